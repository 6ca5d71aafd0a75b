//! Two-factor one-time password validation (RFC 4226 / RFC 6238).
//!
//! Journalists enroll an OTP secret and verify a 6-digit token at login.
//! SHA-1 is retained deliberately: it is what deployed authenticator apps
//! and hardware tokens implement, and HMAC-SHA1 is not affected by SHA-1
//! collision attacks. Do not "upgrade" the algorithm without a migration
//! plan for every enrolled device.

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::rngs::OsRng;
use rand::Rng;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{Result, TiplineError};

type HmacSha1 = Hmac<sha1::Sha1>;

/// Issuer embedded in provisioning URIs.
const ISSUER: &str = "SecureDrop";

/// Number of digits in a generated token.
const TOKEN_DIGITS: u32 = 6;

/// TOTP time step in seconds.
const TIME_STEP_SECONDS: i64 = 30;

/// HOTP verification scans this many counter values past the baseline, to
/// tolerate tokens generated but never submitted.
const LOOK_AHEAD_WINDOW_SIZE: u64 = 20;

/// Required length for base32-format HOTP secrets (160 bits).
const HOTP_SECRET_BASE32_LENGTH: usize = 32;

/// Required length for hex-format HOTP secrets as input by users.
pub const HOTP_SECRET_HEX_LENGTH: usize = 40;

/// Minimum length for base32 TOTP secrets. New secrets are 160-bit
/// (32 chars) but journalists enrolled long ago may still have 80-bit
/// (16-char) secrets.
const TOTP_SECRET_MIN_BASE32_LENGTH: usize = 16;

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Generate a random base32 secret of `length` chars.
///
/// # Errors
///
/// Returns `TiplineError::InvalidInput` for lengths under 32 chars
/// (160 bits), the minimum for new enrollments.
pub fn random_base32(length: usize) -> Result<String> {
    if length < 32 {
        return Err(TiplineError::InvalidInput(
            "Secrets should be at least 160 bits".to_string(),
        ));
    }

    let mut rng = OsRng;
    Ok((0..length)
        .map(|_| BASE32_ALPHABET[rng.gen_range(0..BASE32_ALPHABET.len())] as char)
        .collect())
}

/// Decode a base32 secret, accepting lowercase input from UI forms.
fn decode_base32_secret(secret_as_base32: &str) -> Result<Zeroizing<Vec<u8>>> {
    BASE32_NOPAD
        .decode(secret_as_base32.to_ascii_uppercase().as_bytes())
        .map(Zeroizing::new)
        .map_err(|_| TiplineError::OtpSecretInvalid("Secret is not base32-encoded".to_string()))
}

/// RFC 4226 dynamic truncation of an HMAC-SHA1 digest to a 6-digit token.
fn truncate_to_token(secret: &[u8], moving_factor: u64) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|e| TiplineError::Crypto(format!("HMAC key setup failed: {}", e)))?;
    mac.update(&moving_factor.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    let token = binary % 10u32.pow(TOKEN_DIGITS);
    Ok(format!("{:0width$}", token, width = TOKEN_DIGITS as usize))
}

/// Constant-time token comparison, so a submitted token's rejection timing
/// reveals nothing about the expected digits.
fn tokens_match(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

/// Counter-based one-time password validator (RFC 4226).
pub struct Hotp {
    secret: Zeroizing<Vec<u8>>,
}

impl Hotp {
    /// Build a validator from a 32-char base32 secret.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::OtpSecretInvalid` if the secret is not
    /// exactly 32 base32 chars (160 bits) or is not valid base32.
    pub fn new(secret_as_base32: &str) -> Result<Self> {
        if secret_as_base32.len() != HOTP_SECRET_BASE32_LENGTH {
            return Err(TiplineError::OtpSecretInvalid(
                "Invalid secret length".to_string(),
            ));
        }
        let secret = decode_base32_secret(secret_as_base32)?;
        Ok(Self { secret })
    }

    /// Build a validator from the 40-hex-char form users type in when
    /// enrolling a hardware token.
    pub fn from_hex_secret(secret_as_hex: &str) -> Result<Self> {
        if secret_as_hex.len() != HOTP_SECRET_HEX_LENGTH {
            return Err(TiplineError::OtpSecretInvalid(
                "Invalid secret length".to_string(),
            ));
        }
        let secret = hex::decode(secret_as_hex)
            .map(Zeroizing::new)
            .map_err(|_| TiplineError::OtpSecretInvalid("Secret is not hex-encoded".to_string()))?;
        Ok(Self { secret })
    }

    /// Generate the 6-digit token for `counter`.
    pub fn generate(&self, counter: u64) -> Result<String> {
        truncate_to_token(&self.secret, counter)
    }

    /// Validate a token, scanning the look-ahead window
    /// `[counter, counter + 20)`.
    ///
    /// Returns the counter value that succeeded. The caller must persist
    /// the returned value as the new baseline so stale tokens cannot be
    /// replayed; `verify` itself never mutates shared state.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::OtpTokenInvalid` if no counter in the window
    /// matches.
    pub fn verify(&self, token: &str, counter: u64) -> Result<u64> {
        for counter_value in counter..counter + LOOK_AHEAD_WINDOW_SIZE {
            if tokens_match(&self.generate(counter_value)?, token) {
                return Ok(counter_value);
            }
        }
        Err(TiplineError::OtpTokenInvalid)
    }
}

/// Time-based one-time password validator (RFC 6238).
pub struct Totp {
    secret: Zeroizing<Vec<u8>>,
    secret_as_base32: String,
}

impl Totp {
    /// Build a validator from a base32 secret of at least 16 chars.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::OtpSecretInvalid` if the secret is shorter
    /// than 16 base32 chars (80 bits, the legacy minimum) or is not valid
    /// base32.
    pub fn new(secret_as_base32: &str) -> Result<Self> {
        if secret_as_base32.len() < TOTP_SECRET_MIN_BASE32_LENGTH {
            return Err(TiplineError::OtpSecretInvalid(
                "Invalid secret length".to_string(),
            ));
        }
        let secret = decode_base32_secret(secret_as_base32)?;
        Ok(Self {
            secret,
            secret_as_base32: secret_as_base32.to_ascii_uppercase(),
        })
    }

    /// Generate the 6-digit token for the time step containing `time`.
    pub fn generate(&self, time: DateTime<Utc>) -> Result<String> {
        let time_step = time.timestamp().div_euclid(TIME_STEP_SECONDS);
        truncate_to_token(&self.secret, time_step as u64)
    }

    /// Generate the token for the current time.
    pub fn now(&self) -> Result<String> {
        self.generate(Utc::now())
    }

    /// Validate a token against `time`.
    ///
    /// The token is also checked against the previous and next time steps,
    /// to compensate for clock skew between the client and the server. The
    /// total valid window is 90 seconds.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::OtpTokenInvalid` if the token matches none of
    /// the three time steps.
    pub fn verify(&self, token: &str, time: DateTime<Utc>) -> Result<()> {
        for index_for_time_skew in [-1i64, 0, 1] {
            let time_step = (time.timestamp() + TIME_STEP_SECONDS * index_for_time_skew)
                .div_euclid(TIME_STEP_SECONDS);
            if tokens_match(&truncate_to_token(&self.secret, time_step as u64)?, token) {
                return Ok(());
            }
        }
        Err(TiplineError::OtpTokenInvalid)
    }

    /// Standard `otpauth://` Key URI for authenticator-app enrollment.
    pub fn get_provisioning_uri(&self, account_name: &str) -> String {
        let account = utf8_percent_encode(account_name, NON_ALPHANUMERIC);
        format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={digits}&period={period}",
            issuer = ISSUER,
            account = account,
            secret = self.secret_as_base32,
            digits = TOKEN_DIGITS,
            period = TIME_STEP_SECONDS,
        )
    }
}
