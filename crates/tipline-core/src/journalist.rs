//! Journalist two-factor enrollment and login verification.
//!
//! Journalists authenticate with a username plus an OTP token. The OTP
//! secret lives on the journalist row; HOTP verification additionally
//! persists the matched counter (plus one) as the new baseline so a stale
//! token can never be replayed. `Hotp::verify` itself never touches the
//! database; the ratchet write happens here.

use chrono::Utc;
use data_encoding::BASE32_NOPAD;
use tracing::info;

use crate::crypto::{random_base32, Hotp, Totp, HOTP_SECRET_HEX_LENGTH};
use crate::error::{Result, TiplineError};
use crate::storage::{Database, Journalist, NewJournalist};

/// Enroll a new journalist with a fresh 160-bit TOTP secret.
pub fn enroll_journalist(db: &dyn Database, username: &str) -> Result<Journalist> {
    let otp_secret = random_base32(32)?;
    let journalist = db.insert_journalist(&NewJournalist {
        username: username.to_string(),
        otp_secret,
        is_totp: true,
    })?;
    info!(journalist_id = journalist.id, "enrolled new journalist");
    Ok(journalist)
}

/// Replace the journalist's secret with a fresh TOTP secret, returning the
/// new secret for provisioning display.
pub fn regenerate_totp_secret(db: &dyn Database, journalist: &Journalist) -> Result<String> {
    let otp_secret = random_base32(32)?;
    db.set_journalist_otp_secret(journalist.id, &otp_secret, true)?;
    info!(journalist_id = journalist.id, "regenerated TOTP secret");
    Ok(otp_secret)
}

/// Switch the journalist to a hardware HOTP token.
///
/// Takes the 40-hex-char secret printed on the token, validates it, and
/// stores it base32-encoded with the counter reset to zero.
pub fn set_hotp_secret(
    db: &dyn Database,
    journalist: &Journalist,
    secret_as_hex: &str,
) -> Result<()> {
    if secret_as_hex.len() != HOTP_SECRET_HEX_LENGTH {
        return Err(TiplineError::OtpSecretInvalid(
            "Invalid secret length".to_string(),
        ));
    }
    let secret_bytes = hex::decode(secret_as_hex)
        .map_err(|_| TiplineError::OtpSecretInvalid("Secret is not hex-encoded".to_string()))?;
    let secret_as_base32 = BASE32_NOPAD.encode(&secret_bytes);

    // Round-trip through the validator before persisting anything.
    Hotp::new(&secret_as_base32)?;

    db.set_journalist_otp_secret(journalist.id, &secret_as_base32, false)?;
    info!(journalist_id = journalist.id, "enrolled HOTP token");
    Ok(())
}

/// The `otpauth://` URI for the journalist's current TOTP secret.
///
/// # Errors
///
/// Returns `TiplineError::OtpSecretInvalid` if the journalist is enrolled
/// with an HOTP token, which has no provisioning URI.
pub fn get_totp_provisioning_uri(journalist: &Journalist) -> Result<String> {
    if !journalist.is_totp {
        return Err(TiplineError::OtpSecretInvalid(
            "Journalist is enrolled with an HOTP token".to_string(),
        ));
    }
    let totp = Totp::new(&journalist.otp_secret)?;
    Ok(totp.get_provisioning_uri(&journalist.username))
}

/// Verify a login token against the journalist's enrolled secret.
///
/// For HOTP, a successful verification advances the persisted counter to
/// one past the matched value.
///
/// # Errors
///
/// Returns `TiplineError::OtpTokenInvalid` on a failed check; callers
/// should rate-limit before retrying.
pub fn verify_journalist_2fa(
    db: &dyn Database,
    journalist: &Journalist,
    token: &str,
) -> Result<()> {
    if journalist.is_totp {
        let totp = Totp::new(&journalist.otp_secret)?;
        totp.verify(token, Utc::now())
    } else {
        let hotp = Hotp::new(&journalist.otp_secret)?;
        let counter_that_succeeded = hotp.verify(token, journalist.hotp_counter as u64)?;
        db.update_journalist_hotp_counter(journalist.id, counter_that_succeeded as i64 + 1)?;
        Ok(())
    }
}
