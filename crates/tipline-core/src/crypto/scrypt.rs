//! Scrypt-based derivation of source identity material.
//!
//! Two independent secrets are derived from one passphrase using two
//! distinct fixed salts ("peppers"): the filesystem id (the source's
//! natural key and on-disk directory name) and the passphrase protecting
//! the source's generated PGP secret key. Both are pure functions of
//! (passphrase, pepper, N, r, p); the parameters must stay fixed for the
//! deployment's lifetime or every existing source becomes unreachable.
//!
//! Derivation is deliberately CPU/memory-bound and runs synchronously on
//! the login/registration path: this bounds brute-force throughput.

use data_encoding::BASE32;
use scrypt::{scrypt, Params};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::{Result, TiplineError};
use crate::passphrase::DicewarePassphrase;

/// Derived output length in bytes, before base32 encoding.
const DERIVED_SECRET_LEN: usize = 64;

/// Derives a source's filesystem id and GPG secret from their passphrase.
pub struct ScryptManager {
    params: Params,
    salt_for_filesystem_id: Vec<u8>,
    salt_for_gpg_secret: Vec<u8>,
}

impl ScryptManager {
    /// Build a manager from the deployment's fixed salts and cost parameters.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::Crypto` if:
    /// - The two peppers are identical (the derived secrets would collide)
    /// - `n` is not a power of two greater than one
    /// - The parameters are rejected by the scrypt implementation
    pub fn new(
        salt_for_filesystem_id: impl Into<Vec<u8>>,
        salt_for_gpg_secret: impl Into<Vec<u8>>,
        n: u32,
        r: u32,
        p: u32,
    ) -> Result<Self> {
        let salt_for_filesystem_id = salt_for_filesystem_id.into();
        let salt_for_gpg_secret = salt_for_gpg_secret.into();

        if salt_for_filesystem_id == salt_for_gpg_secret {
            return Err(TiplineError::Crypto(
                "id pepper and gpg pepper must differ".to_string(),
            ));
        }

        if n < 2 || !n.is_power_of_two() {
            return Err(TiplineError::Crypto(format!(
                "scrypt N must be a power of two greater than one (got {})",
                n
            )));
        }
        let log_n = n.trailing_zeros() as u8;

        let params = Params::new(log_n, r, p, DERIVED_SECRET_LEN)
            .map_err(|e| TiplineError::Crypto(format!("Invalid scrypt parameters: {}", e)))?;

        Ok(Self {
            params,
            salt_for_filesystem_id,
            salt_for_gpg_secret,
        })
    }

    /// Build the manager from deployment configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.scrypt_id_pepper.as_bytes(),
            config.scrypt_gpg_pepper.as_bytes(),
            config.scrypt_n,
            config.scrypt_r,
            config.scrypt_p,
        )
    }

    /// Derive the source's filesystem id: a filesystem-safe base32 string
    /// used as their natural key and on-disk directory name.
    ///
    /// Deterministic: the same passphrase and parameters always produce the
    /// same id, which is how login re-finds the source's record.
    pub fn derive_source_filesystem_id(&self, passphrase: &DicewarePassphrase) -> Result<String> {
        let derived = self.derive(passphrase, &self.salt_for_filesystem_id)?;
        Ok(BASE32.encode(&derived[..]))
    }

    /// Derive the passphrase protecting the source's generated PGP secret
    /// key. Never persisted; zeroized on drop.
    pub fn derive_source_gpg_secret(
        &self,
        passphrase: &DicewarePassphrase,
    ) -> Result<Zeroizing<String>> {
        let derived = self.derive(passphrase, &self.salt_for_gpg_secret)?;
        Ok(Zeroizing::new(BASE32.encode(&derived[..])))
    }

    fn derive(
        &self,
        passphrase: &DicewarePassphrase,
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; DERIVED_SECRET_LEN]>> {
        let mut output = Zeroizing::new([0u8; DERIVED_SECRET_LEN]);
        scrypt(
            passphrase.as_str().as_bytes(),
            salt,
            &self.params,
            &mut output[..],
        )
        .map_err(|e| TiplineError::Crypto(format!("scrypt derivation failed: {}", e)))?;
        Ok(output)
    }
}
