//! Deployment configuration.
//!
//! The original deployment kept these values in a module-level config
//! singleton; here they are an explicit immutable struct passed into the
//! constructors that need them (scrypt manager, passphrase generator,
//! session manager). The CLI loads this from a TOML file.

use std::path::PathBuf;

use serde::Deserialize;

/// Immutable deployment configuration.
///
/// The scrypt parameters and the two peppers are fixed for the lifetime of
/// a deployment: changing any of them changes every derived filesystem id
/// and orphans all existing sources. This is an operational constraint, not
/// a bug.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// scrypt CPU/memory cost parameter. Must be a power of two.
    pub scrypt_n: u32,

    /// scrypt block size parameter.
    pub scrypt_r: u32,

    /// scrypt parallelism parameter.
    pub scrypt_p: u32,

    /// Fixed salt for filesystem id derivation.
    pub scrypt_id_pepper: String,

    /// Fixed salt for GPG secret derivation. Must differ from the id pepper.
    pub scrypt_gpg_pepper: String,

    /// Session time-to-live, in minutes.
    pub session_expiration_minutes: u64,

    /// Directory of `<language>.txt` passphrase word lists.
    pub wordlists_dir: PathBuf,

    /// Word list of nouns for journalist designations.
    pub nouns_file: PathBuf,

    /// Word list of adjectives for journalist designations.
    pub adjectives_file: PathBuf,

    /// Root directory for per-source submission storage.
    pub store_dir: PathBuf,
}
