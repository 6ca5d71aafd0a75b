//! # Tipline Core
//!
//! Core library for Tipline - the source identity and session security
//! subsystem of a whistleblower submission portal.
//!
//! This crate provides everything between a source's passphrase and their
//! authenticated session, independent of the HTTP layer:
//!
//! - **passphrase**: diceware passphrase generation from validated word lists
//! - **crypto**: scrypt identity derivation and HOTP/TOTP validators
//! - **designation**: two-word display pseudonyms for sources
//! - **source_user**: source registration and passphrase authentication
//! - **journalist**: journalist 2FA enrollment and login verification
//! - **session**: TTL-bound sessions over an injectable store
//! - **secure_tempfile**: encrypted on-disk buffering of uploads
//! - **storage**: the persistence trait and its SQLite backend
//! - **filestore**: per-source submission directories
//!
//! ## Security Model
//!
//! A source's passphrase is their only credential. Everything the server
//! keeps for them is derived from it through memory-hard scrypt with
//! deployment-fixed peppers; no plaintext passphrase, OTP secret token, or
//! derived key is ever logged, and none of it reaches durable storage.

pub mod config;
pub mod crypto;
pub mod designation;
pub mod error;
pub mod filestore;
pub mod journalist;
pub mod passphrase;
pub mod secure_tempfile;
pub mod session;
pub mod source_user;
pub mod storage;

pub use config::Config;
pub use crypto::{Hotp, ScryptManager, Totp};
pub use designation::DesignationGenerator;
pub use error::{Result, TiplineError};
pub use filestore::Filestore;
pub use passphrase::{DicewarePassphrase, PassphraseGenerator};
pub use secure_tempfile::SecureTemporaryFile;
pub use session::{InMemorySessionStore, SessionCookie, SessionManager, SessionStore};
pub use source_user::{authenticate_source_user, create_source_user, SourceUser};
pub use storage::{Database, SqliteDatabase};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
