//! Error types for Tipline core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; the web/CLI layer is expected
//! to collapse them into user-safe messages. In particular, the three
//! session errors must be folded into one generic "please log in again"
//! response so that a holder of a stale cookie cannot learn whether the
//! account behind it was deleted.

use thiserror::Error;

/// Result type alias for Tipline operations.
pub type Result<T> = std::result::Result<T, TiplineError>;

/// Core error type for Tipline operations.
#[derive(Debug, Error)]
pub enum TiplineError {
    /// An OTP secret failed validation at enrollment (wrong length, not base32).
    #[error("Invalid OTP secret: {0}")]
    OtpSecretInvalid(String),

    /// An OTP token did not verify. Recoverable; callers should rate-limit.
    #[error("Token verification failed")]
    OtpTokenInvalid,

    /// A word list failed its entropy/length validation at startup.
    #[error("Invalid word list: {0}")]
    InvalidWordList(String),

    /// A new source's passphrase derived a filesystem id already in use.
    #[error("Passphrase already in use by another source")]
    PassphraseCollision,

    /// Could not generate an unused journalist designation within the retry bound.
    #[error("Could not generate an unused journalist designation")]
    DesignationCollision,

    /// Authentication failure. Deliberately carries no detail: "no such
    /// source" and "wrong passphrase" must be outwardly indistinguishable.
    #[error("Invalid passphrase")]
    InvalidPassphrase,

    /// No session cookie was presented.
    #[error("User is not logged in")]
    NotLoggedIn,

    /// The session cookie referenced an expired or evicted session.
    #[error("User session has expired")]
    SessionExpired,

    /// The account behind an otherwise-valid session has been deleted.
    #[error("User has been deleted")]
    UserDeleted,

    /// Encryption, decryption, or key derivation error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or contract violation
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TiplineError {
    /// Whether this error is one of the three session-invalidation kinds.
    ///
    /// The route layer should treat all three identically in the response
    /// it sends, while keeping them distinct for audit logging.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            TiplineError::NotLoggedIn | TiplineError::SessionExpired | TiplineError::UserDeleted
        )
    }
}

impl From<std::io::Error> for TiplineError {
    fn from(err: std::io::Error) -> Self {
        TiplineError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for TiplineError {
    fn from(err: rusqlite::Error) -> Self {
        TiplineError::Storage(err.to_string())
    }
}
