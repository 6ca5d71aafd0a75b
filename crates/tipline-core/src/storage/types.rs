//! Row types for the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted source account.
///
/// The row never holds the source's passphrase or any secret derived from
/// it other than the filesystem id, which is itself a scrypt output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Database row id
    pub id: i64,

    /// Stable public identifier
    pub uuid: Uuid,

    /// Passphrase-derived pseudorandom identifier; natural key and on-disk
    /// directory name
    pub filesystem_id: String,

    /// Two-word display pseudonym shown to journalists
    pub journalist_designation: String,

    /// Number of submissions/replies, used to sequence stored documents
    pub interaction_count: i64,

    /// Whether the source has submitted anything yet
    pub pending: bool,

    /// When the source registered
    pub created_at: DateTime<Utc>,

    /// Set when the account is deleted; a set value invalidates any live
    /// session immediately
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Builder for inserting a new source row.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub filesystem_id: String,
    pub journalist_designation: String,
}

/// A persisted journalist account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journalist {
    /// Database row id
    pub id: i64,

    /// Stable public identifier
    pub uuid: Uuid,

    /// Login name
    pub username: String,

    /// Base32-encoded OTP secret
    pub otp_secret: String,

    /// Whether the secret is used for TOTP (true) or HOTP (false)
    pub is_totp: bool,

    /// HOTP counter baseline; advanced after each successful verification
    pub hotp_counter: i64,

    /// When the journalist was enrolled
    pub created_at: DateTime<Utc>,
}

/// Builder for inserting a new journalist row.
#[derive(Debug, Clone)]
pub struct NewJournalist {
    pub username: String,
    pub otp_secret: String,
    pub is_totp: bool,
}
