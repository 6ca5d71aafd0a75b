//! Persistence trait definition.
//!
//! The `Database` trait defines the interface the identity and session
//! subsystems require from the persistence layer. The abstraction keeps
//! the core logic testable against an in-memory database and independent
//! of the concrete backend.

use super::types::{Journalist, NewJournalist, NewSource, Source};
use crate::error::Result;

/// Persistence interface for source and journalist records.
///
/// All implementations must enforce uniqueness of `sources.filesystem_id`
/// and `sources.journalist_designation` at the storage level: the
/// check-then-insert in the source factory has an inherent race that only
/// a constraint can close.
pub trait Database: Send + Sync {
    // --- Source operations ---

    /// Insert a new source row.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::PassphraseCollision` if the filesystem id is
    /// already in use, and `TiplineError::DesignationCollision` if the
    /// designation is (the factory retries the latter).
    fn insert_source(&self, new_source: &NewSource) -> Result<Source>;

    /// Get a source by row id, whether or not it has been deleted.
    ///
    /// Session validation re-fetches through this on every call: the
    /// database is the sole source of truth for deletion status.
    fn get_source_by_id(&self, id: i64) -> Result<Option<Source>>;

    /// Get a non-deleted source by its derived filesystem id.
    fn get_active_source_by_filesystem_id(&self, filesystem_id: &str) -> Result<Option<Source>>;

    /// Whether any source (deleted or not) holds this designation.
    fn designation_exists(&self, designation: &str) -> Result<bool>;

    /// Record one more submission or reply for the source, clearing the
    /// pending flag on first contact.
    fn increment_source_interaction_count(&self, id: i64) -> Result<()>;

    /// Soft-delete the source. Takes effect on the next session validation.
    fn mark_source_deleted(&self, id: i64) -> Result<()>;

    // --- Journalist operations ---

    /// Insert a new journalist row.
    fn insert_journalist(&self, new_journalist: &NewJournalist) -> Result<Journalist>;

    /// Get a journalist by login name.
    fn get_journalist_by_username(&self, username: &str) -> Result<Option<Journalist>>;

    /// Replace a journalist's OTP secret, resetting the HOTP counter.
    fn set_journalist_otp_secret(&self, id: i64, otp_secret: &str, is_totp: bool) -> Result<()>;

    /// Persist a verified HOTP counter as the new replay-prevention
    /// baseline. Stored as `counter + 1` by the caller.
    fn update_journalist_hotp_counter(&self, id: i64, counter: i64) -> Result<()>;
}
