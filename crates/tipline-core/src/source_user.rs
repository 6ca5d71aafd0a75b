//! Source account creation and authentication.
//!
//! A source has no username: their passphrase is the sole identity and
//! authentication factor. This supports deniability, and it means the
//! server cannot efficiently enumerate valid sources. Everything derived
//! from the passphrase is recomputed at login; only the filesystem id (an
//! scrypt output) is persisted.

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto::ScryptManager;
use crate::designation::DesignationGenerator;
use crate::error::{Result, TiplineError};
use crate::filestore::Filestore;
use crate::passphrase::DicewarePassphrase;
use crate::storage::{Database, NewSource, Source};

/// Bound on designation generation retries.
///
/// The stock word lists give roughly a million distinct designations. Even
/// at ten thousand active sources the per-draw collision chance is about
/// 1%, so the probability of 50 independent draws all colliding is far
/// below any operational concern; exhausting the bound indicates the word
/// lists are misconfigured or the instance is absurdly oversubscribed.
const MAX_DESIGNATION_ATTEMPTS: usize = 50;

/// An authenticated source and the data derived from their passphrase.
///
/// Ephemeral: wraps a reference to one persisted row by id (never the row
/// itself, to force a fresh fetch) plus the transient GPG secret, which is
/// never written to durable storage.
#[derive(Clone)]
pub struct SourceUser {
    db_record_id: i64,
    filesystem_id: String,
    gpg_secret: Zeroizing<String>,
}

impl SourceUser {
    fn new(db_record: &Source, filesystem_id: String, gpg_secret: Zeroizing<String>) -> Self {
        Self {
            db_record_id: db_record.id,
            filesystem_id,
            gpg_secret,
        }
    }

    /// Row id of the backing source record.
    pub fn db_record_id(&self) -> i64 {
        self.db_record_id
    }

    /// The source's derived filesystem id.
    pub fn filesystem_id(&self) -> &str {
        &self.filesystem_id
    }

    /// The passphrase protecting the source's PGP secret key. Transient;
    /// pass it straight to the encryption manager and let it drop.
    pub fn gpg_secret(&self) -> &str {
        &self.gpg_secret
    }

    /// Fetch the backing record fresh from the database.
    pub fn get_db_record(&self, db: &dyn Database) -> Result<Source> {
        db.get_source_by_id(self.db_record_id)?
            .ok_or_else(|| TiplineError::NotFound(format!("source {}", self.db_record_id)))
    }
}

impl std::fmt::Debug for SourceUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceUser")
            .field("db_record_id", &self.db_record_id)
            .field("filesystem_id", &self.filesystem_id)
            .field("gpg_secret", &"[REDACTED]")
            .finish()
    }
}

/// Register a new source from their generated passphrase.
///
/// Derives the filesystem id and GPG secret, generates a collision-checked
/// designation, persists the row, and creates the source's submission
/// directory.
///
/// # Errors
///
/// - `TiplineError::PassphraseCollision` if the passphrase derives a
///   filesystem id already in use (the caller should generate a fresh
///   passphrase and retry)
/// - `TiplineError::DesignationCollision` once the retry bound exhausts
pub fn create_source_user(
    db: &dyn Database,
    source_passphrase: &DicewarePassphrase,
    filestore: &Filestore,
    scrypt_manager: &ScryptManager,
    designation_generator: &DesignationGenerator,
) -> Result<SourceUser> {
    let filesystem_id = scrypt_manager.derive_source_filesystem_id(source_passphrase)?;
    let gpg_secret = scrypt_manager.derive_source_gpg_secret(source_passphrase)?;

    // Find an unused designation. The database's UNIQUE constraint closes
    // the race between this check and the insert below.
    let mut valid_designation = None;
    for _ in 0..MAX_DESIGNATION_ATTEMPTS {
        let new_designation = designation_generator.generate_journalist_designation();
        if !db.designation_exists(&new_designation)? {
            valid_designation = Some(new_designation);
            break;
        }
    }
    let Some(journalist_designation) = valid_designation else {
        warn!(
            attempts = MAX_DESIGNATION_ATTEMPTS,
            "exhausted designation generation attempts"
        );
        return Err(TiplineError::DesignationCollision);
    };

    let db_record = db.insert_source(&NewSource {
        filesystem_id: filesystem_id.clone(),
        journalist_designation,
    })?;

    filestore.create_source_directory(&filesystem_id)?;

    info!(source_id = db_record.id, "created new source");
    Ok(SourceUser::new(&db_record, filesystem_id, gpg_secret))
}

/// Authenticate a source from the passphrase they supplied at login.
///
/// Re-derives the filesystem id and looks up the matching non-deleted
/// record.
///
/// # Errors
///
/// Returns `TiplineError::InvalidPassphrase` if no such source exists; the
/// error is identical whether the passphrase was mistyped or the account
/// never existed or was deleted.
pub fn authenticate_source_user(
    db: &dyn Database,
    supplied_passphrase: &DicewarePassphrase,
    scrypt_manager: &ScryptManager,
) -> Result<SourceUser> {
    let filesystem_id = scrypt_manager.derive_source_filesystem_id(supplied_passphrase)?;

    let Some(db_record) = db.get_active_source_by_filesystem_id(&filesystem_id)? else {
        info!("failed source login attempt");
        return Err(TiplineError::InvalidPassphrase);
    };

    let gpg_secret = scrypt_manager.derive_source_gpg_secret(supplied_passphrase)?;
    Ok(SourceUser::new(&db_record, filesystem_id, gpg_secret))
}
