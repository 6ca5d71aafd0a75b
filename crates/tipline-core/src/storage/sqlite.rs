//! SQLite persistence backend.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::traits::Database;
use super::types::{Journalist, NewJournalist, NewSource, Source};
use crate::error::{Result, TiplineError};

/// SQLite-backed implementation of the `Database` trait.
///
/// The connection is shared behind a mutex; every trait method is a single
/// statement or transaction, so per-row atomicity follows from SQLite's
/// own guarantees.
pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid BLOB NOT NULL UNIQUE,
        filesystem_id TEXT NOT NULL UNIQUE,
        journalist_designation TEXT NOT NULL UNIQUE,
        interaction_count INTEGER NOT NULL DEFAULT 0,
        pending INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        deleted_at TEXT
    );

    CREATE TABLE IF NOT EXISTS journalists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid BLOB NOT NULL UNIQUE,
        username TEXT NOT NULL UNIQUE,
        otp_secret TEXT NOT NULL,
        is_totp INTEGER NOT NULL DEFAULT 1,
        hotp_counter INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
"#;

impl SqliteDatabase {
    /// Open (creating if necessary) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database. Used by tests and tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the database connection, returning an error if the mutex is
    /// poisoned.
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TiplineError::Storage("SQLite connection poisoned".to_string()))
    }
}

fn source_from_row(row: &Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get("id")?,
        uuid: row.get("uuid")?,
        filesystem_id: row.get("filesystem_id")?,
        journalist_designation: row.get("journalist_designation")?,
        interaction_count: row.get("interaction_count")?,
        pending: row.get("pending")?,
        created_at: row.get("created_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn journalist_from_row(row: &Row<'_>) -> rusqlite::Result<Journalist> {
    Ok(Journalist {
        id: row.get("id")?,
        uuid: row.get("uuid")?,
        username: row.get("username")?,
        otp_secret: row.get("otp_secret")?,
        is_totp: row.get("is_totp")?,
        hotp_counter: row.get("hotp_counter")?,
        created_at: row.get("created_at")?,
    })
}

/// Map a UNIQUE-constraint failure on the sources table to the collision
/// error the factory expects; everything else stays a storage error.
fn map_source_insert_error(err: rusqlite::Error) -> TiplineError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            if message.contains("sources.filesystem_id") {
                return TiplineError::PassphraseCollision;
            }
            if message.contains("sources.journalist_designation") {
                return TiplineError::DesignationCollision;
            }
        }
    }
    TiplineError::from(err)
}

impl Database for SqliteDatabase {
    fn insert_source(&self, new_source: &NewSource) -> Result<Source> {
        let conn = self.lock_conn()?;
        let uuid = Uuid::new_v4();
        let created_at: DateTime<Utc> = Utc::now();

        conn.execute(
            "INSERT INTO sources (uuid, filesystem_id, journalist_designation, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                uuid,
                new_source.filesystem_id,
                new_source.journalist_designation,
                created_at,
            ],
        )
        .map_err(map_source_insert_error)?;

        let id = conn.last_insert_rowid();
        let source = conn.query_row(
            "SELECT * FROM sources WHERE id = ?1",
            params![id],
            source_from_row,
        )?;
        Ok(source)
    }

    fn get_source_by_id(&self, id: i64) -> Result<Option<Source>> {
        let conn = self.lock_conn()?;
        let source = conn
            .query_row(
                "SELECT * FROM sources WHERE id = ?1",
                params![id],
                source_from_row,
            )
            .optional()?;
        Ok(source)
    }

    fn get_active_source_by_filesystem_id(&self, filesystem_id: &str) -> Result<Option<Source>> {
        let conn = self.lock_conn()?;
        let source = conn
            .query_row(
                "SELECT * FROM sources WHERE filesystem_id = ?1 AND deleted_at IS NULL",
                params![filesystem_id],
                source_from_row,
            )
            .optional()?;
        Ok(source)
    }

    fn designation_exists(&self, designation: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sources WHERE journalist_designation = ?1",
            params![designation],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn increment_source_interaction_count(&self, id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE sources
             SET interaction_count = interaction_count + 1, pending = 0
             WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(TiplineError::NotFound(format!("source {}", id)));
        }
        Ok(())
    }

    fn mark_source_deleted(&self, id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let deleted_at: DateTime<Utc> = Utc::now();
        let updated = conn.execute(
            "UPDATE sources SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![deleted_at, id],
        )?;
        if updated == 0 {
            return Err(TiplineError::NotFound(format!("source {}", id)));
        }
        Ok(())
    }

    fn insert_journalist(&self, new_journalist: &NewJournalist) -> Result<Journalist> {
        let conn = self.lock_conn()?;
        let uuid = Uuid::new_v4();
        let created_at: DateTime<Utc> = Utc::now();

        conn.execute(
            "INSERT INTO journalists (uuid, username, otp_secret, is_totp, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uuid,
                new_journalist.username,
                new_journalist.otp_secret,
                new_journalist.is_totp,
                created_at,
            ],
        )?;

        let id = conn.last_insert_rowid();
        let journalist = conn.query_row(
            "SELECT * FROM journalists WHERE id = ?1",
            params![id],
            journalist_from_row,
        )?;
        Ok(journalist)
    }

    fn get_journalist_by_username(&self, username: &str) -> Result<Option<Journalist>> {
        let conn = self.lock_conn()?;
        let journalist = conn
            .query_row(
                "SELECT * FROM journalists WHERE username = ?1",
                params![username],
                journalist_from_row,
            )
            .optional()?;
        Ok(journalist)
    }

    fn set_journalist_otp_secret(&self, id: i64, otp_secret: &str, is_totp: bool) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE journalists SET otp_secret = ?1, is_totp = ?2, hotp_counter = 0
             WHERE id = ?3",
            params![otp_secret, is_totp, id],
        )?;
        if updated == 0 {
            return Err(TiplineError::NotFound(format!("journalist {}", id)));
        }
        Ok(())
    }

    fn update_journalist_hotp_counter(&self, id: i64, counter: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE journalists SET hotp_counter = ?1 WHERE id = ?2",
            params![counter, id],
        )?;
        if updated == 0 {
            return Err(TiplineError::NotFound(format!("journalist {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_source(n: u32) -> NewSource {
        NewSource {
            filesystem_id: format!("FSID{}", n),
            journalist_designation: format!("designation {}", n),
        }
    }

    #[test]
    fn test_insert_and_fetch_source() {
        let db = SqliteDatabase::open_in_memory().expect("open should succeed");
        let source = db.insert_source(&new_source(1)).expect("insert should succeed");

        assert_eq!(source.filesystem_id, "FSID1");
        assert_eq!(source.interaction_count, 0);
        assert!(source.pending);
        assert!(source.deleted_at.is_none());

        let fetched = db
            .get_source_by_id(source.id)
            .expect("fetch should succeed")
            .expect("source should exist");
        assert_eq!(fetched.uuid, source.uuid);

        let by_fsid = db
            .get_active_source_by_filesystem_id("FSID1")
            .expect("fetch should succeed")
            .expect("source should exist");
        assert_eq!(by_fsid.id, source.id);
    }

    #[test]
    fn test_duplicate_filesystem_id_is_passphrase_collision() {
        let db = SqliteDatabase::open_in_memory().expect("open should succeed");
        db.insert_source(&new_source(1)).expect("insert should succeed");

        let mut duplicate = new_source(2);
        duplicate.filesystem_id = "FSID1".to_string();
        let result = db.insert_source(&duplicate);
        assert!(matches!(result, Err(TiplineError::PassphraseCollision)));
    }

    #[test]
    fn test_duplicate_designation_is_designation_collision() {
        let db = SqliteDatabase::open_in_memory().expect("open should succeed");
        db.insert_source(&new_source(1)).expect("insert should succeed");

        let mut duplicate = new_source(2);
        duplicate.journalist_designation = "designation 1".to_string();
        let result = db.insert_source(&duplicate);
        assert!(matches!(result, Err(TiplineError::DesignationCollision)));
    }

    #[test]
    fn test_designation_exists() {
        let db = SqliteDatabase::open_in_memory().expect("open should succeed");
        db.insert_source(&new_source(1)).expect("insert should succeed");

        assert!(db.designation_exists("designation 1").unwrap());
        assert!(!db.designation_exists("unused designation").unwrap());
    }

    #[test]
    fn test_mark_source_deleted_hides_from_active_lookup() {
        let db = SqliteDatabase::open_in_memory().expect("open should succeed");
        let source = db.insert_source(&new_source(1)).expect("insert should succeed");

        db.mark_source_deleted(source.id).expect("delete should succeed");

        // Gone from the login lookup, but still visible by row id so the
        // session layer can observe the deletion.
        assert!(db
            .get_active_source_by_filesystem_id("FSID1")
            .unwrap()
            .is_none());
        let by_id = db.get_source_by_id(source.id).unwrap().expect("row remains");
        assert!(by_id.deleted_at.is_some());
    }

    #[test]
    fn test_increment_interaction_count_clears_pending() {
        let db = SqliteDatabase::open_in_memory().expect("open should succeed");
        let source = db.insert_source(&new_source(1)).expect("insert should succeed");

        db.increment_source_interaction_count(source.id)
            .expect("increment should succeed");
        db.increment_source_interaction_count(source.id)
            .expect("increment should succeed");

        let fetched = db.get_source_by_id(source.id).unwrap().unwrap();
        assert_eq!(fetched.interaction_count, 2);
        assert!(!fetched.pending);
    }

    #[test]
    fn test_journalist_otp_secret_lifecycle() {
        let db = SqliteDatabase::open_in_memory().expect("open should succeed");
        let journalist = db
            .insert_journalist(&NewJournalist {
                username: "dellsberg".to_string(),
                otp_secret: "JHCOGO7VCER3EJ4L".to_string(),
                is_totp: true,
            })
            .expect("insert should succeed");

        assert_eq!(journalist.hotp_counter, 0);
        assert!(journalist.is_totp);

        // Switch to HOTP; counter must reset.
        db.update_journalist_hotp_counter(journalist.id, 13)
            .expect("update should succeed");
        db.set_journalist_otp_secret(journalist.id, "YQTEGUTJCMBETH3KUUZZMRWZAVBKGT5O", false)
            .expect("update should succeed");

        let fetched = db
            .get_journalist_by_username("dellsberg")
            .unwrap()
            .expect("journalist should exist");
        assert!(!fetched.is_totp);
        assert_eq!(fetched.hotp_counter, 0);
        assert_eq!(fetched.otp_secret, "YQTEGUTJCMBETH3KUUZZMRWZAVBKGT5O");
    }
}
