//! Source session management.
//!
//! A logged-in source is represented by an opaque 32-byte session id held
//! in a cookie and mapped, with a TTL, to their `SourceUser` in a shared
//! session store. The store is injected rather than being a hidden global,
//! so backends (in-memory behind a mutex, an external cache) are
//! swappable and tests can supply their own.
//!
//! Account deletion takes effect immediately, not at TTL expiry: the
//! database record is re-fetched on every session validation and is the
//! sole source of truth for deletion status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

use crate::config::Config;
use crate::error::{Result, TiplineError};
use crate::source_user::SourceUser;
use crate::storage::Database;

/// Session id length in bytes; hex-encoded to 64 chars in the cookie.
const SESSION_ID_BYTES: usize = 32;

/// The session id slot in a source's cookie.
///
/// Owned by the request layer; the session manager reads and clears it.
#[derive(Debug, Default, Clone)]
pub struct SessionCookie {
    session_id: Option<String>,
}

impl SessionCookie {
    /// An empty cookie, for a request that presented none.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a cookie value presented by an incoming request.
    pub fn from_value(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
        }
    }

    /// The session id to send back to the client, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn set(&mut self, session_id: String) {
        self.session_id = Some(session_id);
    }

    fn clear(&mut self) {
        self.session_id = None;
    }
}

/// Session store interface: a TTL map from session ids to users.
///
/// Implementations must make get/set/delete atomic per key under
/// concurrent requests; no cross-key ordering is required. Expired entries
/// must never be returned and should be purged on access.
pub trait SessionStore: Send + Sync {
    fn set(&self, session_id: &str, user: SourceUser, ttl: Duration) -> Result<()>;
    fn get(&self, session_id: &str) -> Result<Option<SourceUser>>;
    fn delete(&self, session_id: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

struct SessionEntry {
    user: SourceUser,
    expires_at: Instant,
}

/// Process-local session store backed by a mutex-guarded map.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<String, SessionEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, HashMap<String, SessionEntry>>> {
        self.entries
            .lock()
            .map_err(|_| TiplineError::Storage("Session store poisoned".to_string()))
    }
}

impl SessionStore for InMemorySessionStore {
    fn set(&self, session_id: &str, user: SourceUser, ttl: Duration) -> Result<()> {
        let entry = SessionEntry {
            user,
            expires_at: Instant::now() + ttl,
        };
        self.lock_entries()?.insert(session_id.to_string(), entry);
        Ok(())
    }

    fn get(&self, session_id: &str) -> Result<Option<SourceUser>> {
        let mut entries = self.lock_entries()?;
        match entries.get(session_id) {
            Some(entry) if Instant::now() < entry.expires_at => Ok(Some(entry.user.clone())),
            Some(_) => {
                // Purge the expired entry on access.
                entries.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        self.lock_entries()?.remove(session_id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock_entries()?.clear();
        Ok(())
    }
}

/// Issues, validates, and revokes source sessions.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    session_ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, session_expiration_minutes: u64) -> Self {
        Self {
            store,
            session_ttl: Duration::from_secs(session_expiration_minutes * 60),
        }
    }

    /// Build the manager with the configured session TTL.
    pub fn from_config(store: Arc<dyn SessionStore>, config: &Config) -> Self {
        Self::new(store, config.session_expiration_minutes)
    }

    /// Start a session for an authenticated user: generate a fresh random
    /// session id, map it to the user with the configured TTL, and write
    /// it into the cookie.
    pub fn log_user_in(&self, user: SourceUser, cookie: &mut SessionCookie) -> Result<()> {
        let session_id = generate_session_id();
        self.store.set(&session_id, user, self.session_ttl)?;
        cookie.set(session_id);
        info!("source logged in");
        Ok(())
    }

    /// End the current session, if any. A no-op for an absent or unknown
    /// cookie.
    pub fn log_user_out(&self, cookie: &mut SessionCookie) -> Result<()> {
        if let Some(session_id) = cookie.session_id.take() {
            self.store.delete(&session_id)?;
            info!("source logged out");
        }
        Ok(())
    }

    /// Resolve the cookie to a logged-in user.
    ///
    /// The backing database record is re-fetched on every call so that
    /// account deletion logs the source out immediately.
    ///
    /// # Errors
    ///
    /// - `TiplineError::NotLoggedIn` if no cookie is present
    /// - `TiplineError::SessionExpired` if the session is expired or
    ///   unknown; the dangling cookie is cleared
    /// - `TiplineError::UserDeleted` if the backing record has been
    ///   deleted; the session is revoked and the cookie cleared
    pub fn get_logged_in_user(
        &self,
        db: &dyn Database,
        cookie: &mut SessionCookie,
    ) -> Result<SourceUser> {
        let Some(session_id) = cookie.session_id() else {
            return Err(TiplineError::NotLoggedIn);
        };
        let session_id = session_id.to_string();

        let Some(user) = self.store.get(&session_id)? else {
            cookie.clear();
            return Err(TiplineError::SessionExpired);
        };

        let record_is_live = db
            .get_source_by_id(user.db_record_id())?
            .is_some_and(|record| record.deleted_at.is_none());
        if !record_is_live {
            self.store.delete(&session_id)?;
            cookie.clear();
            info!(source_id = user.db_record_id(), "session revoked for deleted source");
            return Err(TiplineError::UserDeleted);
        }

        Ok(user)
    }

    /// Whether the cookie resolves to a live session.
    ///
    /// Swallows the three session-invalidation errors; anything else (e.g.
    /// a storage failure) still propagates.
    pub fn is_user_logged_in(&self, db: &dyn Database, cookie: &mut SessionCookie) -> Result<bool> {
        match self.get_logged_in_user(db, cookie) {
            Ok(_) => Ok(true),
            Err(err) if err.is_session_error() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Revoke every session. Admin/testing operation.
    pub fn log_all_users_out(&self) -> Result<()> {
        self.store.clear()?;
        info!("all sessions revoked");
        Ok(())
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ScryptManager;
    use crate::designation::DesignationGenerator;
    use crate::filestore::Filestore;
    use crate::passphrase::DicewarePassphrase;
    use crate::source_user::create_source_user;
    use crate::storage::SqliteDatabase;

    struct Harness {
        db: SqliteDatabase,
        manager: SessionManager,
        user: SourceUser,
        _root: tempfile::TempDir,
    }

    fn harness_with_ttl(session_expiration_minutes: u64) -> Harness {
        let db = SqliteDatabase::open_in_memory().expect("open should succeed");
        let root = tempfile::tempdir().expect("tempdir should be created");
        let scrypt_manager = ScryptManager::new(&b"id-pepper"[..], &b"gpg-pepper"[..], 16, 8, 1)
            .expect("manager should build");
        let nouns = (0..10).map(|i| format!("noun{}", i)).collect();
        let adjectives = (0..10).map(|i| format!("adj{}", i)).collect();
        let designations =
            DesignationGenerator::new(nouns, adjectives).expect("generator should build");
        let filestore = Filestore::new(root.path()).expect("store should build");

        let passphrase = DicewarePassphrase::new("resume fifth grab risk tummy meet mouse");
        let user = create_source_user(&db, &passphrase, &filestore, &scrypt_manager, &designations)
            .expect("create should succeed");

        let store = Arc::new(InMemorySessionStore::new());
        let manager = SessionManager::new(store, session_expiration_minutes);

        Harness {
            db,
            manager,
            user,
            _root: root,
        }
    }

    fn harness() -> Harness {
        harness_with_ttl(120)
    }

    #[test]
    fn test_login_then_get_logged_in_user() {
        let h = harness();
        let mut cookie = SessionCookie::new();

        h.manager
            .log_user_in(h.user.clone(), &mut cookie)
            .expect("login should succeed");
        let session_id = cookie.session_id().expect("cookie should be set");
        assert_eq!(session_id.len(), 64);
        assert!(session_id.chars().all(|c| c.is_ascii_hexdigit()));

        let logged_in = h
            .manager
            .get_logged_in_user(&h.db, &mut cookie)
            .expect("session should resolve");
        assert_eq!(logged_in.db_record_id(), h.user.db_record_id());
        assert!(h.manager.is_user_logged_in(&h.db, &mut cookie).unwrap());
    }

    #[test]
    fn test_absent_cookie_is_not_logged_in() {
        let h = harness();
        let mut cookie = SessionCookie::new();

        let result = h.manager.get_logged_in_user(&h.db, &mut cookie);
        assert!(matches!(result, Err(TiplineError::NotLoggedIn)));
        assert!(!h.manager.is_user_logged_in(&h.db, &mut cookie).unwrap());
    }

    #[test]
    fn test_logout_ends_session() {
        let h = harness();
        let mut cookie = SessionCookie::new();

        h.manager
            .log_user_in(h.user.clone(), &mut cookie)
            .expect("login should succeed");
        h.manager
            .log_user_out(&mut cookie)
            .expect("logout should succeed");

        let result = h.manager.get_logged_in_user(&h.db, &mut cookie);
        assert!(matches!(result, Err(TiplineError::NotLoggedIn)));

        // Logging out again is a no-op.
        h.manager
            .log_user_out(&mut cookie)
            .expect("repeated logout should succeed");
    }

    #[test]
    fn test_expired_session_is_purged_and_cookie_cleared() {
        let h = harness_with_ttl(0);
        let mut cookie = SessionCookie::new();

        h.manager
            .log_user_in(h.user.clone(), &mut cookie)
            .expect("login should succeed");

        let result = h.manager.get_logged_in_user(&h.db, &mut cookie);
        assert!(matches!(result, Err(TiplineError::SessionExpired)));
        assert!(cookie.session_id().is_none());
    }

    #[test]
    fn test_unknown_session_id_is_expired() {
        let h = harness();
        let mut cookie = SessionCookie::from_value("f".repeat(64));

        let result = h.manager.get_logged_in_user(&h.db, &mut cookie);
        assert!(matches!(result, Err(TiplineError::SessionExpired)));
        assert!(cookie.session_id().is_none());
    }

    #[test]
    fn test_deleted_source_is_logged_out_immediately() {
        let h = harness();
        let mut cookie = SessionCookie::new();

        h.manager
            .log_user_in(h.user.clone(), &mut cookie)
            .expect("login should succeed");

        // Delete the account without touching the session TTL.
        h.db.mark_source_deleted(h.user.db_record_id())
            .expect("delete should succeed");

        let result = h.manager.get_logged_in_user(&h.db, &mut cookie);
        assert!(matches!(result, Err(TiplineError::UserDeleted)));
        assert!(cookie.session_id().is_none());
    }

    #[test]
    fn test_log_all_users_out() {
        let h = harness();
        let mut first = SessionCookie::new();
        let mut second = SessionCookie::new();

        h.manager
            .log_user_in(h.user.clone(), &mut first)
            .expect("login should succeed");
        h.manager
            .log_user_in(h.user.clone(), &mut second)
            .expect("login should succeed");

        h.manager.log_all_users_out().expect("clear should succeed");

        assert!(matches!(
            h.manager.get_logged_in_user(&h.db, &mut first),
            Err(TiplineError::SessionExpired)
        ));
        assert!(matches!(
            h.manager.get_logged_in_user(&h.db, &mut second),
            Err(TiplineError::SessionExpired)
        ));
    }

    #[test]
    fn test_store_stays_consistent_under_concurrent_sessions() {
        let h = Arc::new(harness());

        // One long-lived session that every worker validates while all of
        // them churn their own logins and logouts against the same store.
        let mut shared_cookie = SessionCookie::new();
        h.manager
            .log_user_in(h.user.clone(), &mut shared_cookie)
            .expect("login should succeed");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                let shared_cookie = shared_cookie.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let mut own_cookie = SessionCookie::new();
                        h.manager
                            .log_user_in(h.user.clone(), &mut own_cookie)
                            .expect("login should succeed");
                        let resolved = h
                            .manager
                            .get_logged_in_user(&h.db, &mut own_cookie)
                            .expect("own session should resolve");
                        assert_eq!(resolved.db_record_id(), h.user.db_record_id());

                        h.manager
                            .log_user_out(&mut own_cookie)
                            .expect("logout should succeed");
                        assert!(matches!(
                            h.manager.get_logged_in_user(&h.db, &mut own_cookie),
                            Err(TiplineError::NotLoggedIn)
                        ));

                        // Churn in other threads must never lose or
                        // resurrect an unrelated entry.
                        let mut shared_cookie = shared_cookie.clone();
                        h.manager
                            .get_logged_in_user(&h.db, &mut shared_cookie)
                            .expect("shared session should stay live");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker should not panic");
        }

        h.manager
            .get_logged_in_user(&h.db, &mut shared_cookie)
            .expect("shared session should survive the churn");
    }

    #[test]
    fn test_each_login_issues_a_fresh_session_id() {
        let h = harness();
        let mut first = SessionCookie::new();
        let mut second = SessionCookie::new();

        h.manager
            .log_user_in(h.user.clone(), &mut first)
            .expect("login should succeed");
        h.manager
            .log_user_in(h.user.clone(), &mut second)
            .expect("login should succeed");

        assert_ne!(first.session_id(), second.session_id());
    }
}
