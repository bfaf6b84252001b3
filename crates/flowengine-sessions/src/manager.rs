use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::types::ChatSession;

/// Thread-safe session store implementing the §4.2 contract:
/// `load(session_id) -> Session?`, `save(session)`, `clear(session_id)`.
///
/// Wraps a single SQLite connection in a `Mutex`, matching the corpus's
/// single-node Phase-2 posture — a connection pool is unnecessary at this
/// scale, and every call here is a single short-lived statement.
pub struct SessionStore {
    db: Mutex<Connection>,
    ttl_secs: Option<u64>,
}

impl SessionStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection, ttl_secs: Option<u64>) -> Self {
        Self {
            db: Mutex::new(conn),
            ttl_secs,
        }
    }

    /// Load a session by id. Returns `Ok(None)` when absent or expired —
    /// absence is never an error per §4.2.
    #[instrument(skip(self), fields(session_id))]
    pub fn load(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let db = self.db.lock().unwrap();
        let row: Option<(String, Option<String>)> = db
            .query_row(
                "SELECT data, expires_at FROM sessions WHERE session_id = ?1",
                rusqlite::params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((data, expires_at)) = row else {
            return Ok(None);
        };

        if let Some(expires_at) = expires_at {
            if let Ok(expiry) = chrono::DateTime::parse_from_rfc3339(&expires_at) {
                if expiry < chrono::Utc::now() {
                    debug!(session_id, "session expired, treating as absent");
                    return Ok(None);
                }
            }
        }

        let session: ChatSession = serde_json::from_str(&data)?;
        Ok(Some(session))
    }

    /// Persist the full JSON form of a session, overwriting any prior copy.
    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    pub fn save(&self, session: &ChatSession) -> Result<()> {
        let data = serde_json::to_string(session)?;
        let now = chrono::Utc::now();
        let expires_at = self
            .ttl_secs
            .map(|secs| (now + chrono::Duration::seconds(secs as i64)).to_rfc3339());

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sessions (session_id, data, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
            rusqlite::params![session.session_id, data, now.to_rfc3339(), expires_at],
        )?;
        Ok(())
    }

    /// Delete a session. Idempotent — clearing an absent session is not an
    /// error.
    #[instrument(skip(self), fields(session_id))]
    pub fn clear(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            rusqlite::params![session_id],
        )?;
        Ok(())
    }

    /// All non-expired sessions, most recently updated first. Used by the
    /// admin listing endpoint; skips (rather than fails on) any row whose
    /// JSON no longer deserializes.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<ChatSession>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT data, expires_at FROM sessions ORDER BY updated_at DESC")?;
        let rows = stmt.query_map([], |row| {
            let data: String = row.get(0)?;
            let expires_at: Option<String> = row.get(1)?;
            Ok((data, expires_at))
        })?;

        let now = chrono::Utc::now();
        let mut out = Vec::new();
        for row in rows {
            let (data, expires_at) = row?;
            if let Some(expires_at) = &expires_at {
                if let Ok(expiry) = chrono::DateTime::parse_from_rfc3339(expires_at) {
                    if expiry < now {
                        continue;
                    }
                }
            }
            if let Ok(session) = serde_json::from_str::<ChatSession>(&data) {
                out.push(session);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> SessionStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        SessionStore::new(conn, None)
    }

    #[test]
    fn load_missing_returns_none() {
        let store = store();
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let store = store();
        let session = ChatSession::new("s1", "start");
        store.save(&session).unwrap();
        let loaded = store.load("s1").unwrap().expect("should exist");
        assert_eq!(loaded.current_node_id, "start");
    }

    #[test]
    fn clear_is_idempotent() {
        let store = store();
        store.clear("never-existed").unwrap();
        let session = ChatSession::new("s2", "start");
        store.save(&session).unwrap();
        store.clear("s2").unwrap();
        store.clear("s2").unwrap();
        assert!(store.load("s2").unwrap().is_none());
    }

    #[test]
    fn save_overwrites_existing() {
        let store = store();
        let mut session = ChatSession::new("s3", "start");
        store.save(&session).unwrap();
        session.current_node_id = "end".to_string();
        store.save(&session).unwrap();
        let loaded = store.load("s3").unwrap().unwrap();
        assert_eq!(loaded.current_node_id, "end");
    }

    #[test]
    fn ttl_expired_session_reads_as_absent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let store = SessionStore::new(conn, Some(0));
        let session = ChatSession::new("s4", "start");
        store.save(&session).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(store.load("s4").unwrap().is_none());
    }

    #[test]
    fn list_returns_saved_sessions_and_skips_expired() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        let store = SessionStore::new(conn, None);
        store.save(&ChatSession::new("s1", "start")).unwrap();
        store.save(&ChatSession::new("s2", "start")).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);

        let expiring_conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&expiring_conn).unwrap();
        let expiring = SessionStore::new(expiring_conn, Some(0));
        expiring.save(&ChatSession::new("s3", "start")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(expiring.list().unwrap().is_empty());
    }
}
