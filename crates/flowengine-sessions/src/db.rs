use rusqlite::Connection;

use crate::error::Result;

/// Initialise the sessions table. Safe to call on every startup — uses
/// `IF NOT EXISTS` throughout.
///
/// The full `ChatSession` is stored as a single JSON blob per §4.2
/// ("Serialization is the session's full JSON form"), rather than a
/// normalized, stats-aggregating schema.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            data       TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_expires
            ON sessions(expires_at);",
    )?;
    Ok(())
}
