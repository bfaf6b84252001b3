//! Control-plane storage (§6 storage layout): bot configs, platform
//! conversations, conversation messages, and extracted variables.
//!
//! Grounded on `flowengine_sessions::db` for the "one `init_db`, `IF NOT
//! EXISTS` everywhere" convention, and on the original source's
//! `bot_config.py` / `variable_storage.py` for the table shapes.

use rusqlite::{Connection, OptionalExtension};

use flowengine_core::error::{EngineError, Result};

/// Initialise all control-plane tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bot_configs (
            id                   TEXT PRIMARY KEY,
            platform             TEXT NOT NULL,
            name                 TEXT NOT NULL,
            bot_token_encrypted  TEXT NOT NULL,
            webhook_secret       TEXT NOT NULL,
            flow_file_path       TEXT NOT NULL,
            is_active            INTEGER NOT NULL DEFAULT 1,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS platform_conversations (
            id                TEXT PRIMARY KEY,
            bot_config_id     TEXT NOT NULL REFERENCES bot_configs(id),
            platform_user_id  TEXT NOT NULL,
            session_id        TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'active',
            created_at        TEXT NOT NULL,
            last_message_at   TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_bot_user
            ON platform_conversations(bot_config_id, platform_user_id);
        CREATE INDEX IF NOT EXISTS idx_conversations_session
            ON platform_conversations(session_id);

        CREATE TABLE IF NOT EXISTS conversation_messages (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL REFERENCES platform_conversations(id),
            role             TEXT NOT NULL,
            content          TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON conversation_messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS extracted_variables (
            conversation_id  TEXT NOT NULL REFERENCES platform_conversations(id),
            name             TEXT NOT NULL,
            value            TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            PRIMARY KEY (conversation_id, name)
        );",
    )
    .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    Ok(())
}

/// Open (creating if absent) the sqlite file at `path` with all tables
/// present.
pub fn open(path: &str) -> Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
        }
    }
    let conn = Connection::open(path).map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    init_db(&conn)?;
    Ok(conn)
}

/// Upsert a single extracted variable for a conversation (mirrors the
/// original source's `variable_storage.py` upsert semantics).
pub fn upsert_variable(
    conn: &Connection,
    conversation_id: &str,
    name: &str,
    value: &serde_json::Value,
) -> Result<()> {
    let value_text = serde_json::to_string(value).map_err(EngineError::Serialization)?;
    conn.execute(
        "INSERT INTO extracted_variables (conversation_id, name, value, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(conversation_id, name) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        rusqlite::params![
            conversation_id,
            name,
            value_text,
            chrono::Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    Ok(())
}

/// All extracted variables for a conversation, as a JSON object.
pub fn load_variables(
    conn: &Connection,
    conversation_id: &str,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut stmt = conn
        .prepare("SELECT name, value FROM extracted_variables WHERE conversation_id = ?1")
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![conversation_id], |row| {
            let name: String = row.get(0)?;
            let value: String = row.get(1)?;
            Ok((name, value))
        })
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;

    let mut out = serde_json::Map::new();
    for row in rows {
        let (name, value) = row.map_err(|e| EngineError::StoreFailure(e.to_string()))?;
        let parsed: serde_json::Value =
            serde_json::from_str(&value).unwrap_or(serde_json::Value::Null);
        out.insert(name, parsed);
    }
    Ok(out)
}

/// Append one conversation message row and bump the parent conversation's
/// `last_message_at` so admin listings can sort by recency.
pub fn append_message(
    conn: &Connection,
    conversation_id: &str,
    role: &str,
    content: &str,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO conversation_messages (id, conversation_id, role, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![uuid::Uuid::new_v4().to_string(), conversation_id, role, content, now],
    )
    .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    conn.execute(
        "UPDATE platform_conversations SET last_message_at = ?2 WHERE id = ?1",
        rusqlite::params![conversation_id, now],
    )
    .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    Ok(())
}

/// One row of `platform_conversations`, as exposed to the admin API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationRow {
    pub id: String,
    pub bot_config_id: String,
    pub platform_user_id: String,
    pub session_id: String,
    pub status: String,
    pub created_at: String,
    pub last_message_at: String,
}

fn conversation_row(row: &rusqlite::Row) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        bot_config_id: row.get(1)?,
        platform_user_id: row.get(2)?,
        session_id: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        last_message_at: row.get(6)?,
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, bot_config_id, platform_user_id, session_id, status, created_at, last_message_at";

/// Find the conversation for `(bot_config_id, platform_user_id)`, creating
/// one with a freshly-minted session id if absent (§4.9 step 2 of the
/// Telegram adapter contract). Returns `(conversation_id, session_id,
/// is_closed)`.
pub fn find_or_create_conversation(
    conn: &Connection,
    bot_config_id: &str,
    platform: &str,
    platform_user_id: &str,
) -> Result<(String, String, bool)> {
    let existing: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, session_id, status FROM platform_conversations
             WHERE bot_config_id = ?1 AND platform_user_id = ?2",
            rusqlite::params![bot_config_id, platform_user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;

    if let Some((id, session_id, status)) = existing {
        return Ok((id, session_id, status != "active"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let session_id =
        flowengine_core::types::SessionId::for_platform_conversation(platform, bot_config_id, platform_user_id)
            .to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO platform_conversations (id, bot_config_id, platform_user_id, session_id, status, created_at, last_message_at)
         VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
        rusqlite::params![id, bot_config_id, platform_user_id, session_id, now],
    )
    .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    Ok((id, session_id, false))
}

pub fn get_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM platform_conversations WHERE id = ?1"),
        rusqlite::params![id],
        conversation_row,
    )
    .optional()
    .map_err(|e| EngineError::StoreFailure(e.to_string()))
}

pub fn conversations_by_bot(conn: &Connection, bot_config_id: &str) -> Result<Vec<ConversationRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM platform_conversations
             WHERE bot_config_id = ?1 ORDER BY last_message_at DESC"
        ))
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![bot_config_id], conversation_row)
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::StoreFailure(e.to_string()))
}

/// Every `(variable_name, value, conversation_id)` triple recorded for any
/// conversation belonging to `bot_config_id` — the raw material for both the
/// by-bot listing and the bot-level summary.
pub fn variables_by_bot(
    conn: &Connection,
    bot_config_id: &str,
) -> Result<Vec<(String, String, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT ev.conversation_id, ev.name, ev.value
             FROM extracted_variables ev
             JOIN platform_conversations pc ON pc.id = ev.conversation_id
             WHERE pc.bot_config_id = ?1",
        )
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![bot_config_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::StoreFailure(e.to_string()))
}

/// Every `(variable_name, value, conversation_id)` triple recorded for any
/// conversation whose owning bot's `flow_file_path` matches `flow_file_path`
/// exactly (§9 open question: flows are identified by their file path since
/// the flow model itself carries no id).
pub fn variables_by_flow(
    conn: &Connection,
    flow_file_path: &str,
) -> Result<Vec<(String, String, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT ev.conversation_id, ev.name, ev.value
             FROM extracted_variables ev
             JOIN platform_conversations pc ON pc.id = ev.conversation_id
             JOIN bot_configs bc ON bc.id = pc.bot_config_id
             WHERE bc.flow_file_path = ?1",
        )
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![flow_file_path], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::StoreFailure(e.to_string()))
}

/// Free-text search across extracted variables, filtering on whichever of
/// `name`, `value`, `bot_config_id` are supplied (all are ANDed together).
pub fn search_variables(
    conn: &Connection,
    name: Option<&str>,
    value: Option<&str>,
    bot_config_id: Option<&str>,
) -> Result<Vec<(String, String, String)>> {
    let mut sql = String::from(
        "SELECT ev.conversation_id, ev.name, ev.value
         FROM extracted_variables ev
         JOIN platform_conversations pc ON pc.id = ev.conversation_id
         WHERE 1 = 1",
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if let Some(name) = name {
        sql.push_str(" AND ev.name LIKE ?");
        params.push(Box::new(format!("%{name}%")));
    }
    if let Some(value) = value {
        sql.push_str(" AND ev.value LIKE ?");
        params.push(Box::new(format!("%{value}%")));
    }
    if let Some(bot_config_id) = bot_config_id {
        sql.push_str(" AND pc.bot_config_id = ?");
        params.push(Box::new(bot_config_id.to_string()));
    }

    let mut stmt = conn.prepare(&sql).map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::StoreFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn variable_upsert_overwrites() {
        let conn = conn();
        conn.execute(
            "INSERT INTO bot_configs (id, platform, name, bot_token_encrypted, webhook_secret, flow_file_path, created_at, updated_at)
             VALUES ('b1','telegram','bot','enc','secret','flow.json','now','now')",
            [],
        ).unwrap();
        conn.execute(
            "INSERT INTO platform_conversations (id, bot_config_id, platform_user_id, session_id, created_at, last_message_at)
             VALUES ('c1','b1','u1','s1','now','now')",
            [],
        ).unwrap();

        upsert_variable(&conn, "c1", "name", &serde_json::json!("Alice")).unwrap();
        upsert_variable(&conn, "c1", "name", &serde_json::json!("Bob")).unwrap();

        let vars = load_variables(&conn, "c1").unwrap();
        assert_eq!(vars.get("name").unwrap(), "Bob");
    }

    #[test]
    fn append_message_persists() {
        let conn = conn();
        conn.execute(
            "INSERT INTO bot_configs (id, platform, name, bot_token_encrypted, webhook_secret, flow_file_path, created_at, updated_at)
             VALUES ('b1','telegram','bot','enc','secret','flow.json','now','now')",
            [],
        ).unwrap();
        conn.execute(
            "INSERT INTO platform_conversations (id, bot_config_id, platform_user_id, session_id, created_at, last_message_at)
             VALUES ('c1','b1','u1','s1','now','now')",
            [],
        ).unwrap();
        let before: String = conn
            .query_row(
                "SELECT last_message_at FROM platform_conversations WHERE id = 'c1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(before, "now");

        append_message(&conn, "c1", "user", "hello").unwrap();

        let after: String = conn
            .query_row(
                "SELECT last_message_at FROM platform_conversations WHERE id = 'c1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(after, "now");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM conversation_messages WHERE conversation_id = 'c1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    fn insert_bot(conn: &Connection, id: &str, flow_file_path: &str) {
        conn.execute(
            "INSERT INTO bot_configs (id, platform, name, bot_token_encrypted, webhook_secret, flow_file_path, created_at, updated_at)
             VALUES (?1,'telegram','bot','enc','secret',?2,'now','now')",
            rusqlite::params![id, flow_file_path],
        )
        .unwrap();
    }

    #[test]
    fn find_or_create_conversation_is_idempotent() {
        let conn = conn();
        insert_bot(&conn, "b1", "flow.json");

        let (id1, session1, closed1) =
            find_or_create_conversation(&conn, "b1", "telegram", "u1").unwrap();
        assert!(!closed1);

        let (id2, session2, _) = find_or_create_conversation(&conn, "b1", "telegram", "u1").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(session1, session2);
    }

    #[test]
    fn find_or_create_conversation_distinguishes_users() {
        let conn = conn();
        insert_bot(&conn, "b1", "flow.json");

        let (id1, ..) = find_or_create_conversation(&conn, "b1", "telegram", "u1").unwrap();
        let (id2, ..) = find_or_create_conversation(&conn, "b1", "telegram", "u2").unwrap();
        assert_ne!(id1, id2);
    }

    #[test]
    fn search_variables_filters_by_name_and_bot() {
        let conn = conn();
        insert_bot(&conn, "b1", "flow.json");
        insert_bot(&conn, "b2", "other.json");
        let (c1, ..) = find_or_create_conversation(&conn, "b1", "telegram", "u1").unwrap();
        let (c2, ..) = find_or_create_conversation(&conn, "b2", "telegram", "u2").unwrap();
        upsert_variable(&conn, &c1, "email", &serde_json::json!("a@example.com")).unwrap();
        upsert_variable(&conn, &c2, "email", &serde_json::json!("b@example.com")).unwrap();

        let results = search_variables(&conn, Some("email"), None, Some("b1")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, c1);
    }

    #[test]
    fn variables_by_flow_joins_through_bot() {
        let conn = conn();
        insert_bot(&conn, "b1", "flows/support.json");
        let (c1, ..) = find_or_create_conversation(&conn, "b1", "telegram", "u1").unwrap();
        upsert_variable(&conn, &c1, "name", &serde_json::json!("Alice")).unwrap();

        let rows = variables_by_flow(&conn, "flows/support.json").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "name");
    }
}
