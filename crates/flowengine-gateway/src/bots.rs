//! Bot configuration CRUD (§6 `bot_configs`), grounded on the original
//! source's `bots.py` admin API and `bot_config.py` model.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use flowengine_core::error::{EngineError, Result};

use crate::crypto::CredentialCipher;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub id: String,
    pub platform: String,
    pub name: String,
    /// Decrypted bot token. Never serialized back out over HTTP — callers
    /// that expose `BotConfig` publicly must redact this field first.
    #[serde(skip_serializing)]
    pub bot_token: String,
    pub webhook_secret: String,
    pub flow_file_path: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct NewBotConfig {
    pub platform: String,
    pub name: String,
    pub bot_token: String,
    pub flow_file_path: String,
}

pub fn create(
    conn: &Connection,
    cipher: &CredentialCipher,
    new: NewBotConfig,
) -> Result<BotConfig> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let webhook_secret = {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
        hex::encode(bytes)
    };
    let token_encrypted = cipher.encrypt(&new.bot_token);

    conn.execute(
        "INSERT INTO bot_configs
            (id, platform, name, bot_token_encrypted, webhook_secret, flow_file_path, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
        rusqlite::params![id, new.platform, new.name, token_encrypted, webhook_secret, new.flow_file_path, now],
    )
    .map_err(|e| EngineError::StoreFailure(e.to_string()))?;

    Ok(BotConfig {
        id,
        platform: new.platform,
        name: new.name,
        bot_token: new.bot_token,
        webhook_secret,
        flow_file_path: new.flow_file_path,
        is_active: true,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get(conn: &Connection, cipher: &CredentialCipher, id: &str) -> Result<Option<BotConfig>> {
    let row: Option<(String, String, String, String, String, String, bool, String, String)> = conn
        .query_row(
            "SELECT id, platform, name, bot_token_encrypted, webhook_secret, flow_file_path, is_active, created_at, updated_at
             FROM bot_configs WHERE id = ?1",
            rusqlite::params![id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            },
        )
        .optional()
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;

    let Some((id, platform, name, token_encrypted, webhook_secret, flow_file_path, is_active, created_at, updated_at)) = row else {
        return Ok(None);
    };

    let bot_token = cipher
        .decrypt(&token_encrypted)
        .map_err(|e| EngineError::Internal(format!("failed to decrypt bot token: {e}")))?;

    Ok(Some(BotConfig {
        id,
        platform,
        name,
        bot_token,
        webhook_secret,
        flow_file_path,
        is_active,
        created_at,
        updated_at,
    }))
}

/// Find the active bot config matching a webhook's secret token path
/// segment (§4.9 step 1: Telegram delivers the secret in the URL or the
/// `X-Telegram-Bot-Api-Secret-Token` header).
pub fn find_by_webhook_secret(
    conn: &Connection,
    cipher: &CredentialCipher,
    secret: &str,
) -> Result<Option<BotConfig>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM bot_configs WHERE webhook_secret = ?1 AND is_active = 1",
            rusqlite::params![secret],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;

    match id {
        Some(id) => get(conn, cipher, &id),
        None => Ok(None),
    }
}

pub fn list(conn: &Connection) -> Result<Vec<(String, String, String, bool)>> {
    let mut stmt = conn
        .prepare("SELECT id, platform, name, is_active FROM bot_configs ORDER BY created_at")
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::StoreFailure(e.to_string()))
}

/// Patch for `PUT /bots/{id}`. Every field is optional; omitted fields keep
/// their current stored value. Supplying `bot_token` re-encrypts it.
#[derive(Debug, Default, Deserialize)]
pub struct BotConfigPatch {
    pub name: Option<String>,
    pub bot_token: Option<String>,
    pub flow_file_path: Option<String>,
    pub is_active: Option<bool>,
}

pub fn update(
    conn: &Connection,
    cipher: &CredentialCipher,
    id: &str,
    patch: BotConfigPatch,
) -> Result<Option<BotConfig>> {
    let Some(existing) = get(conn, cipher, id)? else {
        return Ok(None);
    };

    let name = patch.name.unwrap_or(existing.name);
    let flow_file_path = patch.flow_file_path.unwrap_or(existing.flow_file_path);
    let is_active = patch.is_active.unwrap_or(existing.is_active);
    let token_encrypted = match patch.bot_token {
        Some(token) => cipher.encrypt(&token),
        None => cipher.encrypt(&existing.bot_token),
    };

    conn.execute(
        "UPDATE bot_configs SET name = ?2, bot_token_encrypted = ?3, flow_file_path = ?4, is_active = ?5, updated_at = ?6
         WHERE id = ?1",
        rusqlite::params![id, name, token_encrypted, flow_file_path, is_active, chrono::Utc::now().to_rfc3339()],
    )
    .map_err(|e| EngineError::StoreFailure(e.to_string()))?;

    get(conn, cipher, id)
}

pub fn deactivate(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE bot_configs SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        rusqlite::params![id, chrono::Utc::now().to_rfc3339()],
    )
    .map_err(|e| EngineError::StoreFailure(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;

    fn setup() -> (Connection, CredentialCipher) {
        let conn = Connection::open_in_memory().unwrap();
        storage::init_db(&conn).unwrap();
        let cipher = CredentialCipher::from_hex(&CredentialCipher::generate_key_hex()).unwrap();
        (conn, cipher)
    }

    #[test]
    fn create_then_get_round_trips_token() {
        let (conn, cipher) = setup();
        let created = create(
            &conn,
            &cipher,
            NewBotConfig {
                platform: "telegram".into(),
                name: "support-bot".into(),
                bot_token: "123:ABC".into(),
                flow_file_path: "flows/support.json".into(),
            },
        )
        .unwrap();

        let fetched = get(&conn, &cipher, &created.id).unwrap().unwrap();
        assert_eq!(fetched.bot_token, "123:ABC");
        assert_eq!(fetched.webhook_secret, created.webhook_secret);
    }

    #[test]
    fn find_by_webhook_secret_finds_active_only() {
        let (conn, cipher) = setup();
        let created = create(
            &conn,
            &cipher,
            NewBotConfig {
                platform: "telegram".into(),
                name: "b".into(),
                bot_token: "tok".into(),
                flow_file_path: "f.json".into(),
            },
        )
        .unwrap();

        let found = find_by_webhook_secret(&conn, &cipher, &created.webhook_secret)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);

        deactivate(&conn, &created.id).unwrap();
        assert!(find_by_webhook_secret(&conn, &cipher, &created.webhook_secret)
            .unwrap()
            .is_none());
    }

    #[test]
    fn update_patches_only_supplied_fields() {
        let (conn, cipher) = setup();
        let created = create(
            &conn,
            &cipher,
            NewBotConfig {
                platform: "telegram".into(),
                name: "old-name".into(),
                bot_token: "tok".into(),
                flow_file_path: "old.json".into(),
            },
        )
        .unwrap();

        let updated = update(
            &conn,
            &cipher,
            &created.id,
            BotConfigPatch {
                name: Some("new-name".into()),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();

        assert_eq!(updated.name, "new-name");
        assert_eq!(updated.flow_file_path, "old.json");
        assert_eq!(updated.bot_token, "tok");
    }

    #[test]
    fn update_missing_bot_returns_none() {
        let (conn, cipher) = setup();
        assert!(update(&conn, &cipher, "missing", BotConfigPatch::default())
            .unwrap()
            .is_none());
    }
}
