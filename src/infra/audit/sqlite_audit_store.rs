// SQLite-backed audit store for the moderation trail.
//
// Tables:
// - moderation_audit: append-only log of mute/ban/unmute actions

use crate::core::audit::{AuditEntry, AuditError, AuditStore, ModerationAction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteAuditStore {
    pool: Pool<Sqlite>,
}

impl SqliteAuditStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                actor_id INTEGER,
                action TEXT NOT NULL,
                reason TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_moderation_audit_guild
                ON moderation_audit(guild_id, timestamp);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_audit (guild_id, target_id, actor_id, action, reason, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.guild_id as i64)
        .bind(entry.target_id as i64)
        .bind(entry.actor_id.map(|id| id as i64))
        .bind(entry.action.to_string())
        .bind(&entry.reason)
        .bind(entry.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn recent(&self, guild_id: u64, limit: u32) -> Result<Vec<AuditEntry>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id, target_id, actor_id, action, reason, timestamp
            FROM moderation_audit
            WHERE guild_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(guild_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let action_str: String = row.get("action");
            let action = action_str
                .parse::<ModerationAction>()
                .map_err(|_| AuditError::Storage(format!("unknown action '{}'", action_str)))?;

            let timestamp_str: String = row.get("timestamp");
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            entries.push(AuditEntry {
                guild_id: row.get::<i64, _>("guild_id") as u64,
                target_id: row.get::<i64, _>("target_id") as u64,
                actor_id: row.get::<Option<i64>, _>("actor_id").map(|id| id as u64),
                action,
                reason: row.get("reason"),
                timestamp,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteAuditStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteAuditStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn entry(guild_id: u64, action: ModerationAction, actor_id: Option<u64>) -> AuditEntry {
        AuditEntry {
            guild_id,
            target_id: 100,
            actor_id,
            action,
            reason: "spam".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let store = memory_store().await;
        store
            .append(&entry(1, ModerationAction::AutoMute, None))
            .await
            .unwrap();
        store
            .append(&entry(1, ModerationAction::Ban, Some(42)))
            .await
            .unwrap();
        store
            .append(&entry(2, ModerationAction::Unmute, Some(43)))
            .await
            .unwrap();

        let recent = store.recent(1, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        // newest first
        assert_eq!(recent[0].action, ModerationAction::Ban);
        assert_eq!(recent[0].actor_id, Some(42));
        assert_eq!(recent[1].action, ModerationAction::AutoMute);
        assert_eq!(recent[1].actor_id, None);
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let store = memory_store().await;
        for _ in 0..5 {
            store
                .append(&entry(1, ModerationAction::AutoMute, None))
                .await
                .unwrap();
        }
        assert_eq!(store.recent(1, 3).await.unwrap().len(), 3);
    }
}
