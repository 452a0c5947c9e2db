// Append-only audit trail of moderation actions.
//
// The dashboard reads this; the bot only ever appends. Entries carry the
// actor (None for automatic actions), target, action, and reason.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationAction {
    AutoMute,
    Ban,
    Unmute,
}

impl std::fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModerationAction::AutoMute => write!(f, "auto_mute"),
            ModerationAction::Ban => write!(f, "ban"),
            ModerationAction::Unmute => write!(f, "unmute"),
        }
    }
}

impl std::str::FromStr for ModerationAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_mute" => Ok(ModerationAction::AutoMute),
            "ban" => Ok(ModerationAction::Ban),
            "unmute" => Ok(ModerationAction::Unmute),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub guild_id: u64,
    pub target_id: u64,
    /// None when the bot acted automatically
    pub actor_id: Option<u64>,
    pub action: ModerationAction,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Most recent entries for a guild, newest first.
    async fn recent(&self, guild_id: u64, limit: u32) -> Result<Vec<AuditEntry>, AuditError>;
}

pub struct AuditService<S: AuditStore> {
    store: S,
}

impl<S: AuditStore> AuditService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn record_auto_mute(
        &self,
        guild_id: u64,
        target_id: u64,
        reason: &str,
    ) -> Result<(), AuditError> {
        self.append(guild_id, target_id, None, ModerationAction::AutoMute, reason)
            .await
    }

    pub async fn record_ban(
        &self,
        guild_id: u64,
        target_id: u64,
        moderator_id: u64,
        reason: &str,
    ) -> Result<(), AuditError> {
        self.append(
            guild_id,
            target_id,
            Some(moderator_id),
            ModerationAction::Ban,
            reason,
        )
        .await
    }

    pub async fn record_unmute(
        &self,
        guild_id: u64,
        target_id: u64,
        moderator_id: u64,
        reason: &str,
    ) -> Result<(), AuditError> {
        self.append(
            guild_id,
            target_id,
            Some(moderator_id),
            ModerationAction::Unmute,
            reason,
        )
        .await
    }

    pub async fn recent(&self, guild_id: u64, limit: u32) -> Result<Vec<AuditEntry>, AuditError> {
        self.store.recent(guild_id, limit).await
    }

    async fn append(
        &self,
        guild_id: u64,
        target_id: u64,
        actor_id: Option<u64>,
        action: ModerationAction,
        reason: &str,
    ) -> Result<(), AuditError> {
        let entry = AuditEntry {
            guild_id,
            target_id,
            actor_id,
            action,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        };
        self.store.append(&entry).await
    }
}
