// Anti-spam domain models - data structures for spam detection and review.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts these to Discord-specific actions.

use crate::core::evidence::{EvidenceDescriptor, SkippedFile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How much raw message text we keep per activity record.
pub const CONTENT_PREVIEW_LEN: usize = 200;

/// One observed message event for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
    pub channel_id: u64,
    pub message_id: u64,
    /// Clamped raw text, used for identical-repeat matching and review samples
    pub content_preview: String,
    /// Content fingerprint (see `fingerprint` module)
    pub fingerprint: u64,
    pub has_attachments: bool,
}

/// Salient content of a message, extracted by the adapter layer so the
/// fingerprint stays a pure function.
#[derive(Debug, Clone, Default)]
pub struct MessageSnapshot {
    pub text: String,
    pub attachments: Vec<AttachmentMeta>,
    pub embeds: Vec<EmbedMeta>,
    pub sticker_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct EmbedMeta {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Output of classification. Implicated records ride along so the
/// orchestrator knows what to delete and capture.
#[derive(Debug, Clone)]
pub enum SpamVerdict {
    NotSpam,
    /// Same fingerprint observed in multiple distinct channels
    CrossChannelDuplicate {
        fingerprint: u64,
        records: Vec<ActivityRecord>,
    },
    /// Too many messages inside the rapid window
    RapidBurst { records: Vec<ActivityRecord> },
    /// Several rapid-window messages with identical text
    IdenticalRepeat { records: Vec<ActivityRecord> },
}

impl SpamVerdict {
    pub fn is_spam(&self) -> bool {
        !matches!(self, SpamVerdict::NotSpam)
    }

    /// The records implicated by this verdict (empty for `NotSpam`).
    pub fn records(&self) -> &[ActivityRecord] {
        match self {
            SpamVerdict::NotSpam => &[],
            SpamVerdict::CrossChannelDuplicate { records, .. } => records,
            SpamVerdict::RapidBurst { records } => records,
            SpamVerdict::IdenticalRepeat { records } => records,
        }
    }
}

impl std::fmt::Display for SpamVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpamVerdict::NotSpam => write!(f, "Not spam"),
            SpamVerdict::CrossChannelDuplicate { .. } => write!(f, "Cross-channel duplicate"),
            SpamVerdict::RapidBurst { .. } => write!(f, "Rapid message burst"),
            SpamVerdict::IdenticalRepeat { .. } => write!(f, "Identical message repeat"),
        }
    }
}

/// Per-user aggregate, keyed by user id in the activity window.
#[derive(Debug, Clone, Default)]
pub struct UserSpamState {
    /// Insertion-ordered recent activity, pruned by time
    pub activity: Vec<ActivityRecord>,
    /// Distinct channel ids across current activity (recomputed on prune)
    pub observed_channels: std::collections::HashSet<u64>,
    /// True from episode start until a moderator unmutes
    pub muted: bool,
    /// Spam episodes started for this user
    pub warning_count: u32,
}

/// Configuration for anti-spam behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamConfig {
    /// Whether anti-spam is enabled
    pub enabled: bool,
    /// Messages inside the rapid window that count as a burst
    pub message_threshold: u32,
    /// Rapid-burst window in seconds
    pub rapid_window_secs: u64,
    /// Retention window for activity records, in seconds
    pub cross_channel_window_secs: u64,
    /// Minimum distinct channels a fingerprint must span
    pub cross_channel_threshold: u32,
    /// Carried for dashboard compatibility; the spam path resolves manually
    pub mute_duration_secs: u64,
    /// Roles whose holders bypass classification entirely
    pub exempt_roles: Vec<u64>,
    /// Per-file evidence download cap in bytes
    pub evidence_max_bytes: u64,
    /// Delay between detection and remediation, letting the burst settle
    pub remediation_delay_ms: u64,
    /// Suppress repeat remediation triggers for this long per user
    pub cooldown_secs: u64,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message_threshold: 5,             // 5 messages...
            rapid_window_secs: 10,            // ...in 10 seconds
            cross_channel_window_secs: 30,    // retention window
            cross_channel_threshold: 2,       // 2 distinct channels
            mute_duration_secs: 3600,         // unused: manual resolution
            exempt_roles: Vec::new(),
            evidence_max_bytes: 10 * 1024 * 1024, // 10 MiB per file
            remediation_delay_ms: 2000,
            cooldown_secs: 30,
        }
    }
}

/// A channel/message pair, enough to re-address a Discord message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Terminal outcome of a review case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Banned,
    Unmuted,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Banned => write!(f, "banned"),
            Resolution::Unmuted => write!(f, "unmuted"),
        }
    }
}

/// Lifecycle of a review case. `Resolved` is terminal; no path reopens it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewStatus {
    Pending,
    Resolved {
        resolution: Resolution,
        moderator_id: u64,
        at: DateTime<Utc>,
    },
}

/// A pending human-review unit created by the orchestrator at mute time.
/// Retained after resolution as an audit trail.
#[derive(Debug, Clone)]
pub struct ReviewCase {
    pub case_id: u64,
    pub guild_id: u64,
    pub target_user_id: u64,
    pub verdict: SpamVerdict,
    pub muted_role_applied: bool,
    pub deleted_messages: Vec<MessageRef>,
    pub captured_evidence: Vec<EvidenceDescriptor>,
    pub skipped_files: Vec<SkippedFile>,
    pub status: ReviewStatus,
    /// Where the review controls were posted, needed to edit on resolution
    pub review_post: Option<MessageRef>,
    pub opened_at: DateTime<Utc>,
}

/// Clamp text to `max` characters on a char boundary, appending an ellipsis.
pub fn clamp_text(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_text_keeps_short_strings() {
        assert_eq!(clamp_text("hello", 10), "hello");
    }

    #[test]
    fn clamp_text_truncates_on_char_boundary() {
        let clamped = clamp_text("héllo wörld", 6);
        assert_eq!(clamped.chars().count(), 6);
        assert!(clamped.ends_with('…'));
    }

    #[test]
    fn verdict_records_empty_for_not_spam() {
        assert!(SpamVerdict::NotSpam.records().is_empty());
        assert!(!SpamVerdict::NotSpam.is_spam());
    }
}
