// The spam engine ties the window, classifier, and review-case table
// together behind one injectable handle.
//
// Handlers across different users run concurrently; everything per-user is
// serialized by DashMap entry locking inside the window. The engine holds
// no Discord types - the adapter layer owns all side effects.

use super::activity_window::{UserActivityStats, UserActivityWindow};
use super::antispam_models::{
    ActivityRecord, Resolution, ReviewCase, ReviewStatus, SpamConfig, SpamVerdict,
};
use super::classifier;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("review case {case_id} was already resolved ({resolution})")]
    AlreadyResolved {
        case_id: u64,
        resolution: Resolution,
    },

    #[error("no review case with id {0}")]
    CaseNotFound(u64),
}

pub struct SpamEngine {
    config: SpamConfig,
    window: UserActivityWindow,
    /// user id -> suppress further remediation triggers until this instant
    cooldowns: DashMap<u64, DateTime<Utc>>,
    cases: DashMap<u64, ReviewCase>,
    next_case_id: AtomicU64,
}

impl SpamEngine {
    pub fn new(config: SpamConfig) -> Self {
        let window = UserActivityWindow::new(config.cross_channel_window_secs);
        Self {
            config,
            window,
            cooldowns: DashMap::new(),
            cases: DashMap::new(),
            next_case_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &SpamConfig {
        &self.config
    }

    /// Record one message event and classify the resulting window.
    ///
    /// Muted users and users inside the post-detection cooldown are still
    /// tracked but never re-flagged, so an in-flight episode cannot trigger
    /// a second remediation pass.
    pub fn observe(&self, user_id: u64, record: ActivityRecord) -> SpamVerdict {
        let now = record.timestamp;
        let suppressed = self.window.is_muted(user_id) || self.in_cooldown(user_id, now);

        let activity = self.window.record(user_id, record);
        if suppressed {
            return SpamVerdict::NotSpam;
        }

        let verdict = classifier::classify(&activity, &self.config, now);
        if verdict.is_spam() {
            let until = now + Duration::seconds(self.config.cooldown_secs as i64);
            self.cooldowns.insert(user_id, until);
        }
        verdict
    }

    /// Claim the remediation episode for a user. Returns false if the user
    /// is already muted - the second trigger is a no-op.
    pub fn try_begin_episode(&self, user_id: u64) -> bool {
        self.window.try_mark_muted(user_id)
    }

    pub fn is_muted(&self, user_id: u64) -> bool {
        self.window.is_muted(user_id)
    }

    pub fn warning_count(&self, user_id: u64) -> u32 {
        self.window.warning_count(user_id)
    }

    /// Moderator unmute: clears the mute flag and resets the user's window.
    pub fn mark_unmuted(&self, user_id: u64) {
        self.window.clear_muted(user_id);
        self.cooldowns.remove(&user_id);
    }

    /// Drop all tracking for a banned user.
    pub fn forget_user(&self, user_id: u64) {
        self.window.remove(user_id);
        self.cooldowns.remove(&user_id);
    }

    /// Current pruned activity for a user. The orchestrator re-reads this
    /// after the stabilization delay so burst-tail messages recorded in the
    /// meantime are acted on too.
    pub fn activity_snapshot(&self, user_id: u64, now: DateTime<Utc>) -> Vec<ActivityRecord> {
        self.window.snapshot(user_id, now)
    }

    pub fn tracked_users(&self, now: DateTime<Utc>) -> Vec<UserActivityStats> {
        self.window.stats(now)
    }

    /// Drop idle users and expired cooldowns. Runs from a periodic task;
    /// muted users survive until a moderator resolves them.
    pub fn sweep_idle(&self, now: DateTime<Utc>) {
        self.window.sweep_idle(now);
        self.cooldowns.retain(|_, until| now < *until);
    }

    /// Reserve a case id before evidence capture so stored files can be
    /// keyed by case.
    pub fn allocate_case_id(&self) -> u64 {
        self.next_case_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert_case(&self, case: ReviewCase) {
        self.cases.insert(case.case_id, case);
    }

    pub fn case(&self, case_id: u64) -> Option<ReviewCase> {
        self.cases.get(&case_id).map(|c| c.clone())
    }

    /// The open review case for a user, if any. Used by the manual unmute
    /// path so a pending case is closed instead of left with live controls.
    pub fn pending_case_for(&self, guild_id: u64, user_id: u64) -> Option<ReviewCase> {
        self.cases
            .iter()
            .find(|case| {
                case.guild_id == guild_id
                    && case.target_user_id == user_id
                    && matches!(case.status, ReviewStatus::Pending)
            })
            .map(|case| case.clone())
    }

    /// Resolve a pending case. The transition is terminal and serialized:
    /// concurrent attempts see the entry lock, the first wins, and later
    /// attempts get `AlreadyResolved` with the standing resolution.
    pub fn resolve_case(
        &self,
        case_id: u64,
        resolution: Resolution,
        moderator_id: u64,
        now: DateTime<Utc>,
    ) -> Result<ReviewCase, ResolveError> {
        let mut case = self
            .cases
            .get_mut(&case_id)
            .ok_or(ResolveError::CaseNotFound(case_id))?;

        match &case.status {
            ReviewStatus::Pending => {
                case.status = ReviewStatus::Resolved {
                    resolution,
                    moderator_id,
                    at: now,
                };
                Ok(case.clone())
            }
            ReviewStatus::Resolved {
                resolution: standing,
                ..
            } => Err(ResolveError::AlreadyResolved {
                case_id,
                resolution: *standing,
            }),
        }
    }

    fn in_cooldown(&self, user_id: u64, now: DateTime<Utc>) -> bool {
        match self.cooldowns.get(&user_id) {
            Some(until) => now < *until,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn record(ms: i64, channel_id: u64, fingerprint: u64, text: &str) -> ActivityRecord {
        ActivityRecord {
            timestamp: at(ms),
            channel_id,
            message_id: ms as u64,
            content_preview: text.to_string(),
            fingerprint,
            has_attachments: false,
        }
    }

    fn pending_case(engine: &SpamEngine, user_id: u64) -> ReviewCase {
        ReviewCase {
            case_id: engine.allocate_case_id(),
            guild_id: 1,
            target_user_id: user_id,
            verdict: SpamVerdict::RapidBurst {
                records: Vec::new(),
            },
            muted_role_applied: true,
            deleted_messages: Vec::new(),
            captured_evidence: Vec::new(),
            skipped_files: Vec::new(),
            status: ReviewStatus::Pending,
            review_post: None,
            opened_at: at(0),
        }
    }

    #[test]
    fn cross_channel_posting_flags_the_second_message() {
        let engine = SpamEngine::new(SpamConfig::default());
        let first = engine.observe(1, record(0, 10, 99, "Join my server!"));
        assert!(!first.is_spam());

        // same content five seconds later in another channel
        let second = engine.observe(1, record(5000, 20, 99, "Join my server!"));
        assert!(matches!(
            second,
            SpamVerdict::CrossChannelDuplicate { .. }
        ));
    }

    #[test]
    fn cooldown_suppresses_immediate_retrigger() {
        let engine = SpamEngine::new(SpamConfig::default());
        engine.observe(1, record(0, 10, 99, "spam"));
        let verdict = engine.observe(1, record(1000, 20, 99, "spam"));
        assert!(verdict.is_spam());

        // still spamming 2s later, but the episode is in flight
        let follow_up = engine.observe(1, record(3000, 30, 99, "spam"));
        assert!(!follow_up.is_spam());

        // after the 30s cooldown (and window expiry) detection resumes
        let later = engine.observe(1, record(40_000, 10, 77, "again"));
        assert!(!later.is_spam());
        let retrigger = engine.observe(1, record(41_000, 20, 77, "again"));
        assert!(retrigger.is_spam());
    }

    #[test]
    fn episode_start_is_idempotent() {
        let engine = SpamEngine::new(SpamConfig::default());
        assert!(engine.try_begin_episode(1));
        assert!(!engine.try_begin_episode(1));
        assert!(engine.is_muted(1));
    }

    #[test]
    fn muted_users_are_not_reflagged() {
        let engine = SpamEngine::new(SpamConfig::default());
        engine.try_begin_episode(1);
        for i in 0..10 {
            let verdict = engine.observe(1, record(i * 500, 10 + i as u64, 99, "spam"));
            assert!(!verdict.is_spam());
        }
    }

    #[test]
    fn resolution_is_terminal_and_first_wins() {
        let engine = SpamEngine::new(SpamConfig::default());
        let case = pending_case(&engine, 1);
        let case_id = case.case_id;
        engine.insert_case(case);

        let resolved = engine
            .resolve_case(case_id, Resolution::Banned, 42, at(1000))
            .unwrap();
        assert!(matches!(
            resolved.status,
            ReviewStatus::Resolved {
                resolution: Resolution::Banned,
                moderator_id: 42,
                ..
            }
        ));

        // the losing moderator gets the standing resolution, not a re-apply
        let err = engine
            .resolve_case(case_id, Resolution::Unmuted, 43, at(2000))
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::AlreadyResolved {
                case_id,
                resolution: Resolution::Banned,
            }
        );
    }

    #[test]
    fn resolving_unknown_case_fails() {
        let engine = SpamEngine::new(SpamConfig::default());
        assert!(matches!(
            engine.resolve_case(999, Resolution::Unmuted, 1, at(0)),
            Err(ResolveError::CaseNotFound(999))
        ));
    }

    #[test]
    fn post_delay_snapshot_includes_burst_tail() {
        let engine = SpamEngine::new(SpamConfig::default());
        engine.observe(1, record(0, 10, 99, "spam"));
        let verdict = engine.observe(1, record(1000, 20, 99, "spam"));
        assert!(verdict.is_spam());
        assert_eq!(verdict.records().len(), 2);

        // another copy lands while remediation is waiting out the delay;
        // it is suppressed from re-flagging but still recorded
        let tail = engine.observe(1, record(2000, 30, 99, "spam"));
        assert!(!tail.is_spam());

        let snapshot = engine.activity_snapshot(1, at(3000));
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[2].message_id, 2000);
    }

    #[test]
    fn sweep_forgets_idle_users() {
        let engine = SpamEngine::new(SpamConfig::default());
        engine.observe(1, record(0, 10, 99, "spam"));
        engine.observe(1, record(1000, 20, 99, "spam"));
        assert_eq!(engine.tracked_users(at(1000)).len(), 1);

        engine.sweep_idle(at(120_000));
        assert!(engine.tracked_users(at(120_000)).is_empty());
    }

    #[test]
    fn sweep_keeps_muted_users() {
        let engine = SpamEngine::new(SpamConfig::default());
        engine.observe(1, record(0, 10, 99, "spam"));
        engine.try_begin_episode(1);

        engine.sweep_idle(at(120_000));
        assert!(engine.is_muted(1));
        assert_eq!(engine.tracked_users(at(120_000)).len(), 1);
    }

    #[test]
    fn pending_case_lookup_skips_resolved_cases() {
        let engine = SpamEngine::new(SpamConfig::default());
        let case = pending_case(&engine, 1);
        let case_id = case.case_id;
        engine.insert_case(case);
        engine.insert_case(pending_case(&engine, 2));

        let found = engine.pending_case_for(1, 1).unwrap();
        assert_eq!(found.case_id, case_id);
        assert!(engine.pending_case_for(1, 3).is_none());
        assert!(engine.pending_case_for(9, 1).is_none());

        engine
            .resolve_case(case_id, Resolution::Unmuted, 42, at(0))
            .unwrap();
        assert!(engine.pending_case_for(1, 1).is_none());
    }

    #[test]
    fn unmute_resets_tracking_state() {
        let engine = SpamEngine::new(SpamConfig::default());
        engine.observe(1, record(0, 10, 99, "spam"));
        engine.observe(1, record(1000, 20, 99, "spam"));
        engine.try_begin_episode(1);

        engine.mark_unmuted(1);
        assert!(!engine.is_muted(1));

        // a fresh offense right after the unmute is detectable again
        engine.observe(1, record(2000, 10, 55, "more"));
        let verdict = engine.observe(1, record(3000, 20, 55, "more"));
        assert!(verdict.is_spam());
    }

    #[test]
    fn case_ids_are_unique() {
        let engine = SpamEngine::new(SpamConfig::default());
        let a = engine.allocate_case_id();
        let b = engine.allocate_case_id();
        assert_ne!(a, b);
    }

}
