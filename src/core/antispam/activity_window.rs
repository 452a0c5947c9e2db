// Per-user sliding window of recent message activity.
//
// Entries live for `cross_channel_window` and are pruned lazily on every
// record. Pruning also recomputes the derived channel set, keeping the
// invariant that `observed_channels` always matches the unpruned activity.
// DashMap entry locking serializes all mutation per user.

use super::antispam_models::{ActivityRecord, UserSpamState};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Summary row for the `/spamstats` command.
#[derive(Debug, Clone)]
pub struct UserActivityStats {
    pub user_id: u64,
    pub message_count: usize,
    pub channel_count: usize,
    pub muted: bool,
    pub warning_count: u32,
}

pub struct UserActivityWindow {
    states: DashMap<u64, UserSpamState>,
    window: Duration,
}

impl UserActivityWindow {
    pub fn new(window_secs: u64) -> Self {
        Self {
            states: DashMap::new(),
            window: Duration::seconds(window_secs as i64),
        }
    }

    /// Append a record for a user, prune expired entries, and return the
    /// resulting time-ordered activity snapshot.
    pub fn record(&self, user_id: u64, record: ActivityRecord) -> Vec<ActivityRecord> {
        let now = record.timestamp;
        let mut state = self.states.entry(user_id).or_default();
        state.activity.push(record);
        Self::prune_state(&mut state, now, self.window);
        state.activity.clone()
    }

    /// Current (pruned) activity for a user without adding anything.
    pub fn snapshot(&self, user_id: u64, now: DateTime<Utc>) -> Vec<ActivityRecord> {
        match self.states.get_mut(&user_id) {
            Some(mut state) => {
                Self::prune_state(&mut state, now, self.window);
                state.activity.clone()
            }
            None => Vec::new(),
        }
    }

    pub fn is_muted(&self, user_id: u64) -> bool {
        self.states.get(&user_id).map(|s| s.muted).unwrap_or(false)
    }

    /// Flip `muted` false -> true. Returns false when the user was already
    /// muted, making episode starts idempotent.
    pub fn try_mark_muted(&self, user_id: u64) -> bool {
        let mut state = self.states.entry(user_id).or_default();
        if state.muted {
            return false;
        }
        state.muted = true;
        state.warning_count += 1;
        true
    }

    /// Explicit moderator unmute: clears the flag and resets the window.
    pub fn clear_muted(&self, user_id: u64) {
        if let Some(mut state) = self.states.get_mut(&user_id) {
            state.muted = false;
            state.activity.clear();
            state.observed_channels.clear();
        }
    }

    pub fn warning_count(&self, user_id: u64) -> u32 {
        self.states
            .get(&user_id)
            .map(|s| s.warning_count)
            .unwrap_or(0)
    }

    /// Drop all state for a user (after a ban).
    pub fn remove(&self, user_id: u64) {
        self.states.remove(&user_id);
    }

    /// Snapshot stats for every tracked user with activity or a mute flag.
    /// Each window is pruned first so counts are never stale.
    pub fn stats(&self, now: DateTime<Utc>) -> Vec<UserActivityStats> {
        self.states
            .iter_mut()
            .filter_map(|mut entry| {
                Self::prune_state(&mut entry, now, self.window);
                if entry.activity.is_empty() && !entry.muted {
                    return None;
                }
                Some(UserActivityStats {
                    user_id: *entry.key(),
                    message_count: entry.activity.len(),
                    channel_count: entry.observed_channels.len(),
                    muted: entry.muted,
                    warning_count: entry.warning_count,
                })
            })
            .collect()
    }

    /// Drop users whose window pruned to nothing. Muted users are kept
    /// until a moderator resolves them.
    pub fn sweep_idle(&self, now: DateTime<Utc>) {
        self.states.retain(|_, state| {
            Self::prune_state(state, now, self.window);
            !state.activity.is_empty() || state.muted
        });
    }

    fn prune_state(state: &mut UserSpamState, now: DateTime<Utc>, window: Duration) {
        state.activity.retain(|r| now - r.timestamp < window);
        state.observed_channels = state.activity.iter().map(|r| r.channel_id).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn record(ms: i64, channel_id: u64, message_id: u64) -> ActivityRecord {
        ActivityRecord {
            timestamp: at(ms),
            channel_id,
            message_id,
            content_preview: "hi".to_string(),
            fingerprint: 1,
            has_attachments: false,
        }
    }

    #[test]
    fn record_appends_in_order() {
        let window = UserActivityWindow::new(30);
        window.record(1, record(0, 10, 100));
        let activity = window.record(1, record(1000, 10, 101));
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].message_id, 100);
        assert_eq!(activity[1].message_id, 101);
    }

    #[test]
    fn entries_older_than_window_are_pruned() {
        let window = UserActivityWindow::new(30);
        window.record(1, record(0, 10, 100));
        // 31s later: the first event falls out of the 30s window
        let activity = window.record(1, record(31_000, 10, 101));
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].message_id, 101);
    }

    #[test]
    fn observed_channels_tracks_unpruned_activity() {
        let window = UserActivityWindow::new(30);
        window.record(1, record(0, 10, 100));
        window.record(1, record(1000, 20, 101));
        // exactly 30s after the first record: it ages out, t=1000 does not
        window.record(1, record(30_000, 20, 102));

        let stats = window.stats(at(30_000));
        assert_eq!(stats.len(), 1);
        // channel 10's only record was pruned, so just channel 20 remains
        assert_eq!(stats[0].channel_count, 1);
        assert_eq!(stats[0].message_count, 2);
    }

    #[test]
    fn stats_prunes_before_reporting() {
        let window = UserActivityWindow::new(30);
        window.record(1, record(0, 10, 100));
        window.record(1, record(1000, 20, 101));

        // no record call in between, so pruning must happen in stats itself
        let stats = window.stats(at(30_500));
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].message_count, 1);
        assert_eq!(stats[0].channel_count, 1);
    }

    #[test]
    fn sweep_drops_idle_users_but_keeps_muted_ones() {
        let window = UserActivityWindow::new(30);
        window.record(1, record(0, 10, 100));
        window.record(2, record(0, 10, 101));
        window.try_mark_muted(1);
        window.clear_muted(1);
        window.try_mark_muted(2);
        assert_eq!(window.warning_count(1), 1);

        window.sweep_idle(at(40_000));

        let stats = window.stats(at(40_000));
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].user_id, 2);
        assert!(stats[0].muted);
        // the idle user is gone entirely, not just pruned
        assert_eq!(window.warning_count(1), 0);
    }

    #[test]
    fn snapshot_prunes_without_recording() {
        let window = UserActivityWindow::new(30);
        window.record(1, record(0, 10, 100));
        assert_eq!(window.snapshot(1, at(31_000)).len(), 0);
        assert!(window.snapshot(2, at(0)).is_empty());
    }

    #[test]
    fn mute_flag_flips_once_per_episode() {
        let window = UserActivityWindow::new(30);
        assert!(window.try_mark_muted(1));
        assert!(!window.try_mark_muted(1));
        assert!(window.is_muted(1));
        assert_eq!(window.warning_count(1), 1);

        window.clear_muted(1);
        assert!(!window.is_muted(1));
        // a new episode may start after an explicit unmute
        assert!(window.try_mark_muted(1));
        assert_eq!(window.warning_count(1), 2);
    }

    #[test]
    fn clear_muted_resets_activity() {
        let window = UserActivityWindow::new(30);
        window.record(1, record(0, 10, 100));
        window.try_mark_muted(1);
        window.clear_muted(1);
        assert!(window.snapshot(1, at(0)).is_empty());
    }
}
