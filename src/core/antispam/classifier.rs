// Spam classification rules.
//
// Rules are evaluated in priority order and the first match wins:
//   1. Cross-channel duplicate - one fingerprint spanning several channels.
//      Stronger signal than raw rate: it implies single-content multi-post
//      intent, so it outranks the burst rules.
//   2. Rapid burst - too many messages inside the short window.
//   3. Identical repeat - a small burst of identical text.
//
// Exemption (roles / moderator permissions) is the caller's responsibility;
// classification itself never looks at who sent the messages.

use super::antispam_models::{ActivityRecord, SpamConfig, SpamVerdict};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Classify a user's current activity window.
pub fn classify(
    activity: &[ActivityRecord],
    config: &SpamConfig,
    now: DateTime<Utc>,
) -> SpamVerdict {
    // Rule 1: cross-channel duplicate
    let mut by_fingerprint: HashMap<u64, Vec<&ActivityRecord>> = HashMap::new();
    for record in activity {
        by_fingerprint
            .entry(record.fingerprint)
            .or_default()
            .push(record);
    }
    for (fingerprint, group) in &by_fingerprint {
        let distinct_channels = group
            .iter()
            .map(|r| r.channel_id)
            .collect::<std::collections::HashSet<_>>()
            .len();
        if distinct_channels >= config.cross_channel_threshold as usize {
            return SpamVerdict::CrossChannelDuplicate {
                fingerprint: *fingerprint,
                records: group.iter().map(|r| (*r).clone()).collect(),
            };
        }
    }

    // Rule 2: rapid burst
    let rapid_window = Duration::seconds(config.rapid_window_secs as i64);
    let rapid: Vec<&ActivityRecord> = activity
        .iter()
        .filter(|r| now - r.timestamp < rapid_window)
        .collect();
    if rapid.len() >= config.message_threshold as usize {
        return SpamVerdict::RapidBurst {
            records: rapid.iter().map(|r| (*r).clone()).collect(),
        };
    }

    // Rule 3: identical repeat inside the rapid window
    if rapid.len() >= 3 {
        let first = rapid[0].content_preview.trim().to_lowercase();
        // Attachment-only messages carry no text, so empty-text records
        // compare by fingerprint instead.
        let all_identical = if first.is_empty() {
            let first_fingerprint = rapid[0].fingerprint;
            rapid.iter().all(|r| {
                r.content_preview.trim().is_empty() && r.fingerprint == first_fingerprint
            })
        } else {
            rapid
                .iter()
                .all(|r| r.content_preview.trim().to_lowercase() == first)
        };
        if all_identical {
            return SpamVerdict::IdenticalRepeat {
                records: rapid.iter().map(|r| (*r).clone()).collect(),
            };
        }
    }

    SpamVerdict::NotSpam
}

/// Whether a member bypasses automated spam action entirely.
///
/// Called by the event handler *before* recording/classifying.
pub fn is_exempt(member_role_ids: &[u64], has_moderator_permissions: bool, config: &SpamConfig) -> bool {
    if has_moderator_permissions {
        return true;
    }
    member_role_ids
        .iter()
        .any(|role| config.exempt_roles.contains(role))
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

    #[test]
    fn empty_window_is_not_spam() {
        let verdict = classify(&[], &SpamConfig::default(), at(0));
        assert!(!verdict.is_spam());
    }

    #[test]
    fn same_fingerprint_in_two_channels_is_cross_channel() {
        let config = SpamConfig::default();
        let activity = vec![
            record(0, 10, 99, "Join my server!"),
            record(5000, 20, 99, "Join my server!"),
        ];
        match classify(&activity, &config, at(5000)) {
            SpamVerdict::CrossChannelDuplicate {
                fingerprint,
                records,
            } => {
                assert_eq!(fingerprint, 99);
                assert_eq!(records.len(), 2);
            }
            other => panic!("expected CrossChannelDuplicate, got {:?}", other),
        }
    }

    #[test]
    fn cross_channel_outranks_burst() {
        // 5 messages in 10s would be a burst, but two of them share a
        // fingerprint across channels, which takes priority.
        let config = SpamConfig::default();
        let activity = vec![
            record(0, 10, 1, "a"),
            record(1000, 10, 2, "b"),
            record(2000, 10, 3, "c"),
            record(3000, 10, 7, "dup"),
            record(4000, 20, 7, "dup"),
        ];
        assert!(matches!(
            classify(&activity, &config, at(4000)),
            SpamVerdict::CrossChannelDuplicate { .. }
        ));
    }

    #[test]
    fn five_distinct_messages_in_ten_seconds_is_rapid_burst() {
        let config = SpamConfig::default();
        let activity: Vec<ActivityRecord> = (0..5)
            .map(|i| record(i * 1000, 10, i as u64, &format!("msg {}", i)))
            .collect();
        match classify(&activity, &config, at(4000)) {
            SpamVerdict::RapidBurst { records } => assert_eq!(records.len(), 5),
            other => panic!("expected RapidBurst, got {:?}", other),
        }
    }

    #[test]
    fn old_messages_do_not_count_toward_burst() {
        let config = SpamConfig::default();
        // 5 messages, but spread over 20s - only 3 are inside the 10s window
        let activity: Vec<ActivityRecord> = (0..5)
            .map(|i| record(i * 5000, 10, i as u64, &format!("msg {}", i)))
            .collect();
        assert!(!classify(&activity, &config, at(20_000)).is_spam());
    }

    #[test]
    fn three_identical_messages_is_identical_repeat() {
        let config = SpamConfig::default();
        let activity = vec![
            record(0, 10, 5, "Buy now!"),
            record(1000, 10, 5, "  buy NOW!  "),
            record(2000, 10, 5, "buy now!"),
        ];
        assert!(matches!(
            classify(&activity, &config, at(2000)),
            SpamVerdict::IdenticalRepeat { .. }
        ));
    }

    #[test]
    fn repeated_attachment_only_messages_are_identical_repeat() {
        let config = SpamConfig::default();
        // no text at all, same attachment posted three times in one channel
        let activity = vec![
            record(0, 10, 5, ""),
            record(1000, 10, 5, "  "),
            record(2000, 10, 5, ""),
        ];
        assert!(matches!(
            classify(&activity, &config, at(2000)),
            SpamVerdict::IdenticalRepeat { .. }
        ));
    }

    #[test]
    fn distinct_attachment_only_messages_are_clean() {
        let config = SpamConfig::default();
        let activity = vec![
            record(0, 10, 1, ""),
            record(1000, 10, 2, ""),
            record(2000, 10, 3, ""),
        ];
        assert!(!classify(&activity, &config, at(2000)).is_spam());
    }

    #[test]
    fn three_distinct_messages_is_clean() {
        let config = SpamConfig::default();
        let activity = vec![
            record(0, 10, 1, "one"),
            record(1000, 10, 2, "two"),
            record(2000, 10, 3, "three"),
        ];
        assert!(!classify(&activity, &config, at(2000)).is_spam());
    }

    #[test]
    fn exemption_checks_roles_and_permissions() {
        let config = SpamConfig {
            exempt_roles: vec![555],
            ..Default::default()
        };
        assert!(is_exempt(&[555, 7], false, &config));
        assert!(is_exempt(&[], true, &config));
        assert!(!is_exempt(&[7], false, &config));
    }
}
