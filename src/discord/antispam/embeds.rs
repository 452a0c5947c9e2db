// Embed and component builders for the spam-review workflow.
//
// Pure construction only - sending and editing happens in the orchestrator
// and resolver.

use crate::core::antispam::{clamp_text, Resolution, ReviewCase};
use poise::serenity_prelude as serenity;

const FOOTER: &str = "Auto-moderation system";

/// custom_id prefix for review controls: `spamreview:<case_id>:<action>`
pub const REVIEW_CUSTOM_ID_PREFIX: &str = "spamreview";

pub fn ban_button_id(case_id: u64) -> String {
    format!("{}:{}:ban", REVIEW_CUSTOM_ID_PREFIX, case_id)
}

pub fn unmute_button_id(case_id: u64) -> String {
    format!("{}:{}:unmute", REVIEW_CUSTOM_ID_PREFIX, case_id)
}

/// The two review controls posted under the evidence summary.
pub fn review_buttons(case_id: u64) -> serenity::CreateActionRow {
    serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(ban_button_id(case_id))
            .label("🔨 Confirm spam - ban")
            .style(serenity::ButtonStyle::Danger),
        serenity::CreateButton::new(unmute_button_id(case_id))
            .label("✅ Not spam - unmute")
            .style(serenity::ButtonStyle::Success),
    ])
}

/// The review request posted to the review channel after an auto-mute.
pub fn review_request_embed(
    case: &ReviewCase,
    user_tag: &str,
    avatar_url: Option<String>,
    warning_count: u32,
    permission_note: Option<&str>,
) -> serenity::CreateEmbed {
    let records = case.verdict.records();
    let distinct_channels = records
        .iter()
        .map(|r| r.channel_id)
        .collect::<std::collections::HashSet<_>>()
        .len();

    let mut embed = serenity::CreateEmbed::new()
        .title("🚨 Auto-Mute: Spam Detected")
        .color(0xFF0000)
        .field(
            "User",
            format!("{} ({})", user_tag, case.target_user_id),
            true,
        )
        .field("Spam Type", case.verdict.to_string(), true)
        .field("Messages Flagged", records.len().to_string(), true)
        .field("Channels Spammed", distinct_channels.to_string(), true)
        .field(
            "Messages Deleted",
            case.deleted_messages.len().to_string(),
            true,
        )
        .field("Spam Episodes", warning_count.to_string(), true);

    if let Some(url) = avatar_url {
        embed = embed.thumbnail(url);
    }

    // Sample of the flagged content (originals are deleted by now)
    let samples: Vec<String> = records
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. <#{}>: {}",
                i + 1,
                r.channel_id,
                clamp_text(&r.content_preview, 100)
            )
        })
        .collect();
    if !samples.is_empty() {
        embed = embed.field(
            "📝 Sample Messages",
            clamp_text(&samples.join("\n"), 1024),
            false,
        );
    }

    if !case.captured_evidence.is_empty() {
        let manifest: Vec<String> = case
            .captured_evidence
            .iter()
            .map(|e| format!("`{}` ({} KB)", e.file_name, e.size_bytes / 1024))
            .collect();
        embed = embed.field(
            format!("📎 Evidence Saved ({})", case.captured_evidence.len()),
            clamp_text(&manifest.join("\n"), 1024),
            false,
        );
    }

    if !case.skipped_files.is_empty() {
        let notes: Vec<String> = case
            .skipped_files
            .iter()
            .map(|s| format!("`{}`: {}", s.file_name, s.reason))
            .collect();
        embed = embed.field(
            "⚠️ Files Not Captured",
            clamp_text(&notes.join("\n"), 1024),
            false,
        );
    }

    if let Some(note) = permission_note {
        embed = embed.field("⚠️ Permission Problem", note.to_string(), false);
    }

    embed
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} • Case #{}",
            FOOTER, case.case_id
        )))
        .timestamp(serenity::Timestamp::now())
}

/// Terminal state of the review post once a moderator acts.
pub fn resolved_review_embed(
    case: &ReviewCase,
    resolution: Resolution,
    moderator_id: u64,
) -> serenity::CreateEmbed {
    let (title, color) = match resolution {
        Resolution::Banned => ("RESOLVED: BANNED", 0x8B0000),
        Resolution::Unmuted => ("RESOLVED: UNMUTED", 0x00FF00),
    };

    serenity::CreateEmbed::new()
        .title(title)
        .color(color)
        .description(format!(
            "<@{}> was **{}** by <@{}>.",
            case.target_user_id, resolution, moderator_id
        ))
        .field("Spam Type", case.verdict.to_string(), true)
        .field(
            "Messages Deleted",
            case.deleted_messages.len().to_string(),
            true,
        )
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} • Case #{}",
            FOOTER, case.case_id
        )))
        .timestamp(serenity::Timestamp::now())
}

/// Posted over the review request when the ban API call fails after a
/// moderator confirmed the spam. The case is closed; the ban needs a
/// manual follow-up.
pub fn ban_failed_embed(case: &ReviewCase, moderator_id: u64, error: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("⚠️ BAN FAILED")
        .color(0xFFA500)
        .description(format!(
            "<@{}> confirmed the spam, but banning <@{}> failed: `{}`\n\
             Check the bot's Ban Members permission and ban manually.",
            moderator_id, case.target_user_id, error
        ))
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} • Case #{}",
            FOOTER, case.case_id
        )))
        .timestamp(serenity::Timestamp::now())
}

/// DM sent to the user when the auto-mute lands.
pub fn mute_dm_embed(guild_name: &str, case: &ReviewCase) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("⚠️ You have been muted for spamming")
        .color(0xFF0000)
        .description(format!(
            "You were automatically muted in **{}** for spam behavior. \
             A moderator will review this shortly.",
            guild_name
        ))
        .field("Reason", case.verdict.to_string(), false)
        .field(
            "Messages Deleted",
            case.deleted_messages.len().to_string(),
            true,
        )
        .field(
            "Appeal",
            "If you believe this was a mistake, contact a moderator.",
            false,
        )
        .timestamp(serenity::Timestamp::now())
}

/// DM sent when a moderator confirms the spam and bans.
pub fn ban_dm_embed(guild_name: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("🔨 You have been banned")
        .color(0x8B0000)
        .description(format!(
            "A moderator reviewed your recent messages in **{}** and confirmed \
             them as spam.",
            guild_name
        ))
        .field(
            "Appeal",
            "If you believe this was a mistake, contact the server's moderation team.",
            false,
        )
        .timestamp(serenity::Timestamp::now())
}

/// DM sent when a moderator clears the user.
pub fn unmute_dm_embed(guild_name: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("🔓 You have been unmuted")
        .color(0x00FF00)
        .description(format!(
            "A moderator reviewed the automatic mute in **{}** and determined \
             it was a false positive. Sorry for the inconvenience!",
            guild_name
        ))
        .timestamp(serenity::Timestamp::now())
}
