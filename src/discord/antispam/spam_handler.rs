// Discord-specific spam handling - translates incoming messages into core
// activity records and spins off remediation when a verdict lands.

use crate::core::antispam::{
    clamp_text, ActivityRecord, AttachmentMeta, EmbedMeta, MessageSnapshot, CONTENT_PREVIEW_LEN,
};
use crate::core::antispam::{classifier, fingerprint};
use crate::discord::antispam::remediation::Orchestrator;
use crate::discord::commands::antispam::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;

/// Feed a message through spam detection.
///
/// Returns `true` if the message was flagged and remediation was started.
pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<bool, Error> {
    // Skip bots
    if msg.author.bot {
        return Ok(false);
    }

    // Only check guild messages
    let Some(guild_id) = msg.guild_id else {
        return Ok(false);
    };

    let config = data.engine.config();
    if !config.enabled {
        return Ok(false);
    }

    // Exemption is decided here, before anything is recorded.
    let role_ids: Vec<u64> = msg
        .member
        .as_deref()
        .map(|member| member.roles.iter().map(|role| role.get()).collect())
        .unwrap_or_default();
    let has_moderator_permissions = moderator_permissions_from_cache(ctx, guild_id, msg);
    if classifier::is_exempt(&role_ids, has_moderator_permissions, config) {
        return Ok(false);
    }

    let snapshot = snapshot_message(msg);
    let record = ActivityRecord {
        timestamp: msg.timestamp.with_timezone(&Utc),
        channel_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        content_preview: clamp_text(&snapshot.text, CONTENT_PREVIEW_LEN),
        fingerprint: fingerprint::fingerprint(&snapshot),
        has_attachments: !snapshot.attachments.is_empty(),
    };

    let verdict = data.engine.observe(msg.author.id.get(), record);
    if !verdict.is_spam() {
        return Ok(false);
    }

    tracing::warn!(
        user_id = msg.author.id.get(),
        guild_id = guild_id.get(),
        verdict = %verdict,
        "spam detected"
    );

    // The gateway handler must stay responsive; remediation sleeps and
    // makes a series of HTTP calls, so it runs on its own task.
    let orchestrator = Orchestrator::from_data(data);
    let ctx = ctx.clone();
    let msg = msg.clone();
    tokio::spawn(async move {
        orchestrator.remediate(ctx, msg, verdict).await;
    });

    Ok(true)
}

/// Whether the author moderates the guild, judged from cached role
/// permissions. An uncached guild reads as non-moderator, which only
/// means the user is subject to normal classification.
fn moderator_permissions_from_cache(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    msg: &serenity::Message,
) -> bool {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return false;
    };
    if guild.owner_id == msg.author.id {
        return true;
    }
    msg.member
        .as_deref()
        .map(|member| {
            member
                .roles
                .iter()
                .filter_map(|role_id| guild.roles.get(role_id))
                .any(|role| {
                    role.permissions.administrator() || role.permissions.moderate_members()
                })
        })
        .unwrap_or(false)
}

/// Pull the fingerprint-relevant content out of a Discord message.
fn snapshot_message(msg: &serenity::Message) -> MessageSnapshot {
    MessageSnapshot {
        text: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|attachment| AttachmentMeta {
                filename: attachment.filename.clone(),
                size_bytes: attachment.size as u64,
                content_type: attachment.content_type.clone(),
                url: attachment.url.clone(),
            })
            .collect(),
        embeds: msg
            .embeds
            .iter()
            .map(|embed| EmbedMeta {
                url: embed.url.clone(),
                title: embed.title.clone(),
                description: embed.description.clone(),
            })
            .collect(),
        sticker_ids: msg
            .sticker_items
            .iter()
            .map(|sticker| sticker.id.get())
            .collect(),
    }
}
