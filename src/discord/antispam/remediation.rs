// Remediation orchestrator - runs the side-effect sequence after a spam
// verdict: mute, evidence capture, deletion, review post, DM, audit.
//
// Every step past the mute is best-effort. A failed deletion or DM is
// logged and the workflow keeps going; the review post reports what
// actually happened.

use crate::core::antispam::{AttachmentMeta, MessageRef, ReviewCase, ReviewStatus, SpamEngine, SpamVerdict};
use crate::core::audit::AuditService;
use crate::core::evidence::{plan_capture, EvidenceStore, SkippedFile};
use crate::discord::antispam::embeds;
use crate::discord::commands::antispam::{BotSettings, Data};
use crate::infra::audit::SqliteAuditStore;
use crate::infra::evidence::FileEvidenceStore;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

pub const MUTED_ROLE_NAME: &str = "Muted";

#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<SpamEngine>,
    evidence: Arc<FileEvidenceStore>,
    audit: Arc<AuditService<SqliteAuditStore>>,
    settings: BotSettings,
}

impl Orchestrator {
    pub fn from_data(data: &Data) -> Self {
        Self {
            engine: data.engine.clone(),
            evidence: data.evidence.clone(),
            audit: data.audit.clone(),
            settings: data.settings.clone(),
        }
    }

    /// Run the full remediation sequence for one spam verdict.
    ///
    /// Re-entrant triggers for the same user are dropped at the episode
    /// claim, so concurrent verdicts produce exactly one pass.
    pub async fn remediate(
        &self,
        ctx: serenity::Context,
        msg: serenity::Message,
        verdict: SpamVerdict,
    ) {
        let Some(guild_id) = msg.guild_id else { return };
        let user_id = msg.author.id.get();

        if !self.engine.try_begin_episode(user_id) {
            return;
        }
        tracing::warn!(user_id, verdict = %verdict, "starting spam remediation");

        // Let the tail of the burst land so the window has it all.
        let delay = self.engine.config().remediation_delay_ms;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let case_id = self.engine.allocate_case_id();

        let mut permission_note = None;
        let muted_role_applied =
            match apply_muted_role(&ctx, guild_id, msg.author.id).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "failed to apply Muted role");
                    permission_note = Some(
                        "The Muted role could not be applied. Check the bot's \
                         Manage Roles permission and role position.",
                    );
                    false
                }
            };

        // Re-read the window now that the delay has passed: messages the
        // user posted while the episode settled were recorded (though not
        // re-flagged) and belong in the cleanup too.
        let mut records = self.engine.activity_snapshot(user_id, Utc::now());
        if records.is_empty() {
            records = verdict.records().to_vec();
        }

        // Capture attachments before anything is deleted.
        let (captured_evidence, skipped_files) = self.capture_evidence(&ctx, case_id, &records).await;

        let mut deleted_messages = Vec::new();
        for record in &records {
            let channel = serenity::ChannelId::new(record.channel_id);
            let message = serenity::MessageId::new(record.message_id);
            match channel.delete_message(&ctx.http, message).await {
                Ok(()) => deleted_messages.push(MessageRef {
                    channel_id: record.channel_id,
                    message_id: record.message_id,
                }),
                Err(e) => {
                    tracing::warn!(
                        channel_id = record.channel_id,
                        message_id = record.message_id,
                        error = %e,
                        "failed to delete spam message"
                    );
                }
            }
        }

        let mut case = ReviewCase {
            case_id,
            guild_id: guild_id.get(),
            target_user_id: user_id,
            verdict,
            muted_role_applied,
            deleted_messages,
            captured_evidence,
            skipped_files,
            status: ReviewStatus::Pending,
            review_post: None,
            opened_at: Utc::now(),
        };

        if let Some(review_channel) = self.settings.review_channel_id {
            let embed = embeds::review_request_embed(
                &case,
                &msg.author.tag(),
                msg.author.avatar_url(),
                self.engine.warning_count(user_id),
                permission_note,
            );
            let builder = serenity::CreateMessage::new()
                .embed(embed)
                .components(vec![embeds::review_buttons(case_id)]);
            match serenity::ChannelId::new(review_channel)
                .send_message(&ctx.http, builder)
                .await
            {
                Ok(post) => {
                    case.review_post = Some(MessageRef {
                        channel_id: review_channel,
                        message_id: post.id.get(),
                    });
                }
                Err(e) => {
                    tracing::error!(review_channel, error = %e, "failed to post review request");
                }
            }
        } else {
            tracing::warn!("REVIEW_CHANNEL_ID not set; case has no review controls");
        }

        let name = guild_name(&ctx, guild_id);
        dm_embed(&ctx, msg.author.id, embeds::mute_dm_embed(&name, &case)).await;

        if let Err(e) = self
            .audit
            .record_auto_mute(guild_id.get(), user_id, &case.verdict.to_string())
            .await
        {
            tracing::error!(user_id, error = %e, "failed to write auto-mute audit entry");
        }

        tracing::info!(
            user_id,
            case_id,
            deleted = case.deleted_messages.len(),
            evidence = case.captured_evidence.len(),
            "spam remediation complete"
        );
        self.engine.insert_case(case);
    }

    /// Re-fetch each flagged message and download its in-cap attachments.
    /// Already-deleted messages and failed downloads become skip notes.
    async fn capture_evidence(
        &self,
        ctx: &serenity::Context,
        case_id: u64,
        records: &[crate::core::antispam::ActivityRecord],
    ) -> (Vec<crate::core::evidence::EvidenceDescriptor>, Vec<SkippedFile>) {
        let max_bytes = self.engine.config().evidence_max_bytes;
        let client = reqwest::Client::new();
        let mut captured = Vec::new();
        let mut skipped = Vec::new();

        for record in records {
            if !record.has_attachments {
                continue;
            }
            let channel = serenity::ChannelId::new(record.channel_id);
            let message_id = serenity::MessageId::new(record.message_id);
            let live = match channel.message(&ctx.http, message_id).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(
                        message_id = record.message_id,
                        error = %e,
                        "flagged message unavailable for evidence capture"
                    );
                    continue;
                }
            };

            let metas: Vec<AttachmentMeta> =
                live.attachments.iter().map(attachment_meta).collect();
            let plan = plan_capture(&metas, max_bytes);
            skipped.extend(plan.skipped);

            for meta in plan.download {
                let file_name = format!("{}_{}", record.message_id, meta.filename);
                match download_capped(&client, &meta.url, max_bytes).await {
                    Some(bytes) => {
                        match self.evidence.save(case_id, &file_name, &bytes, &meta.url).await {
                            Ok(descriptor) => captured.push(descriptor),
                            Err(e) => {
                                tracing::warn!(file = %meta.filename, error = %e, "evidence write failed");
                                skipped.push(SkippedFile {
                                    file_name: meta.filename,
                                    size_bytes: meta.size_bytes,
                                    reason: "storage failure".to_string(),
                                });
                            }
                        }
                    }
                    None => {
                        skipped.push(SkippedFile {
                            file_name: meta.filename,
                            size_bytes: meta.size_bytes,
                            reason: "download failed or exceeded the size cap".to_string(),
                        });
                    }
                }
            }
        }

        (captured, skipped)
    }
}

fn attachment_meta(attachment: &serenity::Attachment) -> AttachmentMeta {
    AttachmentMeta {
        filename: attachment.filename.clone(),
        size_bytes: attachment.size as u64,
        content_type: attachment.content_type.clone(),
        url: attachment.url.clone(),
    }
}

/// Download with the advertised and actual sizes both checked against the cap.
async fn download_capped(client: &reqwest::Client, url: &str, max_bytes: u64) -> Option<Vec<u8>> {
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return None;
        }
    }
    let bytes = response.bytes().await.ok()?;
    if bytes.is_empty() || bytes.len() as u64 > max_bytes {
        return None;
    }
    Some(bytes.to_vec())
}

/// Resolve the Muted role (creating it if missing) and assign it.
async fn apply_muted_role(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
) -> Result<(), serenity::Error> {
    let role_id = ensure_muted_role(ctx, guild_id).await?;
    let member = guild_id.member(&ctx.http, user_id).await?;
    member.add_role(&ctx.http, role_id).await
}

pub fn find_muted_role(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
) -> Option<serenity::RoleId> {
    ctx.cache
        .guild(guild_id)
        .and_then(|guild| guild.role_by_name(MUTED_ROLE_NAME).map(|role| role.id))
}

/// Find the Muted role or create it with channel overwrites that deny
/// sending, reacting, and speaking. Overwrites are only written on
/// creation; an existing role is trusted as-is.
pub async fn ensure_muted_role(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
) -> Result<serenity::RoleId, serenity::Error> {
    if let Some(role_id) = find_muted_role(ctx, guild_id) {
        return Ok(role_id);
    }

    let role = guild_id
        .create_role(
            &ctx.http,
            serenity::EditRole::new()
                .name(MUTED_ROLE_NAME)
                .permissions(serenity::Permissions::empty()),
        )
        .await?;
    tracing::info!(guild_id = guild_id.get(), "created Muted role");

    let overwrite_deny = serenity::Permissions::SEND_MESSAGES
        | serenity::Permissions::ADD_REACTIONS
        | serenity::Permissions::SPEAK;
    match guild_id.channels(&ctx.http).await {
        Ok(channels) => {
            for channel in channels.values() {
                if !matches!(
                    channel.kind,
                    serenity::ChannelType::Text | serenity::ChannelType::Voice
                ) {
                    continue;
                }
                let overwrite = serenity::PermissionOverwrite {
                    allow: serenity::Permissions::empty(),
                    deny: overwrite_deny,
                    kind: serenity::PermissionOverwriteType::Role(role.id),
                };
                if let Err(e) = channel.create_permission(&ctx.http, overwrite).await {
                    tracing::warn!(
                        channel_id = channel.id.get(),
                        error = %e,
                        "failed to set Muted overwrite"
                    );
                }
            }
        }
        Err(e) => {
            tracing::warn!(guild_id = guild_id.get(), error = %e, "could not list channels for Muted overwrites");
        }
    }

    Ok(role.id)
}

/// Remove the Muted role from a member. Returns true when the role was
/// actually stripped; an absent role or departed member is already the
/// desired state.
pub async fn remove_muted_role(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
) -> Result<bool, serenity::Error> {
    let Some(role_id) = find_muted_role(ctx, guild_id) else {
        return Ok(false);
    };
    let member = match guild_id.member(&ctx.http, user_id).await {
        Ok(member) => member,
        Err(_) => return Ok(false),
    };
    if !member.roles.contains(&role_id) {
        return Ok(false);
    }
    member.remove_role(&ctx.http, role_id).await?;
    Ok(true)
}

pub fn guild_name(ctx: &serenity::Context, guild_id: serenity::GuildId) -> String {
    ctx.cache
        .guild(guild_id)
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| "this server".to_string())
}

/// DM a user, swallowing failures (closed DMs are common and not an error).
pub async fn dm_embed(
    ctx: &serenity::Context,
    user_id: serenity::UserId,
    embed: serenity::CreateEmbed,
) {
    let builder = serenity::CreateMessage::new().embed(embed);
    let sent = match user_id.create_dm_channel(&ctx.http).await {
        Ok(channel) => channel.id.send_message(&ctx.http, builder).await.is_ok(),
        Err(_) => false,
    };
    if !sent {
        tracing::debug!(user_id = user_id.get(), "could not DM user");
    }
}
