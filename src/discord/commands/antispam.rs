// Moderator-facing anti-spam commands.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call core service
// 3. Format the response based on the result
//
// This layer is THIN - no business logic, just translation.

use crate::core::antispam::Resolution;
use crate::discord::antispam::{embeds, remediation, review};
use chrono::Utc;
use poise::serenity_prelude as serenity;

/// Show what the spam tracker currently knows about active users.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn spamstats(ctx: Context<'_>) -> Result<(), Error> {
    let mut stats = ctx.data().engine.tracked_users(Utc::now());
    stats.sort_by(|a, b| b.message_count.cmp(&a.message_count));

    let mut embed = serenity::CreateEmbed::new()
        .title("📊 Spam Tracking Stats")
        .color(0x0099FF)
        .description(format!("Currently tracking {} user(s)", stats.len()));

    for stat in stats.iter().take(10) {
        embed = embed.field(
            format!("User {}", stat.user_id),
            format!(
                "Messages: {} | Channels: {} | Episodes: {}{}",
                stat.message_count,
                stat.channel_count,
                stat.warning_count,
                if stat.muted { " | **MUTED**" } else { "" },
            ),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Manually lift a spam auto-mute.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "User to unmute"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in servers")?;
    let user_id = user.id.get();
    let moderator_id = ctx.author().id.get();

    let removed =
        remediation::remove_muted_role(ctx.serenity_context(), guild_id, user.id).await?;
    ctx.data().engine.mark_unmuted(user_id);

    // Close any open review case so its controls can't fire afterwards.
    if let Some(case) = ctx.data().engine.pending_case_for(guild_id.get(), user_id) {
        match ctx.data().engine.resolve_case(
            case.case_id,
            Resolution::Unmuted,
            moderator_id,
            Utc::now(),
        ) {
            Ok(resolved) => {
                review::edit_review_post(
                    ctx.serenity_context(),
                    &resolved,
                    Resolution::Unmuted,
                    moderator_id,
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(case_id = case.case_id, error = %e, "review case raced the manual unmute");
            }
        }
    }

    if removed {
        let guild_name = remediation::guild_name(ctx.serenity_context(), guild_id);
        remediation::dm_embed(
            ctx.serenity_context(),
            user.id,
            embeds::unmute_dm_embed(&guild_name),
        )
        .await;
    }

    // Tracking state was cleared either way, so the trail gets an entry
    // even when the role had already been stripped by hand.
    ctx.data()
        .audit
        .record_unmute(guild_id.get(), user_id, moderator_id, "manual unmute command")
        .await?;

    if removed {
        ctx.say(format!("🔓 Unmuted <@{}>.", user_id)).await?;
    } else {
        ctx.say(format!(
            "<@{}> does not have the Muted role. Tracking state was cleared anyway.",
            user_id
        ))
        .await?;
    }

    Ok(())
}

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands.
/// This is where we store our services and configuration.
use std::sync::Arc;

use crate::core::antispam::SpamEngine;
use crate::core::audit::AuditService;
use crate::infra::audit::SqliteAuditStore;
use crate::infra::evidence::FileEvidenceStore;

/// Guild-level wiring read from the environment at startup.
#[derive(Debug, Clone, Default)]
pub struct BotSettings {
    /// Channel that receives review posts; None disables review controls
    pub review_channel_id: Option<u64>,
}

pub struct Data {
    pub engine: Arc<SpamEngine>,
    pub evidence: Arc<FileEvidenceStore>,
    pub audit: Arc<AuditService<SqliteAuditStore>>,
    pub settings: BotSettings,
}
