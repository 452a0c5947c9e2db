// Review resolver - turns moderator button presses on a review post into
// the terminal ban/unmute outcome.
//
// The engine's case table is the arbiter: the first moderator to resolve
// wins, and everyone after sees the standing resolution.

use crate::core::antispam::{Resolution, ReviewCase};
use crate::core::antispam::spam_engine::ResolveError;
use crate::discord::antispam::{embeds, remediation};
use crate::discord::commands::antispam::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Ban,
    Unmute,
}

/// Parse a review-control custom_id (`spamreview:<case_id>:<action>`).
pub fn parse_review_action(custom_id: &str) -> Option<(u64, ReviewAction)> {
    let mut parts = custom_id.split(':');
    if parts.next()? != embeds::REVIEW_CUSTOM_ID_PREFIX {
        return None;
    }
    let case_id = parts.next()?.parse().ok()?;
    let action = match parts.next()? {
        "ban" => ReviewAction::Ban,
        "unmute" => ReviewAction::Unmute,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((case_id, action))
}

/// Entry point from the gateway for component interactions. Ignores
/// anything that isn't one of our review buttons.
pub async fn handle_interaction(
    ctx: &serenity::Context,
    interaction: &serenity::Interaction,
    data: &Data,
) -> Result<(), Error> {
    let serenity::Interaction::Component(component) = interaction else {
        return Ok(());
    };
    let Some((case_id, action)) = parse_review_action(&component.data.custom_id) else {
        return Ok(());
    };
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    let permitted = component
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .map(|p| p.administrator() || p.moderate_members() || p.ban_members())
        .unwrap_or(false);
    if !permitted {
        respond_ephemeral(
            ctx,
            component,
            "You need the Moderate Members permission to resolve spam reviews.",
        )
        .await;
        return Ok(());
    }

    let Some(case) = data.engine.case(case_id) else {
        respond_ephemeral(ctx, component, "This review case is no longer tracked.").await;
        return Ok(());
    };

    match action {
        ReviewAction::Ban => resolve_ban(ctx, component, data, guild_id, case).await,
        ReviewAction::Unmute => resolve_unmute(ctx, component, data, guild_id, case).await,
    }
    Ok(())
}

/// Whether a member fetch failed because the user is genuinely gone, as
/// opposed to a transient HTTP failure.
fn is_unknown_member(error: &serenity::Error) -> bool {
    use ::serenity::http::HttpError;

    // Discord JSON error code for "Unknown Member"
    const UNKNOWN_MEMBER: isize = 10007;
    matches!(
        error,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.error.code == UNKNOWN_MEMBER
    )
}

async fn resolve_ban(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
    guild_id: serenity::GuildId,
    case: ReviewCase,
) {
    let target = serenity::UserId::new(case.target_user_id);
    let moderator_id = component.user.id.get();

    // The member has to still be around to ban; a departed target leaves
    // the case pending so the unmute control can close it out.
    match guild_id.member(&ctx.http, target).await {
        Ok(_) => {}
        Err(e) if is_unknown_member(&e) => {
            respond_ephemeral(
                ctx,
                component,
                "That user is no longer in the server, so no ban was applied. \
                 Use the unmute control to close the case.",
            )
            .await;
            return;
        }
        Err(e) => {
            tracing::warn!(case_id = case.case_id, error = %e, "member lookup failed");
            respond_ephemeral(
                ctx,
                component,
                &format!("Could not verify the member ({}). Try again in a moment.", e),
            )
            .await;
            return;
        }
    }

    let resolved = match data
        .engine
        .resolve_case(case.case_id, Resolution::Banned, moderator_id, Utc::now())
    {
        Ok(resolved) => resolved,
        Err(e) => {
            respond_resolve_error(ctx, component, e).await;
            return;
        }
    };

    // DM before the ban lands, while the user can still be reached.
    let name = remediation::guild_name(ctx, guild_id);
    remediation::dm_embed(ctx, target, embeds::ban_dm_embed(&name)).await;

    if let Err(e) = guild_id
        .ban_with_reason(&ctx.http, target, 1, "Spam (confirmed by moderator review)")
        .await
    {
        tracing::error!(case_id = case.case_id, error = %e, "ban failed after case resolution");
        // The case is claimed but the ban did not land: retire the controls
        // and surface the manual follow-up on the post itself.
        edit_review_post_failed(ctx, &resolved, moderator_id, &e.to_string()).await;
        respond_ephemeral(
            ctx,
            component,
            &format!(
                "The case was claimed but the ban failed ({}). \
                 Check the bot's Ban Members permission and ban manually.",
                e
            ),
        )
        .await;
        return;
    }

    data.engine.forget_user(case.target_user_id);
    edit_review_post(ctx, &resolved, Resolution::Banned, moderator_id).await;

    if let Err(e) = data
        .audit
        .record_ban(
            guild_id.get(),
            case.target_user_id,
            moderator_id,
            "confirmed spam via review",
        )
        .await
    {
        tracing::error!(case_id = case.case_id, error = %e, "failed to write ban audit entry");
    }

    respond_ephemeral(
        ctx,
        component,
        &format!("🔨 Banned <@{}> (case #{}).", case.target_user_id, case.case_id),
    )
    .await;
}

async fn resolve_unmute(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
    guild_id: serenity::GuildId,
    case: ReviewCase,
) {
    let target = serenity::UserId::new(case.target_user_id);
    let moderator_id = component.user.id.get();

    let resolved = match data
        .engine
        .resolve_case(case.case_id, Resolution::Unmuted, moderator_id, Utc::now())
    {
        Ok(resolved) => resolved,
        Err(e) => {
            respond_resolve_error(ctx, component, e).await;
            return;
        }
    };

    // A missing role or departed member already satisfies the unmute.
    match remediation::remove_muted_role(ctx, guild_id, target).await {
        Ok(true) => {
            let name = remediation::guild_name(ctx, guild_id);
            remediation::dm_embed(ctx, target, embeds::unmute_dm_embed(&name)).await;
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(case_id = case.case_id, error = %e, "failed to remove Muted role");
        }
    }
    data.engine.mark_unmuted(case.target_user_id);

    edit_review_post(ctx, &resolved, Resolution::Unmuted, moderator_id).await;

    if let Err(e) = data
        .audit
        .record_unmute(
            guild_id.get(),
            case.target_user_id,
            moderator_id,
            "false positive via review",
        )
        .await
    {
        tracing::error!(case_id = case.case_id, error = %e, "failed to write unmute audit entry");
    }

    respond_ephemeral(
        ctx,
        component,
        &format!(
            "✅ Unmuted <@{}> (case #{}).",
            case.target_user_id, case.case_id
        ),
    )
    .await;
}

/// Replace the review post's embed with a ban-failure notice and drop the
/// buttons, so stale controls can't claim the ban went through.
async fn edit_review_post_failed(
    ctx: &serenity::Context,
    case: &ReviewCase,
    moderator_id: u64,
    error: &str,
) {
    let Some(post) = case.review_post else { return };
    let builder = serenity::EditMessage::new()
        .embed(embeds::ban_failed_embed(case, moderator_id, error))
        .components(Vec::new());
    if let Err(e) = serenity::ChannelId::new(post.channel_id)
        .edit_message(&ctx.http, serenity::MessageId::new(post.message_id), builder)
        .await
    {
        tracing::warn!(case_id = case.case_id, error = %e, "failed to edit review post");
    }
}

/// Replace the review post's embed with the terminal state and drop the
/// buttons so the post can't be acted on again.
pub(crate) async fn edit_review_post(
    ctx: &serenity::Context,
    case: &ReviewCase,
    resolution: Resolution,
    moderator_id: u64,
) {
    let Some(post) = case.review_post else { return };
    let builder = serenity::EditMessage::new()
        .embed(embeds::resolved_review_embed(case, resolution, moderator_id))
        .components(Vec::new());
    if let Err(e) = serenity::ChannelId::new(post.channel_id)
        .edit_message(&ctx.http, serenity::MessageId::new(post.message_id), builder)
        .await
    {
        tracing::warn!(case_id = case.case_id, error = %e, "failed to edit review post");
    }
}

async fn respond_resolve_error(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    error: ResolveError,
) {
    let text = match error {
        ResolveError::AlreadyResolved { resolution, .. } => format!(
            "Another moderator already resolved this case: the user was {}.",
            resolution
        ),
        ResolveError::CaseNotFound(case_id) => {
            format!("Review case #{} is no longer tracked.", case_id)
        }
    };
    respond_ephemeral(ctx, component, &text).await;
}

async fn respond_ephemeral(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    text: &str,
) {
    let response = serenity::CreateInteractionResponse::Message(
        serenity::CreateInteractionResponseMessage::new()
            .content(text)
            .ephemeral(true),
    );
    if let Err(e) = component.create_response(&ctx.http, response).await {
        tracing::warn!(error = %e, "failed to respond to review interaction");
    }
}
