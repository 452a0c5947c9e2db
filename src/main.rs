// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, filesystem)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::antispam::{SpamConfig, SpamEngine};
use crate::core::audit::AuditService;
use crate::discord::antispam::{review, spam_handler};
use crate::discord::commands::antispam::BotSettings;
use crate::discord::{Data, Error};
use crate::infra::audit::SqliteAuditStore;
use crate::infra::evidence::FileEvidenceStore;
use poise::serenity_prelude as serenity;

/// Event handler for non-command Discord events.
/// This is where messages get checked for spam and review buttons land.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            match spam_handler::handle_message(ctx, new_message, data).await {
                Ok(_flagged) => {}
                Err(e) => {
                    tracing::error!("Error running spam detection: {}", e);
                }
            }
        }
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let Err(e) = review::handle_interaction(ctx, interaction, data).await {
                tracing::error!("Error handling review interaction: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Read one config value from the environment, falling back to the default.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn spam_config_from_env() -> SpamConfig {
    let defaults = SpamConfig::default();
    SpamConfig {
        enabled: env_or("ANTISPAM_ENABLED", defaults.enabled),
        message_threshold: env_or("ANTISPAM_MESSAGE_THRESHOLD", defaults.message_threshold),
        rapid_window_secs: env_or("ANTISPAM_RAPID_WINDOW_SECS", defaults.rapid_window_secs),
        cross_channel_window_secs: env_or(
            "ANTISPAM_WINDOW_SECS",
            defaults.cross_channel_window_secs,
        ),
        cross_channel_threshold: env_or(
            "ANTISPAM_CROSS_CHANNEL_THRESHOLD",
            defaults.cross_channel_threshold,
        ),
        mute_duration_secs: env_or("ANTISPAM_MUTE_DURATION_SECS", defaults.mute_duration_secs),
        exempt_roles: std::env::var("ANTISPAM_EXEMPT_ROLES")
            .ok()
            .map(|v| v.split(',').filter_map(|s| s.trim().parse().ok()).collect())
            .unwrap_or_default(),
        evidence_max_bytes: env_or("ANTISPAM_EVIDENCE_MAX_BYTES", defaults.evidence_max_bytes),
        remediation_delay_ms: env_or(
            "ANTISPAM_REMEDIATION_DELAY_MS",
            defaults.remediation_delay_ms,
        ),
        cooldown_secs: env_or("ANTISPAM_COOLDOWN_SECS", defaults.cooldown_secs),
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // Keep runtime databases and evidence in a dedicated folder so the repo
    // root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).expect("Failed to create data directory");
    let audit_db_path = format!("{}/moderation.db", data_dir);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    use std::sync::Arc;

    let config = spam_config_from_env();
    tracing::info!(?config, "anti-spam configuration loaded");
    let engine = Arc::new(SpamEngine::new(config));

    let evidence_store = Arc::new(FileEvidenceStore::new(format!("{}/evidence", data_dir)));

    let audit_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", audit_db_path))
        .await
        .expect("Failed to connect to audit DB");
    let audit_store = SqliteAuditStore::new(audit_pool);
    audit_store
        .migrate()
        .await
        .expect("Failed to migrate audit DB");
    let audit_service = Arc::new(AuditService::new(audit_store));

    let settings = BotSettings {
        review_channel_id: std::env::var("REVIEW_CHANNEL_ID")
            .ok()
            .and_then(|v| v.parse().ok()),
    };
    if settings.review_channel_id.is_none() {
        tracing::warn!("REVIEW_CHANNEL_ID not set - review posts will be skipped");
    }

    // Create the data structure that will be shared across all commands
    let data = Data {
        engine: Arc::clone(&engine),
        evidence: Arc::clone(&evidence_store),
        audit: Arc::clone(&audit_service),
        settings,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Configure the poise framework with our commands and settings.

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            // Register all our commands here
            commands: vec![
                discord::commands::antispam::spamstats(),
                discord::commands::antispam::unmute(),
            ],
            // Event handler for messages and interactions
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                println!("🤖 Bot is starting up...");

                // Register slash commands globally (can take up to an hour to propagate)
                // For faster development, use register_in_guild instead:
                // poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id).await?;
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                println!("✅ Commands registered!");
                println!("🚀 Bot is ready!");

                // Background sweep so one-time posters don't accumulate in
                // the tracking maps. Runs every 5 minutes.
                let sweep_engine = Arc::clone(&data.engine);
                tokio::spawn(async move {
                    use std::time::Duration as StdDuration;
                    use tokio::time::sleep;

                    loop {
                        sleep(StdDuration::from_secs(300)).await;
                        sweep_engine.sweep_idle(chrono::Utc::now());
                        tracing::debug!("idle spam-tracking sweep completed");
                    }
                });

                Ok(data)
            })
        })
        .build();

    // Create the client and start the bot
    let mut settings = serenity::cache::Settings::default();
    settings.max_messages = 10000;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .cache_settings(settings)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
