use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workspace_bot::{Bot, BotServer, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration; without a file, fall back to APP_ID & co.
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::from_env().context("No config file found and environment is incomplete")?
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Configuration loaded successfully");
    info!("  Workspace API: {}", config.workspace.api_url);
    info!("  Public URL: {}", config.server.effective_public_url());
    info!("  Bots: {}", config.bots.len());

    let mut server = BotServer::new(config.server.clone());

    for bot_config in &config.bots {
        let bot = Arc::new(Bot::from_config(bot_config, &config.workspace));
        register_logging_listeners(&bot);

        match bot.authenticate().await {
            Ok(_) => info!("Bot '{}' authenticated", bot.app_id()),
            Err(e) => warn!("Bot '{}' could not authenticate: {}", bot.app_id(), e),
        }

        server = server.mount(bot);
    }

    server.serve().await
}

fn register_logging_listeners(bot: &Bot) {
    let app_id = bot.app_id().to_string();
    bot.on_verify(move || info!("Webhook verified for '{}'", app_id));

    let app_id = bot.app_id().to_string();
    bot.on_oauth(move |user_id| info!("User {} authorized '{}'", user_id, app_id));

    bot.on("message-created", |event| {
        info!(
            "Message {:?} in space {:?}: {:?}",
            event.message.message_id, event.message.space_id, event.message.content
        );
    });
}
