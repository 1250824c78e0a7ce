pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::bot::Bot;
use crate::config::ServerConfig;
use handlers::BotState;

/// Largest webhook body accepted.
const BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

/// HTTP host for any number of bots, each mounted under `/{app_id}`.
pub struct BotServer {
    config: ServerConfig,
    router: Router,
}

impl BotServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
        }
    }

    /// Mount `/webhook`, `/oauth` and `/callback` for a bot.
    pub fn mount(self, bot: Arc<Bot>) -> Self {
        self.mount_with(bot, Router::new())
    }

    /// Like [`BotServer::mount`], with extra developer routes nested under
    /// the same prefix.
    pub fn mount_with(mut self, bot: Arc<Bot>, custom: Router) -> Self {
        let path = format!("/{}", bot.app_id());
        let state = BotState {
            redirect_uri: format!("{}{}/callback", self.config.effective_public_url(), path),
            bot,
        };

        info!("Mounting /webhook, /oauth and /callback on '{}'", path);

        let routes = Router::new()
            .route("/webhook", post(handlers::webhook))
            .route("/oauth", get(handlers::oauth))
            .route("/callback", get(handlers::callback))
            .with_state(state)
            .merge(custom)
            .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES));

        self.router = self.router.nest(&path, routes);
        self
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind and serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;

        info!("workspace-bot listening on {}", addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            })
            .await
            .context("Server error")?;

        Ok(())
    }
}
