use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{BotConfig, WorkspaceConfig};
use crate::events::{DispatchError, EventBus, Lifecycle, WebhookEvent, WebhookPayload};
use crate::oauth::{AccessToken, OAuthClient, OAuthError, TokenExchange};
use crate::registry::UserRegistry;
use crate::verification::{self, ChallengeResponse};
use crate::workspace::{WorkspaceClient, WorkspaceError};

/// How long an issued OAuth `state` stays redeemable.
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// One hosted application.
///
/// Owns its own listener table, user registry and OAuth state, so several
/// bots can share a process without seeing each other's events.
pub struct Bot {
    app_id: String,
    app_secret: String,
    webhook_secret: String,
    client: WorkspaceClient,
    users: UserRegistry,
    events: EventBus,
    oauth: OAuthClient,
    exchange: Arc<dyn TokenExchange>,
    pending_states: DashMap<String, DateTime<Utc>>,
}

impl Bot {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        webhook_secret: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        let app_id = app_id.into();
        let app_secret = app_secret.into();
        let api_url = api_url.into();
        let oauth = OAuthClient::new(api_url.clone(), app_id.clone(), app_secret.clone());

        info!("Creating bot '{}'", app_id);

        Self {
            client: WorkspaceClient::new(api_url.clone()),
            users: UserRegistry::new(api_url),
            events: EventBus::new(),
            exchange: Arc::new(oauth.clone()),
            oauth,
            pending_states: DashMap::new(),
            webhook_secret: webhook_secret.into(),
            app_secret,
            app_id,
        }
    }

    pub fn from_config(bot: &BotConfig, workspace: &WorkspaceConfig) -> Self {
        Self::new(
            bot.app_id.clone(),
            bot.app_secret.clone(),
            bot.webhook_secret.clone(),
            workspace.api_url.clone(),
        )
    }

    /// Replace the code-for-token exchange, e.g. with a fake in tests.
    pub fn with_token_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// The bot's own API client.
    pub fn client(&self) -> &WorkspaceClient {
        &self.client
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn on<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&WebhookEvent<'_>) + Send + Sync + 'static,
    {
        self.events.on(name, listener);
    }

    pub fn on_verify<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on_verify(listener);
    }

    pub fn on_oauth<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.events.on_oauth(listener);
    }

    /// Authenticate as the application; the token is kept on [`Bot::client`].
    pub async fn authenticate(&self) -> Result<String, WorkspaceError> {
        self.client.authenticate(&self.app_id, &self.app_secret).await
    }

    /// Post a text message into a space as the application.
    pub async fn send_message(&self, space_id: &str, text: &str) -> Result<(), WorkspaceError> {
        self.client.send_message(space_id, text).await
    }

    /// Store a user's OAuth token and announce it on the `oauth` event.
    pub fn add_user(&self, user_id: &str, token: impl Into<String>) {
        self.users.add_user(user_id, token);
        self.emit_oauth(user_id);
    }

    /// Act on behalf of a user who completed OAuth.
    pub fn as_user(&self, user_id: &str) -> Option<WorkspaceClient> {
        self.users.as_user(user_id)
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    /// Fan a webhook payload out to this bot's listeners.
    pub fn emit_webhook(&self, payload: WebhookPayload) -> Result<Vec<String>, DispatchError> {
        self.events.emit_webhook(payload)
    }

    /// Notify `verify` listeners.
    pub fn emit_verify(&self) {
        self.events.emit_lifecycle(Lifecycle::Verify);
    }

    /// Notify `oauth` listeners that `user_id` was registered.
    pub fn emit_oauth(&self, user_id: &str) {
        self.events.emit_lifecycle(Lifecycle::OAuth { user_id });
    }

    /// Sign a verification challenge with this bot's webhook secret.
    pub fn answer_challenge(&self, challenge: &Value) -> ChallengeResponse {
        verification::respond(&self.webhook_secret, challenge)
    }

    /// Start an authorization-code flow; returns the URL to redirect to.
    pub fn begin_oauth(&self, redirect_uri: &str) -> Result<String, OAuthError> {
        let now = Utc::now();
        let cutoff = now - Duration::minutes(OAUTH_STATE_TTL_MINUTES);
        self.pending_states.retain(|_, issued| *issued > cutoff);

        let state = uuid::Uuid::new_v4().to_string();
        let url = self.oauth.authorize_url(redirect_uri, &state)?;
        self.pending_states.insert(state, now);

        debug!("Redirecting to {}", url);
        Ok(url)
    }

    /// Finish a flow started by [`Bot::begin_oauth`] and register the user.
    pub async fn complete_oauth(
        &self,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<AccessToken, OAuthError> {
        let issued = self
            .pending_states
            .remove(state)
            .map(|(_, issued)| issued)
            .ok_or(OAuthError::UnknownState)?;
        if Utc::now() - issued > Duration::minutes(OAUTH_STATE_TTL_MINUTES) {
            return Err(OAuthError::UnknownState);
        }

        let token = self.exchange.exchange_code(code, redirect_uri).await?;

        info!(
            "Adding {} to {} user registry",
            token.display_name.as_deref().unwrap_or(&token.id),
            self.app_id
        );
        self.add_user(&token.id, token.access_token.clone());
        Ok(token)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub(crate) struct FakeExchange {
        pub(crate) result: Mutex<Option<Result<AccessToken, OAuthError>>>,
    }

    impl FakeExchange {
        pub(crate) fn ok(user_id: &str, token: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(Ok(AccessToken {
                    access_token: token.to_string(),
                    id: user_id.to_string(),
                    display_name: Some("Test User".to_string()),
                    expires_in: Some(3600),
                    scope: Some("ibmid".to_string()),
                }))),
            })
        }

        pub(crate) fn err() -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(Err(OAuthError::Rejected {
                    status: reqwest::StatusCode::BAD_REQUEST,
                    body: "invalid_grant".to_string(),
                }))),
            })
        }
    }

    #[async_trait]
    impl TokenExchange for FakeExchange {
        async fn exchange_code(
            &self,
            _code: &str,
            _redirect_uri: &str,
        ) -> Result<AccessToken, OAuthError> {
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(OAuthError::MissingCode))
        }
    }

    fn bot() -> Bot {
        Bot::new("app-1", "secret", "hook", "https://api.example.com")
    }

    fn state_from(url: &str) -> String {
        let url = url::Url::parse(url).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_user_emits_oauth_and_overwrites() {
        let bot = bot();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bot.on_oauth(move |user_id| s.lock().unwrap().push(user_id.to_string()));

        bot.add_user("u1", "t1");
        bot.add_user("u1", "t2");

        assert_eq!(
            bot.as_user("u1").unwrap().token().await.as_deref(),
            Some("t2")
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_bots_do_not_share_listeners() {
        let first = bot();
        let second = Bot::new("app-2", "secret", "hook", "https://api.example.com");
        first.on("message-created", |_| {});

        assert_eq!(first.events().listener_count("message-created"), 1);
        assert_eq!(second.events().listener_count("message-created"), 0);
    }

    #[test]
    fn test_answer_challenge_uses_webhook_secret() {
        let challenge = serde_json::json!("c");
        let answer = bot().answer_challenge(&challenge);
        assert_eq!(answer, verification::respond("hook", &challenge));

        let other = Bot::new("app-1", "secret", "other-hook", "https://api.example.com");
        assert_ne!(other.answer_challenge(&challenge).token, answer.token);
    }

    #[tokio::test]
    async fn test_complete_oauth_registers_user() {
        let bot = bot().with_token_exchange(FakeExchange::ok("user-1", "at-1"));
        let url = bot.begin_oauth("https://bots.example.com/app-1/callback").unwrap();
        let state = state_from(&url);

        let token = bot
            .complete_oauth("code", &state, "https://bots.example.com/app-1/callback")
            .await
            .unwrap();

        assert_eq!(token.id, "user-1");
        assert_eq!(
            bot.as_user("user-1").unwrap().token().await.as_deref(),
            Some("at-1")
        );
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let bot = bot().with_token_exchange(FakeExchange::ok("user-1", "at-1"));
        let url = bot.begin_oauth("https://bots.example.com/cb").unwrap();
        let state = state_from(&url);

        bot.complete_oauth("code", &state, "https://bots.example.com/cb")
            .await
            .unwrap();
        let again = bot
            .complete_oauth("code", &state, "https://bots.example.com/cb")
            .await;
        assert!(matches!(again, Err(OAuthError::UnknownState)));
    }

    #[tokio::test]
    async fn test_failed_exchange_leaves_registry_alone() {
        let bot = bot().with_token_exchange(FakeExchange::err());
        bot.add_user("existing", "t0");
        let state = state_from(&bot.begin_oauth("https://bots.example.com/cb").unwrap());

        let result = bot
            .complete_oauth("bad", &state, "https://bots.example.com/cb")
            .await;

        assert!(matches!(result, Err(OAuthError::Rejected { .. })));
        assert_eq!(bot.users().len(), 1);
        assert!(bot.as_user("existing").is_some());
    }
}
