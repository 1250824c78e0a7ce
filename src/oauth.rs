use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("token exchange request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token exchange rejected ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid OAuth endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("callback is missing the authorization code")]
    MissingCode,
    #[error("callback state is unknown or already used")]
    UnknownState,
    #[error("authorization denied: {0}")]
    Denied(String),
}

/// Token issued to a user at the end of the authorization-code flow.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Platform user id the token acts as
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl AccessToken {
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|seconds| issued_at + Duration::seconds(seconds))
    }
}

/// Exchanges an authorization code for an access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AccessToken, OAuthError>;
}

/// OAuth2 client for one application.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    api_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    pub fn new(
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Where to send the user's browser to start the flow.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String, OAuthError> {
        let url = Url::parse_with_params(
            &format!("{}/oauth/authorize", self.api_url),
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }
}

#[async_trait]
impl TokenExchange for OAuthClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AccessToken, OAuthError> {
        let url = format!("{}/oauth/token", self.api_url);
        debug!("Exchanging authorization code at {}", url);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Rejected { status, body });
        }

        Ok(response.json().await?)
    }
}
