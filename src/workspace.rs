use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("request to workspace API failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("workspace API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("client has no access token; authenticate first")]
    NotAuthenticated,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Thin client for the workspace REST API.
///
/// Cloning is cheap and clones share the same token, so a refresh through
/// one handle is seen by all of them.
#[derive(Clone)]
pub struct WorkspaceClient {
    http: reqwest::Client,
    api_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl WorkspaceClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// A handle that acts as the owner of `token`, no authentication round
    /// trip needed.
    pub fn with_token(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = Self::new(api_url);
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
            ..client
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Client-credentials grant for the application itself.
    pub async fn authenticate(
        &self,
        app_id: &str,
        app_secret: &str,
    ) -> Result<String, WorkspaceError> {
        let url = format!("{}/oauth/token", self.api_url);
        debug!("Authenticating app {} against {}", app_id, url);

        let response = self
            .http
            .post(&url)
            .basic_auth(app_id, Some(app_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkspaceError::Api { status, body });
        }

        let token: TokenResponse = response.json().await?;
        *self.token.write().await = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    /// Post a plain text app message into a space.
    pub async fn send_message(&self, space_id: &str, text: &str) -> Result<(), WorkspaceError> {
        let token = self.token().await.ok_or(WorkspaceError::NotAuthenticated)?;
        let url = format!("{}/v1/spaces/{}/messages", self.api_url, space_id);

        let body = json!({
            "type": "appMessage",
            "version": 1.0,
            "annotations": [{
                "type": "generic",
                "version": 1.0,
                "color": "#6CB7FB",
                "text": text,
            }]
        });

        debug!("Sending message to space {}", space_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkspaceError::Api { status, body });
        }
        Ok(())
    }
}

impl std::fmt::Debug for WorkspaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        http::{header, HeaderMap, Method, StatusCode, Uri},
        Router,
    };
    use std::sync::Mutex;

    /// A request as the fake API received it.
    #[derive(Debug, Clone)]
    pub(crate) struct Received {
        pub(crate) method: Method,
        pub(crate) path: String,
        pub(crate) headers: HeaderMap,
        pub(crate) body: Bytes,
    }

    impl Received {
        pub(crate) fn header(&self, name: header::HeaderName) -> &str {
            self.headers[name].to_str().unwrap()
        }

        pub(crate) fn form(&self) -> Vec<(String, String)> {
            url::form_urlencoded::parse(&self.body)
                .into_owned()
                .collect()
        }
    }

    /// Serve `reply` with `status` on every path of a local port and record
    /// what arrives. Returns the base URL to point a client at.
    pub(crate) async fn fake_api(
        status: StatusCode,
        reply: &'static str,
    ) -> (String, Arc<Mutex<Vec<Received>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();
        let router = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(Received {
                        method,
                        path: uri.path().to_string(),
                        headers,
                        body,
                    });
                    (status, [(header::CONTENT_TYPE, "application/json")], reply)
                }
            },
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("http://{addr}"), received)
    }

    fn only(received: &Arc<Mutex<Vec<Received>>>) -> Received {
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        received[0].clone()
    }

    #[tokio::test]
    async fn test_new_client_has_no_token() {
        let client = WorkspaceClient::new("https://api.example.com/");
        assert_eq!(client.api_url(), "https://api.example.com");
        assert_eq!(client.token().await, None);
    }

    #[tokio::test]
    async fn test_with_token_is_shared_between_clones() {
        let client = WorkspaceClient::with_token("https://api.example.com", "t-1");
        let clone = client.clone();
        assert_eq!(clone.token().await.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_send_without_token_fails_before_any_request() {
        let client = WorkspaceClient::new("http://127.0.0.1:9");
        let err = client.send_message("space", "hi").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_authenticate_uses_client_credentials() {
        let (api, received) = fake_api(
            StatusCode::OK,
            r#"{"access_token":"app-token","token_type":"bearer","expires_in":43199}"#,
        )
        .await;
        let client = WorkspaceClient::new(api);

        let token = client.authenticate("app-1", "app-secret").await.unwrap();

        assert_eq!(token, "app-token");
        assert_eq!(client.token().await.as_deref(), Some("app-token"));

        let request = only(&received);
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/oauth/token");
        // base64("app-1:app-secret")
        assert_eq!(
            request.header(header::AUTHORIZATION),
            "Basic YXBwLTE6YXBwLXNlY3JldA=="
        );
        assert_eq!(
            request.header(header::CONTENT_TYPE),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(
            request.form(),
            vec![("grant_type".to_string(), "client_credentials".to_string())]
        );
    }

    #[tokio::test]
    async fn test_authenticate_rejection_keeps_client_unauthenticated() {
        let (api, _) = fake_api(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_client"}"#).await;
        let client = WorkspaceClient::new(api);

        let err = client.authenticate("app-1", "wrong").await.unwrap_err();

        match err {
            WorkspaceError::Api { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(body.contains("invalid_client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.token().await, None);
    }

    #[tokio::test]
    async fn test_send_message_posts_app_message_with_bearer() {
        let (api, received) = fake_api(StatusCode::CREATED, r#"{"id":"m-1"}"#).await;
        let client = WorkspaceClient::with_token(api, "t-1");

        client.send_message("space-1", "hello").await.unwrap();

        let request = only(&received);
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/v1/spaces/space-1/messages");
        assert_eq!(request.header(header::AUTHORIZATION), "Bearer t-1");

        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["type"], "appMessage");
        assert_eq!(body["annotations"][0]["type"], "generic");
        assert_eq!(body["annotations"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_send_message_maps_server_errors() {
        let (api, _) = fake_api(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#).await;
        let client = WorkspaceClient::with_token(api, "t-1");

        let err = client.send_message("space-1", "hello").await.unwrap_err();

        assert!(matches!(
            err,
            WorkspaceError::Api { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }
}
