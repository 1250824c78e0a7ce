use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::bot::Bot;
use crate::events::WebhookPayload;
use crate::oauth::OAuthError;
use crate::verification::{OUTBOUND_TOKEN_HEADER, VERIFICATION_TYPE};

#[derive(Clone)]
pub struct BotState {
    pub bot: Arc<Bot>,
    /// `{public_url}/{app_id}/callback`
    pub redirect_uri: String,
}

pub async fn webhook(State(state): State<BotState>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            warn!("Ignoring webhook body that is not JSON: {}", e);
            return StatusCode::OK.into_response();
        }
    };

    if body.get("type").and_then(Value::as_str) == Some(VERIFICATION_TYPE) {
        return verification(&state.bot, &body);
    }

    // Messages the bot posts itself come back as webhooks too
    if body.get("userId").and_then(Value::as_str) == Some(state.bot.app_id()) {
        return StatusCode::CREATED.into_response();
    }

    let payload: WebhookPayload = match serde_json::from_value(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Ignoring malformed webhook payload: {}", e);
            return StatusCode::OK.into_response();
        }
    };

    if let Some(event_type) = payload.event_type.as_deref().filter(|t| !t.is_empty()) {
        debug!(
            "Webhook event '{}' for messageId {:?}",
            event_type, payload.message_id
        );
        if let Err(e) = state.bot.emit_webhook(payload) {
            warn!("Dropping webhook for bot {}: {}", state.bot.app_id(), e);
        }
    }

    // Anything but 200 makes the platform redeliver
    StatusCode::OK.into_response()
}

fn verification(bot: &Bot, body: &Value) -> Response {
    let missing = Value::String(String::new());
    let challenge = body.get("challenge").unwrap_or(&missing);
    debug!("Received webhook verification challenge {}", challenge);

    let answer = bot.answer_challenge(challenge);
    let token = match HeaderValue::from_str(&answer.token) {
        Ok(token) => token,
        Err(e) => {
            error!("Challenge signature is not a valid header value: {}", e);
            return StatusCode::OK.into_response();
        }
    };

    bot.emit_verify();

    (
        StatusCode::OK,
        [
            (HeaderName::from_static(OUTBOUND_TOKEN_HEADER), token),
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
        ],
        answer.body,
    )
        .into_response()
}

pub async fn oauth(State(state): State<BotState>) -> Response {
    match state.bot.begin_oauth(&state.redirect_uri) {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => {
            error!("Failed to build authorization URL: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub async fn callback(
    State(state): State<BotState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let result = match (params.error, params.code) {
        (Some(denied), _) => Err(OAuthError::Denied(denied)),
        (None, None) => Err(OAuthError::MissingCode),
        (None, Some(code)) => {
            let nonce = params.state.unwrap_or_default();
            state
                .bot
                .complete_oauth(&code, &nonce, &state.redirect_uri)
                .await
        }
    };

    match result {
        Ok(token) => {
            info!("OAuth complete for user {}", token.id);
            let expires = token
                .expires_at(Utc::now())
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            Html(format!(
                "<p>{}</p>\n<p>{}</p>\n<p>Valid until {}</p>\n<p>{}</p>\n",
                escape_html(token.display_name.as_deref().unwrap_or_default()),
                escape_html(&token.id),
                expires,
                escape_html(token.scope.as_deref().unwrap_or_default()),
            ))
            .into_response()
        }
        Err(e) => {
            error!("Error with OAuth callback: {}", e);
            let status = match e {
                OAuthError::MissingCode | OAuthError::UnknownState | OAuthError::Denied(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, e.to_string()).into_response()
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
