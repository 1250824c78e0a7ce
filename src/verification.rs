//! Webhook verification challenge.
//!
//! The platform proves endpoint ownership by sending a challenge; the
//! endpoint answers with `{"response": challenge}` and signs exactly those
//! bytes with the app's webhook secret.

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature of the response body.
pub const OUTBOUND_TOKEN_HEADER: &str = "x-outbound-token";

/// Value of `type` on a verification delivery.
pub const VERIFICATION_TYPE: &str = "verification";

/// Signed answer to a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponse {
    /// JSON body to send as-is
    pub body: String,
    /// Hex HMAC-SHA256 of `body`
    pub token: String,
}

/// Hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign(secret: &str, body: &str) -> String {
    // HMAC accepts keys of any length, including empty
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build and sign the answer to `challenge`, which is echoed back as sent.
pub fn respond(secret: &str, challenge: &Value) -> ChallengeResponse {
    let body = json!({ "response": challenge }).to_string();
    let token = sign(secret, &body);
    ChallengeResponse { body, token }
}
