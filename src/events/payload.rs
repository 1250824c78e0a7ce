use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON body of a webhook delivery.
///
/// Only the fields the dispatcher and the HTTP layer look at are typed;
/// everything else the platform sends is kept in `extra` and passed on to
/// listeners untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_type: Option<String>,
    /// Raw JSON text of the annotation. Always `None` by the time a listener
    /// sees the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded `annotationPayload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    /// Arrives as JSON text; replaced by the decoded value when an action
    /// fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Annotation {
    /// Lens name, if one was sent and is non-empty
    pub fn lens(&self) -> Option<&str> {
        non_empty(&self.lens)
    }

    /// Lens category, if non-empty
    pub fn category(&self) -> Option<&str> {
        non_empty(&self.category)
    }

    /// Button id or slash command text, if non-empty
    pub fn action_id(&self) -> Option<&str> {
        non_empty(&self.action_id)
    }
}

// The platform sends "" for fields it means to leave unset.
fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}
