use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::key::EventKey;
use super::payload::{Annotation, WebhookPayload};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("annotationPayload is not valid JSON: {0}")]
    AnnotationPayload(#[source] serde_json::Error),
    #[error("nested annotation payload is not valid JSON: {0}")]
    ActionPayload(#[source] serde_json::Error),
}

/// One event to fire, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub key: EventKey,
    /// Positional arguments; only slash commands carry them.
    pub args: Option<Vec<String>>,
}

impl Emission {
    fn plain(key: EventKey) -> Self {
        Self { key, args: None }
    }
}

/// Result of fanning out one payload: the message and annotation every
/// listener receives, plus the ordered emissions.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub message: WebhookPayload,
    pub annotation: Annotation,
    pub emissions: Vec<Emission>,
}

/// Map a webhook payload onto its cascade of events.
///
/// The raw `annotationPayload` string is consumed and never appears on the
/// returned message. Nothing is emitted for a payload without a `type`, and
/// an empty `type` counts as missing.
pub fn fan_out(mut payload: WebhookPayload) -> Result<Dispatch, DispatchError> {
    let mut annotation = match payload.annotation_payload.take() {
        Some(raw) if !raw.is_empty() => {
            serde_json::from_str::<Annotation>(&raw).map_err(DispatchError::AnnotationPayload)?
        }
        _ => Annotation::default(),
    };

    let Some(event_type) = payload.event_type.clone().filter(|t| !t.is_empty()) else {
        return Ok(Dispatch {
            message: payload,
            annotation,
            emissions: Vec::new(),
        });
    };

    debug!(
        "Fanning out '{}' for messageId {:?} with annotation {:?}",
        event_type, payload.message_id, annotation
    );

    let annotation_type = payload.annotation_type.clone().unwrap_or_default();
    let mut emissions = vec![Emission::plain(EventKey::Type(event_type))];

    if !annotation_type.is_empty() {
        emissions.push(Emission::plain(EventKey::AnnotationType(
            annotation_type.clone(),
        )));
    }

    if let Some(lens) = annotation.lens() {
        emissions.push(Emission::plain(EventKey::Lens {
            annotation_type: annotation_type.clone(),
            lens: lens.to_string(),
        }));
    }

    if let Some(category) = annotation.category() {
        emissions.push(Emission::plain(EventKey::Category {
            annotation_type: annotation_type.clone(),
            lens: annotation.lens().map(str::to_string),
            category: category.to_string(),
        }));
    }

    if let Some(action_id) = annotation.action_id().map(str::to_string) {
        decode_action_payload(&mut annotation)?;

        if action_id.starts_with('/') {
            let mut parts = action_id.split_whitespace().map(str::to_string);
            let command = parts.next().unwrap_or_default();
            emissions.push(Emission {
                key: EventKey::Command {
                    annotation_type,
                    command,
                },
                args: Some(parts.collect()),
            });
        } else {
            emissions.push(Emission::plain(EventKey::Action {
                annotation_type,
                action_id,
            }));
        }
    }

    Ok(Dispatch {
        message: payload,
        annotation,
        emissions,
    })
}

fn decode_action_payload(annotation: &mut Annotation) -> Result<(), DispatchError> {
    if let Some(Value::String(raw)) = &annotation.payload {
        if !raw.is_empty() {
            let decoded = serde_json::from_str(raw).map_err(DispatchError::ActionPayload)?;
            annotation.payload = Some(decoded);
        }
    }
    Ok(())
}
