use std::fmt;

/// Routing key for a webhook emission.
///
/// Each variant maps to one level of the fan-out hierarchy. The string a
/// listener subscribes to is produced by [`EventKey::canonical`]; segments
/// the platform did not send render as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// `message-created`, `message-annotation-added`, ...
    Type(String),
    /// `message-focus`, `actionSelected`, ...
    AnnotationType(String),
    /// `message-focus:Question`
    Lens {
        annotation_type: String,
        lens: String,
    },
    /// `message-focus:ActionRequest:Schedule`
    Category {
        annotation_type: String,
        lens: Option<String>,
        category: String,
    },
    /// `actionSelected:sample_button`
    Action {
        annotation_type: String,
        action_id: String,
    },
    /// `actionSelected:/todo`, carries the positional arguments separately
    Command {
        annotation_type: String,
        command: String,
    },
}

impl EventKey {
    /// The string listeners subscribe to.
    pub fn canonical(&self) -> String {
        match self {
            EventKey::Type(name) | EventKey::AnnotationType(name) => name.clone(),
            EventKey::Lens {
                annotation_type,
                lens,
            } => format!("{}:{}", annotation_type, lens),
            EventKey::Category {
                annotation_type,
                lens,
                category,
            } => format!(
                "{}:{}:{}",
                annotation_type,
                lens.as_deref().unwrap_or_default(),
                category
            ),
            EventKey::Action {
                annotation_type,
                action_id,
            } => format!("{}:{}", annotation_type, action_id),
            EventKey::Command {
                annotation_type,
                command,
            } => format!("{}:{}", annotation_type, command),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<EventKey> for String {
    fn from(key: EventKey) -> Self {
        key.canonical()
    }
}
