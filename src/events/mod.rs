pub mod dispatch;
pub mod key;
pub mod payload;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

pub use dispatch::{fan_out, Dispatch, DispatchError, Emission};
pub use key::EventKey;
pub use payload::{Annotation, WebhookPayload};

/// What a webhook listener receives.
#[derive(Debug, Clone, Copy)]
pub struct WebhookEvent<'a> {
    /// Canonical routing key this invocation fired under
    pub name: &'a str,
    pub message: &'a WebhookPayload,
    pub annotation: &'a Annotation,
    /// Slash command arguments; `None` for every other event.
    pub args: Option<&'a [String]>,
}

/// Events that are not derived from a webhook payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle<'a> {
    /// The platform completed the webhook verification challenge.
    Verify,
    /// A user finished the OAuth flow and is now in the registry.
    OAuth { user_id: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LifecycleKind {
    Verify,
    OAuth,
}

impl Lifecycle<'_> {
    fn kind(&self) -> LifecycleKind {
        match self {
            Lifecycle::Verify => LifecycleKind::Verify,
            Lifecycle::OAuth { .. } => LifecycleKind::OAuth,
        }
    }
}

type WebhookListener = Arc<dyn Fn(&WebhookEvent<'_>) + Send + Sync>;
type LifecycleListener = Arc<dyn Fn(&Lifecycle<'_>) + Send + Sync>;

fn lifecycle_listener<F>(listener: F) -> LifecycleListener
where
    F: Fn(&Lifecycle<'_>) + Send + Sync + 'static,
{
    Arc::new(listener)
}

/// Listener table for a single bot.
///
/// Listeners run synchronously, in registration order, on the task handling
/// the delivery.
#[derive(Default)]
pub struct EventBus {
    webhook: DashMap<String, Vec<WebhookListener>>,
    lifecycle: DashMap<LifecycleKind, Vec<LifecycleListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a routing key such as `message-focus:Question`.
    pub fn on<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&WebhookEvent<'_>) + Send + Sync + 'static,
    {
        self.webhook
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn on_verify<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lifecycle
            .entry(LifecycleKind::Verify)
            .or_default()
            .push(lifecycle_listener(move |_| listener()));
    }

    pub fn on_oauth<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.lifecycle
            .entry(LifecycleKind::OAuth)
            .or_default()
            .push(lifecycle_listener(move |event| {
                if let Lifecycle::OAuth { user_id } = event {
                    listener(user_id);
                }
            }));
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.webhook.get(name).map(|l| l.len()).unwrap_or(0)
    }

    /// Fan a payload out and run every matching listener.
    ///
    /// Returns the routing keys that fired, in order, whether or not anyone
    /// was listening.
    pub fn emit_webhook(&self, payload: WebhookPayload) -> Result<Vec<String>, DispatchError> {
        let dispatch = fan_out(payload)?;
        let mut fired = Vec::with_capacity(dispatch.emissions.len());

        for emission in &dispatch.emissions {
            let name = emission.key.canonical();
            let event = WebhookEvent {
                name: &name,
                message: &dispatch.message,
                annotation: &dispatch.annotation,
                args: emission.args.as_deref(),
            };
            let invoked = self.emit(&event);
            trace!("Emitted '{}' to {} listener(s)", name, invoked);
            fired.push(name);
        }

        Ok(fired)
    }

    /// Run the listeners registered for `event.name`; returns how many ran.
    pub fn emit(&self, event: &WebhookEvent<'_>) -> usize {
        // Clone out of the map so a listener may subscribe without deadlocking
        // on the shard it is being called from.
        let listeners = match self.webhook.get(event.name) {
            Some(listeners) => listeners.value().clone(),
            None => return 0,
        };
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Run `verify` or `oauth` listeners; returns how many ran.
    pub fn emit_lifecycle(&self, event: Lifecycle<'_>) -> usize {
        let listeners = match self.lifecycle.get(&event.kind()) {
            Some(listeners) => listeners.value().clone(),
            None => return 0,
        };
        for listener in &listeners {
            listener(&event);
        }
        listeners.len()
    }
}
