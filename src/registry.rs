use dashmap::DashMap;
use tracing::info;

use crate::workspace::WorkspaceClient;

/// Users who completed OAuth, keyed by their platform user id.
///
/// Entries live for the lifetime of the process; re-authorizing replaces the
/// previous handle.
pub struct UserRegistry {
    api_url: String,
    users: DashMap<String, WorkspaceClient>,
}

impl UserRegistry {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            users: DashMap::new(),
        }
    }

    /// Register a handle acting as `user_id` with the given bearer token
    pub fn add_user(&self, user_id: impl Into<String>, token: impl Into<String>) {
        let user_id = user_id.into();
        let client = WorkspaceClient::with_token(self.api_url.clone(), token);
        if self.users.insert(user_id.clone(), client).is_some() {
            info!("Replaced token for user {}", user_id);
        } else {
            info!("Registered user {}", user_id);
        }
    }

    /// Get the client acting as `user_id`, if they have authorized
    pub fn as_user(&self, user_id: &str) -> Option<WorkspaceClient> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
