//! Webhook and OAuth adapter for workspace chat bots.
//!
//! A [`Bot`] turns webhook deliveries into named events, e.g.
//!
//! ```text
//! message-created
//! message-annotation-added
//! message-focus
//! message-focus:ActionRequest
//! message-focus:ActionRequest:Schedule
//! actionSelected:sample_button
//! actionSelected:/mycommand        (listener gets the arguments)
//! ```
//!
//! and keeps a registry of users who authorized the app through OAuth so
//! it can act on their behalf. [`BotServer`] hosts any number of bots.

pub mod bot;
pub mod config;
pub mod events;
pub mod oauth;
pub mod registry;
pub mod server;
pub mod verification;
pub mod workspace;

pub use bot::Bot;
pub use config::Config;
pub use events::{Annotation, EventKey, WebhookEvent, WebhookPayload};
pub use server::BotServer;
pub use workspace::WorkspaceClient;
