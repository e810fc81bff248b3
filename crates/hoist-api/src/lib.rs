//! Webhook server for hoist.
//!
//! Receives push webhooks from GitHub and Bitbucket and hands them to the
//! per-provider dispatchers.

pub mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use state::{AppState, GithubWebhook};
