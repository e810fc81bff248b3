//! Application state.

use hoist_scheduler::Dispatcher;

/// GitHub webhook settings and the dispatcher its events go to.
#[derive(Clone)]
pub struct GithubWebhook {
    pub webhook_secret: String,
    pub dispatcher: Dispatcher,
}

/// Shared application state.
///
/// An integration is `None` when it isn't configured.
#[derive(Clone, Default)]
pub struct AppState {
    pub github: Option<GithubWebhook>,
    pub bitbucket: Option<Dispatcher>,
}

impl AppState {
    /// Stop every dispatcher and wait for in-flight builds.
    pub async fn shutdown(&self) {
        if let Some(github) = &self.github {
            github.dispatcher.shutdown().await;
        }
        if let Some(bitbucket) = &self.bitbucket {
            bitbucket.shutdown().await;
        }
    }
}
