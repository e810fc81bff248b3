//! HTTP routes.

pub mod bitbucket;
pub mod github;
pub mod health;

use crate::AppState;
use axum::Router;

/// Build the main router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/integrations", integrations_router())
        .merge(health::router())
        .with_state(state)
}

fn integrations_router() -> Router<AppState> {
    Router::new()
        .nest("/github", github::router())
        .nest("/bitbucket", bitbucket::router())
}
