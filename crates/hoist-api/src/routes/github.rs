//! GitHub webhook endpoint.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use hmac::{Hmac, Mac};
use hoist_core::GitProvider;
use hoist_core::event::{
    CredentialContext, GitAuthor, GitCommit, PushEvent, RefKind, RepositoryRef,
};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(github_events))
}

/// The parts of a GitHub `push` payload we use.
#[derive(Debug, Deserialize)]
pub struct GithubPushPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    pub repository: GithubRepository,
    #[serde(default)]
    pub commits: Vec<GithubCommit>,
    pub installation: Option<GithubInstallation>,
}

#[derive(Debug, Deserialize)]
pub struct GithubRepository {
    pub full_name: String,
    pub name: String,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
pub struct GithubCommit {
    #[serde(default)]
    pub message: String,
    pub author: GithubCommitAuthor,
}

#[derive(Debug, Deserialize)]
pub struct GithubCommitAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GithubInstallation {
    pub id: i64,
}

impl GithubPushPayload {
    pub fn into_push_event(self) -> PushEvent {
        let git_ref = self.git_ref.as_str();
        let (ref_kind, ref_name) = if let Some(branch) = git_ref.strip_prefix("refs/heads/") {
            (RefKind::Branch, branch.to_string())
        } else if let Some(tag) = git_ref.strip_prefix("refs/tags/") {
            (RefKind::Tag, tag.to_string())
        } else {
            (RefKind::Other, git_ref.to_string())
        };

        let owner = self
            .repository
            .full_name
            .split_once('/')
            .map(|(owner, _)| owner.to_string())
            .unwrap_or_default();

        let credentials = match self.installation {
            Some(installation) => CredentialContext::GithubInstallation {
                installation_id: installation.id,
            },
            None => CredentialContext::None,
        };

        PushEvent {
            provider: GitProvider::Github,
            repository: RepositoryRef {
                source: GitProvider::Github.host().to_string(),
                owner,
                name: self.repository.name,
                html_url: self.repository.html_url,
            },
            ref_kind,
            ref_name,
            revision: if self.deleted {
                String::new()
            } else {
                self.after
            },
            commits: self
                .commits
                .into_iter()
                .map(|c| GitCommit {
                    author: GitAuthor {
                        name: c.author.name,
                        email: c.author.email,
                        username: c.author.username.unwrap_or_default(),
                    },
                    message: c.message,
                })
                .collect(),
            credentials,
        }
    }
}

async fn github_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let Some(github) = &state.github else {
        return Err(ApiError::NotFound(
            "GitHub integration is not configured".to_string(),
        ));
    };

    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());

    if !github.webhook_secret.is_empty()
        && !verify_github_signature(&github.webhook_secret, &body, signature)
    {
        warn!(event = %event_type, "Invalid GitHub webhook signature");
        return Err(ApiError::Unauthorized("invalid signature".to_string()));
    }

    match event_type {
        "push" => {
            let payload: GithubPushPayload = serde_json::from_slice(&body)
                .map_err(|e| ApiError::BadRequest(format!("Invalid push payload: {}", e)))?;
            let event = payload.into_push_event();
            info!(
                repo = %event.full_name(),
                git_ref = %event.ref_name,
                revision = %event.revision,
                "Received GitHub push"
            );
            github.dispatcher.dispatch(event).await?;
        }
        other => debug!(event = %other, "Ignoring GitHub event"),
    }

    Ok(StatusCode::OK)
}

/// Verify a `sha256=<hex>` GitHub webhook signature.
pub fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GithubWebhook;
    use crate::routes::router as app_router;
    use crate::routes::testing::recording_dispatcher;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const SECRET: &str = "this-is-a-webhook-secret";

    const PUSH: &str = r#"{
        "ref": "refs/heads/feature-x",
        "before": "0000000000000000000000000000000000000000",
        "after": "abc123def4567890abc123def4567890abc123de",
        "deleted": false,
        "repository": {
            "full_name": "acme/api",
            "name": "api",
            "html_url": "https://github.com/acme/api",
            "owner": { "login": "acme" }
        },
        "commits": [
            {
                "id": "abc123",
                "message": "Add endpoint",
                "author": { "name": "Jo Doe", "email": "jo@example.com", "username": "jodoe" }
            }
        ],
        "installation": { "id": 42 }
    }"#;

    fn sign(body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn request(event: &str, body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/api/integrations/github/events")
            .header("X-GitHub-Event", event)
            .header("Content-Type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("X-Hub-Signature-256", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[test]
    fn test_into_push_event() {
        let payload: GithubPushPayload = serde_json::from_str(PUSH).unwrap();
        let event = payload.into_push_event();

        assert_eq!(event.provider, GitProvider::Github);
        assert_eq!(event.ref_kind, RefKind::Branch);
        assert_eq!(event.ref_name, "feature-x");
        assert_eq!(event.full_name(), "acme/api");
        assert_eq!(event.repository.source, "github.com");
        assert_eq!(event.commits[0].author.username, "jodoe");
        assert_eq!(
            event.credentials,
            CredentialContext::GithubInstallation {
                installation_id: 42
            }
        );
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_tag_push() {
        let payload: GithubPushPayload =
            serde_json::from_str(&PUSH.replace("refs/heads/feature-x", "refs/tags/v1.0.0"))
                .unwrap();
        let event = payload.into_push_event();
        assert_eq!(event.ref_kind, RefKind::Tag);
        assert_eq!(event.ref_name, "v1.0.0");
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_branch_deletion_has_no_revision() {
        let payload: GithubPushPayload =
            serde_json::from_str(&PUSH.replace("\"deleted\": false", "\"deleted\": true"))
                .unwrap();
        let event = payload.into_push_event();
        assert_eq!(event.revision, "");
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_verify_signature() {
        assert!(verify_github_signature(SECRET, PUSH.as_bytes(), Some(&sign(PUSH))));
        assert!(!verify_github_signature(SECRET, b"tampered", Some(&sign(PUSH))));
        assert!(!verify_github_signature(SECRET, PUSH.as_bytes(), None));
        assert!(!verify_github_signature(SECRET, PUSH.as_bytes(), Some("sha1=abc")));
        assert!(!verify_github_signature(SECRET, PUSH.as_bytes(), Some("sha256=zz")));
    }

    #[tokio::test]
    async fn test_push_is_dispatched() {
        let (dispatcher, handler) = recording_dispatcher();
        let state = AppState {
            github: Some(GithubWebhook {
                webhook_secret: SECRET.to_string(),
                dispatcher: dispatcher.clone(),
            }),
            bitbucket: None,
        };

        let response = app_router(state)
            .oneshot(request("push", PUSH, Some(sign(PUSH))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        dispatcher.shutdown().await;
        let events = handler.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ref_name, "feature-x");
    }

    #[tokio::test]
    async fn test_invalid_signature_is_rejected() {
        let (dispatcher, handler) = recording_dispatcher();
        let state = AppState {
            github: Some(GithubWebhook {
                webhook_secret: SECRET.to_string(),
                dispatcher: dispatcher.clone(),
            }),
            bitbucket: None,
        };

        let response = app_router(state)
            .oneshot(request("push", PUSH, Some("sha256=00".to_string())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        dispatcher.shutdown().await;
        assert!(handler.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_events_are_acknowledged() {
        let (dispatcher, handler) = recording_dispatcher();
        let state = AppState {
            github: Some(GithubWebhook {
                webhook_secret: SECRET.to_string(),
                dispatcher: dispatcher.clone(),
            }),
            bitbucket: None,
        };

        let body = r#"{"zen": "Keep it logically awesome."}"#;
        let response = app_router(state)
            .oneshot(request("ping", body, Some(sign(body))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        dispatcher.shutdown().await;
        assert!(handler.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_integration() {
        let response = app_router(AppState::default())
            .oneshot(request("push", PUSH, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_push_after_shutdown_is_unavailable() {
        let (dispatcher, _handler) = recording_dispatcher();
        dispatcher.shutdown().await;
        let state = AppState {
            github: Some(GithubWebhook {
                webhook_secret: SECRET.to_string(),
                dispatcher,
            }),
            bitbucket: None,
        };

        let response = app_router(state)
            .oneshot(request("push", PUSH, Some(sign(PUSH))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
