//! Bitbucket webhook endpoint.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use hoist_core::GitProvider;
use hoist_core::event::{
    CredentialContext, GitAuthor, GitCommit, PushEvent, RefKind, RepositoryRef,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(bitbucket_events))
}

/// The parts of a Bitbucket `repo:push` payload we use.
#[derive(Debug, Deserialize)]
pub struct BitbucketPushPayload {
    pub push: BitbucketPush,
    pub repository: BitbucketRepository,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketPush {
    #[serde(default)]
    pub changes: Vec<BitbucketChange>,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketChange {
    /// `None` when the ref was deleted.
    pub new: Option<BitbucketRefState>,
    #[serde(default)]
    pub commits: Vec<BitbucketCommit>,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketRefState {
    #[serde(rename = "type")]
    pub ref_type: String,
    pub name: String,
    pub target: BitbucketTarget,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketTarget {
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketCommit {
    #[serde(default)]
    pub message: String,
    pub author: BitbucketAuthor,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketAuthor {
    /// `Name <email>`.
    #[serde(default)]
    pub raw: String,
    pub user: Option<BitbucketUser>,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketUser {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketRepository {
    pub full_name: String,
    pub name: String,
    pub links: BitbucketLinks,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketLinks {
    pub html: BitbucketLink,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketLink {
    pub href: String,
}

impl BitbucketAuthor {
    fn into_git_author(self) -> GitAuthor {
        let (name, email) = match self.raw.split_once('<') {
            Some((name, rest)) => (
                name.trim().to_string(),
                rest.trim_end().trim_end_matches('>').to_string(),
            ),
            None => (self.raw.trim().to_string(), String::new()),
        };
        GitAuthor {
            name,
            email,
            username: self.user.map(|u| u.username).unwrap_or_default(),
        }
    }
}

impl BitbucketPushPayload {
    /// Only the first change of a push is built.
    pub fn into_push_event(self) -> PushEvent {
        let owner = self
            .repository
            .full_name
            .split_once('/')
            .map(|(owner, _)| owner.to_string())
            .unwrap_or_default();

        let change = self.push.changes.into_iter().next();
        let (ref_kind, ref_name, revision, commits) = match change {
            Some(BitbucketChange {
                new: Some(new),
                commits,
            }) => {
                let kind = match new.ref_type.as_str() {
                    "branch" => RefKind::Branch,
                    "tag" => RefKind::Tag,
                    _ => RefKind::Other,
                };
                (kind, new.name, new.target.hash, commits)
            }
            _ => (RefKind::Other, String::new(), String::new(), Vec::new()),
        };

        PushEvent {
            provider: GitProvider::Bitbucket,
            repository: RepositoryRef {
                source: GitProvider::Bitbucket.host().to_string(),
                owner,
                name: self.repository.name,
                html_url: self.repository.links.html.href,
            },
            ref_kind,
            ref_name,
            revision,
            commits: commits
                .into_iter()
                .map(|c| GitCommit {
                    author: c.author.into_git_author(),
                    message: c.message,
                })
                .collect(),
            credentials: CredentialContext::BitbucketOAuth,
        }
    }
}

async fn bitbucket_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let Some(dispatcher) = &state.bitbucket else {
        return Err(ApiError::NotFound(
            "Bitbucket integration is not configured".to_string(),
        ));
    };

    let event_key = headers
        .get("X-Event-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    match event_key {
        "repo:push" => {
            let payload: BitbucketPushPayload = serde_json::from_slice(&body)
                .map_err(|e| ApiError::BadRequest(format!("Invalid push payload: {}", e)))?;
            let event = payload.into_push_event();
            info!(
                repo = %event.full_name(),
                git_ref = %event.ref_name,
                revision = %event.revision,
                "Received Bitbucket push"
            );
            dispatcher.dispatch(event).await?;
        }
        other => debug!(event = %other, "Ignoring Bitbucket event"),
    }

    Ok(StatusCode::OK)
}
