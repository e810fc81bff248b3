//! Collaborator traits consumed by the build orchestrator.
//!
//! Implementations live in `hoist-api` (provider clients), `hoist-config`
//! (bootstrap steps) and `hoist-db` (persistence).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::build::{Build, InsertedBuild};
use crate::event::{CredentialContext, GitProvider, PushEvent};
use crate::manifest::Manifest;

/// A short-lived provider access token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }
}

// Keep tokens out of logs.
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Mints repository credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_access_token(&self, context: &CredentialContext) -> Result<AccessToken>;

    /// Clone URL for `plain_url` with the token embedded.
    async fn get_authenticated_clone_url(
        &self,
        token: &AccessToken,
        plain_url: &str,
    ) -> Result<String>;
}

/// Fetches the manifest file at the pushed revision.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// `Ok(None)` when the repository has no manifest.
    async fn get_manifest_text(
        &self,
        token: &AccessToken,
        event: &PushEvent,
    ) -> Result<Option<String>>;
}

/// Adds provider-specific setup steps to a resolved manifest.
pub trait ManifestAugmenter: Send + Sync {
    fn inject_bootstrap_steps(
        &self,
        manifest: Manifest,
        track: &str,
        provider: GitProvider,
    ) -> Result<Manifest>;
}

/// Build persistence.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Next value of the per-repository counter.
    async fn next_auto_increment(&self, provider: GitProvider, repo_full_name: &str)
    -> Result<i64>;

    async fn insert_build(&self, build: Build) -> Result<InsertedBuild>;
}
