//! Persisted build records.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::event::GitCommit;
use crate::manifest::{Manifest, ReleaseAction};

/// Status a build is created with. Later transitions belong to whoever
/// reports job completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    #[display("running")]
    Running,
    #[display("failed")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// A release target as recorded on a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTarget {
    pub name: String,
    pub actions: Vec<ReleaseAction>,
}

/// A build about to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub repo_source: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub repo_branch: String,
    pub repo_revision: String,
    /// Empty when the manifest could not be resolved.
    pub build_version: String,
    pub build_status: BuildStatus,
    pub labels: Vec<Label>,
    pub release_targets: Vec<ReleaseTarget>,
    /// Raw manifest text as fetched from the repository.
    pub manifest: String,
    pub commits: Vec<GitCommit>,
}

impl Build {
    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }
}

/// Labels of a manifest, as build labels.
pub fn labels_from_manifest(manifest: &Manifest) -> Vec<Label> {
    manifest
        .labels
        .iter()
        .map(|(key, value)| Label {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

/// Release targets of a manifest, preserving declaration order.
pub fn release_targets_from_manifest(manifest: &Manifest) -> Vec<ReleaseTarget> {
    manifest
        .releases
        .iter()
        .map(|r| ReleaseTarget {
            name: r.name.clone(),
            actions: r.actions.clone(),
        })
        .collect()
}

/// A build after the store assigned it an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertedBuild {
    pub id: i64,
    pub inserted_at: DateTime<Utc>,
    pub build: Build,
}
