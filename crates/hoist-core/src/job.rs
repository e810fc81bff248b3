//! Job scheduler trait and build job parameters.
//!
//! A job scheduler turns fully-resolved [`BuildJobParams`] into a single
//! containerized builder job on some cluster.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;
use crate::manifest::Manifest;

/// Maximum length of the repository part of a job name.
const JOB_NAME_REPO_LIMIT: usize = 50;

/// Number of revision characters in a job name.
const JOB_NAME_REVISION_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    #[display("build")]
    Build,
}

/// Everything the builder needs to run one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJobParams {
    pub job_kind: JobKind,
    pub repo_source: String,
    pub repo_owner: String,
    pub repo_name: String,
    /// Clone URL with credentials embedded.
    pub repo_url: String,
    pub repo_branch: String,
    pub repo_revision: String,
    /// Extra environment for the builder, including the provider API token.
    pub environment: BTreeMap<String, String>,
    pub track: String,
    pub auto_increment: i64,
    pub version: String,
    pub manifest: Manifest,
    pub build_id: i64,
}

impl BuildJobParams {
    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }

    /// Cluster-safe job name: `build-<repo>-<revision prefix>`, at most 63 chars.
    pub fn job_name(&self) -> String {
        let mut repo = String::new();
        let mut in_separator = false;
        for c in self.repo_full_name().chars() {
            if c.is_ascii_alphanumeric() {
                repo.push(c);
                in_separator = false;
            } else if !in_separator {
                repo.push('-');
                in_separator = true;
            }
        }
        repo.truncate(JOB_NAME_REPO_LIMIT);

        let revision: String = self
            .repo_revision
            .chars()
            .take(JOB_NAME_REVISION_LENGTH)
            .collect();

        format!("{}-{}-{}", self.job_kind, repo, revision).to_lowercase()
    }
}

/// Handle to a created job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Scheduler-specific identifier (job name, container id, ...).
    pub id: String,
    /// Name of the scheduler that created the job.
    pub scheduler: String,
}

/// Trait for job scheduling backends.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Name of this scheduler.
    fn name(&self) -> &'static str;

    /// Create the builder job. Not retried by the caller.
    async fn create_build_job(&self, params: BuildJobParams) -> Result<JobHandle>;
}
