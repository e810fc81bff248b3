//! Per-event build orchestration.
//!
//! For one push event:
//! 1. validate the event
//! 2. get an access token
//! 3. fetch the manifest (none means nothing to build)
//! 4. resolve the manifest; an invalid one still records a failed build
//! 5. inject bootstrap steps
//! 6. resolve the clone URL and the autoincrement counter
//! 7. persist the build
//! 8. create the builder job
//!
//! Nothing is retried. Any failure ends processing of that event only.

use async_trait::async_trait;
use hoist_config::{parse_manifest, try_version, version};
use hoist_core::build::{
    Build, BuildStatus, labels_from_manifest, release_targets_from_manifest,
};
use hoist_core::job::{BuildJobParams, JobHandle, JobKind, JobScheduler};
use hoist_core::manifest::{DEFAULT_TRACK, Manifest, VersionParams};
use hoist_core::provider::{
    AccessToken, BuildStore, CredentialProvider, ManifestAugmenter, ManifestSource,
};
use hoist_core::{Error, PushEvent, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::EventHandler;

/// How processing of an event ended, when it didn't fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The repository has no manifest at the pushed revision.
    NoManifest,
    /// A build was persisted; `job` is set when a job was created.
    Recorded {
        build_id: i64,
        status: BuildStatus,
        job: Option<JobHandle>,
    },
}

/// Runs the build pipeline for push events.
pub struct BuildOrchestrator {
    credentials: Arc<dyn CredentialProvider>,
    source: Arc<dyn ManifestSource>,
    augmenter: Arc<dyn ManifestAugmenter>,
    store: Arc<dyn BuildStore>,
    scheduler: Arc<dyn JobScheduler>,
}

impl BuildOrchestrator {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        source: Arc<dyn ManifestSource>,
        augmenter: Arc<dyn ManifestAugmenter>,
        store: Arc<dyn BuildStore>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        Self {
            credentials,
            source,
            augmenter,
            store,
            scheduler,
        }
    }

    /// Process a single push event.
    pub async fn run(&self, event: &PushEvent) -> Result<BuildOutcome> {
        let span = info_span!(
            "build",
            provider = %event.provider,
            repo = %event.full_name(),
            branch = %event.branch(),
            revision = %event.revision,
        );
        self.process(event).instrument(span).await
    }

    async fn process(&self, event: &PushEvent) -> Result<BuildOutcome> {
        event.validate()?;

        let token = self.credentials.get_access_token(&event.credentials).await?;

        let Some(text) = self.source.get_manifest_text(&token, event).await? else {
            info!("No manifest found, skipping build");
            return Ok(BuildOutcome::NoManifest);
        };

        let manifest = match resolve_manifest(&text) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(error = %e, "Invalid manifest, recording failed build");
                None
            }
        };
        let track = manifest
            .as_ref()
            .map(|m| m.builder.track.clone())
            .unwrap_or_else(|| DEFAULT_TRACK.to_string());

        let manifest = match manifest {
            Some(manifest) => Some(self.augmenter.inject_bootstrap_steps(
                manifest,
                &track,
                event.provider,
            )?),
            None => None,
        };

        let clone_url = self
            .credentials
            .get_authenticated_clone_url(&token, &event.repository.html_url)
            .await?;

        let auto_increment = match self
            .store
            .next_auto_increment(event.provider, &event.full_name())
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to get autoincrement, using 0");
                0
            }
        };

        let Some(manifest) = manifest else {
            let inserted = self
                .store
                .insert_build(failed_build(event, text))
                .await?;
            info!(build_id = inserted.id, "Recorded failed build");
            return Ok(BuildOutcome::Recorded {
                build_id: inserted.id,
                status: BuildStatus::Failed,
                job: None,
            });
        };

        let params = VersionParams {
            auto_increment,
            branch: event.branch().to_string(),
            revision: event.revision.clone(),
        };
        if let Err(e) = try_version(&manifest.version, &params) {
            warn!(error = %e, "Version template failed, using the error text as version");
        }
        let build_version = version(&manifest.version, &params);

        let inserted = self
            .store
            .insert_build(running_build(event, text, &manifest, &build_version))
            .await?;
        info!(build_id = inserted.id, version = %build_version, "Recorded build");

        let job_params = BuildJobParams {
            job_kind: JobKind::Build,
            repo_source: event.repository.source.clone(),
            repo_owner: event.repository.owner.clone(),
            repo_name: event.repository.name.clone(),
            repo_url: clone_url,
            repo_branch: event.branch().to_string(),
            repo_revision: event.revision.clone(),
            environment: job_environment(event, &token),
            track,
            auto_increment,
            version: build_version,
            manifest,
            build_id: inserted.id,
        };

        let job = self.scheduler.create_build_job(job_params).await?;
        info!(job = %job.id, scheduler = %job.scheduler, "Created build job");

        Ok(BuildOutcome::Recorded {
            build_id: inserted.id,
            status: BuildStatus::Running,
            job: Some(job),
        })
    }
}

fn resolve_manifest(text: &str) -> Result<Manifest> {
    parse_manifest(text).map_err(|e| Error::Manifest(e.to_string()))
}

fn running_build(event: &PushEvent, text: String, manifest: &Manifest, version: &str) -> Build {
    Build {
        build_version: version.to_string(),
        build_status: BuildStatus::Running,
        labels: labels_from_manifest(manifest),
        release_targets: release_targets_from_manifest(manifest),
        commits: event.commits.clone(),
        ..failed_build(event, text)
    }
}

fn failed_build(event: &PushEvent, text: String) -> Build {
    Build {
        repo_source: event.repository.source.clone(),
        repo_owner: event.repository.owner.clone(),
        repo_name: event.repository.name.clone(),
        repo_branch: event.branch().to_string(),
        repo_revision: event.revision.clone(),
        build_version: String::new(),
        build_status: BuildStatus::Failed,
        labels: Vec::new(),
        release_targets: Vec::new(),
        manifest: text,
        commits: Vec::new(),
    }
}

fn job_environment(event: &PushEvent, token: &AccessToken) -> BTreeMap<String, String> {
    BTreeMap::from([(
        event.provider.token_env_var().to_string(),
        token.token.clone(),
    )])
}

#[async_trait]
impl EventHandler for BuildOrchestrator {
    async fn handle(&self, event: PushEvent) {
        match self.run(&event).await {
            Ok(outcome) => debug!(repo = %event.full_name(), ?outcome, "Processed push event"),
            Err(e) if e.is_validation() => {
                debug!(repo = %event.full_name(), reason = %e, "Skipping push event");
            }
            Err(e) => error!(
                provider = %event.provider,
                repo = %event.full_name(),
                branch = %event.branch(),
                revision = %event.revision,
                error = %e,
                "Failed processing push event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::GitProvider;
    use hoist_core::event::{CredentialContext, GitCommit, RefKind, RepositoryRef};

    fn event() -> PushEvent {
        PushEvent {
            provider: GitProvider::Bitbucket,
            repository: RepositoryRef {
                source: "bitbucket.org".to_string(),
                owner: "acme".to_string(),
                name: "web".to_string(),
                html_url: "https://bitbucket.org/acme/web".to_string(),
            },
            ref_kind: RefKind::Branch,
            ref_name: "develop".to_string(),
            revision: "f00ba4".to_string(),
            commits: vec![GitCommit::default()],
            credentials: CredentialContext::BitbucketOAuth,
        }
    }

    #[test]
    fn test_invalid_manifest_is_a_manifest_error() {
        let err = resolve_manifest("pipelines: [this is: not valid").unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
        assert!(err.to_string().starts_with("invalid manifest: "));
        assert!(resolve_manifest("builder:\n  track: dev\n").is_ok());
    }

    #[test]
    fn test_failed_build_has_no_metadata() {
        let build = failed_build(&event(), "not: [valid".to_string());
        assert_eq!(build.build_status, BuildStatus::Failed);
        assert_eq!(build.build_version, "");
        assert!(build.labels.is_empty());
        assert!(build.release_targets.is_empty());
        assert!(build.commits.is_empty());
        assert_eq!(build.manifest, "not: [valid");
        assert_eq!(build.repo_source, "bitbucket.org");
    }

    #[test]
    fn test_running_build_carries_manifest_metadata() {
        let manifest = parse_manifest("labels:\n  app: web\nreleases:\n  prod:\n").unwrap();
        let build = running_build(&event(), String::new(), &manifest, "1.0.0");
        assert_eq!(build.build_status, BuildStatus::Running);
        assert_eq!(build.build_version, "1.0.0");
        assert_eq!(build.labels.len(), 1);
        assert_eq!(build.release_targets[0].name, "prod");
        assert_eq!(build.commits.len(), 1);
    }

    #[test]
    fn test_job_environment_uses_provider_variable() {
        let env = job_environment(&event(), &AccessToken::new("secret"));
        assert_eq!(
            env.get("HOIST_BITBUCKET_API_TOKEN").map(String::as_str),
            Some("secret")
        );
    }
}
