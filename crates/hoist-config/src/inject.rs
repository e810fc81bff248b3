//! Bootstrap steps prepended to every resolved manifest.

use hoist_core::manifest::{Manifest, Step};
use hoist_core::provider::ManifestAugmenter;
use hoist_core::{Error, GitProvider, Result};

pub const GIT_CLONE_STEP: &str = "git-clone";

const DEFAULT_EXTENSION_REPOSITORY: &str = "hoist";

/// Injects a provider-specific `git-clone` step ahead of the user's steps.
#[derive(Debug, Clone)]
pub struct BootstrapSteps {
    repository: String,
}

impl Default for BootstrapSteps {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION_REPOSITORY)
    }
}

impl BootstrapSteps {
    /// `repository` is the image repository holding the clone extensions.
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }

    fn clone_image(&self, provider: GitProvider, track: &str) -> Result<String> {
        match provider {
            GitProvider::Github | GitProvider::Bitbucket => Ok(format!(
                "{}/git-clone-{}:{}",
                self.repository, provider, track
            )),
            GitProvider::Gitlab => Err(Error::InvalidInput(format!(
                "no clone extension for {}",
                provider
            ))),
        }
    }
}

impl ManifestAugmenter for BootstrapSteps {
    fn inject_bootstrap_steps(
        &self,
        mut manifest: Manifest,
        track: &str,
        provider: GitProvider,
    ) -> Result<Manifest> {
        let image = self.clone_image(provider, track)?;

        if manifest.pipelines.iter().any(|s| s.name == GIT_CLONE_STEP) {
            return Ok(manifest);
        }

        manifest.pipelines.insert(0, Step::new(GIT_CLONE_STEP, image));
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_manifest;

    fn manifest() -> Manifest {
        parse_manifest("pipelines:\n  build:\n    image: alpine\n").unwrap()
    }

    #[test]
    fn test_prepends_git_clone() {
        let injected = BootstrapSteps::default()
            .inject_bootstrap_steps(manifest(), "stable", GitProvider::Github)
            .unwrap();

        assert_eq!(injected.pipelines.len(), 2);
        assert_eq!(injected.pipelines[0].name, "git-clone");
        assert_eq!(
            injected.pipelines[0].container_image,
            "hoist/git-clone-github:stable"
        );
        assert_eq!(injected.pipelines[0].shell, "/bin/sh");
        assert_eq!(injected.pipelines[1].name, "build");
    }

    #[test]
    fn test_uses_track_and_repository() {
        let injected = BootstrapSteps::new("registry.local/ci")
            .inject_bootstrap_steps(manifest(), "dev", GitProvider::Bitbucket)
            .unwrap();
        assert_eq!(
            injected.pipelines[0].container_image,
            "registry.local/ci/git-clone-bitbucket:dev"
        );
    }

    #[test]
    fn test_existing_git_clone_is_kept() {
        let text = "pipelines:\n  git-clone:\n    image: custom/clone\n  build:\n    image: alpine\n";
        let injected = BootstrapSteps::default()
            .inject_bootstrap_steps(parse_manifest(text).unwrap(), "stable", GitProvider::Github)
            .unwrap();

        assert_eq!(injected.pipelines.len(), 2);
        assert_eq!(injected.pipelines[0].container_image, "custom/clone");
    }

    #[test]
    fn test_gitlab_is_unsupported() {
        let err = BootstrapSteps::default()
            .inject_bootstrap_steps(manifest(), "stable", GitProvider::Gitlab)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
