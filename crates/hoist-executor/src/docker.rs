//! Local Docker job scheduler, for development.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
use bollard::image::CreateImageOptions;
use futures::StreamExt;
use hoist_core::job::{BuildJobParams, JobHandle, JobScheduler};
use hoist_core::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::CREATED_BY_LABEL;
use crate::env::{builder_environment, builder_image};

/// Runs each build as a detached container on the local Docker daemon.
pub struct DockerJobScheduler {
    docker: Docker,
    builder_image: String,
}

impl DockerJobScheduler {
    /// Connect to the local Docker daemon.
    pub fn new(builder_image: impl Into<String>) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self::with_client(docker, builder_image))
    }

    pub fn with_client(docker: Docker, builder_image: impl Into<String>) -> Self {
        Self {
            docker,
            builder_image: builder_image.into(),
        }
    }

    async fn pull(&self, image: &str) {
        info!(image = %image, "Pulling builder image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(result) = progress.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    // A locally built image is still usable.
                    warn!(image = %image, error = %e, "Pull failed");
                    break;
                }
            }
        }
    }
}

/// Container configuration for a build.
pub fn container_config(params: &BuildJobParams, image: &str) -> Result<Config<String>> {
    let env = builder_environment(params)?
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let labels = HashMap::from([
        (CREATED_BY_LABEL.0.to_string(), CREATED_BY_LABEL.1.to_string()),
        ("jobType".to_string(), params.job_kind.to_string()),
    ]);

    Ok(Config {
        image: Some(builder_image(image, &params.track)),
        env: Some(env),
        labels: Some(labels),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        ..Default::default()
    })
}

#[async_trait]
impl JobScheduler for DockerJobScheduler {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn create_build_job(&self, params: BuildJobParams) -> Result<JobHandle> {
        let name = params.job_name();
        let config = container_config(&params, &self.builder_image)?;
        if let Some(image) = &config.image {
            self.pull(image).await;
        }

        info!(container = %name, "Creating container");
        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };
        let container = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| Error::Transport(format!("creating container: {}", e)))?;

        info!(
            container = %name,
            id = %container.id,
            build_id = params.build_id,
            "Starting container"
        );
        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Transport(format!("starting container: {}", e)))?;

        Ok(JobHandle {
            id: container.id,
            scheduler: self.name().to_string(),
        })
    }
}
