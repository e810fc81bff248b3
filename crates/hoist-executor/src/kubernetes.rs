//! Kubernetes job scheduler.

use async_trait::async_trait;
use hoist_core::job::{BuildJobParams, JobHandle, JobScheduler};
use hoist_core::{Error, Result};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, PostParams};
use std::collections::BTreeMap;
use tracing::info;

use crate::CREATED_BY_LABEL;
use crate::env::{builder_environment, builder_image};

const BUILDER_CONTAINER: &str = "hoist-builder";

/// Creates one `batch/v1` Job per build.
pub struct KubernetesJobScheduler {
    client: Client,
    namespace: String,
    builder_image: String,
}

impl KubernetesJobScheduler {
    /// Connect using the in-cluster or kubeconfig defaults.
    pub async fn new(
        namespace: impl Into<String>,
        builder_image: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self::with_client(client, namespace, builder_image))
    }

    pub fn with_client(
        client: Client,
        namespace: impl Into<String>,
        builder_image: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            builder_image: builder_image.into(),
        }
    }
}

/// The Job object for a build.
pub fn build_job(params: &BuildJobParams, namespace: &str, image: &str) -> Result<Job> {
    let name = params.job_name();
    let labels = BTreeMap::from([
        (CREATED_BY_LABEL.0.to_string(), CREATED_BY_LABEL.1.to_string()),
        ("jobType".to_string(), params.job_kind.to_string()),
    ]);

    let env = builder_environment(params)?
        .into_iter()
        .map(|(name, value)| EnvVar {
            name,
            value: Some(value),
            ..Default::default()
        })
        .collect();

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: BUILDER_CONTAINER.to_string(),
                        image: Some(builder_image(image, &params.track)),
                        image_pull_policy: Some("Always".to_string()),
                        env: Some(env),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[async_trait]
impl JobScheduler for KubernetesJobScheduler {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn create_build_job(&self, params: BuildJobParams) -> Result<JobHandle> {
        let job = build_job(&params, &self.namespace, &self.builder_image)?;
        let api: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);

        let created = api
            .create(&PostParams::default(), &job)
            .await
            .map_err(|e| Error::Transport(format!("creating job: {}", e)))?;

        let id = created.metadata.name.unwrap_or_else(|| params.job_name());
        info!(
            job = %id,
            namespace = %self.namespace,
            build_id = params.build_id,
            "Created builder job"
        );

        Ok(JobHandle {
            id,
            scheduler: self.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::tests::params;

    #[test]
    fn test_build_job() {
        let job = build_job(&params(), "builds", "hoist/builder").unwrap();

        assert_eq!(job.metadata.name.as_deref(), Some("build-acme-api-012345"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("builds"));
        assert_eq!(
            job.metadata.labels.as_ref().unwrap().get("createdBy"),
            Some(&"hoist".to_string())
        );

        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.containers.len(), 1);

        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("hoist/builder:dev"));
        let env = container.env.as_ref().unwrap();
        let version = env.iter().find(|e| e.name == "HOIST_BUILD_VERSION").unwrap();
        assert_eq!(version.value.as_deref(), Some("1.4.42"));
        assert!(env.iter().any(|e| e.name == "HOIST_GITHUB_API_TOKEN"));
    }
}
