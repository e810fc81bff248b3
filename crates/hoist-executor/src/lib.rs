//! Job scheduling backends for hoist.
//!
//! Provides scheduler implementations that start one builder job per build:
//! - Kubernetes (production)
//! - Local Docker (development)

pub mod docker;
pub mod env;
pub mod kubernetes;

pub use docker::DockerJobScheduler;
pub use kubernetes::KubernetesJobScheduler;

pub use hoist_core::job::{BuildJobParams, JobHandle, JobKind, JobScheduler};

/// Label put on every job and container created by hoist.
pub const CREATED_BY_LABEL: (&str, &str) = ("createdBy", "hoist");
