//! Configuration handling for hoist.
//!
//! This crate handles:
//! - Build manifests (`.hoist.yaml`) and version templates
//! - Secret envelopes embedded in configuration text
//! - Bootstrap steps injected into resolved manifests
//! - Server configuration

pub mod error;
pub mod inject;
pub mod manifest;
pub mod secret;
pub mod system;
pub mod version;

pub use error::{ConfigError, ConfigResult, SecretError, TemplateError};
pub use inject::BootstrapSteps;
pub use manifest::parse_manifest;
pub use secret::SecretHelper;
pub use system::{SchedulerKind, ServerConfig, effective_max_workers, load_server_config};
pub use version::{try_version, version};
