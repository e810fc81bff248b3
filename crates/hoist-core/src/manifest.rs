//! The resolved build manifest.
//!
//! These are the typed, defaulted values produced by the manifest resolver
//! in `hoist-config`. Parsing and defaulting rules live there; this module
//! only holds the shapes and the default constants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the manifest file at the repository root.
pub const MANIFEST_FILE_NAME: &str = ".hoist.yaml";

pub const DEFAULT_TRACK: &str = "stable";
pub const DEFAULT_CUSTOM_LABEL_TEMPLATE: &str = "{{revision}}";
pub const DEFAULT_SEMVER_PATCH: &str = "{{auto}}";
pub const DEFAULT_SEMVER_LABEL_TEMPLATE: &str = "{{branch}}";
pub const DEFAULT_RELEASE_BRANCH: &str = "master";
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_WORKING_DIRECTORY: &str = "/estafette-work";
pub const DEFAULT_WHEN: &str = "status == 'succeeded'";

/// A build definition after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub builder: Builder,
    pub version: VersionStrategy,
    /// Free-form labels copied onto the build record.
    pub labels: BTreeMap<String, String>,
    /// Steps in the order they were declared.
    pub pipelines: Vec<Step>,
    /// Release targets in the order they were declared.
    pub releases: Vec<Release>,
}

/// Selects the builder image variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Builder {
    pub track: String,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            track: DEFAULT_TRACK.to_string(),
        }
    }
}

/// How the version string of a build is derived.
///
/// Exactly one strategy exists after defaulting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStrategy {
    Custom(CustomVersion),
    Semver(SemverVersion),
}

impl Default for VersionStrategy {
    fn default() -> Self {
        VersionStrategy::Custom(CustomVersion::default())
    }
}

/// Version is the evaluated label template, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomVersion {
    pub label_template: String,
}

impl Default for CustomVersion {
    fn default() -> Self {
        Self {
            label_template: DEFAULT_CUSTOM_LABEL_TEMPLATE.to_string(),
        }
    }
}

/// `major.minor.patch[-label]`, with the label omitted on the release branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemverVersion {
    pub major: i64,
    pub minor: i64,
    pub patch: String,
    pub label_template: String,
    pub release_branch: String,
}

impl Default for SemverVersion {
    fn default() -> Self {
        Self {
            major: 0,
            minor: 0,
            patch: DEFAULT_SEMVER_PATCH.to_string(),
            label_template: DEFAULT_SEMVER_LABEL_TEMPLATE.to_string(),
            release_branch: DEFAULT_RELEASE_BRANCH.to_string(),
        }
    }
}

/// Inputs available to version templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionParams {
    pub auto_increment: i64,
    pub branch: String,
    pub revision: String,
}

/// A named pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub name: String,
    pub container_image: String,
    pub shell: String,
    pub working_directory: String,
    pub commands: Vec<String>,
    /// Guard expression, evaluated by the builder.
    pub when: String,
    pub env_vars: BTreeMap<String, String>,
    /// Keys the step schema doesn't know about, kept verbatim.
    pub custom_properties: BTreeMap<String, serde_yaml::Value>,
}

impl Step {
    /// A step with only a name and image; everything else defaulted.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container_image: image.into(),
            shell: DEFAULT_SHELL.to_string(),
            working_directory: DEFAULT_WORKING_DIRECTORY.to_string(),
            commands: Vec::new(),
            when: DEFAULT_WHEN.to_string(),
            env_vars: BTreeMap::new(),
            custom_properties: BTreeMap::new(),
        }
    }
}

/// A named deployable destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub actions: Vec<ReleaseAction>,
}

/// An action that may be taken when releasing to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAction {
    pub name: String,
}
