//! `hoist manifest` commands.

use anyhow::{Context, Result};
use hoist_config::{parse_manifest, try_version};
use hoist_core::manifest::{Manifest, VersionParams};
use tracing::debug;

fn load(path: &str) -> Result<Manifest> {
    debug!(path, "Reading manifest");
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    resolve(&text).with_context(|| format!("resolving {}", path))
}

fn resolve(text: &str) -> Result<Manifest> {
    Ok(parse_manifest(text)?)
}

/// Resolve the manifest at `path` and render it as YAML.
pub fn validate(path: &str) -> Result<String> {
    render(&load(path)?)
}

fn render(manifest: &Manifest) -> Result<String> {
    Ok(serde_yaml::to_string(manifest)?)
}

/// Version the manifest at `path` would produce for a build.
pub fn version(
    path: &str,
    branch: String,
    revision: String,
    auto_increment: i64,
) -> Result<String> {
    let manifest = load(path)?;
    compute_version(&manifest, branch, revision, auto_increment)
}

fn compute_version(
    manifest: &Manifest,
    branch: String,
    revision: String,
    auto_increment: i64,
) -> Result<String> {
    let params = VersionParams {
        auto_increment,
        branch,
        revision,
    };
    try_version(&manifest.version, &params).context("rendering version template")
}
