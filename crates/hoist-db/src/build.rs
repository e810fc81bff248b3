//! Build records and the per-repository autoincrement counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoist_core::GitProvider;
use hoist_core::build::{Build, InsertedBuild};
use hoist_core::provider::BuildStore;
use sqlx::PgPool;
use tracing::debug;

use crate::DbResult;

/// Columns of a `builds` row that don't map onto plain text.
#[derive(Debug, Clone, PartialEq)]
struct BuildColumns {
    build_status: String,
    labels: serde_json::Value,
    release_targets: serde_json::Value,
    commits: serde_json::Value,
}

impl BuildColumns {
    fn from_build(build: &Build) -> DbResult<Self> {
        Ok(Self {
            build_status: build.build_status.to_string(),
            labels: serde_json::to_value(&build.labels)?,
            release_targets: serde_json::to_value(&build.release_targets)?,
            commits: serde_json::to_value(&build.commits)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InsertedRow {
    id: i64,
    inserted_at: DateTime<Utc>,
}

/// PostgreSQL implementation of [`BuildStore`].
#[derive(Clone)]
pub struct PgBuildStore {
    pool: PgPool,
}

impl PgBuildStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Increment and return the counter for a repository, creating it at 1.
    pub async fn increment_counter(
        &self,
        repo_source: &str,
        repo_full_name: &str,
    ) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO build_versions (repo_source, repo_full_name, auto_increment, updated_at)
            VALUES ($1, $2, 1, NOW())
            ON CONFLICT (repo_source, repo_full_name)
            DO UPDATE SET auto_increment = build_versions.auto_increment + 1, updated_at = NOW()
            RETURNING auto_increment
            "#,
        )
        .bind(repo_source)
        .bind(repo_full_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }

    pub async fn insert(&self, build: &Build) -> DbResult<(i64, DateTime<Utc>)> {
        let columns = BuildColumns::from_build(build)?;
        let row = sqlx::query_as::<_, InsertedRow>(
            r#"
            INSERT INTO builds (
                repo_source, repo_owner, repo_name, repo_branch, repo_revision,
                build_version, build_status, labels, release_targets, manifest, commits,
                inserted_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            RETURNING id, inserted_at
            "#,
        )
        .bind(&build.repo_source)
        .bind(&build.repo_owner)
        .bind(&build.repo_name)
        .bind(&build.repo_branch)
        .bind(&build.repo_revision)
        .bind(&build.build_version)
        .bind(columns.build_status)
        .bind(columns.labels)
        .bind(columns.release_targets)
        .bind(&build.manifest)
        .bind(columns.commits)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.id, row.inserted_at))
    }
}

#[async_trait]
impl BuildStore for PgBuildStore {
    async fn next_auto_increment(
        &self,
        provider: GitProvider,
        repo_full_name: &str,
    ) -> hoist_core::Result<i64> {
        let value = self.increment_counter(provider.host(), repo_full_name).await?;
        debug!(repo = %repo_full_name, auto_increment = value, "Incremented build counter");
        Ok(value)
    }

    async fn insert_build(&self, build: Build) -> hoist_core::Result<InsertedBuild> {
        let (id, inserted_at) = self.insert(&build).await?;
        debug!(
            build_id = id,
            repo = %build.repo_full_name(),
            status = %build.build_status,
            "Inserted build"
        );
        Ok(InsertedBuild {
            id,
            inserted_at,
            build,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;
    use hoist_core::build::{BuildStatus, Label, ReleaseTarget};
    use hoist_core::event::{GitAuthor, GitCommit};
    use hoist_core::manifest::ReleaseAction;
    use serde_json::json;

    fn build() -> Build {
        Build {
            repo_source: "github.com".to_string(),
            repo_owner: "acme".to_string(),
            repo_name: "api".to_string(),
            repo_branch: "main".to_string(),
            repo_revision: "abc123".to_string(),
            build_version: "1.0.3".to_string(),
            build_status: BuildStatus::Running,
            labels: vec![Label {
                key: "team".to_string(),
                value: "infra".to_string(),
            }],
            release_targets: vec![ReleaseTarget {
                name: "production".to_string(),
                actions: vec![ReleaseAction {
                    name: "deploy-canary".to_string(),
                }],
            }],
            manifest: "labels:\n  team: infra\n".to_string(),
            commits: vec![GitCommit {
                author: GitAuthor {
                    name: "Jo".to_string(),
                    email: "jo@example.com".to_string(),
                    username: "jo".to_string(),
                },
                message: "fix".to_string(),
            }],
        }
    }

    #[test]
    fn test_build_columns() {
        let columns = BuildColumns::from_build(&build()).unwrap();
        assert_eq!(columns.build_status, "running");
        assert_eq!(columns.labels, json!([{"key": "team", "value": "infra"}]));
        assert_eq!(
            columns.release_targets,
            json!([{"name": "production", "actions": [{"name": "deploy-canary"}]}])
        );
        assert_eq!(columns.commits[0]["author"]["email"], "jo@example.com");
    }

    #[test]
    fn test_failed_build_columns() {
        let mut failed = build();
        failed.build_status = BuildStatus::Failed;
        failed.labels.clear();
        failed.release_targets.clear();

        let columns = BuildColumns::from_build(&failed).unwrap();
        assert_eq!(columns.build_status, "failed");
        assert_eq!(columns.labels, json!([]));
        assert_eq!(columns.release_targets, json!([]));
    }

    #[test]
    fn test_error_maps_to_persistence() {
        let err: hoist_core::Error = DbError::Database(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, hoist_core::Error::Persistence(_)));
    }
}
