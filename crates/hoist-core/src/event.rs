//! Provider-agnostic push events.
//!
//! Each provider front end converts its own webhook payload into a
//! [`PushEvent`]; everything downstream only ever sees this shape.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Git provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    Github,
    Gitlab,
    Bitbucket,
}

impl GitProvider {
    /// Host name used as the build's repository source.
    pub fn host(&self) -> &'static str {
        match self {
            GitProvider::Github => "github.com",
            GitProvider::Gitlab => "gitlab.com",
            GitProvider::Bitbucket => "bitbucket.org",
        }
    }

    /// Environment variable under which the builder job receives the
    /// provider's short-lived API token.
    pub fn token_env_var(&self) -> &'static str {
        match self {
            GitProvider::Github => "HOIST_GITHUB_API_TOKEN",
            GitProvider::Gitlab => "HOIST_GITLAB_API_TOKEN",
            GitProvider::Bitbucket => "HOIST_BITBUCKET_API_TOKEN",
        }
    }
}

impl std::fmt::Display for GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitProvider::Github => write!(f, "github"),
            GitProvider::Gitlab => write!(f, "gitlab"),
            GitProvider::Bitbucket => write!(f, "bitbucket"),
        }
    }
}

impl std::str::FromStr for GitProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(GitProvider::Github),
            "gitlab" => Ok(GitProvider::Gitlab),
            "bitbucket" => Ok(GitProvider::Bitbucket),
            _ => Err(format!("Unknown git provider: {}", s)),
        }
    }
}

/// Coordinates of the repository a push landed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Source host, e.g. `github.com`.
    pub source: String,
    pub owner: String,
    pub name: String,
    /// Browser URL of the repository; the clone URL is derived from it.
    pub html_url: String,
}

impl RepositoryRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// What kind of ref the push updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Branch,
    Tag,
    /// Deletions and anything the provider reports that we don't recognise.
    Other,
}

/// Author of a pushed commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitAuthor {
    pub name: String,
    pub email: String,
    pub username: String,
}

/// A commit included in a push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCommit {
    pub author: GitAuthor,
    pub message: String,
}

/// Whatever the credential provider needs to mint a token for this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialContext {
    /// GitHub App installation that delivered the webhook.
    GithubInstallation { installation_id: i64 },
    /// Bitbucket OAuth consumer configured for the whole server.
    BitbucketOAuth,
    None,
}

/// A push notification, independent of the provider that sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub provider: GitProvider,
    pub repository: RepositoryRef,
    /// Kind of the updated ref.
    pub ref_kind: RefKind,
    /// Branch or tag name without the `refs/heads/` style prefix.
    pub ref_name: String,
    /// Head revision after the push; empty for deletions.
    pub revision: String,
    /// Commits in the order the provider listed them.
    pub commits: Vec<GitCommit>,
    pub credentials: CredentialContext,
}

impl PushEvent {
    pub fn full_name(&self) -> String {
        self.repository.full_name()
    }

    pub fn branch(&self) -> &str {
        &self.ref_name
    }

    /// Only branch pushes with a head revision produce a build.
    pub fn validate(&self) -> Result<()> {
        if self.ref_kind != RefKind::Branch {
            return Err(Error::Validation(format!(
                "{:?} change to '{}' is not a branch push",
                self.ref_kind, self.ref_name
            )));
        }
        if self.revision.is_empty() {
            return Err(Error::Validation(format!(
                "push to branch '{}' has no head revision",
                self.ref_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: RefKind, revision: &str) -> PushEvent {
        PushEvent {
            provider: GitProvider::Github,
            repository: RepositoryRef {
                source: "github.com".to_string(),
                owner: "acme".to_string(),
                name: "widgets".to_string(),
                html_url: "https://github.com/acme/widgets".to_string(),
            },
            ref_kind: kind,
            ref_name: "main".to_string(),
            revision: revision.to_string(),
            commits: vec![],
            credentials: CredentialContext::None,
        }
    }

    #[test]
    fn test_branch_push_is_valid() {
        assert!(event(RefKind::Branch, "abc123").validate().is_ok());
    }

    #[test]
    fn test_tag_push_is_rejected() {
        let err = event(RefKind::Tag, "abc123").validate().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_missing_revision_is_rejected() {
        let err = event(RefKind::Branch, "").validate().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_full_name() {
        assert_eq!(event(RefKind::Branch, "a").full_name(), "acme/widgets");
    }

    #[test]
    fn test_provider_round_trip() {
        assert_eq!("GitHub".parse::<GitProvider>().unwrap(), GitProvider::Github);
        assert_eq!(GitProvider::Bitbucket.to_string(), "bitbucket");
        assert!("svn".parse::<GitProvider>().is_err());
    }
}
