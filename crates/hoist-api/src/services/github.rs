//! GitHub App client: installation tokens and manifest retrieval.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoist_config::system::GithubConfig;
use hoist_core::event::{CredentialContext, PushEvent};
use hoist_core::manifest::MANIFEST_FILE_NAME;
use hoist_core::provider::{AccessToken, CredentialProvider, ManifestSource};
use hoist_core::{Error, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{USER_AGENT, authenticated_url};

pub const GITHUB_API_URL: &str = "https://api.github.com";

/// App JWTs may live at most ten minutes; stay under that with clock drift.
const JWT_LIFETIME_SECS: i64 = 9 * 60;
const JWT_BACKDATE_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Talks to the GitHub API as a GitHub App.
pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
    app_id: String,
    key: EncodingKey,
}

impl GithubClient {
    /// Build a client from config, reading the app's private key from disk.
    pub fn from_config(config: &GithubConfig) -> Result<Self> {
        let pem = std::fs::read(&config.private_key_path).map_err(|e| {
            Error::Auth(format!(
                "cannot read private key '{}': {}",
                config.private_key_path, e
            ))
        })?;
        Self::new(&config.app_id, &pem, GITHUB_API_URL)
    }

    pub fn new(app_id: &str, private_key_pem: &[u8], api_url: &str) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| Error::Auth(format!("invalid GitHub App private key: {}", e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            key,
        })
    }

    fn app_jwt(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            iat: now - JWT_BACKDATE_SECS,
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.clone(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| Error::Auth(format!("cannot sign app token: {}", e)))
    }

    async fn installation_token(&self, installation_id: i64) -> Result<AccessToken> {
        let jwt = self.app_jwt()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token request for installation {} failed ({}): {}",
                installation_id, status, text
            )));
        }

        let token: InstallationToken = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("bad token response: {}", e)))?;
        debug!(installation_id, expires_at = ?token.expires_at, "Got installation token");

        Ok(AccessToken {
            token: token.token,
            expires_at: token.expires_at,
        })
    }
}

#[async_trait]
impl CredentialProvider for GithubClient {
    async fn get_access_token(&self, context: &CredentialContext) -> Result<AccessToken> {
        match context {
            CredentialContext::GithubInstallation { installation_id } => {
                self.installation_token(*installation_id).await
            }
            other => Err(Error::Auth(format!(
                "GitHub needs an installation, got {:?}",
                other
            ))),
        }
    }

    async fn get_authenticated_clone_url(
        &self,
        token: &AccessToken,
        plain_url: &str,
    ) -> Result<String> {
        authenticated_url(plain_url, "x-access-token", &token.token)
    }
}

#[async_trait]
impl ManifestSource for GithubClient {
    async fn get_manifest_text(
        &self,
        token: &AccessToken,
        event: &PushEvent,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            event.full_name(),
            MANIFEST_FILE_NAME
        );

        let response = self
            .client
            .get(&url)
            .query(&[("ref", event.revision.as_str())])
            .header("Authorization", format!("Bearer {}", token.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github.raw")
            .send()
            .await
            .map_err(|e| Error::Transport(format!("manifest request failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .text()
                .await
                .map(Some)
                .map_err(|e| Error::Transport(format!("reading manifest failed: {}", e))),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::Transport(format!(
                    "manifest request failed ({}): {}",
                    status, text
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_private_key() {
        let result = GithubClient::new("1234", b"not a key", GITHUB_API_URL);
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[test]
    fn test_missing_private_key_file() {
        let config = GithubConfig {
            private_key_path: "/nonexistent/hoist/key.pem".to_string(),
            app_id: "1234".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            GithubClient::from_config(&config),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn test_token_response_parses_expiry() {
        let token: InstallationToken = serde_json::from_str(
            r#"{"token": "ghs_abc", "expires_at": "2026-07-11T22:14:10Z"}"#,
        )
        .unwrap();
        assert_eq!(token.token, "ghs_abc");
        assert!(token.expires_at.is_some());
    }
}
