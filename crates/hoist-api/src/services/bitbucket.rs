//! Bitbucket OAuth consumer client.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hoist_config::system::BitbucketConfig;
use hoist_core::event::{CredentialContext, PushEvent};
use hoist_core::manifest::MANIFEST_FILE_NAME;
use hoist_core::provider::{AccessToken, CredentialProvider, ManifestSource};
use hoist_core::{Error, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{USER_AGENT, authenticated_url};

pub const BITBUCKET_TOKEN_URL: &str = "https://bitbucket.org/site/oauth2/access_token";
pub const BITBUCKET_API_URL: &str = "https://api.bitbucket.org/2.0";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Talks to Bitbucket with client-credentials tokens.
pub struct BitbucketClient {
    client: reqwest::Client,
    token_url: String,
    api_url: String,
    oauth_key: String,
    oauth_secret: String,
}

impl BitbucketClient {
    pub fn from_config(config: &BitbucketConfig) -> Self {
        Self::new(
            &config.app_oauth_key,
            &config.app_oauth_secret,
            BITBUCKET_TOKEN_URL,
            BITBUCKET_API_URL,
        )
    }

    pub fn new(oauth_key: &str, oauth_secret: &str, token_url: &str, api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            oauth_key: oauth_key.to_string(),
            oauth_secret: oauth_secret.to_string(),
        }
    }

    fn manifest_url(&self, event: &PushEvent) -> String {
        format!(
            "{}/repositories/{}/src/{}/{}",
            self.api_url,
            event.full_name(),
            event.revision,
            MANIFEST_FILE_NAME
        )
    }
}

#[async_trait]
impl CredentialProvider for BitbucketClient {
    async fn get_access_token(&self, _context: &CredentialContext) -> Result<AccessToken> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.oauth_key, Some(&self.oauth_secret))
            .header("User-Agent", USER_AGENT)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token request failed ({}): {}",
                status, text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("bad token response: {}", e)))?;
        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        debug!(?expires_at, "Got Bitbucket access token");

        Ok(AccessToken {
            token: token.access_token,
            expires_at,
        })
    }

    async fn get_authenticated_clone_url(
        &self,
        token: &AccessToken,
        plain_url: &str,
    ) -> Result<String> {
        authenticated_url(plain_url, "x-token-auth", &token.token)
    }
}

#[async_trait]
impl ManifestSource for BitbucketClient {
    async fn get_manifest_text(
        &self,
        token: &AccessToken,
        event: &PushEvent,
    ) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.manifest_url(event))
            .bearer_auth(&token.token)
            .header("User-Agent", USER_AGENT)
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
