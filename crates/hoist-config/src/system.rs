//! Server configuration.
//!
//! Read from a YAML file; secret envelopes in the raw text are decrypted
//! before the structure is parsed, so any string value may be encrypted.

use crate::{ConfigError, ConfigResult, SecretHelper};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use url::Url;

/// Worker count used when an integration doesn't set one.
pub const DEFAULT_MAX_WORKERS: usize = 5;

pub const DEFAULT_CONFIG_PATH: &str = "/configs/config.yaml";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub api_server: ApiServerConfig,
    pub integrations: IntegrationsConfig,
    pub database: DatabaseConfig,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiServerConfig {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(rename = "serviceURL")]
    pub service_url: String,
    #[serde(rename = "maxWorkers")]
    pub max_workers: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub github: Option<GithubConfig>,
    pub bitbucket: Option<BitbucketConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    #[serde(rename = "privateKeyPath")]
    pub private_key_path: String,
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(rename = "webhookSecret")]
    pub webhook_secret: String,
    #[serde(rename = "maxWorkers")]
    pub max_workers: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BitbucketConfig {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "appOAuthKey")]
    pub app_oauth_key: String,
    #[serde(rename = "appOAuthSecret")]
    pub app_oauth_secret: String,
    #[serde(rename = "maxWorkers")]
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub database_name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Disables TLS towards the database.
    pub insecure: bool,
    /// Directory holding `ca.crt` for verifying the server.
    pub certificate_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_name: "hoist".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            user: "hoist".to_string(),
            password: String::new(),
            insecure: false,
            certificate_dir: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// PostgreSQL connection URL for this configuration.
    pub fn connection_url(&self) -> ConfigResult<String> {
        let invalid = |message: String| ConfigError::InvalidValue {
            field: "database".to_string(),
            message,
        };

        let mut url = Url::parse(&format!("postgres://{}:{}", self.host, self.port))
            .map_err(|e| invalid(format!("bad host '{}': {}", self.host, e)))?;
        url.set_path(&self.database_name);
        url.set_username(&self.user)
            .map_err(|_| invalid("cannot set user".to_string()))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| invalid("cannot set password".to_string()))?;
        }

        {
            let mut query = url.query_pairs_mut();
            if self.insecure {
                query.append_pair("sslmode", "disable");
            } else if self.certificate_dir.is_empty() {
                query.append_pair("sslmode", "require");
            } else {
                let dir = self.certificate_dir.trim_end_matches('/');
                query.append_pair("sslmode", "verify-full");
                query.append_pair("sslrootcert", &format!("{}/ca.crt", dir));
            }
        }

        Ok(url.into())
    }
}

/// Which backend runs builder jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Kubernetes,
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobsConfig {
    pub scheduler: SchedulerKind,
    pub namespace: String,
    /// Builder image without tag; the manifest's track is the tag.
    pub builder_image: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default(),
            namespace: "hoist-builds".to_string(),
            builder_image: "hoist/builder".to_string(),
        }
    }
}

/// `configured`, or the default when it is zero.
pub fn effective_max_workers(configured: usize) -> usize {
    if configured == 0 {
        DEFAULT_MAX_WORKERS
    } else {
        configured
    }
}

/// Parse configuration text, decrypting envelopes first when a helper is given.
pub fn parse_server_config(
    text: &str,
    secrets: Option<&SecretHelper>,
) -> ConfigResult<ServerConfig> {
    let config: ServerConfig = match secrets {
        Some(helper) => serde_yaml::from_str(&helper.decrypt_all_envelopes(text))?,
        None => serde_yaml::from_str(text)?,
    };

    if let Some(github) = &config.integrations.github {
        if github.app_id.is_empty() {
            return Err(ConfigError::MissingField(
                "integrations.github.appID".to_string(),
            ));
        }
    }

    Ok(config)
}

/// Read and parse the configuration file at `path`.
pub fn load_server_config(
    path: impl AsRef<Path>,
    secrets: Option<&SecretHelper>,
) -> ConfigResult<ServerConfig> {
    let path = path.as_ref();
    info!(path = %path.display(), decrypt = secrets.is_some(), "Reading configuration");
    let text = std::fs::read_to_string(path)?;
    parse_server_config(&text, secrets)
}
