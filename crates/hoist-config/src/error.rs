//! Configuration parsing errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors from encrypting or decrypting secrets.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("malformed secret: {0}")]
    Format(String),
}

/// Errors from evaluating version templates.
///
/// The display text doubles as the fallback "version" when templates fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template: version: unclosed action")]
    UnclosedAction,

    #[error("template: version: missing value for command")]
    EmptyAction,

    #[error("template: version: function \"{0}\" not defined")]
    UnknownFunction(String),

    #[error("template: version: wrong number of args for {name}: want 0 got {got}")]
    UnexpectedArguments { name: String, got: usize },
}
