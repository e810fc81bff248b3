//! Error types for hoist.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The event is not something we build (tag push, branch deletion, ...).
    #[error("not a buildable event: {0}")]
    Validation(String),

    #[error("credential acquisition failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Validation failures are expected traffic and never logged as failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
