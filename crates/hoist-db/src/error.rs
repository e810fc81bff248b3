//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for hoist_core::Error {
    fn from(e: DbError) -> Self {
        hoist_core::Error::Persistence(e.to_string())
    }
}
