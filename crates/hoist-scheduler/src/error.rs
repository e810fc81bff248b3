//! Dispatcher errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is shutting down")]
    ShutDown,
}
