//! Event dispatch and build orchestration for hoist.
//!
//! Push events from the provider front ends are handed to a bounded pool
//! of workers; each worker runs the build orchestrator for one event at a
//! time.

pub mod dispatcher;
pub mod error;
pub mod orchestrator;

pub use dispatcher::{Dispatcher, EventHandler};
pub use error::DispatchError;
pub use orchestrator::{BuildOrchestrator, BuildOutcome};
