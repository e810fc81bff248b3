//! Core domain types and traits for the hoist CI orchestrator.
//!
//! This crate contains:
//! - Provider-agnostic push events
//! - The resolved build manifest
//! - Build records and job parameters
//! - Collaborator traits (credentials, manifest transport, persistence, job scheduling)

pub mod build;
pub mod error;
pub mod event;
pub mod job;
pub mod manifest;
pub mod provider;

pub use error::{Error, Result};
pub use event::{GitProvider, PushEvent};
