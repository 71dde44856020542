//! Probe Runner
//!
//! The asynchronous test-execution core: a bounded job queue feeding a pool of
//! workers that run API, UI and load-test jobs out of band from the request path.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Stores: State store (task registry), definition store, report store
//! - Services: Progress reporting, report writing, job execution dispatch
//! - Adapters: One per job kind, each returning a normalized outcome
//! - Scheduler: Submission, bounded queue, worker pool and lifecycle tracking

pub mod adapters;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod store;

pub use config::RunnerConfig;
pub use error::{CancelError, StoreError, SubmitError};
pub use scheduler::Scheduler;
