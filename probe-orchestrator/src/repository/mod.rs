//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles database operations for a specific domain entity.

pub mod definition;
pub mod report;
pub mod task;

// Re-export for convenience
pub use definition as definition_repository;
pub use report as report_repository;
pub use task as task_repository;
