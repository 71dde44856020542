//! Data Transfer Objects for the HTTP API
//!
//! DTOs exchanged between the orchestrator and its clients (CLI, UI).

pub mod report;
pub mod task;
