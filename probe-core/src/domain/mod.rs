//! Core domain types
//!
//! This module contains the core domain structures used across Probe services.
//! These types are shared between the orchestrator (submission, status, persistence)
//! and the runner (scheduling and execution).

pub mod definition;
pub mod job;
pub mod outcome;
pub mod progress;
pub mod report;
pub mod task;
