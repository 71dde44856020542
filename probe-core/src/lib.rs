//! Probe Core
//!
//! Core types and abstractions for the Probe test-execution service.
//!
//! This crate contains:
//! - Domain types: Core business entities (job handles, definitions, outcomes, reports)
//! - DTOs: Data transfer objects for the submission and status APIs

pub mod domain;
pub mod dto;
