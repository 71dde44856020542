//! Store layer
//!
//! Stores persist the three kinds of data the runner touches:
//! - Task state records (the registry of every submitted job)
//! - Test definitions (read-only, owned by the application)
//! - Test reports (one per execution attempt)
//!
//! All stores are trait-based so the orchestrator can plug in its database
//! backend while tests and single-node deployments use the in-memory ones.

mod definition;
mod report;
mod state;

// Re-export traits
pub use definition::DefinitionStore;
pub use report::ReportStore;
pub use state::StateStore;

// Re-export implementations
pub use definition::{DefinitionSeed, InMemoryDefinitionStore, SuiteSeed};
pub use report::InMemoryReportStore;
pub use state::InMemoryStateStore;
