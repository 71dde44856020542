//! Execution adapters
//!
//! One adapter per job kind. Every adapter takes a fully resolved definition
//! and returns an `ExecutionOutcome`; failures of the system under test, of the
//! network or of external tools are folded into the outcome instead of being
//! raised.

pub mod api;
pub mod jtl;
pub mod performance;
pub mod process;
pub mod suite;
pub mod ui;

pub use api::ApiCaseAdapter;
pub use performance::PerformanceAdapter;
pub use suite::ApiSuiteAdapter;
pub use ui::UiCaseAdapter;
