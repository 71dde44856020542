//! Service layer
//!
//! Services contain the runner's business logic around a single execution:
//! dispatching a definition to its adapter, publishing progress and writing
//! the durable test report.
//!
//! All services are trait-based to enable testing and dependency injection.

mod execution;
mod progress;
mod report_writer;

// Re-export traits
pub use execution::JobExecutor;
pub use progress::ProgressReporter;

// Re-export implementations
pub use execution::StandardJobExecutor;
pub use progress::{NoopProgressReporter, StoreProgressReporter};
pub use report_writer::ReportWriter;
