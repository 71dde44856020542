//! Scheduler layer for the runner
//!
//! This layer accepts submissions, holds them in a bounded queue and runs them
//! on a fixed-size worker pool. It owns every lifecycle transition of a job
//! from PENDING to its terminal state.

mod pool;
mod recovery;
mod submit;
mod sweeper;
mod worker;

pub use recovery::{INTERRUPTED_MESSAGE, fail_interrupted_jobs};
pub use submit::Scheduler;
pub use sweeper::spawn_sweeper;
pub use worker::RetryPolicy;
