//! Progress snapshot domain type

use serde::{Deserialize, Serialize};

/// Latest progress published by a running job
///
/// Each report replaces the previous snapshot for the same handle as a whole,
/// so readers always observe fields that came from a single update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Completion percentage, 0-100
    pub percent: u8,
    /// Short label for the current step
    pub current_step: String,
    /// Free-text status line
    pub status_message: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProgressSnapshot {
    /// Creates a snapshot stamped with the current time; `percent` is clamped to 100
    pub fn new(
        percent: u8,
        current_step: impl Into<String>,
        status_message: impl Into<String>,
    ) -> Self {
        Self {
            percent: percent.min(100),
            current_step: current_step.into(),
            status_message: status_message.into(),
            updated_at: chrono::Utc::now(),
        }
    }
}
