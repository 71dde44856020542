//! Report DTOs

use serde::{Deserialize, Serialize};

use crate::domain::definition::ProjectId;
use crate::domain::job::JobKind;

/// Query filter for listing reports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
}
