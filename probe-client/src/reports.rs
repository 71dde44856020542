//! Report-related API endpoints

use probe_core::domain::job::JobHandle;
use probe_core::domain::report::TestReport;
use probe_core::dto::report::ReportFilter;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// List reports, newest first
    pub async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<TestReport>> {
        let url = format!("{}/reports", self.base_url);
        let response = self.client.get(&url).query(filter).send().await?;

        self.handle_response(response).await
    }

    /// Get a report by id
    pub async fn get_report(&self, id: i64) -> Result<TestReport> {
        let url = format!("{}/reports/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the report written for a finished task
    pub async fn get_task_report(&self, handle: JobHandle) -> Result<TestReport> {
        let url = format!("{}/tasks/{}/report", self.base_url, handle);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
