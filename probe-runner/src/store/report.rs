//! Report store
//!
//! Durable test reports. Exactly one report may exist per job handle.

use async_trait::async_trait;
use chrono::Utc;
use probe_core::domain::job::JobHandle;
use probe_core::domain::report::{NewTestReport, TestReport};
use probe_core::dto::report::ReportFilter;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Store trait for test reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persists a report
    ///
    /// # Errors
    /// `DuplicateReport` if a report for the same handle already exists
    async fn save_report(&self, report: NewTestReport) -> Result<TestReport, StoreError>;

    /// Lists reports matching the filter, newest first
    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<TestReport>, StoreError>;

    async fn get_report(&self, id: i64) -> Result<Option<TestReport>, StoreError>;

    /// Finds the report produced by a job
    async fn find_by_handle(&self, handle: JobHandle) -> Result<Option<TestReport>, StoreError>;
}

/// In-memory implementation of ReportStore
#[derive(Default)]
pub struct InMemoryReportStore {
    reports: Mutex<Vec<TestReport>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save_report(&self, report: NewTestReport) -> Result<TestReport, StoreError> {
        let mut reports = self.reports.lock().await;

        if reports.iter().any(|existing| existing.handle == report.handle) {
            return Err(StoreError::DuplicateReport(report.handle));
        }

        let id = reports.len() as i64 + 1;
        let saved = TestReport::from_new(id, report, Utc::now());
        reports.push(saved.clone());

        Ok(saved)
    }

    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<TestReport>, StoreError> {
        let reports = self.reports.lock().await;

        // Ids grow with insertion order, so reversing yields newest first
        Ok(reports
            .iter()
            .rev()
            .filter(|report| filter.project_id.is_none_or(|id| report.project_id == id))
            .filter(|report| filter.kind.is_none_or(|kind| report.job_kind == kind))
            .cloned()
            .collect())
    }

    async fn get_report(&self, id: i64) -> Result<Option<TestReport>, StoreError> {
        let reports = self.reports.lock().await;
        Ok(reports.iter().find(|report| report.id == id).cloned())
    }

    async fn find_by_handle(&self, handle: JobHandle) -> Result<Option<TestReport>, StoreError> {
        let reports = self.reports.lock().await;
        Ok(reports.iter().find(|report| report.handle == handle).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::domain::job::JobKind;

    fn report(project_id: i64, kind: JobKind) -> NewTestReport {
        NewTestReport {
            project_id,
            name: kind.report_name("sample"),
            job_kind: kind,
            handle: JobHandle::new(),
            result_payload: serde_json::json!({}),
            pass_rate: 100.0,
            start_time: Utc::now(),
            duration: 1.5,
        }
    }

    #[tokio::test]
    async fn test_duplicate_handle_is_rejected() {
        let store = InMemoryReportStore::new();
        let first = report(1, JobKind::ApiCase);
        let duplicate = NewTestReport {
            name: "other".to_string(),
            ..first.clone()
        };

        store.save_report(first).await.unwrap();
        let err = store.save_report(duplicate).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReport(_)));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let store = InMemoryReportStore::new();
        let a = store.save_report(report(1, JobKind::ApiCase)).await.unwrap();
        let b = store.save_report(report(2, JobKind::UiCase)).await.unwrap();
        let c = store.save_report(report(1, JobKind::UiCase)).await.unwrap();

        let all = store.list_reports(&ReportFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        let filtered = store
            .list_reports(&ReportFilter {
                project_id: Some(1),
                kind: Some(JobKind::UiCase),
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, c.id);

        let by_handle = store.find_by_handle(b.handle).await.unwrap().unwrap();
        assert_eq!(by_handle.id, b.id);
    }
}
