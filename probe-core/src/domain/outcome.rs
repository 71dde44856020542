//! Normalized execution outcome
//!
//! Every adapter returns an [`ExecutionOutcome`] regardless of job kind. The
//! payload is a tagged variant per kind; performance runs additionally carry an
//! open map for tool-specific fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::definition::DefinitionId;

/// Result envelope produced by every adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Wall-clock seconds spent executing, never negative
    pub duration_seconds: f64,
    pub payload: OutcomePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(duration_seconds: f64, payload: OutcomePayload) -> Self {
        Self {
            success: true,
            duration_seconds: duration_seconds.max(0.0),
            payload,
            error_message: None,
        }
    }

    pub fn failed(
        duration_seconds: f64,
        payload: OutcomePayload,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            duration_seconds: duration_seconds.max(0.0),
            payload,
            error_message: Some(error_message.into()),
        }
    }

    /// Pass rate recorded in the test report, always within 0-100
    ///
    /// Suites report their aggregate rate; single jobs are all-or-nothing.
    pub fn pass_rate(&self) -> f64 {
        match &self.payload {
            OutcomePayload::ApiSuite(suite) => suite.pass_rate.clamp(0.0, 100.0),
            _ if self.success => 100.0,
            _ => 0.0,
        }
    }
}

/// Kind-specific outcome payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomePayload {
    ApiCase(ApiCaseResult),
    ApiSuite(SuiteResult),
    UiCase(UiCaseResult),
    Performance(PerformanceResult),
}

/// Result of one HTTP-API case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCaseResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Parsed JSON body, or `{"text": ...}` when the body is not JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<JsonValue>,
    #[serde(default)]
    pub assertion_errors: Vec<String>,
}

/// Aggregate result of a suite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite_id: DefinitionId,
    pub suite_name: String,
    pub total_cases: usize,
    pub passed_cases: usize,
    pub pass_rate: f64,
    /// Per-case results in suite order
    pub results: Vec<SuiteCaseResult>,
}

/// One case inside a suite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteCaseResult {
    pub case_id: DefinitionId,
    pub case_name: Option<String>,
    pub success: bool,
    pub duration_seconds: f64,
    pub result: ApiCaseResult,
}

/// Result of a browser-automation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiCaseResult {
    /// Ordered step artifacts
    #[serde(default)]
    pub steps: Vec<UiStep>,
    /// Screenshot paths relative to the artifact directory
    #[serde(default)]
    pub screenshots: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
}

/// One step of a browser-automation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiStep {
    pub index: usize,
    pub name: String,
    #[serde(default = "UiStep::default_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl UiStep {
    fn default_status() -> String {
        "passed".to_string()
    }
}

/// Result of a load-test run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResult {
    pub metrics: PerformanceMetrics,
    /// Tool-specific fields
    #[serde(default)]
    pub extra: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_report_path: Option<String>,
}

/// Aggregate metrics computed from the load-test tool's result file
///
/// Response times are in milliseconds, throughput in samples per second.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_samples: u64,
    pub successful_samples: u64,
    pub failed_samples: u64,
    /// Percentage of failed samples
    pub error_rate: f64,
    pub average_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    pub throughput: f64,
    /// Seconds between the first and last sample timestamps
    pub duration: f64,
}

/// Percentage of `passed` over `total`; 0 when `total` is 0
pub fn pass_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    passed as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(pass_rate: f64) -> OutcomePayload {
        OutcomePayload::ApiSuite(SuiteResult {
            suite_id: 1,
            suite_name: "s".to_string(),
            total_cases: 4,
            passed_cases: 3,
            pass_rate,
            results: vec![],
        })
    }

    #[test]
    fn test_pass_rate_helper() {
        assert_eq!(pass_rate(3, 4), 75.0);
        assert_eq!(pass_rate(0, 0), 0.0);
        assert_eq!(pass_rate(2, 2), 100.0);
    }

    #[test]
    fn test_outcome_pass_rate_for_single_jobs() {
        let payload = OutcomePayload::ApiCase(ApiCaseResult::default());
        assert_eq!(ExecutionOutcome::succeeded(0.1, payload.clone()).pass_rate(), 100.0);
        assert_eq!(ExecutionOutcome::failed(0.1, payload, "boom").pass_rate(), 0.0);
    }

    #[test]
    fn test_outcome_pass_rate_for_suites_is_aggregate() {
        let outcome = ExecutionOutcome::succeeded(1.0, suite(75.0));
        assert_eq!(outcome.pass_rate(), 75.0);

        let out_of_range = ExecutionOutcome::succeeded(1.0, suite(140.0));
        assert_eq!(out_of_range.pass_rate(), 100.0);
    }

    #[test]
    fn test_negative_duration_is_clamped() {
        let outcome =
            ExecutionOutcome::succeeded(-3.0, OutcomePayload::UiCase(UiCaseResult::default()));
        assert_eq!(outcome.duration_seconds, 0.0);
    }

    #[test]
    fn test_payload_is_tagged() {
        let value = serde_json::to_value(OutcomePayload::Performance(PerformanceResult::default()))
            .unwrap();
        assert_eq!(value["kind"], "PERFORMANCE");
        assert_eq!(value["metrics"]["total_samples"], 0);
    }
}
