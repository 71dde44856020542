//! API suite adapter
//!
//! Runs a suite's cases in suite order and aggregates a pass rate. Unresolved
//! case references count as failed entries; a suite with nothing to run fails
//! fast.

use probe_core::domain::definition::ApiSuiteDefinition;
use probe_core::domain::job::JobHandle;
use probe_core::domain::outcome::{
    ApiCaseResult, ExecutionOutcome, OutcomePayload, SuiteCaseResult, SuiteResult, pass_rate,
};
use std::time::Instant;
use tracing::{info, warn};

use crate::adapters::api::ApiCaseAdapter;
use crate::service::ProgressReporter;

pub const EMPTY_SUITE_MESSAGE: &str = "test suite has no resolvable cases";

/// Executes API suites case by case
#[derive(Clone)]
pub struct ApiSuiteAdapter {
    cases: ApiCaseAdapter,
}

impl ApiSuiteAdapter {
    pub fn new(cases: ApiCaseAdapter) -> Self {
        Self { cases }
    }

    pub async fn run(
        &self,
        handle: JobHandle,
        suite: &ApiSuiteDefinition,
        progress: &dyn ProgressReporter,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let total = suite.case_ids.len();

        if suite.cases.is_empty() {
            warn!("Suite '{}' has no resolvable cases", suite.name);
            let results = suite.case_ids.iter().map(|id| unresolved(*id)).collect();
            return ExecutionOutcome::failed(
                started.elapsed().as_secs_f64(),
                OutcomePayload::ApiSuite(SuiteResult {
                    suite_id: suite.id,
                    suite_name: suite.name.clone(),
                    total_cases: total,
                    passed_cases: 0,
                    pass_rate: 0.0,
                    results,
                }),
                EMPTY_SUITE_MESSAGE,
            );
        }

        let mut results = Vec::with_capacity(total);

        for (position, case_id) in suite.case_ids.iter().enumerate() {
            let percent = (5 + position * 90 / total) as u8;

            let Some(case) = suite.resolved(*case_id) else {
                warn!("Suite '{}' references missing case {}", suite.name, case_id);
                results.push(unresolved(*case_id));
                continue;
            };

            progress
                .report(
                    handle,
                    percent,
                    &format!("case {}/{}", position + 1, total),
                    &format!("running {}", case.name),
                )
                .await;

            let outcome = self.cases.execute(case).await;
            let result = match outcome.payload {
                OutcomePayload::ApiCase(result) => result,
                _ => ApiCaseResult::default(),
            };

            results.push(SuiteCaseResult {
                case_id: case.id,
                case_name: Some(case.name.clone()),
                success: outcome.success,
                duration_seconds: outcome.duration_seconds,
                result,
            });
        }

        let passed = results.iter().filter(|r| r.success).count();
        let rate = pass_rate(passed, total);

        info!(
            "Suite '{}' finished: {}/{} passed ({:.1}%)",
            suite.name, passed, total, rate
        );

        ExecutionOutcome::succeeded(
            started.elapsed().as_secs_f64(),
            OutcomePayload::ApiSuite(SuiteResult {
                suite_id: suite.id,
                suite_name: suite.name.clone(),
                total_cases: total,
                passed_cases: passed,
                pass_rate: rate,
                results,
            }),
        )
    }
}

fn unresolved(case_id: i64) -> SuiteCaseResult {
    SuiteCaseResult {
        case_id,
        case_name: None,
        success: false,
        duration_seconds: 0.0,
        result: ApiCaseResult {
            status_code: None,
            response_data: None,
            assertion_errors: vec![format!("case {} not found", case_id)],
        },
    }
}
