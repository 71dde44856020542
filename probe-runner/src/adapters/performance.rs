//! Performance adapter
//!
//! Drives the external load-test tool in non-GUI mode, then parses its result
//! file into summary metrics. Output paths in the payload are relative to the
//! load results directory.

use probe_core::domain::definition::PerformanceDefinition;
use probe_core::domain::job::JobHandle;
use probe_core::domain::outcome::{ExecutionOutcome, OutcomePayload, PerformanceResult};
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{info, warn};

use crate::adapters::jtl;
use crate::adapters::process::{ProcessEnd, TimeBand, supervise, tail};
use crate::config::{LoadRunnerConfig, RunnerConfig};
use crate::service::ProgressReporter;

/// Lines of tool output kept in failure messages
const ERROR_TAIL_LINES: usize = 20;

/// Executes load tests
#[derive(Clone)]
pub struct PerformanceAdapter {
    config: LoadRunnerConfig,
    results_dir: PathBuf,
}

impl PerformanceAdapter {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            config: config.load.clone(),
            results_dir: config.load_results_dir.clone(),
        }
    }

    /// Checks that a definition has a test plan on disk
    pub async fn validate(test: &PerformanceDefinition) -> Result<(), String> {
        let Some(path) = &test.plan_path else {
            return Err(format!("Performance test {} has no test plan", test.id));
        };
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(format!("Test plan file not found: {}", path)),
        }
    }

    pub async fn run(
        &self,
        handle: JobHandle,
        test: &PerformanceDefinition,
        progress: &dyn ProgressReporter,
    ) -> ExecutionOutcome {
        let started = Instant::now();

        if let Err(message) = Self::validate(test).await {
            return failure(started, message);
        }
        let plan = test.plan_path.as_deref().unwrap_or_default();

        progress
            .report(handle, 10, "prepare", "preparing result directory")
            .await;

        if let Err(e) = tokio::fs::create_dir_all(&self.results_dir).await {
            return failure(
                started,
                format!("Failed to create results directory: {}", e),
            );
        }

        let result_name = format!("result_{}.jtl", handle);
        let report_name = format!("report_{}", handle);
        let result_file = self.results_dir.join(&result_name);
        let report_dir = self.results_dir.join(&report_name);

        let mut command = Command::new(&self.config.command);
        command
            .arg("-n")
            .arg("-t")
            .arg(plan)
            .arg("-l")
            .arg(&result_file)
            .arg("-e")
            .arg("-o")
            .arg(&report_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        progress
            .report(handle, 20, "load", "starting load test")
            .await;

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return failure(
                    started,
                    format!(
                        "Failed to launch load-test tool '{}': {}",
                        self.config.command, e
                    ),
                );
            }
        };

        info!("Running load test '{}' for job {}", test.name, handle);

        let mut band = TimeBand::new(20, 75, self.config.timeout, "load", "running load test");
        let run = supervise(
            child,
            self.config.timeout,
            self.config.progress_interval,
            &mut band,
            handle,
            progress,
        )
        .await;

        match &run.end {
            ProcessEnd::Exited(status) if status.success() => {}
            ProcessEnd::Exited(status) => {
                let code = status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                return failure(
                    started,
                    format!(
                        "Load-test tool exited with code {}: {}",
                        code,
                        run.error_tail(ERROR_TAIL_LINES)
                    ),
                );
            }
            ProcessEnd::TimedOut => {
                return failure(
                    started,
                    format!(
                        "Performance test execution timed out after {}s",
                        self.config.timeout.as_secs()
                    ),
                );
            }
            ProcessEnd::WaitFailed(e) => {
                return failure(started, format!("Failed to wait for load-test tool: {}", e));
            }
        }

        progress
            .report(handle, 80, "parse", "parsing result file")
            .await;

        let content = match tokio::fs::read_to_string(&result_file).await {
            Ok(content) => content,
            Err(e) => {
                return failure(
                    started,
                    format!("Result file not found: {} ({})", result_file.display(), e),
                );
            }
        };

        let (format, samples) = match jtl::parse_result_file(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse result file for job {}: {}", handle, e);
                return failure(started, format!("Failed to parse result file: {}", e));
            }
        };

        if samples.is_empty() {
            return failure(started, "Result file contains no samples".to_string());
        }

        let metrics = jtl::compute_metrics(&samples);

        let mut extra = Map::new();
        extra.insert("result_file".to_string(), JsonValue::String(result_name));
        extra.insert(
            "result_format".to_string(),
            JsonValue::String(format.as_str().to_string()),
        );

        if run.stderr.iter().any(|line| !line.trim().is_empty()) {
            extra.insert(
                "stderr_tail".to_string(),
                JsonValue::String(tail(&run.stderr, ERROR_TAIL_LINES)),
            );
        }

        let html_report_path = tokio::fs::metadata(&report_dir)
            .await
            .is_ok_and(|meta| meta.is_dir())
            .then_some(report_name);

        info!(
            "Load test '{}' recorded {} samples ({:.1}% errors)",
            test.name, metrics.total_samples, metrics.error_rate
        );

        ExecutionOutcome::succeeded(
            started.elapsed().as_secs_f64(),
            OutcomePayload::Performance(PerformanceResult {
                metrics,
                extra,
                html_report_path,
            }),
        )
    }
}

fn failure(started: Instant, message: String) -> ExecutionOutcome {
    ExecutionOutcome::failed(
        started.elapsed().as_secs_f64(),
        OutcomePayload::Performance(PerformanceResult::default()),
        message,
    )
}
