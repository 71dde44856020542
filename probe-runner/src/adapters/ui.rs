//! UI case adapter
//!
//! Runs a browser-automation script with an external test runner, either
//! locally or inside a container. Output is streamed while the script runs so
//! progress can advance on step markers, with a time-based fallback band when
//! the script prints none.
//!
//! Script protocol (all optional):
//! - `STEP: <label>` lines mark a completed step
//! - verbose runner result lines (`file.py::test_name PASSED`) count as steps
//! - a final `STEPS_JSON: [...]` line replaces the screenshot-derived step list
//! - screenshots are written to the directory named by `SCREENSHOT_DIR`

use probe_core::domain::definition::UiCaseDefinition;
use probe_core::domain::job::JobHandle;
use probe_core::domain::outcome::{ExecutionOutcome, OutcomePayload, UiCaseResult, UiStep};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::adapters::process::{
    ProcessEnd, ProgressModel, ProgressUpdate, TimeBand, supervise,
};
use crate::config::{RunnerConfig, UiRunnerConfig};
use crate::service::ProgressReporter;

/// Progress band covered while the script runs
const RUN_BAND_START: u8 = 30;
const RUN_BAND_END: u8 = 75;

/// Percent credited per observed step marker
const PERCENT_PER_STEP: u8 = 5;

const STEP_PREFIX: &str = "STEP:";
const STEPS_JSON_PREFIX: &str = "STEPS_JSON:";
const SCRIPT_FILE: &str = "test_ui_case.py";
const CONTAINER_SCRIPT_PATH: &str = "/app/test_script.py";
const CONTAINER_SCREENSHOT_DIR: &str = "/app/screenshots";

/// Lines of runner output kept in the error log
const ERROR_LOG_LINES: usize = 50;

/// Executes UI test cases
#[derive(Clone)]
pub struct UiCaseAdapter {
    config: UiRunnerConfig,
    workspace_dir: PathBuf,
    artifact_dir: PathBuf,
}

impl UiCaseAdapter {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            config: config.ui.clone(),
            workspace_dir: config.workspace_dir.clone(),
            artifact_dir: config.artifact_dir.clone(),
        }
    }

    pub async fn run(
        &self,
        handle: JobHandle,
        case: &UiCaseDefinition,
        progress: &dyn ProgressReporter,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let timeout = self.config.timeout();

        progress
            .report(handle, 10, "prepare", "writing automation script")
            .await;

        let job_dir = self.workspace_dir.join(handle.to_string());
        let screenshots_rel = format!("screenshots/{}", handle);
        let screenshot_dir = self.artifact_dir.join(&screenshots_rel);

        let (script_path, screenshot_dir) =
            match prepare(&job_dir, &screenshot_dir, &case.script).await {
                Ok(paths) => paths,
                Err(e) => {
                    return failure(started, format!("Failed to prepare workspace: {}", e));
                }
            };

        progress
            .report(handle, 20, "launch", "starting browser automation")
            .await;

        let container_name = format!("probe-ui-{}", handle);
        let mut command = self.build_command(handle, &script_path, &screenshot_dir, &container_name);
        let program = self.program().to_string();

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                remove_workspace(&job_dir).await;
                return failure(
                    started,
                    format!("Failed to launch UI runner '{}': {}", program, e),
                );
            }
        };

        info!("Running UI case '{}' for job {}", case.name, handle);

        let mut model = ScriptProgress::new(timeout);
        let run = supervise(
            child,
            timeout,
            self.config.poll_interval,
            &mut model,
            handle,
            progress,
        )
        .await;

        if self.config.use_container && matches!(run.end, ProcessEnd::TimedOut) {
            self.remove_container(&container_name).await;
        }

        progress
            .report(handle, 85, "collect", "collecting screenshots")
            .await;

        let screenshots = collect_screenshots(&screenshot_dir, &screenshots_rel).await;
        remove_workspace(&job_dir).await;

        let (success, exit_code, error) = match &run.end {
            ProcessEnd::Exited(status) if status.success() => (true, status.code(), None),
            ProcessEnd::Exited(status) => {
                let code = status.code();
                let message = match code {
                    Some(code) => format!("UI test failed with exit code {}", code),
                    None => "UI test was terminated by a signal".to_string(),
                };
                (false, code, Some(message))
            }
            ProcessEnd::TimedOut => (
                false,
                None,
                Some(format!(
                    "UI test execution timed out after {}s",
                    timeout.as_secs()
                )),
            ),
            ProcessEnd::WaitFailed(e) => {
                (false, None, Some(format!("Failed to wait for UI runner: {}", e)))
            }
        };

        let steps = parse_step_report(&run.stdout)
            .unwrap_or_else(|| steps_from_screenshots(&screenshots, success));

        let result = UiCaseResult {
            steps,
            screenshots,
            exit_code,
            error_log: (!success).then(|| run.error_tail(ERROR_LOG_LINES)),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match error {
            None => ExecutionOutcome::succeeded(elapsed, OutcomePayload::UiCase(result)),
            Some(message) => {
                ExecutionOutcome::failed(elapsed, OutcomePayload::UiCase(result), message)
            }
        }
    }

    fn program(&self) -> &str {
        if self.config.use_container {
            &self.config.container_engine
        } else {
            &self.config.command
        }
    }

    fn build_command(
        &self,
        handle: JobHandle,
        script_path: &Path,
        screenshot_dir: &Path,
        container_name: &str,
    ) -> Command {
        let mut command = Command::new(self.program());

        if self.config.use_container {
            command
                .arg("run")
                .arg("--rm")
                .arg("--name")
                .arg(container_name)
                .arg("-v")
                .arg(format!("{}:{}", script_path.display(), CONTAINER_SCRIPT_PATH))
                .arg("-v")
                .arg(format!(
                    "{}:{}",
                    screenshot_dir.display(),
                    CONTAINER_SCREENSHOT_DIR
                ))
                .arg("-e")
                .arg(format!("SCREENSHOT_DIR={}", CONTAINER_SCREENSHOT_DIR))
                .arg(&self.config.container_image)
                .arg(&self.config.command)
                .arg(CONTAINER_SCRIPT_PATH)
                .args(&self.config.args);
        } else {
            command
                .arg(script_path)
                .args(&self.config.args)
                .env("SCREENSHOT_DIR", screenshot_dir)
                .env("PROBE_JOB_HANDLE", handle.to_string());
            if let Some(dir) = script_path.parent() {
                command.current_dir(dir);
            }
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }

    /// Force-removes a container left behind by a killed engine client
    async fn remove_container(&self, name: &str) {
        debug!("Removing container {}", name);

        match Command::new(&self.config.container_engine)
            .args(["rm", "-f", name])
            .output()
            .await
        {
            Ok(output) if !output.status.success() => {
                warn!(
                    "Failed to remove container {}: {}",
                    name,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => warn!("Failed to remove container {}: {}", name, e),
            Ok(_) => {}
        }
    }
}

/// Writes the script and creates the screenshot directory
///
/// # Returns
/// Absolute script path and screenshot directory
async fn prepare(
    job_dir: &Path,
    screenshot_dir: &Path,
    script: &str,
) -> std::io::Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(job_dir).await?;
    tokio::fs::create_dir_all(screenshot_dir).await?;

    let script_path = job_dir.join(SCRIPT_FILE);
    tokio::fs::write(&script_path, script).await?;

    Ok((
        tokio::fs::canonicalize(&script_path).await?,
        tokio::fs::canonicalize(screenshot_dir).await?,
    ))
}

async fn remove_workspace(job_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(job_dir).await {
        warn!("Failed to remove workspace {}: {}", job_dir.display(), e);
    }
}

fn failure(started: Instant, message: String) -> ExecutionOutcome {
    let result = UiCaseResult {
        error_log: Some(message.clone()),
        ..Default::default()
    };
    ExecutionOutcome::failed(
        started.elapsed().as_secs_f64(),
        OutcomePayload::UiCase(result),
        message,
    )
}

/// Lists image files in `dir`, sorted by name, as paths relative to the artifact root
async fn collect_screenshots(dir: &Path, relative_prefix: &str) -> Vec<String> {
    let mut names = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No screenshots in {}: {}", dir.display(), e);
            return names;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"));
        if is_image {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    names
        .into_iter()
        .map(|name| format!("{}/{}", relative_prefix, name))
        .collect()
}

/// Reads the last `STEPS_JSON:` line, if the script printed one
fn parse_step_report(stdout: &[String]) -> Option<Vec<UiStep>> {
    let line = stdout
        .iter()
        .rev()
        .find_map(|line| line.trim_start().strip_prefix(STEPS_JSON_PREFIX))?;

    match serde_json::from_str(line.trim()) {
        Ok(steps) => Some(steps),
        Err(e) => {
            warn!("Ignoring malformed step report: {}", e);
            None
        }
    }
}

/// One step per screenshot; the last step carries the run's failure
fn steps_from_screenshots(screenshots: &[String], success: bool) -> Vec<UiStep> {
    let count = screenshots.len();
    screenshots
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let name = Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(path.as_str())
                .to_string();
            let status = if !success && i + 1 == count {
                "failed"
            } else {
                "passed"
            };
            UiStep {
                index: i + 1,
                name,
                status: status.to_string(),
                screenshot: Some(path.clone()),
            }
        })
        .collect()
}

/// Extracts a step label from a line of runner output
fn step_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim();

    if let Some(label) = trimmed.strip_prefix(STEP_PREFIX) {
        return Some(label.trim());
    }

    let is_result_line = trimmed.contains("::")
        && [" PASSED", " FAILED", " ERROR"]
            .iter()
            .any(|verdict| trimmed.contains(verdict));
    if is_result_line {
        return trimmed.split_whitespace().next();
    }

    None
}

/// Step markers first, elapsed time as fallback, within the run band
struct ScriptProgress {
    band: TimeBand,
    steps: usize,
}

impl ScriptProgress {
    fn new(timeout: Duration) -> Self {
        Self {
            band: TimeBand::new(RUN_BAND_START, RUN_BAND_END, timeout, "running", "running script"),
            steps: 0,
        }
    }
}

impl ProgressModel for ScriptProgress {
    fn on_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        let label = step_marker(line)?;
        self.steps += 1;

        let by_steps = RUN_BAND_START as usize + self.steps * PERCENT_PER_STEP as usize;
        let percent = (by_steps.min(self.band.end() as usize) as u8).max(self.band.last());
        self.band.observe(percent);

        Some(ProgressUpdate {
            percent,
            step: format!("step {}", self.steps),
            message: label.to_string(),
        })
    }

    fn on_tick(&mut self, elapsed: Duration) -> Option<ProgressUpdate> {
        self.band.on_tick(elapsed)
    }
}
