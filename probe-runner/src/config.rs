//! Runner configuration
//!
//! Defines all configurable parameters for the worker pool and the execution
//! adapters: concurrency, queue bound, state retention, artifact directories,
//! external tool commands and their timeouts.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runner configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (dev vs prod, local vs containerized).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Number of jobs executed in parallel
    pub worker_concurrency: usize,

    /// Maximum number of submitted jobs waiting for a worker
    pub queue_capacity: usize,

    /// How long terminal task states stay readable
    pub state_retention: Duration,

    /// How often expired task states are purged
    pub sweep_interval: Duration,

    /// Root for screenshots and other served artifacts
    pub artifact_dir: PathBuf,

    /// Where load-test result files and HTML reports are written
    pub load_results_dir: PathBuf,

    /// Scratch space for per-job files (scripts)
    pub workspace_dir: PathBuf,

    /// Timeout for a single API-case HTTP request
    pub api_request_timeout: Duration,

    pub ui: UiRunnerConfig,

    pub load: LoadRunnerConfig,
}

/// Browser-automation runner settings
#[derive(Debug, Clone)]
pub struct UiRunnerConfig {
    /// Test runner executable (e.g., "pytest")
    pub command: String,

    /// Arguments appended after the script path
    pub args: Vec<String>,

    /// Run the script inside a container instead of locally
    pub use_container: bool,

    /// Container engine binary (e.g., "podman" or "docker")
    pub container_engine: String,

    /// Image that ships the test runner and browsers
    pub container_image: String,

    /// Wall-clock limit for local runs
    pub local_timeout: Duration,

    /// Wall-clock limit for containerized runs
    pub container_timeout: Duration,

    /// How often progress is re-evaluated while the script runs
    pub poll_interval: Duration,
}

/// Load-test tool settings
#[derive(Debug, Clone)]
pub struct LoadRunnerConfig {
    /// Load-test tool executable
    pub command: String,

    /// Wall-clock limit for one load-test run
    pub timeout: Duration,

    /// How often elapsed-time progress is published during a run
    pub progress_interval: Duration,
}

impl UiRunnerConfig {
    /// Effective wall-clock limit for the configured execution mode
    pub fn timeout(&self) -> Duration {
        if self.use_container {
            self.container_timeout
        } else {
            self.local_timeout
        }
    }
}

impl Default for UiRunnerConfig {
    fn default() -> Self {
        Self {
            command: "pytest".to_string(),
            args: vec!["-v".to_string(), "--tb=short".to_string()],
            use_container: false,
            container_engine: "podman".to_string(),
            container_image: "playwright-test:latest".to_string(),
            local_timeout: Duration::from_secs(300), // 5 minutes
            container_timeout: Duration::from_secs(600), // 10 minutes
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl Default for LoadRunnerConfig {
    fn default() -> Self {
        Self {
            command: "jmeter".to_string(),
            timeout: Duration::from_secs(3600), // 1 hour
            progress_interval: Duration::from_secs(5),
        }
    }
}

impl RunnerConfig {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - WORKER_CONCURRENCY (default: 4)
    /// - QUEUE_CAPACITY (default: 256)
    /// - STATE_RETENTION_SECS (default: 3600)
    /// - STATE_SWEEP_INTERVAL_SECS (default: 60)
    /// - ARTIFACT_DIR (default: ./uploads)
    /// - LOAD_RESULTS_DIR (default: ./jmeter_results)
    /// - WORKSPACE_DIR (default: <tmp>/probe)
    /// - API_REQUEST_TIMEOUT_SECS (default: 30)
    /// - UI_COMMAND, UI_USE_CONTAINER, UI_CONTAINER_ENGINE, UI_CONTAINER_IMAGE,
    ///   UI_LOCAL_TIMEOUT_SECS, UI_CONTAINER_TIMEOUT_SECS, UI_POLL_INTERVAL_MS
    /// - JMETER_HOME (binary becomes $JMETER_HOME/bin/jmeter), LOAD_COMMAND, LOAD_TIMEOUT_SECS
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let ui_defaults = defaults.ui.clone();

        let load_command = match std::env::var("JMETER_HOME") {
            Ok(home) if !home.is_empty() => PathBuf::from(home)
                .join("bin")
                .join("jmeter")
                .to_string_lossy()
                .to_string(),
            _ => std::env::var("LOAD_COMMAND").unwrap_or(defaults.load.command),
        };

        let use_container = std::env::var("UI_USE_CONTAINER")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(ui_defaults.use_container);

        Ok(Self {
            worker_concurrency: env_parse("WORKER_CONCURRENCY")?
                .unwrap_or(defaults.worker_concurrency),
            queue_capacity: env_parse("QUEUE_CAPACITY")?.unwrap_or(defaults.queue_capacity),
            state_retention: env_parse("STATE_RETENTION_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.state_retention),
            sweep_interval: env_parse("STATE_SWEEP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            artifact_dir: std::env::var("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            load_results_dir: std::env::var("LOAD_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.load_results_dir),
            workspace_dir: std::env::var("WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_dir),
            api_request_timeout: env_parse("API_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.api_request_timeout),
            ui: UiRunnerConfig {
                command: std::env::var("UI_COMMAND").unwrap_or(ui_defaults.command),
                args: ui_defaults.args,
                use_container,
                container_engine: std::env::var("UI_CONTAINER_ENGINE")
                    .unwrap_or(ui_defaults.container_engine),
                container_image: std::env::var("UI_CONTAINER_IMAGE")
                    .unwrap_or(ui_defaults.container_image),
                local_timeout: env_parse("UI_LOCAL_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(ui_defaults.local_timeout),
                container_timeout: env_parse("UI_CONTAINER_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(ui_defaults.container_timeout),
                poll_interval: env_parse("UI_POLL_INTERVAL_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(ui_defaults.poll_interval),
            },
            load: LoadRunnerConfig {
                command: load_command,
                timeout: env_parse("LOAD_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.load.timeout),
                progress_interval: defaults.load.progress_interval,
            },
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_concurrency == 0 {
            anyhow::bail!("worker_concurrency must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.state_retention.is_zero() {
            anyhow::bail!("state_retention must be greater than 0");
        }

        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep_interval must be greater than 0");
        }

        if self.ui.poll_interval < Duration::from_millis(100) {
            anyhow::bail!("ui poll_interval must be at least 100ms");
        }

        if self.ui.command.trim().is_empty() {
            anyhow::bail!("ui command cannot be empty");
        }

        if self.ui.use_container && self.ui.container_engine.trim().is_empty() {
            anyhow::bail!("ui container_engine cannot be empty");
        }

        if self.load.progress_interval < Duration::from_millis(100) {
            anyhow::bail!("load progress_interval must be at least 100ms");
        }

        if self.load.command.trim().is_empty() {
            anyhow::bail!("load command cannot be empty");
        }

        Ok(())
    }

    /// Retention window as a chrono duration for timestamp arithmetic
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.state_retention).unwrap_or(chrono::Duration::hours(1))
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 4,
            queue_capacity: 256,
            state_retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            artifact_dir: PathBuf::from("./uploads"),
            load_results_dir: PathBuf::from("./jmeter_results"),
            workspace_dir: std::env::temp_dir().join("probe"),
            api_request_timeout: Duration::from_secs(30),
            ui: UiRunnerConfig::default(),
            load: LoadRunnerConfig::default(),
        }
    }
}

/// Parses an optional environment variable, failing on malformed values
fn env_parse<T: FromStr>(key: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.api_request_timeout, Duration::from_secs(30));
        assert_eq!(config.ui.local_timeout, Duration::from_secs(300));
        assert_eq!(config.ui.container_timeout, Duration::from_secs(600));
        assert_eq!(config.load.timeout, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RunnerConfig::default();

        config.worker_concurrency = 0;
        assert!(config.validate().is_err());
        config.worker_concurrency = 2;

        config.queue_capacity = 0;
        assert!(config.validate().is_err());
        config.queue_capacity = 8;

        // Reader loop must not busy-spin
        config.ui.poll_interval = Duration::from_millis(10);
        assert!(config.validate().is_err());
        config.ui.poll_interval = Duration::from_millis(250);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ui_timeout_depends_on_mode() {
        let mut ui = UiRunnerConfig::default();
        assert_eq!(ui.timeout(), Duration::from_secs(300));
        ui.use_container = true;
        assert_eq!(ui.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_retention_conversion() {
        let config = RunnerConfig {
            state_retention: Duration::from_secs(90),
            ..RunnerConfig::default()
        };
        assert_eq!(config.retention(), chrono::Duration::seconds(90));
    }
}
