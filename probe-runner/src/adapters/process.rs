//! External process supervision
//!
//! Runs a spawned child under a wall-clock limit while its output is read line
//! by line, and turns output and elapsed time into progress updates.

use probe_core::domain::job::JobHandle;
use std::collections::VecDeque;
use std::process::ExitStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::service::ProgressReporter;

/// Lines kept per stream; older lines are dropped
const MAX_RETAINED_LINES: usize = 2000;

/// How long to wait for buffered output once the child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

/// How a supervised process ended
#[derive(Debug)]
pub enum ProcessEnd {
    Exited(ExitStatus),
    /// Killed after exceeding its wall-clock limit
    TimedOut,
    WaitFailed(std::io::Error),
}

/// Result of a supervised run
#[derive(Debug)]
pub struct ProcessRun {
    pub end: ProcessEnd,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub elapsed: Duration,
}

impl ProcessRun {
    /// Last `n` lines of stderr, falling back to stdout when stderr is empty
    pub fn error_tail(&self, n: usize) -> String {
        let source = if self.stderr.iter().any(|l| !l.trim().is_empty()) {
            &self.stderr
        } else {
            &self.stdout
        };
        tail(source, n)
    }
}

/// Joins the last `n` lines
pub fn tail(lines: &[String], n: usize) -> String {
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// A progress update derived from process activity
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub step: String,
    pub message: String,
}

/// Maps process activity onto progress percentages
pub trait ProgressModel: Send {
    /// Called for every output line
    fn on_line(&mut self, line: &str) -> Option<ProgressUpdate>;

    /// Called on every poll interval
    fn on_tick(&mut self, elapsed: Duration) -> Option<ProgressUpdate>;
}

/// Time-based progress within a fixed percent band
///
/// Advances linearly from `start` to `end` over the wall-clock limit and never
/// goes backwards.
#[derive(Debug, Clone)]
pub struct TimeBand {
    start: u8,
    end: u8,
    limit: Duration,
    last: u8,
    step: String,
    label: String,
}

impl TimeBand {
    pub fn new(
        start: u8,
        end: u8,
        limit: Duration,
        step: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end: end.max(start),
            limit,
            last: 0,
            step: step.into(),
            label: label.into(),
        }
    }

    /// Percent for the given elapsed time
    pub fn percent_at(&self, elapsed: Duration) -> u8 {
        if self.limit.is_zero() {
            return self.end;
        }
        let fraction = (elapsed.as_secs_f64() / self.limit.as_secs_f64()).min(1.0);
        self.start + ((self.end - self.start) as f64 * fraction) as u8
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    /// Records a percent reached by other means so ticks stay monotonic
    pub fn observe(&mut self, percent: u8) {
        self.last = self.last.max(percent);
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

impl ProgressModel for TimeBand {
    fn on_line(&mut self, _line: &str) -> Option<ProgressUpdate> {
        None
    }

    fn on_tick(&mut self, elapsed: Duration) -> Option<ProgressUpdate> {
        let percent = self.percent_at(elapsed);
        if percent <= self.last {
            return None;
        }
        self.last = percent;

        Some(ProgressUpdate {
            percent,
            step: self.step.clone(),
            message: format!("{} ({}s elapsed)", self.label, elapsed.as_secs()),
        })
    }
}

/// Supervises a spawned child until it exits or exceeds `limit`
///
/// The child must have been spawned with piped stdout and stderr. On timeout
/// the child is killed before returning.
pub async fn supervise(
    mut child: Child,
    limit: Duration,
    poll_interval: Duration,
    model: &mut dyn ProgressModel,
    handle: JobHandle,
    progress: &dyn ProgressReporter,
) -> ProcessRun {
    let started = Instant::now();
    let mut lines = spawn_line_readers(&mut child);
    let mut stdout = VecDeque::new();
    let mut stderr = VecDeque::new();

    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = time::sleep(limit);
    tokio::pin!(deadline);

    let end = loop {
        tokio::select! {
            Some(line) = lines.recv() => {
                if let Some(update) = model.on_line(&line.text) {
                    progress.report(handle, update.percent, &update.step, &update.message).await;
                }
                retain(&mut stdout, &mut stderr, line);
            }
            _ = ticker.tick() => {
                if let Some(update) = model.on_tick(started.elapsed()) {
                    progress.report(handle, update.percent, &update.step, &update.message).await;
                }
            }
            status = child.wait() => {
                break match status {
                    Ok(status) => ProcessEnd::Exited(status),
                    Err(e) => ProcessEnd::WaitFailed(e),
                };
            }
            _ = &mut deadline => {
                warn!("Job {} process exceeded {:?}, killing it", handle, limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill process for job {}: {}", handle, e);
                }
                break ProcessEnd::TimedOut;
            }
        }
    };

    // Pick up output the readers buffered before the pipes closed. A grandchild
    // may still hold the pipes open, so the grace period is one fixed deadline.
    let drain_deadline = Instant::now() + DRAIN_GRACE;
    while let Ok(Some(line)) = time::timeout_at(drain_deadline, lines.recv()).await {
        retain(&mut stdout, &mut stderr, line);
    }

    debug!(
        "Job {} process finished after {:?}: {:?}",
        handle,
        started.elapsed(),
        end
    );

    ProcessRun {
        end,
        stdout: stdout.into(),
        stderr: stderr.into(),
        elapsed: started.elapsed(),
    }
}

fn retain(stdout: &mut VecDeque<String>, stderr: &mut VecDeque<String>, line: OutputLine) {
    let buffer = match line.stream {
        Stream::Stdout => stdout,
        Stream::Stderr => stderr,
    };
    if buffer.len() == MAX_RETAINED_LINES {
        buffer.pop_front();
    }
    buffer.push_back(line.text);
}

fn spawn_line_readers(child: &mut Child) -> mpsc::Receiver<OutputLine> {
    let (tx, rx) = mpsc::channel(256);

    if let Some(out) = child.stdout.take() {
        spawn_reader(out, Stream::Stdout, tx.clone());
    }
    if let Some(err) = child.stderr.take() {
        spawn_reader(err, Stream::Stderr, tx);
    }

    rx
}

fn spawn_reader<R>(reader: R, stream: Stream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = decode_line(&buf);
                    if tx.send(OutputLine { stream, text }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Stopped reading {:?}: {}", stream, e);
                    break;
                }
            }
        }
    });
}

/// Decodes one raw line, replacing invalid UTF-8 and stripping the terminator
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
