//! Task command handlers
//!
//! Submission, status, waiting and cancellation.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::*;
use probe_client::OrchestratorClient;
use probe_core::domain::definition::DefinitionId;
use probe_core::domain::job::{JobHandle, JobKind, JobState};
use probe_core::dto::task::TaskStatus;

/// Polling options for commands that wait on a task
#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
    /// Delay between status polls, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 3600)]
    pub timeout_secs: u64,
}

/// Submit a job, optionally waiting for it to finish
pub async fn submit(
    client: &OrchestratorClient,
    kind: JobKind,
    definition_id: DefinitionId,
    polling: Option<&WaitArgs>,
) -> Result<()> {
    let submitted = client.submit(kind, definition_id).await?;

    println!("{}", "✓ Task submitted".green().bold());
    println!("  Handle: {}", submitted.handle.to_string().cyan());
    println!("  Kind:   {}", kind);
    println!("  State:  {}", colorize_state(submitted.state));

    match polling {
        Some(polling) => {
            println!();
            wait(client, submitted.handle, polling).await
        }
        None => Ok(()),
    }
}

/// Show the current status of a task
pub async fn status(client: &OrchestratorClient, handle: JobHandle) -> Result<()> {
    let status = client.get_status(handle).await?;
    print_status(&status);
    Ok(())
}

/// Block until a task reaches a terminal state
///
/// Fails unless the task succeeded, so scripts can rely on the exit code.
pub async fn wait(client: &OrchestratorClient, handle: JobHandle, polling: &WaitArgs) -> Result<()> {
    println!("{}", format!("Waiting for task {}...", handle).dimmed());

    let status = client
        .wait_for_completion(
            handle,
            Duration::from_millis(polling.poll_interval_ms),
            Duration::from_secs(polling.timeout_secs),
        )
        .await?;

    print_status(&status);

    if status.state != JobState::Success {
        anyhow::bail!("Task {} finished with state {}", handle, status.state);
    }
    Ok(())
}

/// Cancel a task that no worker has picked up yet
pub async fn cancel(client: &OrchestratorClient, handle: JobHandle) -> Result<()> {
    match client.cancel(handle).await {
        Ok(status) => {
            println!("{}", "✓ Task cancelled".green().bold());
            print_status(&status);
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            println!("{}", "✗ Task can no longer be cancelled".yellow());
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print detailed task status
fn print_status(status: &TaskStatus) {
    println!("{}", "Task Status:".bold());
    println!("  Handle:   {}", status.handle.to_string().cyan());
    println!("  State:    {}", colorize_state(status.state));

    if let Some(percent) = status.percent {
        println!("  Progress: {}", format_progress(percent));
    }
    if let Some(step) = &status.current_step {
        println!("  Step:     {}", step);
    }
    if let Some(message) = &status.status_message {
        println!("  Message:  {}", message.dimmed());
    }

    if let Some(result) = &status.result {
        println!("\n{}", "Result:".bold());
        println!(
            "  Success:  {}",
            if result.success {
                "✓".green()
            } else {
                "✗".red()
            }
        );
        println!("  Duration: {:.2}s", result.duration_seconds);

        if let Ok(pretty) = serde_json::to_string_pretty(&result.payload) {
            println!("\n{}", "Payload:".bold());
            println!("{}", pretty);
        }
    }

    if let Some(error) = &status.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

/// Renders a percentage as a fixed-width bar
fn format_progress(percent: u8) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent / 5;
    format!("[{}{}] {:>3}%", "#".repeat(filled), "-".repeat(20 - filled), percent)
}

/// Colorize task state for display
fn colorize_state(state: JobState) -> ColoredString {
    let state_str = state.to_string();
    match state {
        JobState::Pending => state_str.yellow(),
        JobState::Started | JobState::Progress => state_str.cyan(),
        JobState::Success => state_str.green(),
        JobState::Failure => state_str.red(),
        JobState::Cancelled => state_str.dimmed(),
    }
}
