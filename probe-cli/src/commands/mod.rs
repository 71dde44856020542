//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod report;
mod task;

pub use report::ReportCommands;
pub use task::WaitArgs;

use anyhow::Result;
use clap::Subcommand;
use probe_core::domain::definition::DefinitionId;
use probe_core::domain::job::{JobHandle, JobKind};

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a test job
    Submit {
        /// Job kind: API_CASE, API_SUITE, UI_CASE or PERFORMANCE
        kind: JobKind,

        /// Id of the test definition
        definition_id: DefinitionId,

        /// Block until the task finishes
        #[arg(short, long)]
        wait: bool,

        #[command(flatten)]
        polling: WaitArgs,
    },
    /// Show the status of a task
    Status {
        /// Task handle returned at submission
        handle: JobHandle,
    },
    /// Wait for a task to finish
    Wait {
        /// Task handle returned at submission
        handle: JobHandle,

        #[command(flatten)]
        polling: WaitArgs,
    },
    /// Cancel a task that has not started yet
    Cancel {
        /// Task handle returned at submission
        handle: JobHandle,
    },
    /// Test report queries
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        Commands::Submit {
            kind,
            definition_id,
            wait,
            polling,
        } => {
            let polling = wait.then_some(polling);
            task::submit(&client, kind, definition_id, polling.as_ref()).await
        }
        Commands::Status { handle } => task::status(&client, handle).await,
        Commands::Wait { handle, polling } => task::wait(&client, handle, &polling).await,
        Commands::Cancel { handle } => task::cancel(&client, handle).await,
        Commands::Report { command } => report::handle_report_command(command, &client).await,
    }
}
