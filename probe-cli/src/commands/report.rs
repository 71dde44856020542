//! Report command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use probe_client::OrchestratorClient;
use probe_core::domain::definition::ProjectId;
use probe_core::domain::job::{JobHandle, JobKind};
use probe_core::domain::report::TestReport;
use probe_core::dto::report::ReportFilter;

/// Report subcommands
#[derive(Subcommand)]
pub enum ReportCommands {
    /// List reports, newest first
    List {
        /// Only reports of this project
        #[arg(long)]
        project: Option<ProjectId>,

        /// Only reports of this job kind
        #[arg(long)]
        kind: Option<JobKind>,
    },
    /// Show a report by id
    Get {
        /// Report id
        id: i64,
    },
    /// Show the report of a finished task
    Task {
        /// Task handle returned at submission
        handle: JobHandle,
    },
}

/// Handle report commands
pub async fn handle_report_command(
    command: ReportCommands,
    client: &OrchestratorClient,
) -> Result<()> {
    match command {
        ReportCommands::List { project, kind } => {
            let filter = ReportFilter {
                project_id: project,
                kind,
            };
            list_reports(client, &filter).await
        }
        ReportCommands::Get { id } => {
            let report = client.get_report(id).await?;
            print_report_details(&report);
            Ok(())
        }
        ReportCommands::Task { handle } => {
            let report = client.get_task_report(handle).await?;
            print_report_details(&report);
            Ok(())
        }
    }
}

async fn list_reports(client: &OrchestratorClient, filter: &ReportFilter) -> Result<()> {
    let reports = client.list_reports(filter).await?;

    if reports.is_empty() {
        println!("{}", "No reports found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} report(s):", reports.len()).bold());
    println!();
    for report in reports {
        print_report_summary(&report);
    }

    Ok(())
}

fn print_report_summary(report: &TestReport) {
    println!(
        "  {} #{} {}",
        "▸".cyan(),
        report.id,
        report.name.bold()
    );
    println!("    Pass rate: {}", colorize_pass_rate(report.pass_rate));
    println!(
        "    Started:   {}",
        report
            .start_time
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_report_details(report: &TestReport) {
    println!("{}", "Report Details:".bold());
    println!("  ID:        {}", report.id.to_string().cyan());
    println!("  Name:      {}", report.name);
    println!("  Kind:      {}", report.job_kind);
    println!("  Project:   {}", report.project_id);
    println!("  Task:      {}", report.handle.to_string().dimmed());
    println!("  Pass rate: {}", colorize_pass_rate(report.pass_rate));
    println!(
        "  Started:   {}",
        report.start_time.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Duration:  {:.2}s", report.duration);

    println!("\n{}", "Result:".bold());
    if let Ok(pretty) = serde_json::to_string_pretty(&report.result_payload) {
        println!("{}", pretty);
    } else {
        println!("{:?}", report.result_payload);
    }
}

fn colorize_pass_rate(rate: f64) -> ColoredString {
    let text = format!("{:.1}%", rate);
    if rate >= 100.0 {
        text.green()
    } else if rate > 0.0 {
        text.yellow()
    } else {
        text.red()
    }
}
