//! `lectio status` command: show run progress and phase history.

use anyhow::Result;
use uuid::Uuid;

use lectio_core::RunService;
use lectio_db::models::RunStatus;

/// Run the status command.
///
/// When `run_id` is `Some`, shows detailed status for that run.
/// When `None`, lists all runs.
pub async fn run_status(service: &RunService, run_id: Option<Uuid>) -> Result<()> {
    match run_id {
        Some(id) => run_detail(service, id).await,
        None => run_list(service).await,
    }
}

async fn run_detail(service: &RunService, run_id: Uuid) -> Result<()> {
    let snapshot = service.get_run_status(run_id).await?;
    let run = &snapshot.run;

    println!("Run: {}", run.id);
    println!("Status: {} ({}%)", run.status, run.progress);
    println!("Phase: {}", run.phase);
    println!("Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(completed_at) = run.completed_at {
        println!("Finished: {}", completed_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(error) = &run.error_message {
        match run.failed_phase {
            Some(phase) => println!("Error in {phase}: {error}"),
            None => println!("Error: {error}"),
        }
    }
    println!();

    println!("History:");
    for entry in &snapshot.history {
        let message = entry.message.as_deref().map(|m| format!(" - {m}")).unwrap_or_default();
        println!(
            "  {} {:<20} {:<10} {:>3}%{}",
            entry.recorded_at.format("%H:%M:%S"),
            entry.phase.to_string(),
            entry.status.to_string(),
            entry.progress,
            message
        );
    }
    Ok(())
}

async fn run_list(service: &RunService) -> Result<()> {
    let runs = service.list_runs().await?;
    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!("{:<38} {:<10} {:<20} {:>4}", "RUN", "STATUS", "PHASE", "PCT");
    for run in &runs {
        println!(
            "[{}] {:<36} {:<10} {:<20} {:>3}%",
            status_icon(run.status),
            run.id.to_string(),
            run.status.to_string(),
            run.phase.to_string(),
            run.progress
        );
    }
    Ok(())
}

fn status_icon(status: RunStatus) -> char {
    match status {
        RunStatus::Pending => '.',
        RunStatus::Running => '*',
        RunStatus::Succeeded => '+',
        RunStatus::Failed => '!',
        RunStatus::Cancelled => 'X',
    }
}
