//! `lectio run` command: submit a request and drive it to completion in the
//! foreground. Ctrl+C cancels the run.

use anyhow::{Context, Result};

use lectio_core::request::NewGenerationRequest;
use lectio_core::{RunOutcome, RunService};

use crate::result_cmd;

pub async fn run_generate(service: &RunService, request: NewGenerationRequest, json: bool) -> Result<()> {
    let run_id = service.submit(request).await?;
    if !json {
        println!("Run {run_id} created.");
        println!("  cancel from another shell with `lectio cancel {run_id}`");
    }

    let worker = service.clone();
    let mut handle = tokio::spawn(async move { worker.execute_run(run_id).await });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling run {run_id}...");
            if let Err(e) = service.cancel_run(run_id).await {
                tracing::warn!(%run_id, error = %e, "cancel after interrupt failed");
            }
            handle.await
        }
    };
    let outcome = joined.context("run task panicked")??;

    match outcome {
        RunOutcome::Succeeded(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!();
                result_cmd::print_summary(&result);
            }
        }
        RunOutcome::Cancelled { phase } => {
            println!("Run {run_id} cancelled during {phase}.");
        }
    }
    Ok(())
}
