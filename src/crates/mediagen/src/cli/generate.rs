//! Generation command handlers

use crate::cli::build_orchestrator;
use crate::config::MediaConfig;
use crate::error::{MediaError, Result};
use crate::executor::BatchReport;
use crate::models::{PromptRecord, PromptType};
use crate::service::{MediaService, ServiceReport};
use crate::shutdown::ShutdownCoordinator;
use crate::worker::{GenerationWorker, WorkerEvent};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

/// Handle generate command
///
/// Explicit ids are generated in the order given; otherwise the oldest
/// eligible prompts of `prompt_type` (or of both types) are picked.
pub async fn handle_generate(
    config: &MediaConfig,
    ids: Vec<i64>,
    prompt_type: Option<PromptType>,
    limit: u32,
) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    let prompts = if ids.is_empty() {
        let types = match prompt_type {
            Some(ty) => vec![ty],
            None => PromptType::all().to_vec(),
        };
        let mut prompts = Vec::new();
        for ty in types {
            prompts.extend(orchestrator.prompts().find_eligible(ty, limit).await?);
        }
        prompts
    } else {
        let mut prompts = Vec::with_capacity(ids.len());
        for id in ids {
            prompts.push(orchestrator.prompts().find_by_id(id).await?);
        }
        prompts
    };

    if prompts.is_empty() {
        println!("{}", "No eligible prompts".yellow());
        return Ok(());
    }

    let (worker, events) = GenerationWorker::spawn(orchestrator);
    let report = run_batch(&worker, events, prompts).await?;
    worker.shutdown().await?;

    print_batch_summary("Generation", &report);
    Ok(())
}

async fn run_batch(
    worker: &GenerationWorker,
    mut events: tokio::sync::mpsc::UnboundedReceiver<WorkerEvent>,
    prompts: Vec<PromptRecord>,
) -> Result<BatchReport> {
    let progress = ProgressBar::new(prompts.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
        progress.set_style(style.progress_chars("=> "));
    }
    progress.enable_steady_tick(Duration::from_millis(120));

    let batch_id = worker.submit(prompts)?;
    let mut report = BatchReport::default();

    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Started {
                prompt_id,
                prompt_type,
                ..
            } => {
                progress.set_message(format!("{} #{}", prompt_type.short_name(), prompt_id));
            }
            WorkerEvent::Succeeded {
                prompt_id, files, ..
            } => {
                report.succeeded += 1;
                progress.inc(1);
                progress.println(format!(
                    "{} #{} {}",
                    "✓".green(),
                    prompt_id,
                    files.join(", ")
                ));
            }
            WorkerEvent::Skipped { prompt_id, .. } => {
                report.skipped += 1;
                progress.inc(1);
                progress.println(format!(
                    "{} #{} already claimed",
                    "-".yellow(),
                    prompt_id
                ));
            }
            WorkerEvent::Failed {
                prompt_id, message, ..
            } => {
                report.failed += 1;
                progress.inc(1);
                progress.println(format!(
                    "{} #{} {}",
                    "✗".red(),
                    prompt_id,
                    first_line(&message)
                ));
                report.errors.push((prompt_id, message));
            }
            WorkerEvent::BatchComplete { batch_id: done, .. } if done == batch_id => break,
            WorkerEvent::Queued { .. } | WorkerEvent::BatchComplete { .. } => {}
        }
    }

    progress.finish_and_clear();
    Ok(report)
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

fn print_batch_summary(label: &str, report: &BatchReport) {
    let headline = format!(
        "{}: {} generated, {} failed, {} skipped",
        label, report.succeeded, report.failed, report.skipped
    );
    if report.failed == 0 {
        println!("{}", headline.green().bold());
    } else {
        println!("{}", headline.yellow().bold());
    }
}

fn print_service_report(report: &ServiceReport) {
    if report.reclaimed > 0 {
        println!("Reclaimed {} stale prompt(s)", report.reclaimed);
    }
    print_batch_summary("Images", &report.images);
    print_batch_summary("Songs", &report.songs);
    for (prompt_id, message) in report.images.errors.iter().chain(&report.songs.errors) {
        println!("  {} #{} {}", "✗".red(), prompt_id, first_line(message));
    }
    for (prompt_type, message) in report.query_errors() {
        println!("  {} {} query failed: {}", "✗".red(), prompt_type.short_name(), first_line(message));
    }
    println!("Elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0);
}

/// Handle run-once command: one reclaim and generation pass
pub async fn handle_run_once(config: &MediaConfig, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let service = MediaService::new(orchestrator, &config.service);
    let report = service.run_once().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_service_report(&report);
    }
    Ok(())
}

/// Handle serve command: repeat passes until interrupted
pub async fn handle_serve(
    config: &MediaConfig,
    interval_secs: Option<u64>,
    shutdown: &ShutdownCoordinator,
) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let mut service = MediaService::new(orchestrator, &config.service);
    if let Some(secs) = interval_secs {
        if secs == 0 {
            return Err(MediaError::Config("Interval must be at least 1 second".to_string()));
        }
        service = service.with_interval(Duration::from_secs(secs));
    }

    println!(
        "{} every {}s (Ctrl+C to stop)",
        "Serving".green().bold(),
        service.interval().as_secs()
    );
    let passes = service.run_until_shutdown(shutdown).await;
    info!(passes, "Serve finished");
    println!("Stopped after {} pass(es)", passes);
    Ok(())
}
