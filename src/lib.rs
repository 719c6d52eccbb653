// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod task;
pub mod types;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::task::{JsonFileStore, Task, TaskContext, TaskStore};
use crate::types::{TaskOption, TaskStatus};

/// How often captured output is copied to STDOUT while the task runs.
const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - task discovery in `<data_dir>/<uuid>`
/// - the run itself, with output streamed to STDOUT
/// - Ctrl-C handling (cancels the task)
/// - saving the final snapshot
///
/// Returns `Ok(false)` when the task ended FAILED.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {config_path:?}"))?;
    let ctx = Arc::new(TaskContext::new(cfg));

    let uuid = args
        .uuid
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let options = parse_options(&args.options)?;
    let task = Task::create(uuid, args.name.clone(), options, Arc::clone(&ctx))?;

    if args.dry_run {
        print_dry_run(&task)?;
        return Ok(true);
    }

    let Some(mut handle) = task.start() else {
        bail!("task {} is not queued and cannot be started", task.uuid());
    };

    // Ctrl-C -> cancel the task; the run winds down once its process exits.
    {
        let task = task.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!(task = %task.uuid(), "Ctrl+C received; canceling task");
            if let Err(e) = task.cancel() {
                warn!(task = %task.uuid(), error = %e, "cancel failed");
            }
        });
    }

    let mut next_chunk = 0;
    let mut ticker = tokio::time::interval(OUTPUT_POLL_INTERVAL);
    loop {
        tokio::select! {
            joined = &mut handle => {
                if let Err(e) = joined {
                    warn!(task = %task.uuid(), error = %e, "run task ended abnormally");
                }
                break;
            }
            _ = ticker.tick() => {
                next_chunk = flush_output(&task, next_chunk)?;
            }
        }
    }
    flush_output(&task, next_chunk)?;

    let store = JsonFileStore::in_data_dir(Arc::clone(&ctx.fs), &ctx.config.runner.data_dir);
    store.upsert(task.serialize())?;
    debug!(path = ?store.path(), "snapshot saved");

    let info = task.info();
    println!("{}", serde_json::to_string_pretty(&info)?);

    Ok(!matches!(info.status, TaskStatus::Failed { .. }))
}

/// Parse repeated `--option name=value` flags.
///
/// Values that parse as JSON keep their type; anything else is a string.
fn parse_options(raw: &[String]) -> Result<Vec<TaskOption>> {
    raw.iter()
        .map(|item| -> Result<TaskOption> {
            let (name, value) = item
                .split_once('=')
                .ok_or_else(|| anyhow!("option {item:?} is not of the form name=value"))?;
            let name = name.trim();
            if name.is_empty() {
                bail!("option {item:?} has an empty name");
            }
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            Ok(TaskOption::new(name, value))
        })
        .collect()
}

/// Write chunks from `from` on to STDOUT; returns the next index.
fn flush_output(task: &Task, from: usize) -> Result<usize> {
    let chunks = task.output(from);
    if chunks.is_empty() {
        return Ok(from);
    }

    let mut stdout = std::io::stdout().lock();
    for chunk in &chunks {
        stdout.write_all(chunk.as_bytes())?;
    }
    stdout.flush()?;
    Ok(from + chunks.len())
}

/// Print what would run without running it.
fn print_dry_run(task: &Task) -> Result<()> {
    println!("odm-task dry-run");
    println!("  task: {} ({})", task.uuid(), task.name());
    println!("  working dir: {}", task.project_dir().display());
    println!("  images: {}", task.images().len());
    match task.ground_control_files().first() {
        Some(gcp) => println!("  ground control: {}", gcp.display()),
        None => println!("  ground control: none"),
    }
    println!("  worker: {}", task.worker_command()?);

    debug!("dry-run complete (no execution)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn option_values_keep_json_types() {
        let opts = parse_options(&[
            "resize-to=2400".to_string(),
            "fast-orthophoto=true".to_string(),
            "texturing-data-term=area".to_string(),
        ])
        .unwrap();

        assert_eq!(opts[0], TaskOption::new("resize-to", 2400));
        assert_eq!(opts[1], TaskOption::new("fast-orthophoto", true));
        assert_eq!(opts[2].value, json!("area"));
    }

    #[test]
    fn option_without_value_is_rejected() {
        assert!(parse_options(&["fast-orthophoto".to_string()]).is_err());
        assert!(parse_options(&["=1".to_string()]).is_err());
    }
}
