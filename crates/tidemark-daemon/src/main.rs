mod cli;
mod wiring;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{RootCommand, SubCommands};
use tidemark::{Scheduler, SchedulerStatus};

#[tokio::main]
async fn main() -> Result<()> {
    // Default to INFO, overridable with RUST_LOG. libsql's internals are noisy at debug.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("libsql=warn".parse()?);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let command = RootCommand::parse();
    let config = wiring::load_config(command.config.as_deref())?;
    let scheduler = Arc::new(wiring::build_scheduler(&config).await?);

    match command.action.unwrap_or(SubCommands::Run) {
        SubCommands::Run => run(scheduler).await,
        SubCommands::Sync { json } => {
            let summary = scheduler.trigger_manual_sync().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.report());
            }
            Ok(())
        }
        SubCommands::Status { json } => {
            let status = scheduler
                .status()
                .await
                .context("Failed to read watermarks")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(())
        }
    }
}

async fn run(scheduler: Arc<Scheduler>) -> Result<()> {
    let handle = scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested, waiting for any in-flight run");

    handle.shutdown().await;
    info!(
        "Stopped after {} completed runs",
        scheduler.completed_runs()
    );
    Ok(())
}

fn print_status(status: &SchedulerStatus) {
    println!("State: {:?}", status.state);
    println!("Completed runs: {}", status.completed_runs);
    println!("Next sync in: {}", format_duration(status.next_sync_in));
    println!("Watermarks:");
    for watermark in &status.watermarks {
        match watermark.last_synced_at {
            Some(at) => println!("  {}: {}", watermark.entity_name, at.to_rfc3339()),
            None => println!("  {}: never synced", watermark.entity_name),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return "due now".to_string();
    }
    format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "due now");
        assert_eq!(format_duration(Duration::from_secs(59)), "0h 00m 59s");
        assert_eq!(
            format_duration(Duration::from_secs(23 * 3600 + 5 * 60 + 7)),
            "23h 05m 07s"
        );
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let command = RootCommand::parse_from(["tidemark-daemon", "-c", "x.yaml", "sync", "--json"]);
        assert_eq!(command.config.as_deref(), Some(std::path::Path::new("x.yaml")));
        assert!(matches!(command.action, Some(SubCommands::Sync { json: true })));

        let command = RootCommand::parse_from(["tidemark-daemon"]);
        assert!(command.action.is_none());
    }
}
