//! # courier-agent
//!
//! Command-line front end: loads settings, opens the event database, starts
//! the pipeline and runs one subcommand.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use courier_core::AlwaysOnline;
use courier_dispatch::{Pipeline, install_crash_hook};
use courier_settings::{PipelineSettings, SharedSettings};
use courier_store::{Database, EventStore};
use courier_upload::{HttpUploader, UploaderConfig};

/// Courier telemetry agent.
#[derive(Parser, Debug)]
#[command(name = "courier-agent", about = "Queue and deliver telemetry events")]
struct Cli {
    /// Settings file (defaults to `~/.courier/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Event database (defaults to `~/.courier/events.db`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level filter; `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Override the collection endpoint from settings.
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Seconds to wait for a flush to finish.
    #[arg(long, global = true, default_value_t = 30)]
    wait_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enqueue one event, flush, and wait for the result.
    Track {
        /// Event type, e.g. `track` or `track_signup`.
        event_type: String,
        /// Event name.
        #[arg(long)]
        event: Option<String>,
        /// Event properties as a JSON object.
        #[arg(long)]
        properties: Option<String>,
    },
    /// Enqueue newline-delimited JSON events from stdin, then flush.
    Ingest,
    /// Run one flush and print its report.
    Flush,
    /// Delete every queued event.
    Purge,
    /// Show queue size and footprint.
    Status,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".courier").join("events.db")
    }

    fn load_settings(&self) -> Result<PipelineSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(courier_settings::settings_path);
        let mut settings = courier_settings::load_settings_from_path(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        if let Some(url) = &self.server_url {
            settings.server_url.clone_from(url);
            settings.validate().context("invalid --server-url")?;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    let level = courier_core::logging::effective_level(settings.log_enabled, &cli.log_level);
    if cli.json_logs {
        courier_core::logging::init_json_subscriber(level);
    } else {
        courier_core::logging::init_subscriber(level);
    }

    let db_path = cli.db.clone().unwrap_or_else(Cli::default_db_path);
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open event database {}", db_path.display()))?;
    let store = EventStore::new(db, settings.max_cache_size);

    let uploader = HttpUploader::new(&UploaderConfig::default()).context("failed to build HTTP client")?;
    let track_crash = settings.track_app_crash;
    let crash_wait = Duration::from_millis(settings.crash_flush_wait_ms);
    let pipeline = Pipeline::start(
        store,
        Arc::new(uploader),
        Arc::new(AlwaysOnline),
        SharedSettings::new(settings),
    )?;
    install_crash_hook(pipeline.clone(), track_crash, crash_wait);

    let wait = Duration::from_secs(cli.wait_secs);
    let result = run(&cli.command, &pipeline, &db_path, wait).await;
    pipeline.shutdown().await;
    info!(stats = ?pipeline.stats(), "done");
    result
}

async fn run(command: &Command, pipeline: &Pipeline, db_path: &std::path::Path, wait: Duration) -> Result<()> {
    match command {
        Command::Track {
            event_type,
            event,
            properties,
        } => {
            let report =
                commands::track(pipeline, event_type, event.as_deref(), properties.as_deref(), wait)
                    .await?;
            commands::print_json(&report)
        }
        Command::Ingest => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let summary = commands::ingest(pipeline, stdin, wait).await?;
            commands::print_json(&summary)
        }
        Command::Flush => {
            let report = pipeline.flush_and_wait(wait).await;
            commands::print_json(&report)
        }
        Command::Purge => {
            let deleted = commands::purge(pipeline).await?;
            commands::print_json(&serde_json::json!({ "deleted": deleted }))
        }
        Command::Status => {
            let status = commands::status(pipeline, db_path)?;
            commands::print_json(&status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_track_with_global_flags() {
        let cli = Cli::try_parse_from([
            "courier-agent",
            "--db",
            "/tmp/e.db",
            "track",
            "track_signup",
            "--event",
            "signup",
            "--properties",
            r#"{"plan":"pro"}"#,
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.db, Some(PathBuf::from("/tmp/e.db")));
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Command::Track {
                event_type,
                event,
                properties,
            } => {
                assert_eq!(event_type, "track_signup");
                assert_eq!(event.as_deref(), Some("signup"));
                assert_eq!(properties.as_deref(), Some(r#"{"plan":"pro"}"#));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["courier-agent", "status"]).unwrap();
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.wait_secs, 30);
        assert!(cli.settings.is_none());
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn subcommand_required() {
        assert!(Cli::try_parse_from(["courier-agent"]).is_err());
    }

    #[test]
    fn server_url_override_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.json");
        std::fs::write(&settings, r#"{"serverUrl": "https://collector.example/sa"}"#).unwrap();
        let settings_arg = settings.to_string_lossy().to_string();

        let cli = Cli::try_parse_from(["courier-agent", "--settings", &settings_arg, "flush"]).unwrap();
        assert_eq!(cli.load_settings().unwrap().server_url, "https://collector.example/sa");

        let cli = Cli::try_parse_from([
            "courier-agent",
            "--settings",
            &settings_arg,
            "--server-url",
            "ftp://nope",
            "flush",
        ])
        .unwrap();
        assert!(cli.load_settings().is_err());
    }
}
