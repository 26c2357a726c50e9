//! Subcommand implementations.
//!
//! Each command works on an already started [`Pipeline`] and writes its
//! result to stdout as one JSON document.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use courier_dispatch::{Enqueued, FlushReport, Pipeline};

/// Event type used when an ingested line carries none.
pub(crate) const DEFAULT_EVENT_TYPE: &str = "track";

/// Result of `ingest`.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IngestSummary {
    pub(crate) accepted: u64,
    pub(crate) rejected: u64,
    pub(crate) store_full: u64,
    pub(crate) disabled: u64,
    pub(crate) flush: Option<FlushReport>,
}

/// Result of `status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusReport {
    pub(crate) database: String,
    pub(crate) queued: u64,
    pub(crate) footprint: u64,
    pub(crate) max_cache_size: u64,
    pub(crate) server_url: String,
}

/// Build a tracked event object.
pub(crate) fn build_event(
    event_type: &str,
    name: Option<&str>,
    properties: Option<&str>,
    time_ms: i64,
) -> Result<Value> {
    let properties = match properties {
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("--properties is not valid JSON")?;
            if !value.is_object() {
                bail!("--properties must be a JSON object");
            }
            value
        }
        None => Value::Object(Map::new()),
    };

    let mut event = json!({
        "type": event_type,
        "time": time_ms,
        "properties": properties,
    });
    if let Some(name) = name {
        event["event"] = Value::String(name.to_string());
    }
    Ok(event)
}

/// Parse one line of newline-delimited JSON; blank lines yield `None`.
pub(crate) fn parse_ingest_line(line: &str) -> Result<Option<(String, Value)>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event: Value = serde_json::from_str(line).context("line is not valid JSON")?;
    if !event.is_object() {
        bail!("line is not a JSON object");
    }
    let event_type = event
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_EVENT_TYPE)
        .to_string();
    Ok(Some((event_type, event)))
}

pub(crate) async fn track(
    pipeline: &Pipeline,
    event_type: &str,
    name: Option<&str>,
    properties: Option<&str>,
    wait: Duration,
) -> Result<Option<FlushReport>> {
    let event = build_event(event_type, name, properties, Utc::now().timestamp_millis())?;
    match pipeline.enqueue(event_type, &event)? {
        Enqueued::Queued { queued } => debug!(queued, "event queued"),
        Enqueued::StoreFull => warn!("event store is full, event dropped"),
        Enqueued::Disabled => warn!("pipeline is disabled, event dropped"),
    }
    Ok(pipeline.flush_and_wait(wait).await)
}

pub(crate) async fn ingest<R>(pipeline: &Pipeline, reader: R, wait: Duration) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        line_no += 1;
        match parse_ingest_line(&line) {
            Ok(None) => {}
            Ok(Some((event_type, event))) => match pipeline.enqueue(&event_type, &event)? {
                Enqueued::Queued { .. } => summary.accepted += 1,
                Enqueued::StoreFull => summary.store_full += 1,
                Enqueued::Disabled => summary.disabled += 1,
            },
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping input line");
                summary.rejected += 1;
            }
        }
    }

    summary.flush = pipeline.flush_and_wait(wait).await;
    Ok(summary)
}

pub(crate) async fn purge(pipeline: &Pipeline) -> Result<u64> {
    let before = pipeline.queued()?;
    pipeline.delete_all();
    pipeline.shutdown().await;
    let after = pipeline.queued()?;
    Ok(before.saturating_sub(after))
}

pub(crate) fn status(pipeline: &Pipeline, database: &Path) -> Result<StatusReport> {
    let store = pipeline.store();
    Ok(StatusReport {
        database: database.display().to_string(),
        queued: store.count()?,
        footprint: store.footprint()?,
        max_cache_size: store.max_cache_size(),
        server_url: pipeline.settings().read(|s| s.server_url.clone()),
    })
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_core::AlwaysOnline;
    use courier_settings::{PipelineSettings, SharedSettings};
    use courier_store::{Database, EventStore};
    use courier_upload::{HttpUploader, UploaderConfig};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const WAIT: Duration = Duration::from_secs(10);

    async fn collector(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    fn pipeline(server_url: &str) -> Pipeline {
        let store = EventStore::new(Database::in_memory().unwrap(), 32 * 1024 * 1024);
        Pipeline::start(
            store,
            Arc::new(HttpUploader::new(&UploaderConfig::default()).unwrap()),
            Arc::new(AlwaysOnline),
            SharedSettings::new(PipelineSettings::with_server_url(server_url)),
        )
        .unwrap()
    }

    #[test]
    fn build_event_shapes_payload() {
        let event = build_event("track", Some("purchase"), Some(r#"{"sku":"A"}"#), 1_700_000_000_000).unwrap();
        assert_eq!(event["type"], "track");
        assert_eq!(event["event"], "purchase");
        assert_eq!(event["time"], 1_700_000_000_000_i64);
        assert_eq!(event["properties"]["sku"], "A");

        let bare = build_event("profile_set", None, None, 0).unwrap();
        assert!(bare.get("event").is_none());
        assert!(bare["properties"].as_object().unwrap().is_empty());
    }

    #[test]
    fn build_event_rejects_bad_properties() {
        assert!(build_event("track", None, Some("{"), 0).is_err());
        assert!(build_event("track", None, Some("[1,2]"), 0).is_err());
    }

    #[test]
    fn ingest_line_parsing() {
        assert!(parse_ingest_line("   ").unwrap().is_none());
        let (kind, _) = parse_ingest_line(r#"{"type":"track_signup","distinct_id":"u1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(kind, "track_signup");
        let (kind, _) = parse_ingest_line(r#"{"event":"view"}"#).unwrap().unwrap();
        assert_eq!(kind, DEFAULT_EVENT_TYPE);
        assert!(parse_ingest_line("42").is_err());
        assert!(parse_ingest_line("{oops").is_err());
    }

    #[tokio::test]
    async fn track_delivers_one_event() {
        let server = collector(200).await;
        let p = pipeline(&server.uri());

        let report = track(&p, "track", Some("view"), None, WAIT).await.unwrap().unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(p.queued().unwrap(), 0);
        p.shutdown().await;
    }

    #[tokio::test]
    async fn ingest_counts_lines_and_flushes() {
        let server = collector(200).await;
        let p = pipeline(&server.uri());
        let input = b"{\"type\":\"track\",\"event\":\"a\"}\n\nnot json\n{\"event\":\"b\"}\n".as_slice();

        let summary = ingest(&p, input, WAIT).await.unwrap();

        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.store_full, 0);
        assert_eq!(summary.disabled, 0);
        assert_eq!(summary.flush.unwrap().delivered, 2);
        p.shutdown().await;
    }

    #[tokio::test]
    async fn purge_clears_queue() {
        let server = collector(503).await;
        let p = pipeline(&server.uri());
        for n in 0..5 {
            let _ = p.enqueue("track", &json!({"n": n})).unwrap();
        }

        assert_eq!(purge(&p).await.unwrap(), 5);
        assert_eq!(p.queued().unwrap(), 0);
    }

    #[tokio::test]
    async fn status_reports_queue() {
        let p = pipeline("http://collector.test/sa");
        let _ = p.enqueue("track", &json!({"n": 1})).unwrap();

        let report = status(&p, Path::new(":memory:")).unwrap();
        assert_eq!(report.queued, 1);
        assert!(report.footprint > 0);
        assert_eq!(report.server_url, "http://collector.test/sa");
        p.shutdown().await;
    }
}
