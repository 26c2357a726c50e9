//! Last-chance delivery when the process panics.

use std::panic::{self, PanicHookInfo};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::dispatcher::on_worker;
use crate::drain::FlushReport;
use crate::pipeline::Pipeline;

/// Event name recorded for a crash.
pub const CRASH_EVENT: &str = "AppCrashed";

/// Property carrying the panic message.
pub const CRASH_REASON_PROPERTY: &str = "app_crashed_reason";

/// Wrap the current panic hook with a crash flush.
///
/// On a panic that ends the process: optionally store an [`CRASH_EVENT`]
/// event, run one flush and wait up to `wait` for it. The previous hook
/// always runs afterwards. Panics caught by a join handle or by the
/// dispatcher worker are left alone.
pub fn install_crash_hook(pipeline: Pipeline, track_crash: bool, wait: Duration) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |hook_info: &PanicHookInfo<'_>| {
        if ends_process(thread::current().name()) && !on_worker() {
            let reason = hook_info.to_string();
            let _ = crash_flush(&pipeline, track_crash.then_some(reason.as_str()), wait);
        }
        previous(hook_info);
    }));
    info!(track_crash, ?wait, "crash hook installed");
}

/// Whether a panic on the named thread takes the process down.
///
/// Under `panic = "abort"` every panic does. Otherwise only the main
/// thread's: spawned threads and tasks hand their panic to a join handle.
fn ends_process(thread_name: Option<&str>) -> bool {
    cfg!(panic = "abort") || thread_name == Some("main")
}

/// Record the crash (when `reason` is given) and flush synchronously.
///
/// Does nothing on the dispatcher worker, which survives its own panics.
pub fn crash_flush(pipeline: &Pipeline, reason: Option<&str>, wait: Duration) -> Option<FlushReport> {
    if on_worker() {
        debug!("panic inside the dispatcher worker, not a crash");
        return None;
    }
    if let Some(reason) = reason {
        let event = json!({
            "type": "track",
            "event": CRASH_EVENT,
            "time": Utc::now().timestamp_millis(),
            "properties": { CRASH_REASON_PROPERTY: reason },
        });
        // Straight to the store: the flush below picks it up.
        if let Err(e) = pipeline.store().append(&event.to_string()) {
            warn!(error = %e, kind = e.error_kind(), "crash event not stored");
        }
    }
    let report = pipeline.flush_blocking(wait);
    if report.is_none() {
        warn!(?wait, "crash flush did not finish in time");
    }
    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_core::AlwaysOnline;
    use courier_settings::{PipelineSettings, SharedSettings};
    use courier_upload::codec::decode;

    use super::*;
    use crate::testing::{Reply, ScriptedTransport, memory_store};

    fn pipeline(transport: &Arc<ScriptedTransport>) -> Pipeline {
        Pipeline::start(
            memory_store(),
            transport.clone(),
            Arc::new(AlwaysOnline),
            SharedSettings::new(PipelineSettings::with_server_url("http://collector.test")),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_event_recorded_and_flushed() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Status(200)));
        let p = pipeline(&transport);

        let handle = p.clone();
        let report = tokio::task::spawn_blocking(move || {
            crash_flush(&handle, Some("index out of bounds"), Duration::from_secs(5))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(transport.batch_sizes(), vec![1]);
        let payload = decode(&transport.payloads()[0]).unwrap();
        assert!(payload.contains(CRASH_EVENT));
        assert!(payload.contains(r#""app_crashed_reason":"index out of bounds""#));
        p.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_flush_without_tracking_only_flushes() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Status(200)));
        let p = pipeline(&transport);

        let handle = p.clone();
        let report = tokio::task::spawn_blocking(move || crash_flush(&handle, None, Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.attempts, 0);
        assert_eq!(p.queued().unwrap(), 0);
        p.shutdown().await;
    }

    #[test]
    fn only_main_thread_panics_end_the_process() {
        assert!(ends_process(Some("main")));
        if !cfg!(panic = "abort") {
            assert!(!ends_process(Some("tokio-runtime-worker")));
            assert!(!ends_process(None));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn caught_worker_panic_is_not_recorded_as_crash() {
        let transport = Arc::new(ScriptedTransport::script(vec![Reply::Panic], Reply::Status(200)));
        let p = pipeline(&transport);
        let _ = p.store().append(r#"{"event":"view"}"#).unwrap();

        install_crash_hook(p.clone(), true, Duration::from_secs(5));
        p.flush();
        let report = p.flush_and_wait(Duration::from_secs(5)).await.unwrap();
        drop(panic::take_hook());

        assert_eq!(report.delivered, 1);
        assert_eq!(p.queued().unwrap(), 0);
        for data in transport.payloads() {
            assert!(!decode(&data).unwrap().contains(CRASH_EVENT));
        }
        p.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_flush_skipped_on_worker() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Status(200)));
        let p = pipeline(&transport);

        let handle = p.clone();
        let report = crate::dispatcher::ON_WORKER
            .scope((), async move { crash_flush(&handle, Some("boom"), Duration::from_millis(50)) })
            .await;

        assert!(report.is_none());
        assert_eq!(p.queued().unwrap(), 0);
        p.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crash_flush_gives_up_after_wait() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Status(200)));
        let p = pipeline(&transport);
        p.shutdown().await;

        let handle = p.clone();
        let report = tokio::task::spawn_blocking(move || {
            crash_flush(&handle, Some("boom"), Duration::from_millis(50))
        })
        .await
        .unwrap();

        assert!(report.is_none());
        // The event is still stored for the next run.
        assert_eq!(p.queued().unwrap(), 1);
    }
}
