//! Test doubles shared by the unit tests in this crate.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use courier_store::{Database, EventStore};
use courier_upload::{BatchTransport, DeliveryOptions, DeliveryReceipt, EncodedBatch, UploadError};

pub(crate) const LARGE_CACHE: u64 = 32 * 1024 * 1024;

pub(crate) fn memory_store() -> EventStore {
    EventStore::new(Database::in_memory().unwrap(), LARGE_CACHE)
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Reply {
    Status(u16),
    ConnectionRefused,
    Panic,
}

#[derive(Debug)]
struct Call {
    records: usize,
    data: String,
    cookie: Option<String>,
    dry_run: bool,
}

/// Answers from a script, then a fallback, and records every call.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub(crate) fn always(reply: Reply) -> Self {
        Self::script(Vec::new(), reply)
    }

    pub(crate) fn script(replies: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().iter().map(|c| c.records).collect()
    }

    pub(crate) fn payloads(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.data.clone()).collect()
    }

    pub(crate) fn cookies(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|c| c.cookie.clone()).collect()
    }

    pub(crate) fn dry_run_flags(&self) -> Vec<bool> {
        self.calls.lock().iter().map(|c| c.dry_run).collect()
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn deliver(
        &self,
        _endpoint: &str,
        batch: &EncodedBatch,
        options: &DeliveryOptions,
    ) -> Result<DeliveryReceipt, UploadError> {
        self.calls.lock().push(Call {
            records: batch.record_count,
            data: batch.data.clone(),
            cookie: options.cookie.clone(),
            dry_run: options.dry_run,
        });
        let reply = self.script.lock().pop_front().unwrap_or(self.fallback);
        match reply {
            Reply::Status(status @ 200..=299) => Ok(DeliveryReceipt {
                status,
                redirected: false,
            }),
            Reply::Status(status) => Err(UploadError::Response {
                status,
                body: String::new(),
            }),
            Reply::ConnectionRefused => Err(UploadError::Connection("connection refused".into())),
            Reply::Panic => panic!("transport blew up"),
        }
    }
}
