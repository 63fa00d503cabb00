//! The Indexer RPC boundary (§6).
//!
//! The real Indexer is an external, opaque process; the core only needs an
//! async client for the calls in the table below plus a stream of inbound
//! events. Two in-process implementations ship with the crate so the rest
//! of the pipeline can be tested and smoke-run without a real backend,
//! mirroring the teacher's `ClipboardProvider`/`NullClipboardProvider` split.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Inbound events the Indexer may emit at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerEvent {
    Started,
    Finished {
        seconds_elapsed: u64,
        items_processed: u64,
        items_indexed: u64,
        interrupted: bool,
    },
    Status {
        seconds_elapsed: u64,
        module_name: String,
        items_processed: u64,
        items_indexed: u64,
        items_remaining: u64,
    },
    Paused {
        reason: String,
    },
    Continued,
}

/// One dispatched batch, recorded by test doubles for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerCall {
    Pause,
    Continue,
    FilesCheck { module: String, paths: Vec<String> },
    FilesUpdate { module: String, paths: Vec<String> },
    FilesDelete { module: String, paths: Vec<String> },
    FileMove { module: String, from: String, to: String },
    FilesMove { module: String, from: Vec<String>, to: Vec<String> },
    VolumeUpdateState { udi: String, mount_point: String, mounted: bool },
    VolumeDisableAll,
}

/// The core's async client view of the Indexer process.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    async fn pause(&self) -> Result<()>;
    async fn r#continue(&self) -> Result<()>;
    async fn files_check(&self, module: &str, paths: &[String]) -> Result<()>;
    async fn files_update(&self, module: &str, paths: &[String]) -> Result<()>;
    async fn files_delete(&self, module: &str, paths: &[String]) -> Result<()>;
    async fn file_move(&self, module: &str, from: &str, to: &str) -> Result<()>;
    async fn files_move(&self, module: &str, from: &[String], to: &[String]) -> Result<()>;
    async fn volume_update_state(&self, udi: &str, mount_point: &str, mounted: bool) -> Result<()>;
    async fn volume_disable_all(&self) -> Result<()>;

    /// Takes ownership of the inbound-event receiver. Implementations that
    /// never emit events (e.g. [`NullIndexerClient`]) may return `None`.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<IndexerEvent>>;
}

/// Accepts every call as an immediate success and never emits inbound
/// events. Useful for smoke-testing the pipeline with indexing disabled.
pub struct NullIndexerClient;

#[async_trait]
impl IndexerClient for NullIndexerClient {
    async fn pause(&self) -> Result<()> {
        Ok(())
    }
    async fn r#continue(&self) -> Result<()> {
        Ok(())
    }
    async fn files_check(&self, _module: &str, _paths: &[String]) -> Result<()> {
        Ok(())
    }
    async fn files_update(&self, _module: &str, _paths: &[String]) -> Result<()> {
        Ok(())
    }
    async fn files_delete(&self, _module: &str, _paths: &[String]) -> Result<()> {
        Ok(())
    }
    async fn file_move(&self, _module: &str, _from: &str, _to: &str) -> Result<()> {
        Ok(())
    }
    async fn files_move(&self, _module: &str, _from: &[String], _to: &[String]) -> Result<()> {
        Ok(())
    }
    async fn volume_update_state(&self, _udi: &str, _mount_point: &str, _mounted: bool) -> Result<()> {
        Ok(())
    }
    async fn volume_disable_all(&self) -> Result<()> {
        Ok(())
    }
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<IndexerEvent>> {
        None
    }
}

/// An in-process, queue-backed double used by the test suite and by
/// `miner-daemon` when run with no real indexer configured.
///
/// Every call is recorded in order in `calls` and can optionally be made to
/// fail via [`InMemoryIndexerClient::fail_next`] to exercise the
/// re-enqueue-at-head retry path (§7).
pub struct InMemoryIndexerClient {
    calls: Mutex<Vec<IndexerCall>>,
    fail_next: Mutex<VecDeque<bool>>,
    events_tx: mpsc::UnboundedSender<IndexerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<IndexerEvent>>>,
}

impl InMemoryIndexerClient {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            calls: Mutex::new(Vec::new()),
            fail_next: Mutex::new(VecDeque::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Queues the next `n` calls to fail with a transient RPC error.
    pub fn fail_next(&self, n: usize) {
        let mut queue = self.fail_next.lock().unwrap();
        for _ in 0..n {
            queue.push_back(true);
        }
    }

    pub fn calls(&self) -> Vec<IndexerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn emit(&self, event: IndexerEvent) {
        let _ = self.events_tx.send(event);
    }

    fn record(&self, call: IndexerCall) -> Result<()> {
        if self.fail_next.lock().unwrap().pop_front().unwrap_or(false) {
            return Err(crate::error::MinerError::Indexer(format!(
                "simulated failure for {call:?}"
            )));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl Default for InMemoryIndexerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexerClient for InMemoryIndexerClient {
    async fn pause(&self) -> Result<()> {
        self.record(IndexerCall::Pause)
    }

    async fn r#continue(&self) -> Result<()> {
        self.record(IndexerCall::Continue)
    }

    async fn files_check(&self, module: &str, paths: &[String]) -> Result<()> {
        self.record(IndexerCall::FilesCheck {
            module: module.to_string(),
            paths: paths.to_vec(),
        })
    }

    async fn files_update(&self, module: &str, paths: &[String]) -> Result<()> {
        self.record(IndexerCall::FilesUpdate {
            module: module.to_string(),
            paths: paths.to_vec(),
        })
    }

    async fn files_delete(&self, module: &str, paths: &[String]) -> Result<()> {
        self.record(IndexerCall::FilesDelete {
            module: module.to_string(),
            paths: paths.to_vec(),
        })
    }

    async fn file_move(&self, module: &str, from: &str, to: &str) -> Result<()> {
        self.record(IndexerCall::FileMove {
            module: module.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    async fn files_move(&self, module: &str, from: &[String], to: &[String]) -> Result<()> {
        self.record(IndexerCall::FilesMove {
            module: module.to_string(),
            from: from.to_vec(),
            to: to.to_vec(),
        })
    }

    async fn volume_update_state(&self, udi: &str, mount_point: &str, mounted: bool) -> Result<()> {
        self.record(IndexerCall::VolumeUpdateState {
            udi: udi.to_string(),
            mount_point: mount_point.to_string(),
            mounted,
        })
    }

    async fn volume_disable_all(&self) -> Result<()> {
        self.record(IndexerCall::VolumeDisableAll)
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<IndexerEvent>> {
        self.events_rx.lock().unwrap().take()
    }
}
