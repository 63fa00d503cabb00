//! Polling fallback `MonitorBackend`, used when native notification is
//! unavailable or the caller opts out of it (§9: "a polling fallback").

use std::path::Path;
use std::time::Duration;

use notify::event::{ModifyKind, RemoveKind};
use notify::{Config as NotifyConfig, EventKind as NotifyEventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::warn;

use crate::error::{MinerError, Result};
use crate::monitor::backend::{MonitorBackend, RawEventKind, RawWatchEvent};

/// Polling has no kernel-enforced watch cap; this is a conservative bound
/// to keep the poll sweep itself cheap.
const POLLING_MAX_WATCHES: u32 = 2048;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct PollingBackend {
    watcher: PollWatcher,
    receiver: Option<UnboundedReceiver<RawWatchEvent>>,
}

impl PollingBackend {
    pub fn new() -> Result<Self> {
        let (raw_tx, raw_rx) = crossbeam_channel::unbounded::<notify::Result<notify::Event>>();
        let config = NotifyConfig::default().with_poll_interval(POLL_INTERVAL);
        let watcher = PollWatcher::new(
            move |event: notify::Result<notify::Event>| {
                let _ = raw_tx.send(event);
            },
            config,
        )
        .map_err(|error| MinerError::Monitor(format!("failed to start poll watcher: {error}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || {
            while let Ok(event) = raw_rx.recv() {
                match event {
                    Ok(event) => {
                        for raw in translate_event(event) {
                            if tx.send(raw).is_err() {
                                return;
                            }
                        }
                    }
                    Err(error) => warn!(%error, "poll watcher reported an error"),
                }
            }
        });

        Ok(Self {
            watcher,
            receiver: Some(rx),
        })
    }
}

impl MonitorBackend for PollingBackend {
    fn add_watch(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|error| {
                MinerError::Monitor(format!("failed to watch {}: {error}", path.display()))
            })
    }

    fn remove_watch(&mut self, path: &Path) -> Result<()> {
        self.watcher.unwatch(path).map_err(|error| {
            MinerError::Monitor(format!("failed to unwatch {}: {error}", path.display()))
        })
    }

    fn max_watches(&self) -> u32 {
        POLLING_MAX_WATCHES
    }

    fn delivers_changes_done(&self) -> bool {
        // Polling only ever observes "the file is different now".
        false
    }

    fn take_receiver(&mut self) -> UnboundedReceiver<RawWatchEvent> {
        self.receiver.take().expect("take_receiver called twice")
    }
}

fn translate_event(event: notify::Event) -> Vec<RawWatchEvent> {
    let kind = match event.kind {
        NotifyEventKind::Create(_) => RawEventKind::Create,
        NotifyEventKind::Modify(ModifyKind::Data(_)) | NotifyEventKind::Modify(ModifyKind::Any) => {
            RawEventKind::Update
        }
        NotifyEventKind::Remove(RemoveKind::Any) | NotifyEventKind::Remove(_) => {
            RawEventKind::Delete
        }
        _ => RawEventKind::LowValue,
    };
    event
        .paths
        .into_iter()
        .map(|path| RawWatchEvent { path, kind, cookie: 0 })
        .collect()
}
