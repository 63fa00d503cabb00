//! Cross-platform `MonitorBackend` wrapping the `notify` crate.
//!
//! `notify` selects inotify on Linux, FSEvents on macOS, and
//! ReadDirectoryChangesW on Windows under its `RecommendedWatcher`. The
//! watcher callback runs on a thread `notify` owns; we bridge it into async
//! Rust with a `crossbeam-channel` plus a `tokio::task::spawn_blocking`
//! pump, the same shape the teacher crate uses to connect its OS watcher
//! callback to its single state-owning consumer.

use std::path::Path;

use notify::event::{ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind as NotifyEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::warn;

use crate::error::{MinerError, Result};
use crate::monitor::backend::{MonitorBackend, RawEventKind, RawWatchEvent};

/// Default conservative watch cap used on platforms other than Linux,
/// where we cannot cheaply query a kernel-enforced maximum.
const DEFAULT_MAX_WATCHES: u32 = 8192;
/// Linux reserves headroom for other applications sharing the same
/// per-user inotify budget.
const LINUX_WATCH_HEADROOM: u32 = 500;

pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    max_watches: u32,
    receiver: Option<UnboundedReceiver<RawWatchEvent>>,
}

impl NotifyBackend {
    pub fn new() -> Result<Self> {
        let (raw_tx, raw_rx) = crossbeam_channel::unbounded::<notify::Result<notify::Event>>();
        let watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = raw_tx.send(event);
        })
        .map_err(|error| MinerError::Monitor(format!("failed to start watcher: {error}")))?;

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
                    Err(error) => {
                        warn!(%error, "monitor backend reported an error");
                    }
                }
            }
        });

        Ok(Self {
            watcher,
            max_watches: linux_watch_cap(),
            receiver: Some(rx),
        })
    }
}

impl MonitorBackend for NotifyBackend {
    fn add_watch(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|error| {
                MinerError::Monitor(format!("failed to watch {}: {error}", path.display()))
            })
    }

    fn remove_watch(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .unwatch(path)
            .map_err(|error| {
                MinerError::Monitor(format!("failed to unwatch {}: {error}", path.display()))
            })
    }

    fn max_watches(&self) -> u32 {
        self.max_watches
    }

    fn delivers_changes_done(&self) -> bool {
        // inotify's IN_CLOSE_WRITE gives us a real "changes done" signal on
        // Linux; other notify backends coalesce to plain modify events.
        cfg!(target_os = "linux")
    }

    fn take_receiver(&mut self) -> UnboundedReceiver<RawWatchEvent> {
        self.receiver.take().expect("take_receiver called twice")
    }
}

fn translate_event(event: notify::Event) -> Vec<RawWatchEvent> {
    let cookie = event.attrs.tracker().map(|t| t as u64).unwrap_or(0);

    let kind = match event.kind {
        NotifyEventKind::Create(_) => RawEventKind::Create,
        NotifyEventKind::Modify(ModifyKind::Name(RenameMode::From)) => RawEventKind::MovedFrom,
        NotifyEventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawEventKind::MovedTo,
        NotifyEventKind::Modify(ModifyKind::Data(_)) => RawEventKind::Update,
        NotifyEventKind::Modify(ModifyKind::Metadata(_)) => RawEventKind::AttribChange,
        NotifyEventKind::Modify(_) => RawEventKind::Update,
        NotifyEventKind::Remove(RemoveKind::Any) | NotifyEventKind::Remove(_) => {
            RawEventKind::Delete
        }
        NotifyEventKind::Access(_) => RawEventKind::LowValue,
        NotifyEventKind::Other | NotifyEventKind::Any => RawEventKind::LowValue,
    };

    event
        .paths
        .into_iter()
        .map(|path| RawWatchEvent { path, kind, cookie })
        .collect()
}

fn linux_watch_cap() -> u32 {
    if !cfg!(target_os = "linux") {
        return DEFAULT_MAX_WATCHES;
    }
    std::fs::read_to_string("/proc/sys/fs/inotify/max_user_watches")
        .ok()
        .and_then(|contents| contents.trim().parse::<u32>().ok())
        .map(|cap| cap.saturating_sub(LINUX_WATCH_HEADROOM))
        .unwrap_or(DEFAULT_MAX_WATCHES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_cap_has_headroom_on_non_linux_default() {
        if !cfg!(target_os = "linux") {
            assert_eq!(linux_watch_cap(), DEFAULT_MAX_WATCHES);
        }
    }
}
