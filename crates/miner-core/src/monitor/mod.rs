//! The Monitor component (§4.2): turns raw OS notifications into the four
//! item events the rest of the pipeline understands.
//!
//! `Monitor` owns a [`MonitorBackend`] trait object, a black-list of noisy
//! paths, and a pending-pair table for move correlation. It never talks to
//! the Indexer directly — raw events go in, [`MinerEvent`]s come out, and
//! the Processor is responsible for queueing and dispatch.

mod backend;
mod backends;
mod blacklist;
mod pairing;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use tokio::sync::mpsc::UnboundedReceiver;

pub use backend::{MonitorBackend, RawEventKind, RawWatchEvent};
pub use backends::{NotifyBackend, PollingBackend};

use blacklist::{Admission, Blacklist};
use pairing::{PairTable, Resolution};

use crate::error::Result;
use crate::events::MinerEvent;

/// How long after the last forwarded event the IO pause flag auto-clears
/// (§4.2 step 4).
const IO_QUIET_WINDOW: Duration = Duration::from_secs(5);

struct WatchEntry {
    module: String,
    recursive: bool,
}

pub struct Monitor {
    backend: Box<dyn MonitorBackend>,
    receiver: UnboundedReceiver<RawWatchEvent>,
    watches: FnvHashMap<PathBuf, WatchEntry>,
    blacklist: Blacklist,
    pairs: PairTable,
    last_forwarded_at: Option<Instant>,
}

impl Monitor {
    pub fn new(mut backend: Box<dyn MonitorBackend>) -> Self {
        let receiver = backend.take_receiver();
        Self {
            backend,
            receiver,
            watches: FnvHashMap::default(),
            blacklist: Blacklist::new(),
            pairs: PairTable::new(),
            last_forwarded_at: None,
        }
    }

    /// Adds a watch for `path` under `module`. Returns `false` (without
    /// touching the backend) once [`MonitorBackend::max_watches`] would be
    /// exceeded, so callers can fall back to crawl-only coverage for that
    /// root.
    pub fn add(&mut self, module: &str, path: &Path, recursive: bool) -> Result<bool> {
        if self.watches.len() as u32 >= self.backend.max_watches() {
            return Ok(false);
        }
        if self.watches.contains_key(path) {
            return Ok(true);
        }
        self.backend.add_watch(path)?;
        self.watches.insert(
            path.to_path_buf(),
            WatchEntry {
                module: module.to_string(),
                recursive,
            },
        );
        Ok(true)
    }

    pub fn remove(&mut self, path: &Path) -> Result<()> {
        if self.watches.remove(path).is_some() {
            self.backend.remove_watch(path)?;
            self.blacklist.remove(path);
        }
        Ok(())
    }

    /// Removes every watch rooted under `prefix` (§5 Cancellation: an
    /// unmounted device's watches no longer resolve to anything useful).
    pub fn remove_under(&mut self, prefix: &Path) -> Result<()> {
        let under: Vec<PathBuf> = self
            .watches
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect();
        for path in under {
            self.remove(&path)?;
        }
        Ok(())
    }

    pub fn is_watched(&self, module: &str, path: &Path) -> bool {
        self.watches
            .get(path)
            .is_some_and(|entry| entry.module == module)
    }

    /// Number of active watches, optionally restricted to one module.
    pub fn count(&self, module: Option<&str>) -> u32 {
        match module {
            Some(module) => self
                .watches
                .values()
                .filter(|entry| entry.module == module)
                .count() as u32,
            None => self.watches.len() as u32,
        }
    }

    /// Resolves the owning module for `path`: an exact watch match, or the
    /// nearest watched ancestor for paths the backend reports relative to
    /// a recursively-watched parent.
    fn resolve_module(&self, path: &Path) -> Option<&str> {
        if let Some(entry) = self.watches.get(path) {
            return Some(entry.module.as_str());
        }
        path.ancestors().skip(1).find_map(|ancestor| {
            self.watches.get(ancestor).and_then(|entry| {
                entry.recursive.then_some(entry.module.as_str())
            })
        })
    }

    /// Awaits and processes the next raw event from the backend, returning
    /// the [`MinerEvent`]s it produces. Returns `None` once the backend
    /// channel closes (backend torn down).
    pub async fn next(&mut self) -> Option<Vec<MinerEvent>> {
        let raw = self.receiver.recv().await?;
        Some(self.handle_raw_event(raw, Instant::now()))
    }

    /// Runs one raw event through the pipeline (§4.2 "Event pipeline for
    /// each raw event"):
    /// 1. drop low-value events (pure access/open/close-without-write)
    /// 2. resolve the owning module
    /// 3. black-list admission
    /// 4. pairing for half-moves
    /// 5. translate to `MinerEvent`s and record the forwarding timestamp
    fn handle_raw_event(&mut self, raw: RawWatchEvent, now: Instant) -> Vec<MinerEvent> {
        if matches!(raw.kind, RawEventKind::LowValue | RawEventKind::Overflow) {
            return Vec::new();
        }

        let Some(module) = self.resolve_module(&raw.path).map(str::to_string) else {
            return Vec::new();
        };

        if matches!(raw.kind, RawEventKind::MovedFrom | RawEventKind::MovedTo) {
            return self.handle_move_half(module, raw, now);
        }

        match self.blacklist.record(&raw.path, now) {
            Admission::Suppress => return Vec::new(),
            Admission::Allow => {}
        }

        let event = match raw.kind {
            RawEventKind::Create => MinerEvent::ItemCreated {
                module,
                file: raw.path,
            },
            RawEventKind::Update | RawEventKind::AttribChange => MinerEvent::ItemUpdated {
                module,
                file: raw.path,
            },
            RawEventKind::Delete | RawEventKind::DeleteSelf | RawEventKind::Unmount => {
                MinerEvent::ItemDeleted {
                    module,
                    file: raw.path,
                }
            }
            RawEventKind::MoveSelf => MinerEvent::ItemDeleted {
                module,
                file: raw.path,
            },
            RawEventKind::MovedFrom | RawEventKind::MovedTo | RawEventKind::LowValue | RawEventKind::Overflow => {
                unreachable!("handled above")
            }
        };

        self.last_forwarded_at = Some(now);
        vec![event]
    }

    fn handle_move_half(&mut self, module: String, raw: RawWatchEvent, now: Instant) -> Vec<MinerEvent> {
        let resolution = if raw.kind == RawEventKind::MovedFrom {
            self.pairs.record_from(raw.cookie, raw.path, now)
        } else {
            self.pairs.record_to(raw.cookie, raw.path, now)
        };

        let Some(resolution) = resolution else {
            return Vec::new();
        };

        self.last_forwarded_at = Some(now);
        match resolution {
            Resolution::Paired { source, target } => {
                let source_was_monitored = self.watches.contains_key(&source);
                vec![MinerEvent::ItemMoved {
                    module,
                    source,
                    target,
                    source_was_monitored,
                }]
            }
            Resolution::StrandedDelete(path) => vec![MinerEvent::ItemDeleted { module, file: path }],
            Resolution::StrandedCreate(path) => vec![MinerEvent::ItemCreated { module, file: path }],
        }
    }

    /// Sweeps the black-list and pair table for expired entries, returning
    /// any synthetic events they produce. Should be called on a steady
    /// timer by the owning event loop (the pair timeout is 2s; black-list
    /// quiescence is 30s, so a 1s tick comfortably catches both).
    pub fn sweep(&mut self, now: Instant) -> Vec<MinerEvent> {
        let mut events = Vec::new();

        for path in self.blacklist.sweep_expired(now) {
            let Some(module) = self.resolve_module(&path).map(str::to_string) else {
                continue;
            };
            events.push(MinerEvent::ItemCreated { module, file: path });
        }

        for resolution in self.pairs.sweep_expired(now) {
            let path = match &resolution {
                Resolution::StrandedDelete(path) | Resolution::StrandedCreate(path) => path.clone(),
                Resolution::Paired { .. } => continue,
            };
            let Some(module) = self.resolve_module(&path).map(str::to_string) else {
                continue;
            };
            match resolution {
                Resolution::StrandedDelete(path) => {
                    events.push(MinerEvent::ItemDeleted { module, file: path })
                }
                Resolution::StrandedCreate(path) => {
                    events.push(MinerEvent::ItemCreated { module, file: path })
                }
                Resolution::Paired { .. } => unreachable!(),
            }
        }

        if !events.is_empty() {
            self.last_forwarded_at = Some(now);
        }
        events
    }

    /// Whether the IO pause flag should currently be held: true for the
    /// 5-second quiet window following the most recently forwarded event.
    pub fn io_pause_active(&self, now: Instant) -> bool {
        self.last_forwarded_at
            .is_some_and(|at| now.duration_since(at) < IO_QUIET_WINDOW)
    }
}
