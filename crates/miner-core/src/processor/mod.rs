//! The Processor component (§4.4): the single event loop that owns the
//! Monitor, the per-module Crawlers, the volume backend, and the dispatch
//! queues, and is the only thing that ever calls the Indexer.
//!
//! Everything here runs on one task. The only code outside this module
//! that spawns its own task is the OS-notification bridge inside a
//! [`crate::monitor::MonitorBackend`] implementation; every other
//! component is driven cooperatively from [`Processor::run`]'s
//! `tokio::select!` loop, per the single-threaded event loop model.

mod queue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{debug, info, warn};

pub use queue::QueueSet;

use crate::bus::Bus;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::events::MinerEvent;
use crate::indexer::{IndexerClient, IndexerEvent};
use crate::model::{Device, EventKind, Module, PathItem};
use crate::monitor::Monitor;
use crate::status::{PauseReason, RunState, StatusHandle};
use crate::volume::{VolumeBackend, VolumeEvent};

/// How often the drain/crawl/sweep tick fires. §5 calls for a quick path
/// around 1s when there is queued work and a slower steady tick otherwise;
/// ticking every second and no-op'ing when idle gets the same effect with
/// one timer instead of two.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct Processor {
    config: Config,
    bus: Bus,
    status: StatusHandle,
    indexer: Arc<dyn IndexerClient>,
    monitor: Monitor,
    volume: Box<dyn VolumeBackend>,
    crawlers: HashMap<String, Crawler>,
    queues: QueueSet,
    devices: HashMap<String, Device>,
    stop_rx: Option<oneshot::Receiver<()>>,
}

pub struct StopHandle(oneshot::Sender<()>);

impl StopHandle {
    pub fn stop(self) {
        let _ = self.0.send(());
    }
}

fn path_string(path: &std::path::Path) -> String {
    path.to_string_lossy().to_string()
}

fn paths_of(items: &[PathItem]) -> Vec<String> {
    items.iter().map(|item| path_string(&item.file)).collect()
}

impl Processor {
    pub fn new(
        config: Config,
        bus: Bus,
        status: StatusHandle,
        indexer: Arc<dyn IndexerClient>,
        mut monitor: Monitor,
        volume: Box<dyn VolumeBackend>,
    ) -> crate::error::Result<(Self, StopHandle)> {
        let mut crawlers = HashMap::new();
        for module in &config.modules {
            if !module.enabled || config.is_module_disabled(&module.name) {
                continue;
            }
            crawlers.insert(module.name.clone(), Crawler::new(&config, module.clone())?);

            if config.enable_watches {
                for root in &module.watch_roots {
                    if !monitor.add(&module.name, root, true)? {
                        warn!(module = %module.name, root = %root.display(), "watch limit reached, falling back to crawl-only coverage");
                    }
                }
            }
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        Ok((
            Self {
                config,
                bus,
                status,
                indexer,
                monitor,
                volume,
                crawlers,
                queues: QueueSet::new(),
                devices: HashMap::new(),
                stop_rx: Some(stop_rx),
            },
            StopHandle(stop_tx),
        ))
    }

    /// Directly injects a file-changed report from outside the monitor
    /// (§4.4 public contract). Respects the module's filter predicate like
    /// every other ingestion path.
    pub fn report_file_updated(&mut self, module: &str, path: std::path::PathBuf) {
        self.enqueue_if_admitted(module, EventKind::Updated, path, None);
    }

    /// Directly injects a file-created report, dispatched as `FilesCheck`
    /// rather than `FilesUpdate` (§4.4 public contract).
    pub fn report_file_created(&mut self, module: &str, path: std::path::PathBuf) {
        self.enqueue_if_admitted(module, EventKind::Created, path, None);
    }

    /// Directly injects a file-deleted report (§4.4 public contract).
    pub fn report_file_deleted(&mut self, module: &str, path: std::path::PathBuf) {
        self.enqueue_if_admitted(module, EventKind::Deleted, path, None);
    }

    /// Directly injects a file-moved report (§4.4 public contract).
    pub fn report_file_moved(&mut self, module: &str, source: std::path::PathBuf, target: std::path::PathBuf) {
        self.enqueue_if_admitted(module, EventKind::Moved, target, Some(source));
    }

    fn enqueue_if_admitted(
        &mut self,
        module: &str,
        kind: EventKind,
        path: std::path::PathBuf,
        source: Option<std::path::PathBuf>,
    ) {
        let is_dir = path.is_dir();
        let admitted = self
            .crawlers
            .get(module)
            .map(|crawler| !crawler.is_path_ignored(&path, is_dir))
            .unwrap_or(true);
        if !admitted {
            return;
        }
        let item = match source {
            Some(source) => PathItem::moved(module, source, path),
            None => PathItem::new(module, path),
        };
        self.queues.push(kind, item);
    }

    fn route_monitor_event(&mut self, event: MinerEvent) {
        self.bus.publish(event.clone());
        match event {
            MinerEvent::ItemCreated { module, file } => {
                self.enqueue_if_admitted(&module, EventKind::Created, file, None)
            }
            MinerEvent::ItemUpdated { module, file } => {
                self.enqueue_if_admitted(&module, EventKind::Updated, file, None)
            }
            MinerEvent::ItemDeleted { module, file } => {
                self.enqueue_if_admitted(&module, EventKind::Deleted, file, None)
            }
            MinerEvent::ItemMoved {
                module,
                source,
                target,
                ..
            } => self.enqueue_if_admitted(&module, EventKind::Moved, target, Some(source)),
            _ => {}
        }
    }

    async fn handle_volume_event(&mut self, event: VolumeEvent) {
        match event {
            VolumeEvent::Mounted(device) => {
                self.devices.insert(device.udi.clone(), device.clone());
                if self.config.index_removable_devices {
                    let _ = self
                        .indexer
                        .volume_update_state(&device.udi, &device.mount_point.to_string_lossy(), true)
                        .await;
                    self.add_mount_as_crawl_root(&device);
                }
                self.bus.publish(MinerEvent::DeviceAdded(device));
            }
            VolumeEvent::Unmounted(device) => {
                self.devices.remove(&device.udi);
                let _ = self
                    .indexer
                    .volume_update_state(&device.udi, &device.mount_point.to_string_lossy(), false)
                    .await;
                self.cancel_work_under(&device.mount_point);
                self.bus.publish(MinerEvent::DeviceRemoved(device));
            }
        }
    }

    /// Cancels every piece of pending or in-flight work rooted under
    /// `prefix` (§5 Cancellation, scenario S6): removes monitor watches,
    /// drops queued dispatch items, and cancels whatever crawl progress
    /// that path still has queued.
    fn cancel_work_under(&mut self, prefix: &std::path::Path) {
        if let Err(error) = self.monitor.remove_under(prefix) {
            warn!(%error, prefix = %prefix.display(), "failed to remove watches under unmounted path");
        }
        self.queues.remove_under(prefix);
        for crawler in self.crawlers.values_mut() {
            crawler.cancel_under(prefix);
        }
    }

    fn add_mount_as_crawl_root(&mut self, device: &Device) {
        for (name, crawler) in self.crawlers.iter_mut() {
            if !self.config.index_mounted_directories {
                continue;
            }
            crawler.special_paths_add(device.mount_point.clone());
            debug!(module = name, mount = %device.mount_point.display(), "queued removable mount for crawl");
        }
    }

    async fn handle_indexer_event(&mut self, event: IndexerEvent) {
        match event {
            IndexerEvent::Finished { interrupted, .. } => {
                if !interrupted {
                    self.status.set_state(RunState::Idle);
                    self.bus.publish(MinerEvent::Finished);
                }
            }
            IndexerEvent::Paused { reason } => {
                warn!(%reason, "indexer reported an out-of-band pause");
                self.status.set_pause(PauseReason::External, true).await;
            }
            IndexerEvent::Continued => {
                self.status.set_pause(PauseReason::External, false).await;
            }
            IndexerEvent::Started | IndexerEvent::Status { .. } => {}
        }
    }

    /// Advances every still-running crawler by one tick and routes the
    /// events it produces into the dispatch queues.
    async fn tick_crawlers(&mut self) {
        for crawler in self.crawlers.values_mut() {
            if !crawler.is_running() {
                continue;
            }
            for event in crawler.tick().await {
                self.bus.publish(event.clone());
                match event {
                    MinerEvent::ProcessingFile { module, path } => {
                        let item = PathItem::new(module, path);
                        self.queues.push(EventKind::Created, item);
                    }
                    MinerEvent::CrawlFinished { module, stats, .. } => {
                        info!(module = %module, found = stats.files_found, ignored = stats.files_ignored, "crawl finished");
                    }
                    _ => {}
                }
            }
        }
    }

    /// Starts every configured module's crawler that has roots to walk.
    pub fn start_crawls(&mut self) {
        for crawler in self.crawlers.values_mut() {
            crawler.start();
        }
        self.status.set_state(RunState::Indexing);
    }

    /// Dispatches at most one batched RPC per tick: the first non-empty
    /// `(kind, module)` queue, in priority-then-module order, is drained up
    /// to the 1000-item limit into one call (§4.4 + §6). Only one RPC is
    /// ever in flight; a failed call is pushed back to the front of its
    /// queue, preserving order, so it is retried before newer work (§7).
    async fn drain_queues(&mut self) {
        if self.status.is_paused() {
            return;
        }
        let module_order: Vec<String> = self.config.modules.iter().map(|m| m.name.clone()).collect();
        let Some((module, kind, items)) = self.queues.drain_next_batch(&module_order) else {
            return;
        };

        let count = items.len();
        let result = self.dispatch_batch(&module, kind, &items).await;
        if let Err(error) = result {
            warn!(module = %module, ?kind, count, %error, "batch dispatch failed, re-enqueuing at head");
            self.queues.push_front_batch(&module, kind, items);
        }
    }

    async fn dispatch_batch(&self, module: &str, kind: EventKind, items: &[PathItem]) -> crate::error::Result<()> {
        match kind {
            EventKind::Created => {
                let paths = paths_of(items);
                self.indexer.files_check(module, &paths).await
            }
            EventKind::Updated => {
                let paths = paths_of(items);
                self.indexer.files_update(module, &paths).await
            }
            EventKind::Deleted => {
                let paths = paths_of(items);
                self.indexer.files_delete(module, &paths).await
            }
            EventKind::Moved => {
                if let [item] = items {
                    let from = item.source_file.as_deref().map(path_string).unwrap_or_default();
                    let to = path_string(&item.file);
                    self.indexer.file_move(module, &from, &to).await
                } else {
                    let from: Vec<String> = items
                        .iter()
                        .map(|item| item.source_file.as_deref().map(path_string).unwrap_or_default())
                        .collect();
                    let to: Vec<String> = items.iter().map(|item| path_string(&item.file)).collect();
                    self.indexer.files_move(module, &from, &to).await
                }
            }
        }
    }

    /// The main event loop. Runs until [`StopHandle::stop`] is called.
    pub async fn run(mut self) -> crate::error::Result<()> {
        let mut stop_rx = self.stop_rx.take().expect("run called twice");
        let mut volume_events = self.volume.take_events();
        let mut indexer_events = self.indexer.take_events();
        let mut ticker = interval(TICK_INTERVAL);

        self.bus.publish(MinerEvent::ProcessorStarted);
        self.status.set_state(RunState::Watching);
        self.start_crawls();

        loop {
            tokio::select! {
                biased;

                _ = &mut stop_rx => {
                    info!("processor stopping");
                    self.status.set_state(RunState::Shutdown);
                    return Ok(());
                }

                Some(events) = self.monitor.next() => {
                    for event in events {
                        self.route_monitor_event(event);
                    }
                }

                Some(event) = volume_events.recv() => {
                    self.handle_volume_event(event).await;
                }

                Some(event) = async {
                    match indexer_events.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.handle_indexer_event(event).await;
                }

                _ = ticker.tick() => {
                    self.tick_crawlers().await;
                    self.drain_queues().await;

                    let now = Instant::now();
                    for event in self.monitor.sweep(now) {
                        self.route_monitor_event(event);
                    }

                    let io_busy = self.monitor.io_pause_active(now);
                    self.status.set_pause(PauseReason::Io, io_busy).await;
                }
            }
        }
    }
}
