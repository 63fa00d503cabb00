//! End-to-end scenarios driving the full `Processor` loop against
//! in-process test doubles for the monitor backend, volume backend, and
//! indexer, exercising the behavior a real OS watcher + real Indexer would
//! trigger without needing either.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use miner_core::bus::Bus;
use miner_core::config::Config;
use miner_core::error::Result;
use miner_core::indexer::{IndexerCall, IndexerEvent, InMemoryIndexerClient};
use miner_core::model::{Device, Module};
use miner_core::monitor::{Monitor, MonitorBackend, RawEventKind, RawWatchEvent};
use miner_core::status::{RunLevel, StatusHandle};
use miner_core::volume::{VolumeBackend, VolumeEvent};
use miner_core::Processor;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{advance, sleep};

struct ChannelMonitorBackend {
    receiver: Option<UnboundedReceiver<RawWatchEvent>>,
}

impl MonitorBackend for ChannelMonitorBackend {
    fn add_watch(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
    fn remove_watch(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
    fn max_watches(&self) -> u32 {
        u32::MAX
    }
    fn delivers_changes_done(&self) -> bool {
        true
    }
    fn take_receiver(&mut self) -> UnboundedReceiver<RawWatchEvent> {
        self.receiver.take().unwrap()
    }
}

struct ChannelVolumeBackend {
    receiver: Option<UnboundedReceiver<VolumeEvent>>,
}

impl VolumeBackend for ChannelVolumeBackend {
    fn take_events(&mut self) -> UnboundedReceiver<VolumeEvent> {
        self.receiver.take().unwrap()
    }
    fn current_mounts(&self) -> (Vec<Device>, Vec<Device>) {
        (Vec::new(), Vec::new())
    }
    fn device_for_path(&self, _path: &Path) -> Option<Device> {
        None
    }
}

struct Harness {
    indexer: Arc<InMemoryIndexerClient>,
    raw_events: UnboundedSender<RawWatchEvent>,
    volume_events: UnboundedSender<VolumeEvent>,
    stop: Option<miner_core::StopHandle>,
}

fn spawn_processor(mut config: Config, module: &str, watch_root: &Path) -> Harness {
    let mut m = Module::new(module);
    m.watch_roots.push(watch_root.to_path_buf());
    config.modules.push(m);

    let bus = Bus::new(64);
    let indexer = Arc::new(InMemoryIndexerClient::new());
    let status = StatusHandle::new(bus.clone(), indexer.clone(), RunLevel::MainInstance);

    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let monitor = Monitor::new(Box::new(ChannelMonitorBackend {
        receiver: Some(raw_rx),
    }));

    let (vol_tx, vol_rx) = mpsc::unbounded_channel();
    let volume = Box::new(ChannelVolumeBackend {
        receiver: Some(vol_rx),
    });

    let (processor, stop) =
        Processor::new(config, bus, status, indexer.clone(), monitor, volume).unwrap();

    tokio::spawn(processor.run());

    Harness {
        indexer,
        raw_events: raw_tx,
        volume_events: vol_tx,
        stop: Some(stop),
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.stop();
        }
    }
}

/// S1: a bare create event on a watched path is queued and dispatched as a
/// single `files_check` call, with no crawl traffic since the module has no
/// crawl roots configured.
#[tokio::test(start_paused = true)]
async fn scenario_create_then_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let harness = spawn_processor(Config::default(), "files", dir.path());

    let target = dir.path().join("a.txt");
    harness
        .raw_events
        .send(RawWatchEvent {
            path: target.clone(),
            kind: RawEventKind::Create,
            cookie: 0,
        })
        .unwrap();

    advance(Duration::from_secs(2)).await;
    sleep(Duration::from_millis(1)).await;

    let calls = harness.indexer.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        IndexerCall::FilesCheck { paths, .. } if paths == &vec![target.to_string_lossy().to_string()]
    )));
}

/// S2/S3: a MovedFrom/MovedTo pair sharing a cookie collapses into one
/// `file_move` RPC instead of a delete-then-create pair.
#[tokio::test(start_paused = true)]
async fn scenario_paired_move_dispatches_a_single_file_move() {
    let dir = tempfile::tempdir().unwrap();
    let harness = spawn_processor(Config::default(), "files", dir.path());

    let old_path = dir.path().join("old.txt");
    let new_path = dir.path().join("new.txt");

    harness
        .raw_events
        .send(RawWatchEvent {
            path: old_path.clone(),
            kind: RawEventKind::MovedFrom,
            cookie: 7,
        })
        .unwrap();
    harness
        .raw_events
        .send(RawWatchEvent {
            path: new_path.clone(),
            kind: RawEventKind::MovedTo,
            cookie: 7,
        })
        .unwrap();

    advance(Duration::from_secs(2)).await;
    sleep(Duration::from_millis(1)).await;

    let calls = harness.indexer.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        IndexerCall::FileMove { from, to, .. }
            if from == &old_path.to_string_lossy().to_string()
                && to == &new_path.to_string_lossy().to_string()
    )));
    assert!(!calls
        .iter()
        .any(|call| matches!(call, IndexerCall::FilesDelete { .. })));
}

/// S3b: an unmatched MovedFrom with no corresponding MovedTo within the
/// pair timeout downgrades to a plain delete.
#[tokio::test(start_paused = true)]
async fn scenario_unmatched_move_half_becomes_a_delete() {
    let dir = tempfile::tempdir().unwrap();
    let harness = spawn_processor(Config::default(), "files", dir.path());
    let old_path = dir.path().join("gone.txt");

    harness
        .raw_events
        .send(RawWatchEvent {
            path: old_path.clone(),
            kind: RawEventKind::MovedFrom,
            cookie: 99,
        })
        .unwrap();

    advance(Duration::from_secs(4)).await;
    sleep(Duration::from_millis(1)).await;

    let calls = harness.indexer.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        IndexerCall::FilesDelete { paths, .. } if paths == &vec![old_path.to_string_lossy().to_string()]
    )));
}

/// S4: a burst past the black-list threshold is suppressed, and once the
/// path goes quiet for the quiescence window a single reconciling
/// `files_update` is dispatched instead of one call per raw event.
#[tokio::test(start_paused = true)]
async fn scenario_burst_is_blacklisted_then_reconciled() {
    let dir = tempfile::tempdir().unwrap();
    let harness = spawn_processor(Config::default(), "files", dir.path());
    let hot_path = dir.path().join("hot.txt");

    for _ in 0..10 {
        harness
            .raw_events
            .send(RawWatchEvent {
                path: hot_path.clone(),
                kind: RawEventKind::Update,
                cookie: 0,
            })
            .unwrap();
    }
    advance(Duration::from_secs(1)).await;
    sleep(Duration::from_millis(1)).await;

    let update_calls_during_burst = harness
        .indexer
        .calls()
        .iter()
        .filter(|call| matches!(call, IndexerCall::FilesUpdate { .. }))
        .count();
    assert!(update_calls_during_burst < 10);

    advance(Duration::from_secs(31)).await;
    sleep(Duration::from_millis(1)).await;

    let update_calls_after_quiescence = harness
        .indexer
        .calls()
        .iter()
        .filter(|call| matches!(call, IndexerCall::FilesUpdate { .. }))
        .count();
    assert!(update_calls_after_quiescence > update_calls_during_burst);
}

/// A removable device mount reports its state to the Indexer.
#[tokio::test(start_paused = true)]
async fn scenario_device_mount_reports_volume_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.index_removable_devices = true;
    let harness = spawn_processor(config, "files", dir.path());

    let device = Device {
        udi: "usb-1".into(),
        mount_point: PathBuf::from("/media/usb"),
        mounted: true,
    };
    harness
        .volume_events
        .send(VolumeEvent::Mounted(device))
        .unwrap();

    advance(Duration::from_secs(1)).await;
    sleep(Duration::from_millis(1)).await;

    let calls = harness.indexer.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        IndexerCall::VolumeUpdateState { udi, mounted: true, .. } if udi == "usb-1"
    )));
}

/// The processor loop exits promptly once asked to stop, leaving no further
/// dispatch traffic.
#[tokio::test(start_paused = true)]
async fn scenario_stop_handle_ends_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = spawn_processor(Config::default(), "files", dir.path());

    let stop = harness.stop.take().unwrap();
    stop.stop();
    advance(Duration::from_secs(1)).await;
    sleep(Duration::from_millis(1)).await;

    let calls_at_stop = harness.indexer.calls().len();

    harness
        .raw_events
        .send(RawWatchEvent {
            path: dir.path().join("after-stop.txt"),
            kind: RawEventKind::Create,
            cookie: 0,
        })
        .ok();
    advance(Duration::from_secs(2)).await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(harness.indexer.calls().len(), calls_at_stop);
}

/// S5: while paused, queued work accumulates undispatched; once unpaused,
/// the drain resumes in priority order (Deleted before Created) with the
/// two created paths from one tick folded into a single batched call.
#[tokio::test(start_paused = true)]
async fn scenario_pause_preserves_order() {
    let dir = tempfile::tempdir().unwrap();
    let harness = spawn_processor(Config::default(), "files", dir.path());

    harness.indexer.emit(IndexerEvent::Paused {
        reason: "manual".into(),
    });
    advance(Duration::from_millis(10)).await;
    sleep(Duration::from_millis(1)).await;

    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    let c = dir.path().join("c.txt");
    harness
        .raw_events
        .send(RawWatchEvent {
            path: b.clone(),
            kind: RawEventKind::Delete,
            cookie: 0,
        })
        .unwrap();
    harness
        .raw_events
        .send(RawWatchEvent {
            path: a.clone(),
            kind: RawEventKind::Create,
            cookie: 0,
        })
        .unwrap();
    harness
        .raw_events
        .send(RawWatchEvent {
            path: c.clone(),
            kind: RawEventKind::Create,
            cookie: 0,
        })
        .unwrap();

    advance(Duration::from_secs(2)).await;
    sleep(Duration::from_millis(1)).await;

    // Still paused: the only recorded call is the Pause RPC itself.
    assert_eq!(harness.indexer.calls(), vec![IndexerCall::Pause]);

    harness.indexer.emit(IndexerEvent::Continued);
    advance(Duration::from_secs(3)).await;
    sleep(Duration::from_millis(1)).await;

    let calls = harness.indexer.calls();
    let delete_position = calls.iter().position(|call| {
        matches!(
            call,
            IndexerCall::FilesDelete { paths, .. } if paths == &vec![b.to_string_lossy().to_string()]
        )
    });
    let check_position = calls.iter().position(|call| {
        matches!(
            call,
            IndexerCall::FilesCheck { paths, .. }
                if paths == &vec![a.to_string_lossy().to_string(), c.to_string_lossy().to_string()]
        )
    });
    assert!(delete_position.is_some() && check_position.is_some());
    assert!(delete_position < check_position);
}

/// S6: unmounting a device cancels pending work queued under its mount
/// point — the watch is dropped and the queued creates are never dispatched
/// — while still reporting the unmount to the Indexer.
#[tokio::test(start_paused = true)]
async fn scenario_unmount_cancels_pending_work() {
    let dir = tempfile::tempdir().unwrap();
    let harness = spawn_processor(Config::default(), "files", dir.path());

    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    harness
        .raw_events
        .send(RawWatchEvent {
            path: a.clone(),
            kind: RawEventKind::Create,
            cookie: 0,
        })
        .unwrap();
    harness
        .raw_events
        .send(RawWatchEvent {
            path: b.clone(),
            kind: RawEventKind::Create,
            cookie: 0,
        })
        .unwrap();

    let device = Device {
        udi: "usb-1".into(),
        mount_point: dir.path().to_path_buf(),
        mounted: true,
    };
    harness
        .volume_events
        .send(VolumeEvent::Unmounted(device))
        .unwrap();

    advance(Duration::from_secs(3)).await;
    sleep(Duration::from_millis(1)).await;

    let calls = harness.indexer.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        IndexerCall::VolumeUpdateState { udi, mounted: false, .. } if udi == "usb-1"
    )));
    assert!(!calls.iter().any(|call| matches!(
        call,
        IndexerCall::FilesCheck { paths, .. }
            if paths.iter().any(|p| *p == a.to_string_lossy() || *p == b.to_string_lossy())
    )));
}
