//! Disk-space and battery watchdogs (§4.1).
//!
//! Both watchdogs are expressed as a small sampling trait plus a spawned
//! `tokio` task that ticks on a fixed interval, mirroring the teacher's
//! `ClipboardProvider`/`NullClipboardProvider` split: production sampling
//! goes through a real crate (`sysinfo`, `starship-battery`), tests swap in
//! a `Fixed*Source` double that returns a scripted sequence of readings.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{PauseReason, StatusHandle};

const DISK_SPACE_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
const BATTERY_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
const BATTERY_LOW_PERCENT: f32 = 5.0;

/// Reports free space for a data directory, as a percentage of total.
pub trait DiskSpaceSource: Send + Sync {
    /// Returns `None` if the directory's filesystem could not be queried.
    fn free_space_percent(&self, data_directory: &Path) -> Option<f64>;
}

/// Production [`DiskSpaceSource`] backed by `sysinfo`'s disk listing,
/// matching the free/total space against the longest mount-point prefix of
/// `data_directory`.
pub struct SysinfoDiskSpaceSource;

impl DiskSpaceSource for SysinfoDiskSpaceSource {
    fn free_space_percent(&self, data_directory: &Path) -> Option<f64> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let mut best: Option<(&Path, u64, u64)> = None;
        for disk in disks.list() {
            let mount = disk.mount_point();
            if data_directory.starts_with(mount) {
                let better = match best {
                    Some((current, _, _)) => mount.components().count() > current.components().count(),
                    None => true,
                };
                if better {
                    best = Some((mount, disk.available_space(), disk.total_space()));
                }
            }
        }
        best.and_then(|(_, available, total)| {
            if total == 0 {
                None
            } else {
                Some((available as f64 / total as f64) * 100.0)
            }
        })
    }
}

/// Test double: returns a scripted sequence of readings, repeating the
/// last value once exhausted.
pub struct FixedDiskSpaceSource {
    readings: Vec<f64>,
    cursor: AtomicUsize,
}

impl FixedDiskSpaceSource {
    pub fn new(readings: Vec<f64>) -> Self {
        Self {
            readings,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl DiskSpaceSource for FixedDiskSpaceSource {
    fn free_space_percent(&self, _data_directory: &Path) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(self.readings[index.min(self.readings.len() - 1)])
    }
}

/// Reports battery charge percentage and AC-power status.
pub trait BatterySource: Send + Sync {
    /// Returns `None` when the platform exposes no battery (desktop, or a
    /// battery manager that failed to initialise).
    fn sample(&self) -> Option<BatteryReading>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub percent: f32,
    pub on_battery: bool,
}

/// Production [`BatterySource`] backed by `starship-battery`.
#[cfg(not(target_os = "windows"))]
pub struct StarshipBatterySource {
    manager: starship_battery::Manager,
}

#[cfg(not(target_os = "windows"))]
impl StarshipBatterySource {
    pub fn new() -> Option<Self> {
        starship_battery::Manager::new().ok().map(|manager| Self { manager })
    }
}

#[cfg(not(target_os = "windows"))]
impl BatterySource for StarshipBatterySource {
    fn sample(&self) -> Option<BatteryReading> {
        let mut batteries = self.manager.batteries().ok()?;
        let battery = batteries.next()?.ok()?;
        let percent = battery.state_of_charge().value * 100.0;
        let on_battery = battery.state() == starship_battery::State::Discharging;
        Some(BatteryReading { percent, on_battery })
    }
}

/// Test double: returns a scripted sequence of readings.
pub struct FixedBatterySource {
    readings: Vec<Option<BatteryReading>>,
    cursor: AtomicUsize,
}

impl FixedBatterySource {
    pub fn new(readings: Vec<Option<BatteryReading>>) -> Self {
        Self {
            readings,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl BatterySource for FixedBatterySource {
    fn sample(&self) -> Option<BatteryReading> {
        if self.readings.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.readings[index.min(self.readings.len() - 1)]
    }
}

/// Spawns the disk-space watchdog task. Sampling only happens while (a)
/// already paused for space, or (b) the aggregate state is `Indexing` or
/// `Optimizing` — callers pass `should_sample` to express that predicate
/// without the watchdog needing a reference to the Processor.
///
/// `limit_percent < 1` disables the watchdog entirely.
pub fn spawn_disk_space_watchdog(
    status: StatusHandle,
    source: std::sync::Arc<dyn DiskSpaceSource>,
    data_directory: PathBuf,
    limit_percent: i32,
    should_sample: impl Fn() -> bool + Send + Sync + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if limit_percent < 1 {
            debug!("disk space watchdog disabled (limit_percent < 1)");
            return;
        }
        let mut interval = tokio::time::interval(DISK_SPACE_SAMPLE_INTERVAL);
        loop {
            interval.tick().await;
            let already_paused = status.snapshot().paused.disk_space;
            if !already_paused && !should_sample() {
                continue;
            }
            let Some(percent) = source.free_space_percent(&data_directory) else {
                continue;
            };
            let low = percent <= limit_percent as f64;
            if low != already_paused {
                status.set_pause(PauseReason::DiskSpace, low).await;
            }
        }
    })
}

/// Spawns the battery watchdog task. Pauses at <= 5% charge while on
/// battery; restores on recovery or AC power. Returns the desired crawl
/// throttle profile alongside the pause decision via `on_profile_change`
/// so the caller can switch the crawler between its default and battery
/// throttle profiles (§4.1).
pub fn spawn_battery_watchdog(
    status: StatusHandle,
    source: std::sync::Arc<dyn BatterySource>,
    on_profile_change: impl Fn(bool) + Send + Sync + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(BATTERY_SAMPLE_INTERVAL);
        loop {
            interval.tick().await;
            let Some(reading) = source.sample() else {
                continue;
            };
            on_profile_change(reading.on_battery);
            let should_pause = reading.on_battery && reading.percent <= BATTERY_LOW_PERCENT;
            let currently_paused = status.snapshot().paused.battery;
            if should_pause != currently_paused {
                if should_pause {
                    warn!(percent = reading.percent, "battery critically low; pausing indexing");
                }
                status.set_pause(PauseReason::Battery, should_pause).await;
            }
        }
    })
}
