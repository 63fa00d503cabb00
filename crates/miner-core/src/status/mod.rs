//! Status / RunLevel (§4.1): the single source of truth for whether the
//! core is allowed to do work, and for transitioning the Indexer between
//! running and paused.

mod runlevel;
mod watchdog;

pub use runlevel::{check_run_level, LockFileGuard, RunLevel};
pub use watchdog::{
    spawn_battery_watchdog, spawn_disk_space_watchdog, BatterySource, DiskSpaceSource,
    FixedBatterySource, FixedDiskSpaceSource, SysinfoDiskSpaceSource,
};
#[cfg(not(target_os = "windows"))]
pub use watchdog::StarshipBatterySource;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bus::Bus;
use crate::events::MinerEvent;
use crate::indexer::IndexerClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Initializing,
    Watching,
    Pending,
    Indexing,
    Paused,
    Optimizing,
    Idle,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Manual,
    Battery,
    Io,
    DiskSpace,
    External,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PauseFlags {
    pub manual: bool,
    pub battery: bool,
    pub io: bool,
    pub disk_space: bool,
    pub external: bool,
    pub other: bool,
}

impl PauseFlags {
    pub fn any(&self) -> bool {
        self.manual || self.battery || self.io || self.disk_space || self.external || self.other
    }

    fn flag_mut(&mut self, reason: PauseReason) -> &mut bool {
        match reason {
            PauseReason::Manual => &mut self.manual,
            PauseReason::Battery => &mut self.battery,
            PauseReason::Io => &mut self.io,
            PauseReason::DiskSpace => &mut self.disk_space,
            PauseReason::External => &mut self.external,
            PauseReason::Other => &mut self.other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub state: RunState,
    pub is_readonly: bool,
    pub is_first_time: bool,
    pub in_merge: bool,
    pub paused: PauseFlags,
    pub status_before_paused: Option<RunState>,
}

impl Status {
    fn new(initial_state: RunState, is_readonly: bool, is_first_time: bool) -> Self {
        Self {
            state: initial_state,
            is_readonly,
            is_first_time,
            in_merge: false,
            paused: PauseFlags::default(),
            status_before_paused: None,
        }
    }
}

/// Owns the run-state machine and mediates Pause/Continue RPCs to the
/// Indexer. Cheaply cloneable; clones share the same underlying state.
#[derive(Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<Status>>,
    bus: Bus,
    indexer: Arc<dyn IndexerClient>,
}

impl StatusHandle {
    pub fn new(bus: Bus, indexer: Arc<dyn IndexerClient>, run_level: RunLevel) -> Self {
        let is_readonly = matches!(run_level, RunLevel::ReadOnly);
        let status = Status::new(RunState::Initializing, is_readonly, false, );
        Self {
            inner: Arc::new(RwLock::new(status)),
            bus,
            indexer,
        }
    }

    pub fn snapshot(&self) -> Status {
        *self.inner.read()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().paused.any()
    }

    /// Legal from any state except `Paused`, where the request is recorded
    /// in `status_before_paused` and honoured once every pause flag clears.
    pub fn set_state(&self, new_state: RunState) {
        let mut status = self.inner.write();
        if status.state == RunState::Paused {
            status.status_before_paused = Some(new_state);
            return;
        }
        if status.state == new_state {
            return;
        }
        status.state = new_state;
        let emitted = status.state;
        drop(status);
        info!(state = ?emitted, "run state changed");
        self.bus.publish(MinerEvent::StateChanged { state: emitted });
    }

    /// Sets or clears one pause reason and recomputes the aggregate. When
    /// the aggregate flips, issues the Pause/Continue RPC; on RPC failure
    /// the flag is still recorded but the aggregate state is not flipped,
    /// so the next call to `set_pause` retries (§4.1 failure semantics).
    pub async fn set_pause(&self, reason: PauseReason, value: bool) {
        let was_paused;
        let now_requested_paused;
        {
            let mut status = self.inner.write();
            was_paused = status.paused.any();
            *status.paused.flag_mut(reason) = value;
            now_requested_paused = status.paused.any();
        }

        if was_paused == now_requested_paused {
            if now_requested_paused {
                self.bus.publish(MinerEvent::PauseChanged {
                    paused: self.inner.read().paused,
                });
            }
            return;
        }

        let rpc_result = if now_requested_paused {
            self.indexer.pause().await
        } else {
            self.indexer.r#continue().await
        };

        if let Err(error) = rpc_result {
            warn!(%error, "indexer pause/continue RPC failed; state not flipped");
            return;
        }

        let mut status = self.inner.write();
        if now_requested_paused {
            status.status_before_paused = Some(status.state);
            status.state = RunState::Paused;
        } else if let Some(restored) = status.status_before_paused.take() {
            status.state = restored;
        } else {
            status.state = RunState::Idle;
        }
        let paused = status.paused;
        let state = status.state;
        drop(status);

        self.bus.publish(MinerEvent::PauseChanged { paused });
        self.bus.publish(MinerEvent::StateChanged { state });
    }

    pub fn set_readonly(&self, value: bool) {
        self.inner.write().is_readonly = value;
    }

    pub fn set_first_time(&self, value: bool) {
        self.inner.write().is_first_time = value;
    }
}
