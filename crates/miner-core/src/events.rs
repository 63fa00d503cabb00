//! The event enum broadcast on [`crate::bus::Bus`].
//!
//! Every `Emits` point named in the component design is represented here:
//! Monitor's item events, Crawler's processing/finished events, Processor's
//! progress and finished signals, and Status's aggregate pause state.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Device;
use crate::status::{PauseFlags, RunState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub directories_found: u64,
    pub directories_ignored: u64,
    pub files_found: u64,
    pub files_ignored: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinerEvent {
    // --- Monitor ---
    ItemCreated { module: String, file: PathBuf },
    ItemUpdated { module: String, file: PathBuf },
    ItemDeleted { module: String, file: PathBuf },
    ItemMoved {
        module: String,
        source: PathBuf,
        target: PathBuf,
        source_was_monitored: bool,
    },

    // --- Crawler ---
    ProcessingDirectory { module: String, path: PathBuf },
    ProcessingFile { module: String, path: PathBuf },
    CrawlFinished {
        module: String,
        stats: CrawlStats,
        elapsed: Duration,
    },

    // --- Processor ---
    DeviceAdded(Device),
    DeviceRemoved(Device),
    ProcessorStarted,
    Finished,

    // --- Status ---
    StateChanged { state: RunState },
    PauseChanged { paused: PauseFlags },
}
