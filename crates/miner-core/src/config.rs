//! Configuration knobs the core reads.
//!
//! Loading this value from a file, environment variables, or CLI flags is
//! out of scope for this crate — callers build a [`Config`] however suits
//! them and hand it to [`crate::processor::Processor::new`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::Module;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-item throttle applied by the crawler, in microsleep units (0-20).
    pub throttle: u32,
    pub enable_watches: bool,
    /// -1 disables the disk-space watchdog, otherwise 0..100.
    pub low_disk_space_limit_percent: i32,
    pub index_mounted_directories: bool,
    pub index_removable_devices: bool,
    pub disable_indexing_on_battery: bool,
    pub disable_indexing_on_battery_init: bool,
    pub initial_sleep_seconds: u32,
    pub disabled_modules: BTreeSet<String>,
    pub no_watch_roots: BTreeSet<PathBuf>,
    pub watch_roots: BTreeSet<PathBuf>,
    pub crawl_roots: BTreeSet<PathBuf>,
    pub nfs_locking: bool,
    /// Directory the disk-space watchdog samples free space for.
    pub data_directory: PathBuf,
    pub modules: Vec<Module>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            throttle: 0,
            enable_watches: true,
            low_disk_space_limit_percent: 1,
            index_mounted_directories: true,
            index_removable_devices: true,
            disable_indexing_on_battery: false,
            disable_indexing_on_battery_init: false,
            initial_sleep_seconds: 0,
            disabled_modules: BTreeSet::new(),
            no_watch_roots: BTreeSet::new(),
            watch_roots: BTreeSet::new(),
            crawl_roots: BTreeSet::new(),
            nfs_locking: false,
            data_directory: std::env::temp_dir(),
            modules: Vec::new(),
        }
    }
}

impl Config {
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn is_module_disabled(&self, name: &str) -> bool {
        self.disabled_modules.contains(name)
    }

    /// `throttle` expressed as a sleep duration, per the battery/default
    /// crawl profile switch driven by the battery watchdog (§4.1).
    pub fn throttle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(u64::from(self.throttle) * 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disk_space_watchdog_enabled() {
        let config = Config::default();
        assert!(config.low_disk_space_limit_percent >= 1);
    }

    #[test]
    fn module_lookup_by_name() {
        let mut config = Config::default();
        config.modules.push(Module::new("files"));
        assert!(config.module("files").is_some());
        assert!(config.module("mail").is_none());
    }

    #[test]
    fn throttle_zero_means_no_delay() {
        let config = Config::default();
        assert_eq!(config.throttle_delay(), std::time::Duration::ZERO);
    }
}
