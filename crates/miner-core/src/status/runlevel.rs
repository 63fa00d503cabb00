//! Startup run-level check: an advisory lock file under a per-user temp
//! directory, optionally relaxed for NFS-mounted home directories.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use fs4::FileExt;
use tracing::warn;

use crate::error::{MinerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLevel {
    /// Another instance holds the lock and NFS mode is forbidden.
    Disallowed,
    /// Another instance holds the lock under NFS; start but never write.
    ReadOnly,
    MainInstance,
}

/// Holds the exclusive POSIX advisory lock for the lifetime of the
/// `MainInstance`. Dropping it releases the lock and leaves the file on
/// disk (presence denotes "was running", not "is running").
pub struct LockFileGuard {
    _file: File,
}

fn lock_file_path(user: &str, app: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{user}_{app}_lock"))
}

/// Attempts to acquire the advisory lock, returning the run level the core
/// should start at plus the guard to hold for `MainInstance`/`ReadOnly`.
///
/// `nfs_locking` mirrors the `nfs_locking` config knob (§6): when true, a
/// lock held by another instance downgrades this process to `ReadOnly`
/// instead of refusing to start.
///
/// `on_battery` reflects a synchronous battery sample taken at startup
/// (before the watchdog is spawned); `first_time` is the first-time-index
/// flag; `disable_indexing_on_battery` is the matching policy knob. Per
/// §4.1, a `MainInstance` that would otherwise have acquired the lock is
/// downgraded to `ReadOnly` — but keeps its lock guard, since it still
/// holds the lock exclusively — when running on battery and either the
/// first-time flag is set or the battery policy is on.
pub fn check_run_level(
    user: &str,
    app: &str,
    nfs_locking: bool,
    on_battery: bool,
    first_time: bool,
    disable_indexing_on_battery: bool,
) -> Result<(RunLevel, Option<LockFileGuard>)> {
    let path = lock_file_path(user, app);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(MinerError::Io)?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            let guard = Some(LockFileGuard { _file: file });
            if on_battery && (first_time || disable_indexing_on_battery) {
                warn!("running on battery during first-time index or battery policy; starting read-only");
                Ok((RunLevel::ReadOnly, guard))
            } else {
                Ok((RunLevel::MainInstance, guard))
            }
        }
        Err(_) if nfs_locking => {
            warn!(path = %path.display(), "lock held by another instance; starting read-only under NFS policy");
            Ok((RunLevel::ReadOnly, None))
        }
        Err(_) => {
            warn!(path = %path.display(), "lock held by another instance; refusing to start");
            Ok((RunLevel::Disallowed, None))
        }
    }
}
