//! The `MonitorBackend` trait (§4.2, §9): raw OS notification delivery
//! abstracted away from `Monitor`'s debounce/pairing logic.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    Create,
    Update,
    AttribChange,
    Delete,
    MovedFrom,
    MovedTo,
    MoveSelf,
    DeleteSelf,
    Unmount,
    Overflow,
    /// Opened, accessed, or closed-without-write — dropped at step 1 of the
    /// event pipeline, kept here only so a backend can report them uniformly.
    LowValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWatchEvent {
    pub path: PathBuf,
    pub kind: RawEventKind,
    /// Correlation cookie linking `MovedFrom`/`MovedTo` halves. Zero means
    /// "no correlation available".
    pub cookie: u64,
}

/// Abstracts over the OS-level change-notification source.
///
/// Implementations may exist for INotify, FSEvents, ReadDirectoryChangesW,
/// and a polling fallback (§9); `Monitor` never special-cases backend
/// kinds directly, instead reading `max_watches`/`delivers_changes_done`.
pub trait MonitorBackend: Send + Sync {
    fn add_watch(&mut self, path: &Path) -> Result<()>;
    fn remove_watch(&mut self, path: &Path) -> Result<()>;

    /// Hard limit on the number of simultaneously active watches.
    fn max_watches(&self) -> u32;

    /// Whether the backend distinguishes "changed" from "changes done"
    /// (e.g. inotify's `IN_CLOSE_WRITE`). When `false`, `Monitor` treats
    /// plain `Update` events as the Updated signal instead of waiting for
    /// a done event that will never arrive.
    fn delivers_changes_done(&self) -> bool;

    /// Takes ownership of the raw event receiver. Called exactly once by
    /// `Monitor` at construction time. Implementations that bridge a
    /// synchronous callback (notify's watcher thread) into this channel do
    /// so internally, so callers only ever see `tokio`-friendly events.
    fn take_receiver(&mut self) -> UnboundedReceiver<RawWatchEvent>;
}
