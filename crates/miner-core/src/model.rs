//! Core data model: modules, devices, queued path items.
//!
//! None of these types own persistent state — the Indexer does. The core
//! only ever holds enough information to describe "this path needs this
//! kind of work done to it".

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A named indexing domain ("files", "mail", "applications", …).
///
/// Loaded at startup from [`crate::config::Config`] and fixed for the
/// lifetime of the process — modules are never added or removed at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    /// Directories watched for live change notifications.
    pub watch_roots: Vec<PathBuf>,
    /// Directories recursively crawled at startup and on demand.
    pub crawl_roots: Vec<PathBuf>,
    /// Directories crawled non-recursively (only direct children).
    pub shallow_roots: Vec<PathBuf>,
    /// Roots excluded even if they fall under a crawl/watch root.
    pub excluded_roots: Vec<PathBuf>,
    /// Glob patterns matched against a directory's basename to ignore it.
    pub ignored_directory_patterns: Vec<String>,
    /// Glob patterns matched against a file's basename to ignore it.
    pub ignored_file_patterns: Vec<String>,
    /// If non-empty, a file's basename must match one of these to be kept.
    pub included_file_patterns: Vec<String>,
    pub enabled: bool,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            watch_roots: Vec::new(),
            crawl_roots: Vec::new(),
            shallow_roots: Vec::new(),
            excluded_roots: Vec::new(),
            ignored_directory_patterns: Vec::new(),
            ignored_file_patterns: Vec::new(),
            included_file_patterns: Vec::new(),
            enabled: true,
        }
    }
}

/// A removable-storage root reported by the OS volume subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Opaque, persistent identifier supplied by the volume backend.
    pub udi: String,
    pub mount_point: PathBuf,
    pub mounted: bool,
}

/// The four event kinds a monitored or crawled path can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Moved,
}

impl EventKind {
    /// Drain priority order: Deleted > Created > Updated > Moved.
    pub const DRAIN_ORDER: [EventKind; 4] = [
        EventKind::Deleted,
        EventKind::Created,
        EventKind::Updated,
        EventKind::Moved,
    ];
}

/// A unit of work queued for dispatch to the Indexer.
///
/// For [`EventKind::Moved`] items, `source_file` holds the move's origin
/// and `file` holds the destination; every other kind leaves `source_file`
/// unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathItem {
    pub module: String,
    pub file: PathBuf,
    pub source_file: Option<PathBuf>,
    pub recursive: bool,
}

impl PathItem {
    pub fn new(module: impl Into<String>, file: PathBuf) -> Self {
        Self {
            module: module.into(),
            file,
            source_file: None,
            recursive: false,
        }
    }

    pub fn moved(module: impl Into<String>, source: PathBuf, target: PathBuf) -> Self {
        Self {
            module: module.into(),
            file: target,
            source_file: Some(source),
            recursive: false,
        }
    }
}
