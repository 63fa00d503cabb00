//! The crawl/watch filter predicate (§4.3 "Filter predicate", testable
//! property #2 "Filter idempotence"): given a path and whether it names a
//! directory, decide once and for all whether the pipeline should ever see
//! it. Applying the predicate twice to the same input must always agree.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{MinerError, Result};
use crate::model::Module;

/// System roots that are never crawled or watched regardless of module
/// configuration — virtual filesystems with no durable content.
const HARD_EXCLUDED_ROOTS: &[&str] = &["/dev", "/proc", "/sys", "/lib", "/lib64"];

pub struct PathFilter {
    excluded_roots: Vec<PathBuf>,
    no_watch_roots: Vec<PathBuf>,
    watch_roots: Vec<PathBuf>,
    crawl_roots: Vec<PathBuf>,
    ignored_directories: GlobSet,
    ignored_files: GlobSet,
    included_files: GlobSet,
    has_include_list: bool,
}

impl PathFilter {
    pub fn for_module(module: &Module, no_watch_roots: &[PathBuf]) -> Result<Self> {
        let ignored_directories = compile(&module.ignored_directory_patterns)?;
        let ignored_files = compile(&module.ignored_file_patterns)?;
        let included_files = compile(&module.included_file_patterns)?;
        Ok(Self {
            excluded_roots: module.excluded_roots.clone(),
            no_watch_roots: no_watch_roots.to_vec(),
            watch_roots: module.watch_roots.clone(),
            crawl_roots: module.crawl_roots.clone(),
            has_include_list: !module.included_file_patterns.is_empty(),
            ignored_directories,
            ignored_files,
            included_files,
        })
    }

    /// Returns `true` when `path` must be skipped.
    ///
    /// Dot-directories are rejected unless `path` itself is one of the
    /// module's configured watch or crawl roots (`tracker-crawler.c`'s
    /// `is_path_ignored`: the dot check only spares a directory that is
    /// itself on one of those root lists, not merely a descendant of one).
    /// Dot-files have no such exception — a basename starting with `.` is
    /// always rejected, include list or not.
    pub fn is_ignored(&self, path: &Path, is_directory: bool) -> bool {
        if is_hard_excluded(path) {
            return true;
        }
        if under_any(path, &self.excluded_roots) || under_any(path, &self.no_watch_roots) {
            return true;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return true;
        };

        if name.starts_with('.') {
            if is_directory && (self.watch_roots.contains(&path.to_path_buf()) || self.crawl_roots.contains(&path.to_path_buf())) {
                // fall through to the ordinary directory pattern check below
            } else {
                return true;
            }
        }

        if is_directory {
            self.ignored_directories.is_match(name)
        } else {
            if self.ignored_files.is_match(name) {
                return true;
            }
            self.has_include_list && !self.included_files.is_match(name)
        }
    }
}

fn compile(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|error| MinerError::Config(format!("invalid glob {pattern:?}: {error}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|error| MinerError::Config(format!("failed to compile glob set: {error}")))
}

fn is_hard_excluded(path: &Path) -> bool {
    HARD_EXCLUDED_ROOTS
        .iter()
        .any(|root| path.starts_with(root))
        || path.starts_with(std::env::temp_dir())
}

fn under_any(path: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}
