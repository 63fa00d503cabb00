//! The Crawler component (§4.3): walks a module's crawl/shallow roots and
//! reports every surviving file and directory as processing events, then a
//! single finished event carrying aggregate counts.
//!
//! Crawling proceeds in batches rather than one deep recursive walk so the
//! owning event loop can interleave it with monitor events and RPC work;
//! each [`Crawler::tick`] call drains up to [`BATCH_SIZE`] directory
//! entries before yielding back to the caller.

mod filter;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::Result;
use crate::events::{CrawlStats, MinerEvent};
use crate::model::Module;

pub use filter::PathFilter;

const BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Directory { recursive: bool },
    File,
}

struct Pending {
    path: PathBuf,
    kind: PendingKind,
}

pub struct Crawler {
    module: Module,
    filter: PathFilter,
    queue: VecDeque<Pending>,
    throttle: Duration,
    started_at: Option<Instant>,
    stats: CrawlStats,
    running: bool,
    use_module_paths: bool,
    special_paths: Vec<PathBuf>,
}

impl Crawler {
    pub fn new(config: &Config, module: Module) -> Result<Self> {
        let filter = PathFilter::for_module(&module, &config.no_watch_roots.iter().cloned().collect::<Vec<_>>())?;
        Ok(Self {
            module,
            filter,
            queue: VecDeque::new(),
            throttle: config.throttle_delay(),
            started_at: None,
            stats: CrawlStats::default(),
            running: false,
            use_module_paths: true,
            special_paths: Vec::new(),
        })
    }

    /// When `false`, `start()` only walks paths added via [`Self::add_path`]
    /// and [`Self::special_paths_add`], ignoring the module's own crawl
    /// roots — used for targeted re-crawls of a single reported root.
    pub fn set_use_module_paths(&mut self, value: bool) {
        self.use_module_paths = value;
    }

    pub fn add_path(&mut self, path: PathBuf, recursive: bool) {
        self.queue.push_back(Pending {
            path,
            kind: PendingKind::Directory { recursive },
        });
    }

    pub fn special_paths_add(&mut self, path: PathBuf) {
        self.special_paths.push(path);
    }

    pub fn special_paths_clear(&mut self) {
        self.special_paths.clear();
    }

    pub fn is_path_ignored(&self, path: &Path, is_directory: bool) -> bool {
        self.filter.is_ignored(path, is_directory)
    }

    /// Seeds the queue from the module's configured roots (plus any special
    /// paths) and marks the crawl running. Prunes roots that no longer
    /// exist on disk and deduplicates across crawl/shallow/special roots
    /// (first occurrence wins, in the order above) so the same directory is
    /// never walked twice in one crawl. Returns `false` if there was
    /// nothing to crawl.
    pub fn start(&mut self) -> bool {
        self.stats = CrawlStats::default();
        self.queue.clear();

        let mut seen = std::collections::HashSet::new();

        if self.use_module_paths {
            for root in &self.module.crawl_roots {
                if !root.exists() || !seen.insert(root.clone()) {
                    continue;
                }
                self.queue.push_back(Pending {
                    path: root.clone(),
                    kind: PendingKind::Directory { recursive: true },
                });
            }
            for root in &self.module.shallow_roots {
                if !root.exists() || !seen.insert(root.clone()) {
                    continue;
                }
                self.queue.push_back(Pending {
                    path: root.clone(),
                    kind: PendingKind::Directory { recursive: false },
                });
            }
        }
        for path in self.special_paths.drain(..) {
            if !path.exists() || !seen.insert(path.clone()) {
                continue;
            }
            self.queue.push_back(Pending {
                path,
                kind: PendingKind::Directory { recursive: true },
            });
        }

        if self.queue.is_empty() {
            return false;
        }
        self.started_at = Some(Instant::now());
        self.running = true;
        true
    }

    pub fn stop(&mut self) {
        self.queue.clear();
        self.running = false;
    }

    /// Drops every queued pending entry whose path falls under `prefix`
    /// (used when a device is unmounted mid-crawl, §5 Cancellation). If the
    /// crawl has nothing left queued afterward it stops entirely.
    pub fn cancel_under(&mut self, prefix: &Path) {
        self.queue.retain(|pending| !pending.path.starts_with(prefix));
        if self.queue.is_empty() {
            self.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Drains up to [`BATCH_SIZE`] queued entries, reading directories
    /// (batched concurrently with a [`JoinSet`]) and classifying their
    /// children. Returns the events produced this tick; an empty,
    /// non-`CrawlFinished` result means the caller should tick again after
    /// its throttle sleep. Returns `[MinerEvent::CrawlFinished]` exactly
    /// once, when the queue drains to empty.
    pub async fn tick(&mut self) -> Vec<MinerEvent> {
        if !self.running {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(BATCH_SIZE);
        let mut directories_to_read = Vec::new();

        while events.len() < BATCH_SIZE {
            let Some(item) = self.queue.pop_front() else {
                break;
            };
            match item.kind {
                PendingKind::Directory { recursive } => {
                    if self.filter.is_ignored(&item.path, true) {
                        self.stats.directories_ignored += 1;
                        continue;
                    }
                    self.stats.directories_found += 1;
                    events.push(MinerEvent::ProcessingDirectory {
                        module: self.module.name.clone(),
                        path: item.path.clone(),
                    });
                    directories_to_read.push((item.path, recursive));
                }
                PendingKind::File => {
                    if self.filter.is_ignored(&item.path, false) {
                        self.stats.files_ignored += 1;
                        continue;
                    }
                    self.stats.files_found += 1;
                    events.push(MinerEvent::ProcessingFile {
                        module: self.module.name.clone(),
                        path: item.path,
                    });
                }
            }
        }

        if !directories_to_read.is_empty() {
            let mut reads = JoinSet::new();
            for (path, recursive) in directories_to_read {
                reads.spawn(async move {
                    let children = read_children(&path).await.unwrap_or_default();
                    (recursive, children)
                });
            }
            while let Some(result) = reads.join_next().await {
                let Ok((recursive, children)) = result else {
                    continue;
                };
                for (child, is_dir) in children {
                    let kind = if is_dir {
                        PendingKind::Directory { recursive }
                    } else {
                        PendingKind::File
                    };
                    if is_dir && !recursive {
                        continue;
                    }
                    self.queue.push_back(Pending { path: child, kind });
                }
            }
        }

        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }

        if self.queue.is_empty() {
            self.running = false;
            let elapsed = self
                .started_at
                .take()
                .map(|start| start.elapsed())
                .unwrap_or_default();
            events.push(MinerEvent::CrawlFinished {
                module: self.module.name.clone(),
                stats: self.stats,
                elapsed,
            });
        }

        events
    }
}

async fn read_children(dir: &Path) -> std::io::Result<Vec<(PathBuf, bool)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        children.push((entry.path(), is_dir));
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn module_for(dir: &Path) -> Module {
        let mut module = Module::new("files");
        module.crawl_roots.push(dir.to_path_buf());
        module
    }

    #[tokio::test]
    async fn crawl_reports_every_file_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.txt"), b"c").unwrap();

        let config = Config::default();
        let mut crawler = Crawler::new(&config, module_for(dir.path())).unwrap();
        assert!(crawler.start());

        let mut files_seen = 0;
        let mut finished = false;
        while crawler.is_running() {
            for event in crawler.tick().await {
                match event {
                    MinerEvent::ProcessingFile { .. } => files_seen += 1,
                    MinerEvent::CrawlFinished { stats, .. } => {
                        finished = true;
                        assert_eq!(stats.files_found, 3);
                    }
                    _ => {}
                }
            }
        }
        assert!(finished);
        assert_eq!(files_seen, 3);
    }

    #[tokio::test]
    async fn shallow_root_does_not_descend() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("deep.txt"), b"x").unwrap();

        let config = Config::default();
        let mut module = Module::new("files");
        module.shallow_roots.push(dir.path().to_path_buf());
        let mut crawler = Crawler::new(&config, module).unwrap();
        assert!(crawler.start());

        let mut files_seen = 0;
        while crawler.is_running() {
            for event in crawler.tick().await {
                if matches!(event, MinerEvent::ProcessingFile { .. }) {
                    files_seen += 1;
                }
            }
        }
        assert_eq!(files_seen, 0);
    }

    #[tokio::test]
    async fn empty_roots_produce_no_crawl() {
        let config = Config::default();
        let mut crawler = Crawler::new(&config, Module::new("files")).unwrap();
        assert!(!crawler.start());
    }

    #[tokio::test]
    async fn start_prunes_nonexistent_roots() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let mut module = module_for(dir.path());
        module.crawl_roots.push(dir.path().join("does-not-exist"));
        let mut crawler = Crawler::new(&config, module).unwrap();
        assert!(crawler.start());

        let mut directories_seen = Vec::new();
        while crawler.is_running() {
            for event in crawler.tick().await {
                if let MinerEvent::ProcessingDirectory { path, .. } = event {
                    directories_seen.push(path);
                }
            }
        }
        assert_eq!(directories_seen, vec![dir.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn start_deduplicates_repeated_roots() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let mut module = module_for(dir.path());
        module.crawl_roots.push(dir.path().to_path_buf());
        module.shallow_roots.push(dir.path().to_path_buf());
        let mut crawler = Crawler::new(&config, module).unwrap();
        assert!(crawler.start());

        let mut directories_seen = Vec::new();
        while crawler.is_running() {
            for event in crawler.tick().await {
                if let MinerEvent::ProcessingDirectory { path, .. } = event {
                    directories_seen.push(path);
                }
            }
        }
        assert_eq!(directories_seen, vec![dir.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn cancel_under_drops_queued_entries_beneath_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let mut crawler = Crawler::new(&config, module_for(dir.path())).unwrap();
        assert!(crawler.start());
        crawler.add_path(dir.path().join("other"), true);

        crawler.cancel_under(dir.path());
        assert!(!crawler.is_running());
    }
}
