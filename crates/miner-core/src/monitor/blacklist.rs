//! Per-path black-list counters (§3 "Black-list counter", §4.2 step 3,
//! testable property #6).
//!
//! A path that receives a burst of raw events gets counted; once the count
//! reaches the threshold, further events for that path are suppressed until
//! 30 seconds pass with no new event, at which point the counter clears and
//! (if the threshold was ever crossed) a synthetic `Created` event is
//! emitted so downstream consumers reconcile against the final state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const THRESHOLD: u32 = 5;
const QUIESCENCE: Duration = Duration::from_secs(30);

struct Entry {
    count: u32,
    last_seen: Instant,
    tripped: bool,
}

#[derive(Default)]
pub struct Blacklist {
    entries: HashMap<PathBuf, Entry>,
}

pub enum Admission {
    /// The event should be forwarded as normal.
    Allow,
    /// The event is suppressed; the path is under the threshold's
    /// escalation or already past it.
    Suppress,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a raw event for `path`, returning whether it should still be
    /// forwarded through the rest of the pipeline.
    pub fn record(&mut self, path: &Path, now: Instant) -> Admission {
        let entry = self.entries.entry(path.to_path_buf()).or_insert(Entry {
            count: 0,
            last_seen: now,
            tripped: false,
        });
        entry.last_seen = now;
        entry.count += 1;
        if entry.count >= THRESHOLD {
            entry.tripped = true;
            Admission::Suppress
        } else {
            Admission::Allow
        }
    }

    /// Sweeps entries whose quiescence window has elapsed, returning the
    /// paths that had tripped the threshold and therefore need a synthetic
    /// `Created` reconciliation event.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut reconcile = Vec::new();
        self.entries.retain(|path, entry| {
            if now.duration_since(entry.last_seen) < QUIESCENCE {
                return true;
            }
            if entry.tripped {
                reconcile.push(path.clone());
            }
            false
        });
        reconcile
    }

    pub fn remove(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn is_tripped(&self, path: &Path) -> bool {
        self.entries.get(path).is_some_and(|entry| entry.tripped)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
