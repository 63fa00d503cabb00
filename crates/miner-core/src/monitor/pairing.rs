//! Pending-pair table for MOVED_FROM/MOVED_TO correlation (§3 "Pending
//! pair", §4.2 step 5, testable property #5, scenarios S2/S3).
//!
//! A `MovedFrom` half starts a pending entry keyed by the backend's
//! correlation cookie. If the matching `MovedTo` half arrives within the
//! timeout, the pair collapses into a single `Moved` event. Otherwise the
//! timeout tick downgrades the stranded half into a single-sided
//! `Deleted` (for an unmatched `MovedFrom`) or `Created` (for an unmatched
//! `MovedTo`).
//!
//! §9 Open Questions notes the timeout comparison is done in whole seconds
//! against the recorded arrival second, not a precise duration: two
//! cookies recorded in the same second can therefore expire out of
//! insertion order. That quirk is preserved here rather than "fixed",
//! since nothing in the data model exposes sub-second ordering as a
//! guarantee.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const PAIR_TIMEOUT: Duration = Duration::from_secs(2);

enum Half {
    From(PathBuf),
    To(PathBuf),
}

struct Pending {
    half: Half,
    arrived_at_secs: u64,
}

pub enum Resolution {
    Paired { source: PathBuf, target: PathBuf },
    StrandedDelete(PathBuf),
    StrandedCreate(PathBuf),
}

#[derive(Default)]
pub struct PairTable {
    epoch: Option<Instant>,
    pending: HashMap<u64, Pending>,
}

impl PairTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn second_of(&mut self, now: Instant) -> u64 {
        let epoch = *self.epoch.get_or_insert(now);
        now.duration_since(epoch).as_secs()
    }

    /// Records a `MovedFrom` half, returning a paired resolution
    /// immediately if a matching `MovedTo` is already waiting.
    pub fn record_from(&mut self, cookie: u64, path: PathBuf, now: Instant) -> Option<Resolution> {
        let arrived_at_secs = self.second_of(now);
        match self.pending.remove(&cookie) {
            Some(Pending { half: Half::To(target), .. }) => Some(Resolution::Paired {
                source: path,
                target,
            }),
            Some(other) => {
                // Two MovedFrom halves sharing a cookie: keep the newer one,
                // strand the older as a delete.
                self.pending.insert(
                    cookie,
                    Pending {
                        half: Half::From(path),
                        arrived_at_secs,
                    },
                );
                match other.half {
                    Half::From(stale) => Some(Resolution::StrandedDelete(stale)),
                    Half::To(stale) => Some(Resolution::StrandedCreate(stale)),
                }
            }
            None => {
                self.pending.insert(
                    cookie,
                    Pending {
                        half: Half::From(path),
                        arrived_at_secs,
                    },
                );
                None
            }
        }
    }

    /// Records a `MovedTo` half, mirroring `record_from`.
    pub fn record_to(&mut self, cookie: u64, path: PathBuf, now: Instant) -> Option<Resolution> {
        let arrived_at_secs = self.second_of(now);
        match self.pending.remove(&cookie) {
            Some(Pending { half: Half::From(source), .. }) => Some(Resolution::Paired {
                source,
                target: path,
            }),
            Some(other) => {
                self.pending.insert(
                    cookie,
                    Pending {
                        half: Half::To(path),
                        arrived_at_secs,
                    },
                );
                match other.half {
                    Half::From(stale) => Some(Resolution::StrandedDelete(stale)),
                    Half::To(stale) => Some(Resolution::StrandedCreate(stale)),
                }
            }
            None => {
                self.pending.insert(
                    cookie,
                    Pending {
                        half: Half::To(path),
                        arrived_at_secs,
                    },
                );
                None
            }
        }
    }

    /// Strands every pending half whose recorded second is old enough,
    /// comparing whole seconds per the preserved quirk described above.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<Resolution> {
        let current_secs = self.second_of(now);
        let timeout_secs = PAIR_TIMEOUT.as_secs();
        let mut expired_cookies = Vec::new();
        for (cookie, pending) in self.pending.iter() {
            if current_secs.saturating_sub(pending.arrived_at_secs) >= timeout_secs {
                expired_cookies.push(*cookie);
            }
        }
        expired_cookies
            .into_iter()
            .filter_map(|cookie| self.pending.remove(&cookie))
            .map(|pending| match pending.half {
                Half::From(path) => Resolution::StrandedDelete(path),
                Half::To(path) => Resolution::StrandedCreate(path),
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
