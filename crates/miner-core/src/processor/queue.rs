//! Per-module dispatch queues (§4.4, testable property #1 "at-most-one-queue
//! law", #7 "queue drain priority law").
//!
//! Every path lives in at most one of a module's four event queues at a
//! time: inserting it into a new queue removes it from whichever queue it
//! was already sitting in, so a later event always supersedes an earlier
//! one rather than both surviving to be dispatched.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use crate::model::{EventKind, PathItem};

const DRAIN_LIMIT: usize = 1000;

#[derive(Default)]
struct ModuleQueues {
    queues: HashMap<EventKind, VecDeque<PathItem>>,
    /// Path -> kind it currently sits under, enforcing the at-most-one-queue
    /// invariant in O(1).
    location: HashMap<std::path::PathBuf, EventKind>,
}

impl ModuleQueues {
    fn remove_from_current(&mut self, path: &std::path::Path) {
        if let Some(kind) = self.location.remove(path) {
            if let Some(queue) = self.queues.get_mut(&kind) {
                queue.retain(|item| item.file != path);
            }
        }
    }

    fn remove_under(&mut self, prefix: &Path) {
        let mut removed = Vec::new();
        for queue in self.queues.values_mut() {
            queue.retain(|item| {
                let under = item.file.starts_with(prefix)
                    || item.source_file.as_deref().is_some_and(|source| source.starts_with(prefix));
                if under {
                    removed.push(item.file.clone());
                }
                !under
            });
        }
        for path in removed {
            self.location.remove(&path);
        }
    }
}

#[derive(Default)]
pub struct QueueSet {
    modules: HashMap<String, ModuleQueues>,
}

impl QueueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `item` under `kind`, first evicting the item's path from
    /// whatever queue it currently occupies.
    pub fn push(&mut self, kind: EventKind, item: PathItem) {
        let module = self.modules.entry(item.module.clone()).or_default();
        module.remove_from_current(&item.file);
        module.location.insert(item.file.clone(), kind);
        module.queues.entry(kind).or_default().push_back(item);
    }

    /// Re-enqueues a whole drained batch at the front of its queue,
    /// preserving its original order, used when a dispatch RPC fails and
    /// the batch must be retried before anything queued after it (§7
    /// failure semantics).
    pub fn push_front_batch(&mut self, module: &str, kind: EventKind, items: Vec<PathItem>) {
        let entry = self.modules.entry(module.to_string()).or_default();
        let queue = entry.queues.entry(kind).or_default();
        for item in items.into_iter().rev() {
            entry.location.insert(item.file.clone(), kind);
            queue.push_front(item);
        }
    }

    pub fn is_empty_for(&self, module: &str) -> bool {
        self.modules
            .get(module)
            .is_none_or(|queues| queues.queues.values().all(VecDeque::is_empty))
    }

    pub fn has_any_work(&self) -> bool {
        self.modules.keys().any(|module| !self.is_empty_for(module))
    }

    /// Removes every queued item (across every module and queue) whose path
    /// or move source falls under `prefix` (§5 Cancellation: dropping
    /// pending work under an unmounted device).
    pub fn remove_under(&mut self, prefix: &std::path::Path) {
        for queues in self.modules.values_mut() {
            queues.remove_under(prefix);
        }
    }

    /// Finds the first non-empty `(module, kind)` pair — priority order
    /// first (Deleted > Created > Updated > Moved), then `module_order` —
    /// and drains up to [`DRAIN_LIMIT`] items from it into one batch. Moved
    /// items count double against the limit since each carries a source and
    /// a target path. Returns `None` when every queue is empty.
    ///
    /// Only one batch is drained per call, matching the "only one RPC may
    /// be in flight" rule: the Processor dispatches this batch, awaits the
    /// result, and calls again on the next tick.
    pub fn drain_next_batch(&mut self, module_order: &[String]) -> Option<(String, EventKind, Vec<PathItem>)> {
        for &kind in EventKind::DRAIN_ORDER.iter() {
            let weight = if kind == EventKind::Moved { 2 } else { 1 };
            for module in module_order {
                let Some(queues) = self.modules.get_mut(module) else {
                    continue;
                };
                let Some(queue) = queues.queues.get_mut(&kind) else {
                    continue;
                };
                if queue.is_empty() {
                    continue;
                }

                let mut batch = Vec::new();
                let mut budget = DRAIN_LIMIT;
                while budget >= weight {
                    let Some(item) = queue.pop_front() else {
                        break;
                    };
                    queues.location.remove(&item.file);
                    batch.push(item);
                    budget -= weight;
                }
                return Some((module.clone(), kind, batch));
            }
        }
        None
    }

    pub fn len_for(&self, module: &str, kind: EventKind) -> usize {
        self.modules
            .get(module)
            .and_then(|queues| queues.queues.get(&kind))
            .map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item(path: &str) -> PathItem {
        PathItem::new("files", PathBuf::from(path))
    }

    #[test]
    fn at_most_one_queue_per_path() {
        let mut queues = QueueSet::new();
        queues.push(EventKind::Created, item("/a"));
        queues.push(EventKind::Updated, item("/a"));
        assert_eq!(queues.len_for("files", EventKind::Created), 0);
        assert_eq!(queues.len_for("files", EventKind::Updated), 1);
    }

    #[test]
    fn drain_priority_order_is_deleted_created_updated_moved() {
        let mut queues = QueueSet::new();
        queues.push(EventKind::Moved, item("/m"));
        queues.push(EventKind::Updated, item("/u"));
        queues.push(EventKind::Created, item("/c"));
        queues.push(EventKind::Deleted, item("/d"));

        let modules = vec!["files".to_string()];
        let mut kinds = Vec::new();
        while let Some((_, kind, _)) = queues.drain_next_batch(&modules) {
            kinds.push(kind);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::Deleted,
                EventKind::Created,
                EventKind::Updated,
                EventKind::Moved
            ]
        );
    }

    #[test]
    fn drain_next_batch_groups_same_kind_same_module_into_one_batch() {
        let mut queues = QueueSet::new();
        queues.push(EventKind::Created, item("/a"));
        queues.push(EventKind::Created, item("/b"));
        queues.push(EventKind::Deleted, item("/d"));

        let modules = vec!["files".to_string()];
        let (module, kind, batch) = queues.drain_next_batch(&modules).unwrap();
        assert_eq!(module, "files");
        assert_eq!(kind, EventKind::Deleted);
        assert_eq!(batch.len(), 1);

        let (_, kind, batch) = queues.drain_next_batch(&modules).unwrap();
        assert_eq!(kind, EventKind::Created);
        assert_eq!(batch.len(), 2);

        assert!(queues.drain_next_batch(&modules).is_none());
    }

    #[test]
    fn push_front_batch_reorders_ahead_of_existing_items_preserving_order() {
        let mut queues = QueueSet::new();
        queues.push(EventKind::Created, item("/first"));
        queues.push_front_batch("files", EventKind::Created, vec![item("/retry-a"), item("/retry-b")]);

        let modules = vec!["files".to_string()];
        let (_, _, batch) = queues.drain_next_batch(&modules).unwrap();
        let paths: Vec<PathBuf> = batch.iter().map(|item| item.file.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/retry-a"), PathBuf::from("/retry-b"), PathBuf::from("/first")]
        );
    }

    #[test]
    fn remove_under_drops_matching_items_across_all_queues() {
        let mut queues = QueueSet::new();
        queues.push(EventKind::Created, item("/mnt/usb/a.txt"));
        queues.push(EventKind::Updated, item("/home/user/keep.txt"));

        queues.remove_under(Path::new("/mnt/usb"));

        let modules = vec!["files".to_string()];
        let mut remaining = Vec::new();
        while let Some((_, _, batch)) = queues.drain_next_batch(&modules) {
            remaining.extend(batch);
        }
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].file, PathBuf::from("/home/user/keep.txt"));
    }

    #[test]
    fn empty_queue_set_reports_no_work() {
        let queues = QueueSet::new();
        assert!(!queues.has_any_work());
    }
}
