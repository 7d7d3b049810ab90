//! Pending fetch tasks and their queue ordering key.
//!
//! A [`Task`] references a URL, the rule tree and rule that will parse the
//! response, a dispatch priority, and the context bag carried along the
//! lineage. Tasks are immutable once enqueued and consumed exactly once.

use crate::context::Context;
use serde::{Deserialize, Serialize};
use url::Url;

/// A unit of pending work: fetch `url`, dispatch the response to `rule`
/// within `tree`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub url: Url,
    /// The rule tree (site) this task belongs to.
    pub tree: String,
    /// The rule whose parse step receives the response.
    pub rule: String,
    /// Higher values dispatch first; ties break FIFO by insertion order.
    pub priority: u32,
    pub context: Context,
    /// Pacing gate for this branch, e.g. a channel name. `None` gates on
    /// the tree name.
    #[serde(default)]
    pub pacing_key: Option<String>,
}

impl Task {
    pub fn new(url: Url, tree: impl Into<String>, rule: impl Into<String>) -> Self {
        Task {
            url,
            tree: tree.into(),
            rule: rule.into(),
            priority: 0,
            context: Context::new(),
            pacing_key: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_pacing_key(mut self, key: impl Into<String>) -> Self {
        self.pacing_key = Some(key.into());
        self
    }

    /// The gate the rate controller throttles this task's branch on.
    pub fn pacing_gate(&self) -> &str {
        self.pacing_key.as_deref().unwrap_or(&self.tree)
    }

    /// A compact identity string for log lines.
    pub fn identity(&self) -> String {
        format!("{}/{} {}", self.tree, self.rule, self.url)
    }
}

/// Heap entry pairing a task with its insertion sequence number.
///
/// Ordering: higher priority wins; equal priorities dispatch in insertion
/// order, which keeps replay deterministic.
#[derive(Debug)]
pub(crate) struct QueuedTask {
    pub task: Task,
    pub seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: larger priority first, then smaller seq (FIFO).
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn task(priority: u32) -> Task {
        Task::new(
            Url::parse("http://list.example.com/").unwrap(),
            "t",
            "r",
        )
        .with_priority(priority)
    }

    #[test]
    fn pacing_gate_defaults_to_tree_name() {
        let plain = task(0);
        assert_eq!(plain.pacing_gate(), "t");
        let keyed = task(0).with_pacing_key("movie");
        assert_eq!(keyed.pacing_gate(), "movie");
    }

    #[test]
    fn heap_orders_by_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        for (seq, priority) in [(0u64, 1u32), (1, 3), (2, 1), (3, 3), (4, 0)] {
            heap.push(QueuedTask { task: task(priority), seq });
        }

        let order: Vec<(u32, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|q| (q.task.priority, q.seq))
            .collect();
        assert_eq!(order, vec![(3, 1), (3, 3), (1, 0), (1, 2), (0, 4)]);
    }
}
