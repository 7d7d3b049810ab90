//! Collects metrics about a crawl run.
//!
//! Thread-safe atomic counters covering the task lifecycle (enqueued,
//! dispatched, succeeded, failed), expansion activity, and record output,
//! plus a per-rule dispatch map. A snapshot backs the `Display` and JSON
//! exports so every presentation reads one consistent view.

use crate::error::CrawlError;
use dashmap::DashMap;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

// One consistent view of the counters for reporting.
struct StatsSnapshot {
    tasks_enqueued: usize,
    tasks_dispatched: usize,
    tasks_succeeded: usize,
    tasks_failed: usize,
    branches_abandoned: usize,
    expansions_requested: usize,
    tasks_synthesized: usize,
    records_emitted: usize,
    records_dropped: usize,
    rule_dispatches: HashMap<String, usize>,
    elapsed: Duration,
}

impl StatsSnapshot {
    fn tasks_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.tasks_dispatched as f64 / secs
        } else {
            0.0
        }
    }

    fn records_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.records_emitted as f64 / secs
        } else {
            0.0
        }
    }
}

/// Crawl statistics, updated concurrently by workers.
#[derive(Debug, serde::Serialize)]
pub struct StatCollector {
    #[serde(skip)]
    start_time: Instant,

    pub tasks_enqueued: AtomicUsize,
    pub tasks_dispatched: AtomicUsize,
    pub tasks_succeeded: AtomicUsize,
    pub tasks_failed: AtomicUsize,
    /// Branches abandoned on a parse defect or context mismatch.
    pub branches_abandoned: AtomicUsize,

    pub expansions_requested: AtomicUsize,
    /// Tasks synthesized by the expansion engine.
    pub tasks_synthesized: AtomicUsize,

    pub records_emitted: AtomicUsize,
    pub records_dropped: AtomicUsize,

    /// Dispatch count per `tree/rule`.
    pub rule_dispatches: DashMap<String, usize>,
}

impl StatCollector {
    pub(crate) fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            tasks_enqueued: AtomicUsize::new(0),
            tasks_dispatched: AtomicUsize::new(0),
            tasks_succeeded: AtomicUsize::new(0),
            tasks_failed: AtomicUsize::new(0),
            branches_abandoned: AtomicUsize::new(0),
            expansions_requested: AtomicUsize::new(0),
            tasks_synthesized: AtomicUsize::new(0),
            records_emitted: AtomicUsize::new(0),
            records_dropped: AtomicUsize::new(0),
            rule_dispatches: DashMap::new(),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut rule_dispatches = HashMap::new();
        for entry in self.rule_dispatches.iter() {
            rule_dispatches.insert(entry.key().clone(), *entry.value());
        }

        StatsSnapshot {
            tasks_enqueued: self.tasks_enqueued.load(Ordering::SeqCst),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::SeqCst),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::SeqCst),
            tasks_failed: self.tasks_failed.load(Ordering::SeqCst),
            branches_abandoned: self.branches_abandoned.load(Ordering::SeqCst),
            expansions_requested: self.expansions_requested.load(Ordering::SeqCst),
            tasks_synthesized: self.tasks_synthesized.load(Ordering::SeqCst),
            records_emitted: self.records_emitted.load(Ordering::SeqCst),
            records_dropped: self.records_dropped.load(Ordering::SeqCst),
            rule_dispatches,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_tasks_enqueued(&self) {
        self.tasks_enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_dispatch(&self, tree: &str, rule: &str) {
        self.tasks_dispatched.fetch_add(1, Ordering::SeqCst);
        *self
            .rule_dispatches
            .entry(format!("{tree}/{rule}"))
            .or_insert(0) += 1;
    }

    pub(crate) fn increment_tasks_succeeded(&self) {
        self.tasks_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_tasks_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_branches_abandoned(&self) {
        self.branches_abandoned.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_expansions_requested(&self) {
        self.expansions_requested.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_tasks_synthesized(&self, count: usize) {
        self.tasks_synthesized.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn increment_records_emitted(&self) {
        self.records_emitted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_records_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn to_json_string(&self) -> Result<String, CrawlError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, CrawlError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration  : {:?}", snapshot.elapsed)?;
        writeln!(
            f,
            "  speed     : task/s: {:.2}, record/s: {:.2}",
            snapshot.tasks_per_second(),
            snapshot.records_per_second()
        )?;
        writeln!(
            f,
            "  tasks     : enqueued: {}, dispatched: {}, ok: {}, failed: {}, abandoned: {}",
            snapshot.tasks_enqueued,
            snapshot.tasks_dispatched,
            snapshot.tasks_succeeded,
            snapshot.tasks_failed,
            snapshot.branches_abandoned
        )?;
        writeln!(
            f,
            "  expansion : requests: {}, synthesized: {}",
            snapshot.expansions_requested, snapshot.tasks_synthesized
        )?;
        writeln!(
            f,
            "  records   : emitted: {}, dropped: {}",
            snapshot.records_emitted, snapshot.records_dropped
        )?;

        let rules = if snapshot.rule_dispatches.is_empty() {
            "none".to_string()
        } else {
            let mut pairs: Vec<_> = snapshot.rule_dispatches.into_iter().collect();
            pairs.sort();
            pairs
                .iter()
                .map(|(rule, count)| format!("{rule}: {count}"))
                .collect::<Vec<String>>()
                .join(", ")
        };
        writeln!(f, "  rules     : {rules}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_display() {
        let stats = StatCollector::new();
        stats.increment_tasks_enqueued();
        stats.record_dispatch("tx", "pages");
        stats.record_dispatch("tx", "pages");
        stats.record_dispatch("tx", "detail");
        stats.increment_tasks_succeeded();
        stats.increment_records_emitted();

        assert_eq!(stats.tasks_dispatched.load(Ordering::SeqCst), 3);
        assert_eq!(*stats.rule_dispatches.get("tx/pages").unwrap(), 2);

        let rendered = format!("{stats}");
        assert!(rendered.contains("tx/pages: 2"));
        assert!(rendered.contains("emitted: 1"));
    }

    #[test]
    fn json_export_includes_counters() {
        let stats = StatCollector::new();
        stats.increment_tasks_enqueued();
        let json = stats.to_json_string().unwrap();
        assert!(json.contains("\"tasks_enqueued\":1"));
    }
}
