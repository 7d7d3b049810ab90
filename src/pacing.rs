//! # Rate Controller
//!
//! Pacing between task releases, injected into the engine as a policy
//! object. The policy decides how fast synthesized and seeded tasks are
//! released; the expansion engine decides only how many to make.
//!
//! Delays are a politeness mechanism, not a correctness one. Each pacing key
//! (typically a channel or host) is gated independently, so unrelated
//! branches never serialize against each other. Call sites pass a
//! [`PacingClass`] so channel-level seeding, per-page expansion, and leaf
//! emission can be configured with distinct intervals.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Which call site is releasing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingClass {
    /// Top-level channel seeding.
    Seed,
    /// Per-page release inside an expansion loop.
    Page,
    /// Leaf-level release (detail fetches).
    Leaf,
}

impl fmt::Display for PacingClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacingClass::Seed => f.write_str("seed"),
            PacingClass::Page => f.write_str("page"),
            PacingClass::Leaf => f.write_str("leaf"),
        }
    }
}

/// Decides the delay before releasing one task within `key`'s branch.
#[async_trait]
pub trait PacingPolicy: Send + Sync {
    async fn throttle(&self, key: &str, class: PacingClass);
}

/// No pacing at all. The default for tests and local fixtures.
#[derive(Debug, Default)]
pub struct NoPacing;

#[async_trait]
impl PacingPolicy for NoPacing {
    async fn throttle(&self, _key: &str, _class: PacingClass) {}
}

/// Spaces releases within one `(key, class)` gate by a fixed interval.
///
/// Concurrent callers on the same gate are scheduled one interval apart;
/// distinct keys never contend.
pub struct FixedIntervalPacing {
    seed_interval: Duration,
    page_interval: Duration,
    leaf_interval: Duration,
    next_release: DashMap<String, Instant>,
}

impl FixedIntervalPacing {
    pub fn new(seed: Duration, page: Duration, leaf: Duration) -> Self {
        FixedIntervalPacing {
            seed_interval: seed,
            page_interval: page,
            leaf_interval: leaf,
            next_release: DashMap::new(),
        }
    }

    /// One interval for every class.
    pub fn uniform(interval: Duration) -> Self {
        Self::new(interval, interval, interval)
    }

    fn interval_for(&self, class: PacingClass) -> Duration {
        match class {
            PacingClass::Seed => self.seed_interval,
            PacingClass::Page => self.page_interval,
            PacingClass::Leaf => self.leaf_interval,
        }
    }
}

#[async_trait]
impl PacingPolicy for FixedIntervalPacing {
    async fn throttle(&self, key: &str, class: PacingClass) {
        let interval = self.interval_for(class);
        if interval.is_zero() {
            return;
        }

        let gate = format!("{class}/{key}");
        let now = Instant::now();
        let wake = {
            let mut slot = self.next_release.entry(gate).or_insert(now);
            let scheduled = (*slot).max(now);
            *slot = scheduled + interval;
            scheduled
        };

        if wake > now {
            trace!(key, %class, delay_ms = (wake - now).as_millis() as u64, "pacing delay");
            tokio::time::sleep_until(wake).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn same_gate_spaces_releases() {
        let pacing = Arc::new(FixedIntervalPacing::uniform(Duration::from_millis(30)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let pacing = Arc::clone(&pacing);
            handles.push(tokio::spawn(async move {
                pacing.throttle("movies", PacingClass::Page).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // First release is immediate; the other two are spaced one interval
        // apart behind it.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_serialize() {
        let pacing = Arc::new(FixedIntervalPacing::uniform(Duration::from_millis(50)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for key in ["movies", "tv", "cartoon", "variety"] {
            let pacing = Arc::clone(&pacing);
            handles.push(tokio::spawn(async move {
                pacing.throttle(key, PacingClass::Page).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Each key's first release is immediate.
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn classes_gate_independently() {
        let pacing = FixedIntervalPacing::new(
            Duration::from_millis(100),
            Duration::ZERO,
            Duration::ZERO,
        );
        let start = Instant::now();
        pacing.throttle("movies", PacingClass::Seed).await;
        pacing.throttle("movies", PacingClass::Page).await;
        pacing.throttle("movies", PacingClass::Leaf).await;
        // Only the seed class carries an interval, and its first release is
        // immediate.
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
