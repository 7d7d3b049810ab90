//! # Engine Builder
//!
//! A fluent API for assembling a [`CrawlEngine`] from its collaborators:
//! the rule registry, the downloader, the pacing policy, and the record
//! sinks. Validation happens once, in [`EngineBuilder::build`], so a
//! misconfigured engine is rejected before any task is queued.
//!
//! ## Example
//!
//! ```rust,ignore
//! let engine = EngineBuilder::new(registry)
//!     .fetcher(HttpFetcher::default())
//!     .pacing(FixedIntervalPacing::uniform(Duration::from_millis(200)))
//!     .add_sink(LogSink)
//!     .workers(8)
//!     .build()?;
//! let stats = engine.run().await?;
//! ```

use crate::emit::{LogSink, RecordSink};
use crate::engine::CrawlEngine;
use crate::error::CrawlError;
use crate::fetch::Fetcher;
use crate::pacing::{NoPacing, PacingPolicy};
use crate::registry::RuleRegistry;
use std::sync::Arc;

#[cfg(feature = "checkpoint")]
use std::path::PathBuf;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Builder for [`CrawlEngine`].
pub struct EngineBuilder {
    registry: RuleRegistry,
    fetcher: Option<Arc<dyn Fetcher>>,
    pacing: Arc<dyn PacingPolicy>,
    sinks: Vec<Box<dyn RecordSink>>,
    workers: usize,
    channel_capacity: usize,
    #[cfg(feature = "checkpoint")]
    checkpoint_path: Option<PathBuf>,
}

impl EngineBuilder {
    /// Starts a builder over the given registry. Worker count defaults to
    /// the available parallelism, pacing to [`NoPacing`], and sinks to a
    /// single [`LogSink`] if none are added.
    pub fn new(registry: RuleRegistry) -> Self {
        EngineBuilder {
            registry,
            fetcher: None,
            pacing: Arc::new(NoPacing),
            sinks: Vec::new(),
            workers: num_cpus::get().clamp(2, 16),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            #[cfg(feature = "checkpoint")]
            checkpoint_path: None,
        }
    }

    /// Sets the downloader collaborator. Required.
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Replaces the default [`NoPacing`] policy.
    pub fn pacing(mut self, pacing: impl PacingPolicy + 'static) -> Self {
        self.pacing = Arc::new(pacing);
        self
    }

    /// Adds a record sink. May be called multiple times; records are
    /// delivered to every sink in registration order.
    pub fn add_sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Sets the worker pool size.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the capacity of the bounded record channel between workers and
    /// the sink task.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Enables checkpointing: a stopped run saves its backlog here, and the
    /// next run resumes from it if the file exists.
    #[cfg(feature = "checkpoint")]
    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Validates the configuration and assembles the engine.
    pub fn build(self) -> Result<CrawlEngine, CrawlError> {
        if self.workers == 0 {
            return Err(CrawlError::Configuration(
                "worker count must be at least 1".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(CrawlError::Configuration(
                "record channel capacity must be at least 1".into(),
            ));
        }
        if self.registry.is_empty() {
            return Err(CrawlError::Configuration(
                "registry must contain at least one rule tree".into(),
            ));
        }
        let fetcher = self.fetcher.ok_or_else(|| {
            CrawlError::Configuration("engine requires a fetcher".into())
        })?;
        let sinks = if self.sinks.is_empty() {
            vec![Box::new(LogSink) as Box<dyn RecordSink>]
        } else {
            self.sinks
        };
        #[allow(unused_mut)]
        let mut engine = CrawlEngine::new(
            self.registry,
            fetcher,
            self.pacing,
            sinks,
            self.workers,
            self.channel_capacity,
        );
        #[cfg(feature = "checkpoint")]
        {
            engine.checkpoint_path = self.checkpoint_path;
        }
        Ok(engine)
    }
}
