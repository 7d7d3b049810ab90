//! # ruleflow
//!
//! A rule-driven crawl scheduler with hierarchical task expansion and
//! contextual propagation.
//!
//! A crawl is described declaratively as a [`RuleTree`]: named rules whose
//! parse steps return a [`StepOutput`] of follow-up work: child tasks,
//! range expansions, and output records. The [`CrawlEngine`] drains a
//! priority queue with a worker pool, fetching through an injected
//! [`Fetcher`], pacing through an injected [`PacingPolicy`], and delivering
//! records to [`RecordSink`]s over a bounded channel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ruleflow::prelude::*;
//!
//! let tree = RuleTree::new("news")
//!     .rule(Rule::new("index", |response, _ctx| {
//!         let mut out = StepOutput::new();
//!         for link in extract_links(response.text()) {
//!             out.add_child(ChildTask::new(link, "article").priority(1));
//!         }
//!         Ok(out)
//!     }))?
//!     .rule(Rule::new("article", |response, ctx| {
//!         let mut out = StepOutput::new();
//!         out.add_record(extract_article(response, ctx)?);
//!         Ok(out)
//!     }))?
//!     .seed([SeedTask::new("https://example.com/news", "index")]);
//!
//! let engine = EngineBuilder::new(RuleRegistry::new().with_tree(tree)?)
//!     .fetcher(my_fetcher)
//!     .build()?;
//! let stats = engine.run().await?;
//! ```

pub mod builder;
#[cfg(feature = "checkpoint")]
pub mod checkpoint;
pub mod context;
pub mod emit;
pub mod engine;
pub mod error;
pub mod expansion;
pub mod fetch;
pub mod pacing;
pub mod prelude;
pub mod queue;
pub mod registry;
pub mod response;
pub mod stats;
pub mod task;
pub mod text;
pub mod value;

pub use builder::EngineBuilder;
pub use context::Context;
pub use emit::{Emitted, LogSink, MemorySink, RecordSink};
pub use engine::{CrawlEngine, StopHandle};
pub use error::CrawlError;
pub use expansion::{ExpansionArgs, ExpansionRequest, UrlTemplate};
pub use fetch::{Fetcher, StaticFetcher};
pub use pacing::{FixedIntervalPacing, NoPacing, PacingClass, PacingPolicy};
pub use queue::TaskQueue;
pub use registry::{
    ChildTask, InheritMode, Rule, RuleRegistry, RuleTree, SeedTask, StepOutput,
};
pub use response::ResponseContext;
pub use stats::StatCollector;
pub use task::Task;
pub use value::{Record, Value};

#[cfg(feature = "checkpoint")]
pub use checkpoint::{load_checkpoint, save_checkpoint, QueueCheckpoint};

// Re-exported for downstream trait implementations.
pub use async_trait::async_trait;
pub use url::Url;
