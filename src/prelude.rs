//! A "prelude" for users of the `ruleflow` crate.
//!
//! Re-exports the types needed to declare rule trees and run a crawl.
//!
//! # Example
//!
//! ```
//! use ruleflow::prelude::*;
//! ```

pub use crate::{
    // Engine assembly
    CrawlEngine,
    EngineBuilder,
    StopHandle,
    // Rule declaration
    ChildTask,
    InheritMode,
    Rule,
    RuleRegistry,
    RuleTree,
    SeedTask,
    StepOutput,
    // Expansion
    ExpansionArgs,
    ExpansionRequest,
    // Collaborators
    Fetcher,
    FixedIntervalPacing,
    LogSink,
    MemorySink,
    NoPacing,
    PacingClass,
    PacingPolicy,
    RecordSink,
    ResponseContext,
    StaticFetcher,
    // Data model
    Context,
    CrawlError,
    Record,
    Task,
    Value,
    // Trait-impl essentials
    async_trait,
    Url,
};
