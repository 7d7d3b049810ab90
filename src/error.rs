//! # Error Module
//!
//! Defines the error taxonomy for the crawl orchestration core.
//!
//! Every per-task failure is contained to the task (and its unexpanded
//! subtree) that produced it. Nothing in this module aborts a sibling branch
//! or the worker pool; workers log the failure with task identity and move on.

use thiserror::Error;

/// The error type used throughout the crate.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The downloader collaborator reported a network or HTTP failure.
    /// The task terminates in the `Failed` state and is not retried here;
    /// retry policy belongs to the downloader.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Expected markup or data was absent from a response (for example, zero
    /// total pages parsed). The branch is abandoned with a critical warning.
    #[error("parse defect: {0}")]
    ParseDefect(String),

    /// An expansion was requested with `end < start`. Rejected synchronously
    /// at the call site, before any task is synthesized.
    #[error("invalid expansion bounds: start {start}, end {end}")]
    ExpansionConfig { start: i64, end: i64 },

    /// A step read a context key with an incompatible expected type. Fails
    /// the single task, never the worker or the pool.
    #[error("context key {key:?} holds a {found}, expected {expected}")]
    ContextTypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Invalid engine or rule-tree configuration, caught at build time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An internal channel closed while the pipeline was still running.
    #[error("channel error: {0}")]
    Channel(String),

    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "checkpoint")]
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl CrawlError {
    /// Shorthand for a fetch failure against `url`.
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        CrawlError::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }
}
