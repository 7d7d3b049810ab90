//! # Expansion Engine (the Aid mechanism)
//!
//! Lets a rule, after parsing a response, ask the scheduler to synthesize a
//! bounded range of derivative tasks ("generate pages 2..=total") without
//! enumerating them in rule code, while the same parse invocation remains
//! free to do its own terminal extraction. Page 1 of a listing is both the
//! pagination discoverer and the first page of results; it is never fetched
//! twice.
//!
//! An [`ExpansionRequest`] lives only inside one parse step: created there,
//! consumed by the engine to synthesize `end - start` tasks, then discarded.

use crate::context::Context;
use crate::error::CrawlError;
use crate::task::Task;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Produces the URL for loop index `i`.
pub type UrlTemplate = Arc<dyn Fn(i64) -> String + Send + Sync>;

/// Arguments a parse step passes to its rule's expand step, mirroring the
/// `(loop bounds, target rule, extras)` shape the step computed from the
/// page.
#[derive(Debug, Clone)]
pub struct ExpansionArgs {
    pub start: i64,
    /// Exclusive upper bound.
    pub end: i64,
    pub target_rule: String,
    pub extras: Vec<(String, Value)>,
}

impl ExpansionArgs {
    pub fn new(start: i64, end: i64, target_rule: impl Into<String>) -> Self {
        ExpansionArgs {
            start,
            end,
            target_rule: target_rule.into(),
            extras: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.push((key.into(), value.into()));
        self
    }

    /// Looks up an extra by key.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// A validated request to synthesize tasks for `i` in `[start, end)`.
#[derive(Clone)]
pub struct ExpansionRequest {
    start: i64,
    end: i64,
    target_rule: String,
    priority: u32,
    template_args: Vec<(String, Value)>,
    url_template: UrlTemplate,
    pacing_key: Option<String>,
}

impl ExpansionRequest {
    /// Builds a request, rejecting `end < start` synchronously so invalid
    /// bounds never reach the queue. `start == end` is a valid no-op.
    pub fn new(
        start: i64,
        end: i64,
        target_rule: impl Into<String>,
        url_template: impl Fn(i64) -> String + Send + Sync + 'static,
    ) -> Result<Self, CrawlError> {
        if end < start {
            return Err(CrawlError::ExpansionConfig { start, end });
        }
        Ok(ExpansionRequest {
            start,
            end,
            target_rule: target_rule.into(),
            priority: 0,
            template_args: Vec::new(),
            url_template: Arc::new(url_template),
            pacing_key: None,
        })
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a context key merged into every synthesized child.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.template_args.push((key.into(), value.into()));
        self
    }

    /// Overrides the pacing key used when releasing the synthesized tasks.
    /// Defaults to the owning rule tree's name.
    pub fn with_pacing_key(mut self, key: impl Into<String>) -> Self {
        self.pacing_key = Some(key.into());
        self
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Number of tasks this request will synthesize.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn target_rule(&self) -> &str {
        &self.target_rule
    }

    pub fn pacing_key(&self) -> Option<&str> {
        self.pacing_key.as_deref()
    }

    /// Synthesizes the child tasks in ascending index order.
    ///
    /// Each child's context is an independent copy of `parent`, merged with
    /// the request's template args. A URL the template renders that fails to
    /// parse abandons the whole expansion as a parse defect.
    pub(crate) fn synthesize(&self, tree: &str, parent: &Context) -> Result<Vec<Task>, CrawlError> {
        let mut tasks = Vec::with_capacity(self.len());
        for i in self.start..self.end {
            let raw = (self.url_template)(i);
            let url = Url::parse(&raw).map_err(|e| {
                CrawlError::ParseDefect(format!("expansion produced invalid URL {raw:?}: {e}"))
            })?;
            let context = parent.deep_copy();
            context.merge(self.template_args.iter().cloned());
            let mut task = Task::new(url, tree, self.target_rule.clone())
                .with_priority(self.priority)
                .with_context(context);
            task.pacing_key = self.pacing_key.clone();
            tasks.push(task);
        }
        Ok(tasks)
    }
}

impl fmt::Debug for ExpansionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpansionRequest")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("target_rule", &self.target_rule)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        let err = ExpansionRequest::new(5, 2, "list", |i| format!("http://x.example.com/{i}"))
            .unwrap_err();
        assert!(matches!(
            err,
            CrawlError::ExpansionConfig { start: 5, end: 2 }
        ));
    }

    #[test]
    fn empty_range_synthesizes_nothing() {
        let req =
            ExpansionRequest::new(3, 3, "list", |i| format!("http://x.example.com/{i}")).unwrap();
        assert!(req.is_empty());
        let tasks = req.synthesize("tree", &Context::new()).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn synthesizes_ascending_with_copied_context() {
        let parent = Context::new();
        parent.set("channel", 1);

        let req = ExpansionRequest::new(2, 5, "list", |i| {
            format!("http://x.example.com/page_{i}.html")
        })
        .unwrap()
        .with_priority(1)
        .with_arg("page_source", "aid");

        let tasks = req.synthesize("tree", &parent).unwrap();
        assert_eq!(tasks.len(), 3);
        let urls: Vec<&str> = tasks.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://x.example.com/page_2.html",
                "http://x.example.com/page_3.html",
                "http://x.example.com/page_4.html",
            ]
        );

        // Copies, not aliases: mutating one child is invisible elsewhere.
        tasks[0].context.set("channel", 99);
        assert_eq!(tasks[1].context.get_int("channel", 0).unwrap(), 1);
        assert_eq!(parent.get_int("channel", 0).unwrap(), 1);
        assert_eq!(
            tasks[2].context.get_str("page_source", "").unwrap(),
            "aid"
        );
    }

    #[test]
    fn bad_template_url_is_a_parse_defect() {
        let req = ExpansionRequest::new(0, 1, "list", |_| "not a url".to_string()).unwrap();
        let err = req.synthesize("tree", &Context::new()).unwrap_err();
        assert!(matches!(err, CrawlError::ParseDefect(_)));
    }
}
