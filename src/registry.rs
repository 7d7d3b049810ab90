//! # Rule Registry
//!
//! Named, site-scoped rule definitions and the step-output value parse steps
//! return.
//!
//! A [`RuleTree`] holds every rule for one target site plus its seed tasks
//! (the Root step). A [`Rule`] binds a parse step, an optional expand step
//! (the aid hook), and the advisory list of fields its terminal records
//! declare. Registration happens at startup; trees are immutable once handed
//! to the engine; there is no ambient global registry.
//!
//! A parse step never side-effects into the scheduler. It returns a
//! [`StepOutput`] describing children to enqueue, expansions to perform and
//! records to emit, which makes a dual-mode step (pagination discoverer AND
//! first page of content) a visible, testable return value.

use crate::context::Context;
use crate::error::CrawlError;
use crate::expansion::{ExpansionArgs, ExpansionRequest};
use crate::response::ResponseContext;
use crate::task::Task;
use crate::value::{Record, Value};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// A rule's parse step: inspect the response, read and mutate the task's
/// context, and return what the scheduler should do next.
pub type ParseStep =
    Arc<dyn Fn(&ResponseContext, &Context) -> Result<StepOutput, CrawlError> + Send + Sync>;

/// A rule's expand step: turn the args a parse step computed from the page
/// into a concrete [`ExpansionRequest`] (bounds, target rule, URL template).
pub type ExpandStep =
    Arc<dyn Fn(&ExpansionArgs, &Context) -> Result<ExpansionRequest, CrawlError> + Send + Sync>;

/// How a child inherits the parent task's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritMode {
    /// Independent snapshot; child mutations never reach the parent.
    Copy,
    /// Alias of the parent's store; used when the parent has finished
    /// mutating and merely forwards state downstream.
    Share,
}

/// A child task requested by a parse step.
#[derive(Debug)]
pub struct ChildTask {
    pub url: String,
    pub rule: String,
    pub priority: u32,
    pub mode: InheritMode,
    pub delta: Vec<(String, Value)>,
    pub pacing_key: Option<String>,
}

impl ChildTask {
    pub fn new(url: impl Into<String>, rule: impl Into<String>) -> Self {
        ChildTask {
            url: url.into(),
            rule: rule.into(),
            priority: 0,
            mode: InheritMode::Copy,
            delta: Vec::new(),
            pacing_key: None,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Inherit by aliasing instead of copying. A share-mode child cannot
    /// carry a [`ChildTask::with`] delta; set keys on the parent context
    /// before sharing.
    pub fn share_context(mut self) -> Self {
        self.mode = InheritMode::Share;
        self
    }

    /// Adds a context key applied on top of the inherited state.
    ///
    /// Only valid on copy-mode children: merging a delta through a shared
    /// alias would write into the parent and every sibling snapshot taken
    /// afterwards, so the engine rejects that combination.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.delta.push((key.into(), value.into()));
        self
    }

    /// Overrides the pacing gate for this child's branch. Defaults to the
    /// parent task's gate.
    pub fn pacing_key(mut self, key: impl Into<String>) -> Self {
        self.pacing_key = Some(key.into());
        self
    }
}

/// Everything a parse step asks the scheduler to do.
#[derive(Default)]
pub struct StepOutput {
    children: Vec<ChildTask>,
    expansions: Vec<ExpansionRequest>,
    aids: Vec<ExpansionArgs>,
    records: Vec<Record>,
}

impl StepOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues one follow-up task.
    pub fn add_child(&mut self, child: ChildTask) {
        self.children.push(child);
    }

    /// Requests a pre-built expansion.
    pub fn add_expansion(&mut self, request: ExpansionRequest) {
        self.expansions.push(request);
    }

    /// Requests an expansion via the current rule's expand step, handing it
    /// the bounds and extras this step computed from the page.
    pub fn request_aid(&mut self, args: ExpansionArgs) {
        self.aids.push(args);
    }

    /// Emits a finished record.
    pub fn add_record(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
            && self.expansions.is_empty()
            && self.aids.is_empty()
            && self.records.is_empty()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<ChildTask>,
        Vec<ExpansionRequest>,
        Vec<ExpansionArgs>,
        Vec<Record>,
    ) {
        (self.children, self.expansions, self.aids, self.records)
    }
}

/// One named extraction step within a rule tree. Immutable after
/// registration.
#[derive(Clone)]
pub struct Rule {
    name: String,
    parse: ParseStep,
    expand: Option<ExpandStep>,
    declared_fields: Vec<String>,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        parse: impl Fn(&ResponseContext, &Context) -> Result<StepOutput, CrawlError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Rule {
            name: name.into(),
            parse: Arc::new(parse),
            expand: None,
            declared_fields: Vec::new(),
        }
    }

    /// Attaches the expand step [`StepOutput::request_aid`] resolves to.
    pub fn with_expand(
        mut self,
        expand: impl Fn(&ExpansionArgs, &Context) -> Result<ExpansionRequest, CrawlError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.expand = Some(Arc::new(expand));
        self
    }

    /// Declares the fields this rule's terminal records carry. Advisory by
    /// default; see [`RuleTree::strict_fields`].
    pub fn with_fields<S: Into<String>, I: IntoIterator<Item = S>>(mut self, fields: I) -> Self {
        self.declared_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_fields(&self) -> &[String] {
        &self.declared_fields
    }

    pub(crate) fn parse(
        &self,
        response: &ResponseContext,
        context: &Context,
    ) -> Result<StepOutput, CrawlError> {
        (self.parse)(response, context)
    }

    pub(crate) fn expand(
        &self,
        args: &ExpansionArgs,
        context: &Context,
    ) -> Result<ExpansionRequest, CrawlError> {
        match &self.expand {
            Some(step) => step(args, context),
            None => Err(CrawlError::Configuration(format!(
                "rule {:?} requested aid but declares no expand step",
                self.name
            ))),
        }
    }

    /// Compares a record's keys against the declaration. Returns the
    /// `(missing, extra)` field names, or `None` when they match or nothing
    /// was declared.
    pub(crate) fn field_divergence(&self, record: &Record) -> Option<(Vec<String>, Vec<String>)> {
        if self.declared_fields.is_empty() {
            return None;
        }
        let missing: Vec<String> = self
            .declared_fields
            .iter()
            .filter(|f| !record.contains_key(*f))
            .cloned()
            .collect();
        let extra: Vec<String> = record
            .keys()
            .filter(|k| !self.declared_fields.iter().any(|f| f == *k))
            .cloned()
            .collect();
        if missing.is_empty() && extra.is_empty() {
            None
        } else {
            Some((missing, extra))
        }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("has_expand", &self.expand.is_some())
            .field("declared_fields", &self.declared_fields)
            .finish()
    }
}

/// A seed task, the Root step's output: no response is involved.
#[derive(Debug, Clone)]
pub struct SeedTask {
    pub url: String,
    pub rule: String,
    pub priority: u32,
    pub context: Vec<(String, Value)>,
    pub pacing_key: Option<String>,
}

impl SeedTask {
    pub fn new(url: impl Into<String>, rule: impl Into<String>) -> Self {
        SeedTask {
            url: url.into(),
            rule: rule.into(),
            priority: 0,
            context: Vec::new(),
            pacing_key: None,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Sets the pacing gate for this seed's branch, typically the channel
    /// name. Independent gates release concurrently; seeds without one gate
    /// on the tree name.
    pub fn pacing_key(mut self, key: impl Into<String>) -> Self {
        self.pacing_key = Some(key.into());
        self
    }
}

/// The full set of named rules for one target site.
#[derive(Debug)]
pub struct RuleTree {
    name: String,
    sub_namespace: String,
    strict_fields: bool,
    rules: HashMap<String, Rule>,
    seeds: Vec<SeedTask>,
}

impl RuleTree {
    /// Creates a tree. `name` doubles as the namespace on emitted records.
    pub fn new(name: impl Into<String>) -> Self {
        RuleTree {
            name: name.into(),
            sub_namespace: "items".to_string(),
            strict_fields: false,
            rules: HashMap::new(),
            seeds: Vec::new(),
        }
    }

    /// Sets the record-kind label attached to emitted records.
    pub fn sub_namespace(mut self, sub: impl Into<String>) -> Self {
        self.sub_namespace = sub.into();
        self
    }

    /// When enabled, a record whose keys diverge from its rule's declared
    /// fields fails that task instead of only logging a warning.
    pub fn strict_fields(mut self, strict: bool) -> Self {
        self.strict_fields = strict;
        self
    }

    /// Registers a rule. Duplicate names are a configuration error.
    pub fn rule(mut self, rule: Rule) -> Result<Self, CrawlError> {
        if self.rules.contains_key(rule.name()) {
            return Err(CrawlError::Configuration(format!(
                "duplicate rule {:?} in tree {:?}",
                rule.name(),
                self.name
            )));
        }
        self.rules.insert(rule.name().to_string(), rule);
        Ok(self)
    }

    /// Appends seed tasks (the Root step).
    pub fn seed<I: IntoIterator<Item = SeedTask>>(mut self, seeds: I) -> Self {
        self.seeds.extend(seeds);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.name
    }

    pub fn record_sub_namespace(&self) -> &str {
        &self.sub_namespace
    }

    pub fn is_strict(&self) -> bool {
        self.strict_fields
    }

    pub fn get_rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Materializes the seed tasks, parsing URLs and stripping fragments.
    pub fn seed_tasks(&self) -> Result<Vec<Task>, CrawlError> {
        let mut tasks = Vec::with_capacity(self.seeds.len());
        for seed in &self.seeds {
            if !self.rules.contains_key(&seed.rule) {
                return Err(CrawlError::Configuration(format!(
                    "seed targets unknown rule {:?} in tree {:?}",
                    seed.rule, self.name
                )));
            }
            let mut url = Url::parse(&seed.url)?;
            url.set_fragment(None);
            let mut task = Task::new(url, self.name.clone(), seed.rule.clone())
                .with_priority(seed.priority)
                .with_context(Context::from_pairs(seed.context.iter().cloned()));
            task.pacing_key = seed.pacing_key.clone();
            tasks.push(task);
        }
        Ok(tasks)
    }
}

/// All rule trees an engine serves, keyed by tree name. Built at startup and
/// passed into the scheduler by reference; nothing here is global.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    trees: HashMap<String, RuleTree>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tree(&mut self, tree: RuleTree) -> Result<(), CrawlError> {
        if self.trees.contains_key(tree.name()) {
            return Err(CrawlError::Configuration(format!(
                "duplicate rule tree {:?}",
                tree.name()
            )));
        }
        self.trees.insert(tree.name().to_string(), tree);
        Ok(())
    }

    pub fn with_tree(mut self, tree: RuleTree) -> Result<Self, CrawlError> {
        self.add_tree(tree)?;
        Ok(self)
    }

    pub fn tree(&self, name: &str) -> Option<&RuleTree> {
        self.trees.get(name)
    }

    /// Looks up a rule by `(tree, rule name)`.
    pub fn rule(&self, tree: &str, rule: &str) -> Option<&Rule> {
        self.trees.get(tree).and_then(|t| t.get_rule(rule))
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Seed tasks across every tree, in tree-name order for determinism.
    pub fn seed_tasks(&self) -> Result<Vec<Task>, CrawlError> {
        let mut names: Vec<&String> = self.trees.keys().collect();
        names.sort();
        let mut tasks = Vec::new();
        for name in names {
            tasks.extend(self.trees[name].seed_tasks()?);
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_rule(name: &str) -> Rule {
        Rule::new(name, |_, _| Ok(StepOutput::new()))
    }

    #[test]
    fn lookup_by_tree_and_rule_name() {
        let tree = RuleTree::new("videos")
            .rule(noop_rule("pages"))
            .unwrap()
            .rule(noop_rule("list"))
            .unwrap();
        let registry = RuleRegistry::new().with_tree(tree).unwrap();

        assert!(registry.rule("videos", "pages").is_some());
        assert!(registry.rule("videos", "nope").is_none());
        assert!(registry.rule("other", "pages").is_none());
    }

    #[test]
    fn duplicate_rule_rejected() {
        let err = RuleTree::new("t")
            .rule(noop_rule("a"))
            .unwrap()
            .rule(noop_rule("a"))
            .unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }

    #[test]
    fn seeds_materialize_with_context_and_stripped_fragment() {
        let tree = RuleTree::new("videos")
            .rule(noop_rule("pages"))
            .unwrap()
            .seed([SeedTask::new("http://list.example.com/movie#top", "pages")
                .priority(2)
                .with("channel", 0)]);

        let tasks = tree.seed_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url.as_str(), "http://list.example.com/movie");
        assert_eq!(tasks[0].priority, 2);
        assert_eq!(tasks[0].context.get_int("channel", -1).unwrap(), 0);
    }

    #[test]
    fn seed_to_unknown_rule_is_configuration_error() {
        let tree = RuleTree::new("videos")
            .rule(noop_rule("pages"))
            .unwrap()
            .seed([SeedTask::new("http://list.example.com/", "missing")]);
        assert!(matches!(
            tree.seed_tasks().unwrap_err(),
            CrawlError::Configuration(_)
        ));
    }

    #[test]
    fn field_divergence_reports_missing_and_extra() {
        let rule = noop_rule("detail").with_fields(["name", "score"]);
        let mut record = Record::new();
        record.insert("name".into(), Value::Str("x".into()));
        record.insert("bonus".into(), Value::Int(1));

        let (missing, extra) = rule.field_divergence(&record).unwrap();
        assert_eq!(missing, vec!["score".to_string()]);
        assert_eq!(extra, vec!["bonus".to_string()]);

        record.insert("score".into(), Value::Float(9.1));
        record.remove("bonus");
        assert!(rule.field_divergence(&record).is_none());
    }

    #[test]
    fn aid_without_expand_step_is_configuration_error() {
        let rule = noop_rule("pages");
        let err = rule
            .expand(&ExpansionArgs::new(1, 3, "list"), &Context::new())
            .unwrap_err();
        assert!(matches!(err, CrawlError::Configuration(_)));
    }
}
