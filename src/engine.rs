//! # Crawl Engine
//!
//! The worker pool that drains the task queue and drives each task through
//! its lifecycle: `Queued → Fetching → Parsing → {Expanding, Emitting} →
//! Done`, or `Failed` when the downloader reports an error.
//!
//! Workers pull tasks in priority order, fetch through the downloader
//! collaborator, dispatch the response to the named rule's parse step with
//! the task's context, then consume the returned [`StepOutput`]: perform
//! expansions, enqueue children, forward records to the sink task. A step
//! may expand and emit in the same invocation, in either order or both.
//!
//! Failures are contained: a failed task takes down nothing but itself and
//! its unexpanded subtree. The pool shuts down when the queue reports
//! finished (empty with no active task) or on a cooperative stop.

use crate::emit::{self, Emitted, RecordSink};
use crate::error::CrawlError;
use crate::fetch::Fetcher;
use crate::pacing::{PacingClass, PacingPolicy};
use crate::queue::TaskQueue;
use crate::registry::{InheritMode, Rule, RuleRegistry, RuleTree};
use crate::stats::StatCollector;
use crate::task::Task;
use crate::text;
use kanal::AsyncSender;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use url::Url;

#[cfg(feature = "checkpoint")]
use crate::checkpoint::{load_checkpoint, save_checkpoint, QueueCheckpoint};
#[cfg(feature = "checkpoint")]
use std::path::PathBuf;

/// The orchestrator for one crawl run. Built by
/// [`EngineBuilder`](crate::builder::EngineBuilder), consumed by
/// [`CrawlEngine::run`].
pub struct CrawlEngine {
    registry: Arc<RuleRegistry>,
    queue: Arc<TaskQueue>,
    fetcher: Arc<dyn Fetcher>,
    pacing: Arc<dyn PacingPolicy>,
    sinks: Arc<Vec<Box<dyn RecordSink>>>,
    stats: Arc<StatCollector>,
    workers: usize,
    channel_capacity: usize,
    #[cfg(feature = "checkpoint")]
    pub(crate) checkpoint_path: Option<PathBuf>,
}

impl std::fmt::Debug for CrawlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlEngine")
            .field("workers", &self.workers)
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

/// Requests a cooperative stop of a running engine.
///
/// Workers observe the stop at their next dequeue and abandon waiting
/// without crashing; the backlog stays re-drainable.
#[derive(Clone)]
pub struct StopHandle {
    queue: Arc<TaskQueue>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.queue.stop();
    }
}

impl CrawlEngine {
    pub(crate) fn new(
        registry: RuleRegistry,
        fetcher: Arc<dyn Fetcher>,
        pacing: Arc<dyn PacingPolicy>,
        sinks: Vec<Box<dyn RecordSink>>,
        workers: usize,
        channel_capacity: usize,
    ) -> Self {
        CrawlEngine {
            registry: Arc::new(registry),
            queue: Arc::new(TaskQueue::new()),
            fetcher,
            pacing,
            sinks: Arc::new(sinks),
            stats: Arc::new(StatCollector::new()),
            workers,
            channel_capacity,
            #[cfg(feature = "checkpoint")]
            checkpoint_path: None,
        }
    }

    /// A handle for stopping this engine from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// The statistics collector, for live or post-run inspection.
    pub fn stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    /// Enqueues a saved backlog, if one exists. Returns true when the run
    /// resumes from it instead of seeding.
    #[cfg(feature = "checkpoint")]
    fn restore_backlog(&self) -> bool {
        let Some(path) = &self.checkpoint_path else {
            return false;
        };
        if !path.exists() {
            return false;
        }
        match load_checkpoint(path) {
            Ok(checkpoint) => {
                info!("resuming {} pending tasks from checkpoint", checkpoint.len());
                for task in checkpoint.pending {
                    self.stats.increment_tasks_enqueued();
                    self.queue.enqueue(task);
                }
                true
            }
            Err(e) => {
                warn!("failed to load checkpoint from {path:?}: {e}");
                false
            }
        }
    }

    #[cfg(not(feature = "checkpoint"))]
    fn restore_backlog(&self) -> bool {
        false
    }

    /// Runs the crawl to completion (or cooperative stop) and returns the
    /// collected statistics.
    pub async fn run(self) -> Result<Arc<StatCollector>, CrawlError> {
        info!(workers = self.workers, "crawl engine starting");

        // A restored checkpoint replaces seeding entirely: the backlog
        // already embodies the crawl's progress, and re-seeding would
        // refetch every channel root and duplicate its records.
        if !self.restore_backlog() {
            let seeds = self.registry.seed_tasks()?;
            if seeds.is_empty() {
                warn!("no seed tasks registered, crawl will finish immediately");
            }
            for task in seeds {
                self.pacing
                    .throttle(task.pacing_gate(), PacingClass::Seed)
                    .await;
                debug!("seeding {}", task.identity());
                self.stats.increment_tasks_enqueued();
                self.queue.enqueue(task);
            }
        }

        let (record_tx, record_rx) = kanal::bounded_async(self.channel_capacity);
        let sink_task =
            emit::spawn_sink_task(record_rx, Arc::clone(&self.sinks), Arc::clone(&self.stats));

        let mut workers = tokio::task::JoinSet::new();
        for worker_id in 0..self.workers {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&self.queue),
                Arc::clone(&self.registry),
                Arc::clone(&self.fetcher),
                Arc::clone(&self.pacing),
                Arc::clone(&self.stats),
                record_tx.clone(),
            ));
        }
        drop(record_tx);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, initiating cooperative stop");
                self.queue.stop();
            }
            _ = async {
                while workers.join_next().await.is_some() {}
            } => {}
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("worker task failed: {e}");
            }
        }

        if let Err(e) = sink_task.await {
            error!("sink task failed: {e}");
        }

        #[cfg(feature = "checkpoint")]
        if let Some(path) = &self.checkpoint_path {
            if self.queue.is_stopped() {
                let pending = self.queue.drain_pending();
                save_checkpoint(path, &QueueCheckpoint::new(pending))?;
            } else if path.exists() {
                // Finished cleanly: a stale checkpoint would hijack the next
                // run's seeding.
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("failed to remove consumed checkpoint {path:?}: {e}");
                }
            }
        }

        info!(
            "crawl finished: dispatched={}, succeeded={}, failed={}, records={}",
            self.stats
                .tasks_dispatched
                .load(std::sync::atomic::Ordering::SeqCst),
            self.stats
                .tasks_succeeded
                .load(std::sync::atomic::Ordering::SeqCst),
            self.stats
                .tasks_failed
                .load(std::sync::atomic::Ordering::SeqCst),
            self.stats
                .records_emitted
                .load(std::sync::atomic::Ordering::SeqCst),
        );
        Ok(self.stats)
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<TaskQueue>,
    registry: Arc<RuleRegistry>,
    fetcher: Arc<dyn Fetcher>,
    pacing: Arc<dyn PacingPolicy>,
    stats: Arc<StatCollector>,
    record_tx: AsyncSender<Emitted>,
) {
    trace!(worker_id, "worker started");
    while let Some(task) = queue.dequeue().await {
        process_task(
            &task, &queue, &registry, &fetcher, &pacing, &stats, &record_tx,
        )
        .await;
        queue.task_done();
    }
    trace!(worker_id, "worker finished");
}

/// Drives one task from dispatch to a terminal state. Every failure path
/// returns instead of propagating, so nothing here can take down the pool.
async fn process_task(
    task: &Task,
    queue: &Arc<TaskQueue>,
    registry: &Arc<RuleRegistry>,
    fetcher: &Arc<dyn Fetcher>,
    pacing: &Arc<dyn PacingPolicy>,
    stats: &Arc<StatCollector>,
    record_tx: &AsyncSender<Emitted>,
) {
    stats.record_dispatch(&task.tree, &task.rule);

    let Some(tree) = registry.tree(&task.tree) else {
        error!(task = %task.identity(), "task references unknown rule tree");
        stats.increment_tasks_failed();
        return;
    };
    let Some(rule) = tree.get_rule(&task.rule) else {
        error!(task = %task.identity(), "task references unknown rule");
        stats.increment_tasks_failed();
        return;
    };

    // Fetching (external collaborator). A fetch error is terminal for this
    // task; siblings already queued are unaffected.
    let response = match fetcher.fetch(&task.url).await {
        Ok(response) => response,
        Err(e) => {
            warn!(task = %task.identity(), "fetch failed, task terminated: {e}");
            stats.increment_tasks_failed();
            return;
        }
    };

    // Parsing.
    let output = match rule.parse(&response, &task.context) {
        Ok(output) => output,
        Err(CrawlError::ParseDefect(message)) => {
            // Expected markup absent: critical warning, branch abandoned.
            error!(task = %task.identity(), "parse defect, branch abandoned: {message}");
            stats.increment_branches_abandoned();
            return;
        }
        Err(e) => {
            error!(task = %task.identity(), "parse step failed: {e}");
            stats.increment_tasks_failed();
            return;
        }
    };

    let (children, mut expansions, aids, records) = output.into_parts();

    // Aid calls resolve through the current rule's expand step.
    for args in &aids {
        match rule.expand(args, &task.context) {
            Ok(request) => expansions.push(request),
            Err(e) => {
                error!(task = %task.identity(), "aid resolution failed, branch abandoned: {e}");
                stats.increment_branches_abandoned();
            }
        }
    }

    // Expanding.
    for request in expansions {
        stats.increment_expansions_requested();
        let pacing_key = request
            .pacing_key()
            .unwrap_or_else(|| task.pacing_gate())
            .to_string();
        match request.synthesize(&task.tree, &task.context) {
            Ok(tasks) => {
                trace!(
                    task = %task.identity(),
                    count = tasks.len(),
                    target = request.target_rule(),
                    "expansion synthesized"
                );
                stats.add_tasks_synthesized(tasks.len());
                for child in tasks {
                    pacing.throttle(&pacing_key, PacingClass::Page).await;
                    stats.increment_tasks_enqueued();
                    queue.enqueue(child);
                }
            }
            Err(e) => {
                error!(task = %task.identity(), "expansion failed, branch abandoned: {e}");
                stats.increment_branches_abandoned();
            }
        }
    }

    // Direct children.
    for child in children {
        let absolute = text::absolutize(&child.url);
        let url = match Url::parse(&absolute) {
            Ok(url) => url,
            Err(e) => {
                warn!(task = %task.identity(), url = %child.url, "skipping child with invalid URL: {e}");
                stats.increment_branches_abandoned();
                continue;
            }
        };
        // A delta through a shared alias would write into the parent and
        // every later sibling snapshot; only copy-mode children may carry
        // one.
        if child.mode == InheritMode::Share && !child.delta.is_empty() {
            error!(
                task = %task.identity(),
                url = %child.url,
                "share-mode child carries a context delta, skipping"
            );
            stats.increment_branches_abandoned();
            continue;
        }
        let context = match child.mode {
            InheritMode::Copy => task.context.deep_copy(),
            InheritMode::Share => task.context.share(),
        };
        context.merge(child.delta);
        let mut next = Task::new(url, task.tree.clone(), child.rule)
            .with_priority(child.priority)
            .with_context(context);
        next.pacing_key = child.pacing_key.or_else(|| task.pacing_key.clone());
        pacing.throttle(next.pacing_gate(), PacingClass::Leaf).await;
        stats.increment_tasks_enqueued();
        queue.enqueue(next);
    }

    // Emitting.
    if !emit_records(task, tree, rule, records, stats, record_tx).await {
        return;
    }

    stats.increment_tasks_succeeded();
}

/// Forwards a step's records through the strict-field gate to the sink
/// channel. Returns false when a strict divergence failed the task.
///
/// Every record is validated before any is forwarded, so a strict failure
/// suppresses the whole step's output rather than half-emitting it.
async fn emit_records(
    task: &Task,
    tree: &RuleTree,
    rule: &Rule,
    records: Vec<crate::value::Record>,
    stats: &Arc<StatCollector>,
    record_tx: &AsyncSender<Emitted>,
) -> bool {
    for record in &records {
        if let Some((missing, extra)) = rule.field_divergence(record) {
            if tree.is_strict() {
                error!(
                    task = %task.identity(),
                    ?missing,
                    ?extra,
                    "record fields diverge from declaration, task failed"
                );
                stats.increment_tasks_failed();
                return false;
            }
            warn!(
                task = %task.identity(),
                ?missing,
                ?extra,
                "record fields diverge from declaration"
            );
        }
    }

    for record in records {
        let emitted = Emitted {
            namespace: tree.namespace().to_string(),
            sub_namespace: tree.record_sub_namespace().to_string(),
            record,
        };
        if record_tx.send(emitted).await.is_err() {
            error!(task = %task.identity(), "record channel closed, record dropped");
            stats.increment_records_dropped();
        }
    }
    true
}
