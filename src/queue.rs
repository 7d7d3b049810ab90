//! # Task Queue
//!
//! The ordered, priority-aware work queue at the heart of the scheduler.
//!
//! Ready tasks dispatch highest priority first, FIFO within a priority
//! level. The queue supports concurrent producers (parse steps running on
//! several workers) and a pool of consumers draining it.
//!
//! ## Completion detection
//!
//! "Queue empty" is not "crawl finished": a worker holding a dequeued task
//! may still enqueue children. The queue therefore tracks an active-task
//! counter, incremented on dequeue-for-processing and decremented when the
//! worker reports the task done. The queue is finished only when it is empty
//! AND no task is active, which closes the premature-shutdown race.
//!
//! ## Cooperative stop
//!
//! [`TaskQueue::stop`] makes every subsequent `dequeue` return `None`
//! without draining the backlog, leaving the queue consistent and
//! re-drainable (and snapshottable) for later resumption. Tasks enqueued
//! while stopping are salvaged rather than lost.

use crate::task::{QueuedTask, Task};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::{debug, trace};

pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    seq: AtomicU64,
    /// Tasks dequeued but not yet reported done or failed.
    active: AtomicUsize,
    stopped: AtomicBool,
    notify: Notify,
    /// Tasks that arrived after a stop; kept aside so a snapshot or restart
    /// can reclaim them.
    salvaged: SegQueue<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            notify: Notify::new(),
            salvaged: SegQueue::new(),
        }
    }

    /// Enqueues a task. After a stop the task is salvaged instead, so a
    /// racing producer never loses work or panics.
    pub fn enqueue(&self, task: Task) {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("queue stopped, salvaging task {}", task.identity());
            self.salvaged.push(task);
            return;
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        trace!(seq, "enqueue {}", task.identity());
        self.heap.lock().push(QueuedTask { task, seq });
        self.notify.notify_waiters();
    }

    /// Waits for the next ready task in priority-then-FIFO order.
    ///
    /// Returns `None` once the queue is finished (empty with no active
    /// tasks) or stopped. A returned task counts as active until the caller
    /// reports [`TaskQueue::task_done`].
    pub async fn dequeue(&self) -> Option<Task> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return None;
            }

            // Register interest before re-checking, so a concurrent enqueue
            // or completion between the pop and the await still wakes us.
            let notified = self.notify.notified();

            if let Some(entry) = self.heap.lock().pop() {
                self.active.fetch_add(1, Ordering::SeqCst);
                trace!(seq = entry.seq, "dequeue {}", entry.task.identity());
                return Some(entry.task);
            }

            if self.active.load(Ordering::SeqCst) == 0 {
                // Finished: wake the other waiters so they observe it too.
                self.notify.notify_waiters();
                return None;
            }

            notified.await;
        }
    }

    /// Reports a previously dequeued task as terminal (Done or Failed).
    pub fn task_done(&self) {
        let before = self.active.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(before > 0, "task_done without a matching dequeue");
        self.notify.notify_waiters();
    }

    /// Requests a cooperative stop. In-flight tasks finish; waiting
    /// consumers return `None` at their next dequeue.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of ready (not yet dequeued) tasks.
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dequeued tasks not yet reported done.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// True only when no ready task remains and no worker holds one.
    pub fn is_finished(&self) -> bool {
        self.is_empty() && self.active_count() == 0
    }

    /// Drains the backlog (ready plus salvaged) in dispatch order, leaving
    /// the queue empty. Used for snapshots after a stop.
    pub fn drain_pending(&self) -> Vec<Task> {
        let mut heap = self.heap.lock();
        let mut pending = Vec::with_capacity(heap.len());
        while let Some(entry) = heap.pop() {
            pending.push(entry.task);
        }
        drop(heap);
        while let Some(task) = self.salvaged.pop() {
            pending.push(task);
        }
        pending
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use std::sync::Arc;
    use url::Url;

    fn task(priority: u32, label: &str) -> Task {
        Task::new(
            Url::parse(&format!("http://q.example.com/{label}")).unwrap(),
            "t",
            label,
        )
        .with_priority(priority)
    }

    #[tokio::test]
    async fn priority_then_fifo_across_dequeues() {
        let queue = TaskQueue::new();
        for (p, label) in [(0, "a"), (2, "b"), (1, "c"), (2, "d"), (0, "e")] {
            queue.enqueue(task(p, label));
        }

        let mut seen = Vec::new();
        while let Some(t) = queue.dequeue().await {
            seen.push((t.priority, t.rule.clone()));
            queue.task_done();
        }
        assert_eq!(
            seen,
            vec![
                (2, "b".to_string()),
                (2, "d".to_string()),
                (1, "c".to_string()),
                (0, "a".to_string()),
                (0, "e".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn finishes_only_after_active_producers_complete() {
        let queue = Arc::new(TaskQueue::new());
        queue.enqueue(task(0, "seed"));

        let seed = queue.dequeue().await.unwrap();
        assert_eq!(seed.rule, "seed");
        assert!(queue.is_empty());
        assert!(!queue.is_finished());

        // A second consumer must block here rather than see an empty queue
        // as finished, because the seed's worker may still produce children.
        let q2 = Arc::clone(&queue);
        let waiter = tokio::spawn(async move { q2.dequeue().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.enqueue(task(0, "child"));
        queue.task_done();

        let child = waiter.await.unwrap().unwrap();
        assert_eq!(child.rule, "child");
        queue.task_done();
        assert!(queue.is_finished());
    }

    #[tokio::test]
    async fn stress_no_premature_finish() {
        const WORKERS: usize = 8;
        const CHILDREN: usize = 16;

        let queue = Arc::new(TaskQueue::new());
        let processed = Arc::new(AtomicUsize::new(0));
        for i in 0..WORKERS {
            queue.enqueue(task(1, &format!("root{i}")));
        }

        let mut handles = Vec::new();
        for _ in 0..WORKERS {
            let queue = Arc::clone(&queue);
            let processed = Arc::clone(&processed);
            handles.push(tokio::spawn(async move {
                while let Some(t) = queue.dequeue().await {
                    if t.rule.starts_with("root") {
                        // Simulate parse latency before expansion.
                        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                        for j in 0..CHILDREN {
                            queue.enqueue(task(0, &format!("child-{}-{j}", t.rule)));
                        }
                    }
                    processed.fetch_add(1, Ordering::SeqCst);
                    queue.task_done();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(queue.is_finished());
        assert_eq!(
            processed.load(Ordering::SeqCst),
            WORKERS + WORKERS * CHILDREN
        );
    }

    #[tokio::test]
    async fn stop_salvages_late_enqueues() {
        let queue = TaskQueue::new();
        queue.enqueue(task(0, "before"));
        queue.stop();
        queue.enqueue(task(0, "after"));

        assert!(queue.dequeue().await.is_none());
        let pending: Vec<String> = queue
            .drain_pending()
            .into_iter()
            .map(|t| t.rule)
            .collect();
        assert_eq!(pending, vec!["before".to_string(), "after".to_string()]);
    }

    #[tokio::test]
    async fn context_travels_with_the_task() {
        let queue = TaskQueue::new();
        let ctx = Context::new();
        ctx.set("channel", 3);
        queue.enqueue(task(0, "x").with_context(ctx));

        let t = queue.dequeue().await.unwrap();
        assert_eq!(t.context.get_int("channel", 0).unwrap(), 3);
        queue.task_done();
    }
}
