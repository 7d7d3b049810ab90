//! # Output Emitter
//!
//! The terminal boundary of a rule: finished records are handed downstream,
//! tagged with the namespace (source site) and sub-namespace (record kind)
//! the storage sink routes on. The emitter performs no transformation,
//! validation, or deduplication.
//!
//! Workers send records over a channel to a single sink task, which forwards
//! them to every registered [`RecordSink`] in order. That keeps concurrent
//! emission safe without a partial record ever interleaving.

use crate::error::CrawlError;
use crate::stats::StatCollector;
use crate::value::Record;
use async_trait::async_trait;
use futures_util::future::join_all;
use kanal::AsyncReceiver;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, trace};

/// A record tagged for routing.
#[derive(Debug, Clone)]
pub struct Emitted {
    pub namespace: String,
    pub sub_namespace: String,
    pub record: Record,
}

/// A downstream consumer of emitted records. Append-only; no update or
/// delete semantics.
#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, emitted: &Emitted) -> Result<(), CrawlError>;

    /// Called once when the crawl finishes, for flushing.
    async fn close(&self) {}
}

/// Logs each record as one JSON line. The default sink when none is
/// configured.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl RecordSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, emitted: &Emitted) -> Result<(), CrawlError> {
        let body = serde_json::to_string(&emitted.record)?;
        info!(
            namespace = %emitted.namespace,
            sub_namespace = %emitted.sub_namespace,
            "{body}"
        );
        Ok(())
    }
}

/// Collects records in memory, in arrival order. For tests and small runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Emitted>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A snapshot of everything delivered so far.
    pub fn records(&self) -> Vec<Emitted> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, emitted: &Emitted) -> Result<(), CrawlError> {
        self.records.lock().push(emitted.clone());
        Ok(())
    }
}

/// Arc wrapper so a test can keep a handle on a sink it also registers.
#[async_trait]
impl<T: RecordSink + ?Sized> RecordSink for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn deliver(&self, emitted: &Emitted) -> Result<(), CrawlError> {
        (**self).deliver(emitted).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

/// Drains the record channel into the sinks until every sender is dropped,
/// then closes the sinks.
pub(crate) fn spawn_sink_task(
    rx: AsyncReceiver<Emitted>,
    sinks: Arc<Vec<Box<dyn RecordSink>>>,
    stats: Arc<StatCollector>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(emitted) = rx.recv().await {
            trace!(
                namespace = %emitted.namespace,
                sub_namespace = %emitted.sub_namespace,
                "delivering record"
            );
            for sink in sinks.iter() {
                if let Err(e) = sink.deliver(&emitted).await {
                    error!(sink = sink.name(), "record delivery failed: {e}");
                    stats.increment_records_dropped();
                }
            }
            stats.increment_records_emitted();
        }

        join_all(sinks.iter().map(|s| s.close())).await;
        trace!("sink task finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[tokio::test]
    async fn records_arrive_in_send_order_without_interleaving() {
        let (tx, rx) = kanal::bounded_async::<Emitted>(16);
        let sink = MemorySink::new();
        let sinks: Arc<Vec<Box<dyn RecordSink>>> =
            Arc::new(vec![Box::new(Arc::clone(&sink))]);
        let stats = Arc::new(StatCollector::new());
        let handle = spawn_sink_task(rx, sinks, Arc::clone(&stats));

        for i in 0..10i64 {
            let mut record = Record::new();
            record.insert("i".into(), Value::Int(i));
            tx.send(Emitted {
                namespace: "tx".into(),
                sub_namespace: "videos".into(),
                record,
            })
            .await
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 10);
        for (i, emitted) in records.iter().enumerate() {
            assert_eq!(emitted.record["i"].as_int(), Some(i as i64));
            assert_eq!(emitted.namespace, "tx");
        }
    }
}
