//! Saving and restoring the pending task backlog.
//!
//! A stopped crawl leaves the queue re-drainable; this module persists that
//! backlog so a later run can resume where the stop landed. Tasks serialize
//! completely (URL, tree, rule, priority, context snapshot), encoded as
//! MessagePack and written via a temporary file so a crash mid-save never
//! truncates an existing checkpoint.

use crate::error::CrawlError;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// The pending backlog of a stopped (or snapshotted) queue, in dispatch
/// order.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct QueueCheckpoint {
    pub pending: Vec<Task>,
}

impl QueueCheckpoint {
    pub fn new(pending: Vec<Task>) -> Self {
        QueueCheckpoint { pending }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Serializes the checkpoint and writes it atomically to `path`.
pub fn save_checkpoint(path: &Path, checkpoint: &QueueCheckpoint) -> Result<(), CrawlError> {
    info!("saving checkpoint with {} pending tasks to {:?}", checkpoint.len(), path);

    let encoded = rmp_serde::to_vec(checkpoint)
        .map_err(|e| CrawlError::Checkpoint(format!("failed to serialize checkpoint: {e}")))?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, encoded)?;
    fs::rename(&tmp_path, path)?;

    info!("checkpoint saved");
    Ok(())
}

/// Reads a checkpoint back from `path`.
pub fn load_checkpoint(path: &Path) -> Result<QueueCheckpoint, CrawlError> {
    let bytes = fs::read(path)?;
    let checkpoint = rmp_serde::from_slice(&bytes)
        .map_err(|e| CrawlError::Checkpoint(format!("failed to deserialize checkpoint: {e}")))?;
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use url::Url;

    #[test]
    fn round_trips_tasks_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.checkpoint");

        let ctx = Context::new();
        ctx.set("channel", 2);
        ctx.set("play_count", 150_000_000i64);
        let task = Task::new(
            Url::parse("http://list.example.com/page_3.html").unwrap(),
            "tx",
            "list",
        )
        .with_priority(1)
        .with_context(ctx);

        save_checkpoint(&path, &QueueCheckpoint::new(vec![task])).unwrap();
        let restored = load_checkpoint(&path).unwrap();

        assert_eq!(restored.len(), 1);
        let task = &restored.pending[0];
        assert_eq!(task.tree, "tx");
        assert_eq!(task.rule, "list");
        assert_eq!(task.priority, 1);
        assert_eq!(task.context.get_int("play_count", 0).unwrap(), 150_000_000);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_checkpoint(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, CrawlError::Io(_)));
    }
}
