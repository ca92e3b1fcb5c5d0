//! Size-bounded mutation batches for one run.
//!
//! Each task owns its own [`BatchAccumulator`]; batches are never shared
//! across runs, so no locking is needed on batch state.

use std::sync::Arc;

use tracing::{error, info};

use gridload_core::EncodedCell;
use gridload_storage::{ColumnStore, RowMutation};

/// Write counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Cells handed to the store.
    pub cells: usize,
    /// Bulk-apply calls issued.
    pub batches: usize,
    /// Cells the store rejected, individually or as part of a failed batch.
    pub failed_cells: usize,
    /// Bulk-apply calls that failed as a whole.
    pub failed_batches: usize,
}

pub struct BatchAccumulator {
    store: Arc<dyn ColumnStore>,
    family: String,
    max_mutations: usize,
    pending: Vec<RowMutation>,
    stats: WriteStats,
}

impl BatchAccumulator {
    pub fn new(store: Arc<dyn ColumnStore>, family: impl Into<String>, max_mutations: usize) -> Self {
        let max_mutations = max_mutations.max(1);
        Self {
            store,
            family: family.into(),
            max_mutations,
            pending: Vec::new(),
            stats: WriteStats::default(),
        }
    }

    /// Queue a cell. A full batch is flushed first, so the new cell opens
    /// the next batch instead of overflowing the current one.
    pub async fn add(&mut self, cell: EncodedCell) {
        if self.pending.len() >= self.max_mutations {
            self.flush().await;
        }
        self.pending.push(RowMutation::from_cell(&self.family, cell));
    }

    /// Apply pending mutations in one bulk call. No-op when empty.
    ///
    /// Failures are logged and counted, never retried.
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let first_row = batch[0].row_key.as_str();
        self.stats.batches += 1;
        self.stats.cells += batch.len();

        match self.store.apply_bulk(&batch).await {
            Ok(errs) if errs.is_empty() => {
                info!(
                    mutations = batch.len(),
                    first_row = %first_row,
                    "bulk write success"
                );
            }
            Ok(errs) => {
                self.stats.failed_cells += errs.len();
                error!(
                    failed = errs.len(),
                    mutations = batch.len(),
                    first_failure = %errs[0],
                    "some writes from bulk write failed"
                );
            }
            Err(e) => {
                self.stats.failed_batches += 1;
                self.stats.failed_cells += batch.len();
                error!(
                    error = %e,
                    mutations = batch.len(),
                    first_row = %first_row,
                    "bulk write failed"
                );
            }
        }
    }

    /// Number of mutations waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gridload_core::WriteTimestamp;
    use gridload_storage::{RowWriteError, StorageError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<Vec<String>>>,
        fail_rows: Vec<&'static str>,
        fail_all: bool,
    }

    #[async_trait]
    impl ColumnStore for RecordingStore {
        async fn apply_bulk(
            &self,
            mutations: &[RowMutation],
        ) -> Result<Vec<RowWriteError>, StorageError> {
            self.calls
                .lock()
                .unwrap()
                .push(mutations.iter().map(|m| m.row_key.clone()).collect());
            if self.fail_all {
                return Err(StorageError::Other("unavailable".into()));
            }
            Ok(mutations
                .iter()
                .enumerate()
                .filter(|(_, m)| self.fail_rows.contains(&m.row_key.as_str()))
                .map(|(index, m)| RowWriteError {
                    index,
                    row_key: m.row_key.clone(),
                    code: 8,
                    message: "rejected".into(),
                })
                .collect())
        }
    }

    fn cell(row: &str) -> EncodedCell {
        EncodedCell {
            row_key: row.into(),
            column_key: "col".into(),
            timestamp: WriteTimestamp(0),
            value: b"PASS".to_vec(),
        }
    }

    #[tokio::test]
    async fn flushes_only_when_full_then_starts_fresh_batch() {
        let store = Arc::new(RecordingStore::default());
        let mut acc = BatchAccumulator::new(store.clone(), "runs", 2);

        acc.add(cell("a")).await;
        acc.add(cell("b")).await;
        assert!(store.calls.lock().unwrap().is_empty());
        assert_eq!(acc.pending(), 2);

        acc.add(cell("c")).await;
        assert_eq!(*store.calls.lock().unwrap(), vec![vec!["a", "b"]]);
        assert_eq!(acc.pending(), 1);

        acc.flush().await;
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec![vec!["a", "b"], vec!["c"]]
        );
        assert_eq!(acc.stats().batches, 2);
        assert_eq!(acc.stats().cells, 3);
    }

    #[tokio::test]
    async fn flush_empty_is_noop() {
        let store = Arc::new(RecordingStore::default());
        let mut acc = BatchAccumulator::new(store.clone(), "runs", 10);
        acc.flush().await;
        assert!(store.calls.lock().unwrap().is_empty());
        assert_eq!(acc.stats(), WriteStats::default());
    }

    #[tokio::test]
    async fn mutations_target_configured_family() {
        struct FamilyCheck;
        #[async_trait]
        impl ColumnStore for FamilyCheck {
            async fn apply_bulk(
                &self,
                mutations: &[RowMutation],
            ) -> Result<Vec<RowWriteError>, StorageError> {
                assert!(mutations.iter().all(|m| m.cells[0].family == "results"));
                Ok(Vec::new())
            }
        }
        let mut acc = BatchAccumulator::new(Arc::new(FamilyCheck), "results", 10);
        acc.add(cell("a")).await;
        acc.flush().await;
        assert_eq!(acc.stats().batches, 1);
    }

    #[tokio::test]
    async fn partial_failure_is_counted_and_processing_continues() {
        let store = Arc::new(RecordingStore {
            fail_rows: vec!["b"],
            ..Default::default()
        });
        let mut acc = BatchAccumulator::new(store.clone(), "runs", 2);
        for row in ["a", "b", "c"] {
            acc.add(cell(row)).await;
        }
        acc.flush().await;

        let stats = acc.stats();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.failed_cells, 1);
        assert_eq!(stats.failed_batches, 0);
    }

    #[tokio::test]
    async fn whole_batch_failure_is_not_retried() {
        let store = Arc::new(RecordingStore {
            fail_all: true,
            ..Default::default()
        });
        let mut acc = BatchAccumulator::new(store.clone(), "runs", 2);
        for row in ["a", "b", "c"] {
            acc.add(cell(row)).await;
        }
        acc.flush().await;

        assert_eq!(store.calls.lock().unwrap().len(), 2);
        let stats = acc.stats();
        assert_eq!(stats.failed_batches, 2);
        assert_eq!(stats.failed_cells, 3);
        assert_eq!(acc.pending(), 0);
    }
}
