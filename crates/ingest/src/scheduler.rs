//! Bounded fan-out over runs: one task per run, at most `concurrency` alive.
//!
//! A task owns its permit for its whole life. The permit is released when
//! the task's future is dropped, so skips, write failures and panics all
//! give capacity back without explicit release calls.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use gridload_core::RunDescriptor;
use gridload_storage::ColumnStore;

use crate::batcher::{BatchAccumulator, WriteStats};
use crate::encoder::RowEncoder;
use crate::fetcher::{ReportFetcher, SkipReason};

/// How one run's task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Loaded(WriteStats),
    Skipped(SkipReason),
}

/// Totals for one ingestion pass. Informational only: none of these
/// affect the process exit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub completed: usize,
    pub loaded: usize,
    pub skipped: usize,
    pub panicked: usize,
    pub cells_written: usize,
    pub cells_failed: usize,
}

impl IngestSummary {
    fn record(&mut self, joined: Result<RunOutcome, JoinError>) {
        self.completed += 1;
        match joined {
            Ok(RunOutcome::Loaded(stats)) => {
                self.loaded += 1;
                self.cells_written += stats.cells.saturating_sub(stats.failed_cells);
                self.cells_failed += stats.failed_cells;
            }
            Ok(RunOutcome::Skipped(_)) => self.skipped += 1,
            Err(e) => {
                self.panicked += 1;
                error!(error = %e, "run task ended abnormally");
            }
        }
    }
}

/// Everything a run task needs, shared read-only across tasks.
struct RunContext {
    store: Arc<dyn ColumnStore>,
    fetcher: ReportFetcher,
    encoder: RowEncoder,
    family: String,
    max_batch_mutations: usize,
}

pub struct IngestionScheduler {
    ctx: Arc<RunContext>,
}

impl IngestionScheduler {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        fetcher: ReportFetcher,
        encoder: RowEncoder,
        family: impl Into<String>,
        max_batch_mutations: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(RunContext {
                store,
                fetcher,
                encoder,
                family: family.into(),
                max_batch_mutations,
            }),
        }
    }

    /// Load every run, never more than `concurrency_cap` at once, and return
    /// only after every task has finished and flushed.
    pub async fn run(&self, runs: Vec<RunDescriptor>, concurrency_cap: usize) -> IngestSummary {
        let permits = Arc::new(Semaphore::new(concurrency_cap.max(1)));
        let mut tasks = JoinSet::new();
        let mut summary = IngestSummary::default();
        let total = runs.len();

        for run in runs {
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "run permit pool closed, stopping dispatch");
                    break;
                }
            };
            let ctx = self.ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                load_run(&ctx, run).await
            });

            while let Some(joined) = tasks.try_join_next() {
                summary.record(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }

        info!(
            runs = total,
            loaded = summary.loaded,
            skipped = summary.skipped,
            cells = summary.cells_written,
            failed_cells = summary.cells_failed,
            "all run tasks drained"
        );
        summary
    }
}

/// Fetch → encode → accumulate for a single run. Strictly sequential.
async fn load_run(ctx: &RunContext, run: RunDescriptor) -> RunOutcome {
    let report = match ctx.fetcher.fetch(&run).await {
        Ok(report) => report,
        Err(reason) => return RunOutcome::Skipped(reason),
    };

    let column_key = run.id();
    info!(run = %column_key, results = report.results.len(), "gathering test results");

    let mut batch = BatchAccumulator::new(
        ctx.store.clone(),
        ctx.family.as_str(),
        ctx.max_batch_mutations,
    );
    for cell in ctx.encoder.encode_run(&report.results, &column_key) {
        batch.add(cell).await;
    }
    drop(report);
    batch.flush().await;

    RunOutcome::Loaded(batch.stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = IngestSummary::default();
        summary.record(Ok(RunOutcome::Loaded(WriteStats {
            cells: 5,
            batches: 1,
            failed_cells: 2,
            failed_batches: 0,
        })));
        summary.record(Ok(RunOutcome::Skipped(SkipReason::EmptyReport)));
        summary.record(Ok(RunOutcome::Skipped(SkipReason::NonOkStatus(500))));

        assert_eq!(summary.completed, 3);
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.cells_written, 3);
        assert_eq!(summary.cells_failed, 2);
    }
}
