//! gridload: bulk-load per-run test result reports into Bigtable.
//!
//! One pass: enumerate runs from Datastore, fetch each run's raw results
//! report, flatten it into (row, column, value) cells and write them to the
//! wide results table. A memory watchdog runs alongside and aborts the
//! process if usage runs away.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use gridload_core::config::load_dotenv;
use gridload_core::{LoadConfig, WriteTimestamp};
use gridload_ingest::{
    IngestionScheduler, MemoryGuard, ProcessHeapSampler, ReportFetcher, RowEncoder,
};
use gridload_storage::{
    BigtableStore, ColumnStore, Credentials, DatastoreRunSource, RunSource,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Load per-test-run results into the wide per-test Bigtable table.
///
/// Every flag falls back to its `GRIDLOAD_*` environment variable, then to
/// the built-in default.
#[derive(Parser, Debug)]
#[command(name = "gridload", version, about)]
struct Cli {
    /// Config profile; `{PROFILE}_GRIDLOAD_*` env vars win over plain ones.
    #[arg(long, env = "GRIDLOAD_PROFILE")]
    profile: Option<String>,

    /// Google Cloud Platform project id.
    #[arg(long)]
    project_id: Option<String>,

    /// Cloud Storage bucket where sharded test results are stored.
    #[arg(long)]
    input_gcs_bucket: Option<String>,

    /// Path to the credentials file for Google Cloud services.
    #[arg(long)]
    gcp_credentials_file: Option<PathBuf>,

    /// Output Bigtable instance id.
    #[arg(long)]
    output_bt_instance_id: Option<String>,

    /// Output Bigtable table id.
    #[arg(long)]
    output_bt_table_id: Option<String>,

    /// Output Bigtable column family for test results.
    #[arg(long)]
    output_bt_family: Option<String>,

    /// Maximum number of runs loaded at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Maximum mutations per bulk write.
    #[arg(long)]
    max_mutations_per_batch: Option<usize>,

    /// Abort once process memory exceeds this many bytes.
    #[arg(long)]
    max_heap_bytes: Option<u64>,

    /// Seconds between memory samples.
    #[arg(long)]
    monitor_interval_secs: Option<u64>,

    /// Deadline in seconds for each Datastore or Bigtable API call.
    #[arg(long)]
    request_timeout_secs: Option<u64>,
}

impl Cli {
    fn into_config(self) -> LoadConfig {
        let mut cfg = match &self.profile {
            Some(p) => LoadConfig::for_profile(p),
            None => LoadConfig::from_env(),
        };
        if let Some(v) = self.project_id {
            cfg.gcp.project_id = v;
        }
        if let Some(v) = self.input_gcs_bucket {
            cfg.gcp.input_bucket = v;
        }
        if let Some(v) = self.gcp_credentials_file {
            cfg.gcp.credentials_file = v;
        }
        if let Some(v) = self.output_bt_instance_id {
            cfg.bigtable.instance_id = v;
        }
        if let Some(v) = self.output_bt_table_id {
            cfg.bigtable.table_id = v;
        }
        if let Some(v) = self.output_bt_family {
            cfg.bigtable.column_family = v;
        }
        if let Some(v) = self.concurrency {
            cfg.pipeline.concurrency = v;
        }
        if let Some(v) = self.max_mutations_per_batch {
            cfg.pipeline.max_batch_mutations = v;
        }
        if let Some(v) = self.max_heap_bytes {
            cfg.memory.max_heap_bytes = v;
        }
        if let Some(v) = self.monitor_interval_secs {
            cfg.memory.sample_interval = Duration::from_secs(v);
        }
        if let Some(v) = self.request_timeout_secs {
            cfg.gcp.request_timeout = Duration::from_secs(v);
        }
        cfg
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .init();

    load_dotenv();
    let config = Cli::parse().into_config();
    config.validate()?;
    config.log_summary();

    let sampler = ProcessHeapSampler::new().context("failed to start memory sampler")?;
    let guard = MemoryGuard::new(&config.memory).spawn(sampler);

    let credentials = Credentials::from_file(&config.gcp.credentials_file)
        .context("failed to load GCP credentials")?;
    let runs_source = DatastoreRunSource::new(&config.gcp, &config.datastore, credentials.clone())
        .context("failed to create Datastore client")?;
    let store: Arc<dyn ColumnStore> = Arc::new(
        BigtableStore::new(&config.gcp, &config.bigtable, credentials)
            .context("failed to create Bigtable client")?,
    );
    let fetcher = ReportFetcher::new(config.pipeline.http_timeout)
        .context("failed to create report HTTP client")?;

    // One logical "now" for every cell written by this pass.
    let encoder = RowEncoder::new(WriteTimestamp::now());
    let scheduler = IngestionScheduler::new(
        store,
        fetcher,
        encoder,
        config.bigtable.column_family.clone(),
        config.pipeline.max_batch_mutations,
    );

    let pass = async {
        let runs = runs_source
            .fetch_all()
            .await
            .context("failed to enumerate runs")?;
        info!(runs = runs.len(), "loaded run list");
        Ok::<_, anyhow::Error>(scheduler.run(runs, config.pipeline.concurrency).await)
    };

    tokio::select! {
        tripped = guard => {
            match tripped {
                Ok(trip) => {
                    error!(
                        heap_bytes = trip.heap_bytes,
                        limit_bytes = trip.limit_bytes,
                        "out of memory, aborting"
                    );
                    std::process::exit(1);
                }
                Err(e) => anyhow::bail!("memory guard task failed: {e}"),
            }
        }
        summary = pass => {
            let summary = summary?;
            info!(
                loaded = summary.loaded,
                skipped = summary.skipped,
                panicked = summary.panicked,
                cells = summary.cells_written,
                failed_cells = summary.cells_failed,
                "Finished processing {} runs",
                summary.completed
            );
            Ok(())
        }
    }
}
