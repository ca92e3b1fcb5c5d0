use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub const DEFAULT_CONCURRENCY: usize = 100;
pub const DEFAULT_MAX_BATCH_MUTATIONS: usize = 100_000;
pub const DEFAULT_MAX_HEAP_BYTES: u64 = 45_000_000_000;
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Immutable settings for one ingestion pass.
///
/// Built once at startup and shared by reference with every component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub gcp: GcpConfig,
    pub datastore: DatastoreConfig,
    pub bigtable: BigtableConfig,
    pub pipeline: PipelineConfig,
    pub memory: MemoryConfig,
}

impl LoadConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `GRIDLOAD_PROFILE`. When set (e.g. `STAGING`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("GRIDLOAD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            gcp: GcpConfig::from_env_profiled(p),
            datastore: DatastoreConfig::from_env_profiled(p),
            bigtable: BigtableConfig::from_env_profiled(p),
            pipeline: PipelineConfig::from_env_profiled(p),
            memory: MemoryConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.pipeline.concurrency == 0 {
            return Err(LoadError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.pipeline.max_batch_mutations == 0 {
            return Err(LoadError::InvalidConfig(
                "max mutations per batch must be at least 1".into(),
            ));
        }
        if self.gcp.request_timeout.is_zero() || self.pipeline.http_timeout.is_zero() {
            return Err(LoadError::InvalidConfig("HTTP timeouts must be non-zero".into()));
        }
        if self.memory.sample_interval.is_zero() {
            return Err(LoadError::InvalidConfig(
                "memory sampling interval must be non-zero".into(),
            ));
        }
        for (name, value) in [
            ("project id", &self.gcp.project_id),
            ("bigtable instance id", &self.bigtable.instance_id),
            ("bigtable table id", &self.bigtable.table_id),
            ("bigtable column family", &self.bigtable.column_family),
        ] {
            if value.trim().is_empty() {
                return Err(LoadError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  gcp:        project={}, bucket={}, credentials={}, request_timeout={:?}",
            self.gcp.project_id,
            self.gcp.input_bucket,
            self.gcp.credentials_file.display(),
            self.gcp.request_timeout
        );
        tracing::info!(
            "  datastore:  kind={}, order={}",
            self.datastore.run_kind,
            self.datastore.order_property
        );
        tracing::info!(
            "  bigtable:   instance={}, table={}, family={}",
            self.bigtable.instance_id,
            self.bigtable.table_id,
            self.bigtable.column_family
        );
        tracing::info!(
            "  pipeline:   concurrency={}, max_batch={}, http_timeout={:?}",
            self.pipeline.concurrency,
            self.pipeline.max_batch_mutations,
            self.pipeline.http_timeout
        );
        tracing::info!(
            "  memory:     max_heap_bytes={}, interval={:?}",
            self.memory.max_heap_bytes,
            self.memory.sample_interval
        );
    }
}

// ── GCP ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpConfig {
    pub project_id: String,
    /// Bucket holding sharded results. Not read by the load path.
    pub input_bucket: String,
    pub credentials_file: PathBuf,
    /// Deadline for each Datastore or Bigtable API call.
    pub request_timeout: Duration,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: "wptdashboard".into(),
            input_bucket: "wptd-results".into(),
            credentials_file: PathBuf::from("client-secret.json"),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl GcpConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            project_id: profiled_env_or(p, "GRIDLOAD_PROJECT_ID", &d.project_id),
            input_bucket: profiled_env_or(p, "GRIDLOAD_INPUT_GCS_BUCKET", &d.input_bucket),
            credentials_file: profiled_env_opt(p, "GRIDLOAD_GCP_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or(d.credentials_file),
            request_timeout: Duration::from_secs(profiled_env_parse(
                p,
                "GRIDLOAD_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
        }
    }
}

// ── Datastore (run metadata) ──────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    pub endpoint: String,
    /// Entity kind holding one record per run.
    pub run_kind: String,
    /// Property the run query is ordered by (ascending).
    pub order_property: String,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://datastore.googleapis.com".into(),
            run_kind: "TestRun".into(),
            order_property: "CreatedAt".into(),
        }
    }
}

impl DatastoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            endpoint: profiled_env_or(p, "GRIDLOAD_DATASTORE_ENDPOINT", &d.endpoint),
            run_kind: profiled_env_or(p, "GRIDLOAD_RUN_KIND", &d.run_kind),
            order_property: profiled_env_or(p, "GRIDLOAD_RUN_ORDER_PROPERTY", &d.order_property),
        }
    }
}

// ── Bigtable (output) ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigtableConfig {
    pub endpoint: String,
    pub instance_id: String,
    pub table_id: String,
    pub column_family: String,
}

impl Default for BigtableConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://bigtable.googleapis.com".into(),
            instance_id: "wpt-results-matrix".into(),
            table_id: "wpt-results-per-test-wide".into(),
            column_family: "runs".into(),
        }
    }
}

impl BigtableConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            endpoint: profiled_env_or(p, "GRIDLOAD_BIGTABLE_ENDPOINT", &d.endpoint),
            instance_id: profiled_env_or(p, "GRIDLOAD_BT_INSTANCE_ID", &d.instance_id),
            table_id: profiled_env_or(p, "GRIDLOAD_BT_TABLE_ID", &d.table_id),
            column_family: profiled_env_or(p, "GRIDLOAD_BT_FAMILY", &d.column_family),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of runs processed at once.
    pub concurrency: usize,
    /// Maximum mutations carried by one bulk-apply call.
    pub max_batch_mutations: usize,
    /// Timeout for a single report download.
    pub http_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_batch_mutations: DEFAULT_MAX_BATCH_MUTATIONS,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl PipelineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            concurrency: profiled_env_parse(p, "GRIDLOAD_CONCURRENCY", DEFAULT_CONCURRENCY),
            max_batch_mutations: profiled_env_parse(
                p,
                "GRIDLOAD_MAX_MUTATIONS_PER_BATCH",
                DEFAULT_MAX_BATCH_MUTATIONS,
            ),
            http_timeout: Duration::from_secs(profiled_env_parse(
                p,
                "GRIDLOAD_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
        }
    }
}

// ── Memory guard ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Abort once heap usage exceeds this many bytes.
    pub max_heap_bytes: u64,
    pub sample_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_heap_bytes: DEFAULT_MAX_HEAP_BYTES,
            sample_interval: Duration::from_secs(DEFAULT_SAMPLE_INTERVAL_SECS),
        }
    }
}

impl MemoryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_heap_bytes: profiled_env_parse(p, "GRIDLOAD_MAX_HEAP_BYTES", DEFAULT_MAX_HEAP_BYTES),
            sample_interval: Duration::from_secs(profiled_env_parse(
                p,
                "GRIDLOAD_MONITOR_INTERVAL_SECS",
                DEFAULT_SAMPLE_INTERVAL_SECS,
            )),
        }
    }
}
