pub mod batcher;
pub mod encoder;
pub mod fetcher;
pub mod memory_guard;
pub mod scheduler;

pub use batcher::{BatchAccumulator, WriteStats};
pub use encoder::{encode_value, RowEncoder};
pub use fetcher::{ReportFetcher, SkipReason};
pub use memory_guard::{GuardTrip, HeapSampler, MemoryGuard, ProcessHeapSampler, SamplerError};
pub use scheduler::{IngestSummary, IngestionScheduler, RunOutcome};
