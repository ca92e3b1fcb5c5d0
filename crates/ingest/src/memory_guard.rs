//! Coarse memory watchdog for the whole process.
//!
//! The guard samples memory usage on a fixed interval and returns a
//! [`GuardTrip`] the first time usage exceeds the threshold. It does not
//! kill anything itself: the coordinator that spawned it decides how to
//! terminate.

use std::time::Duration;

use sysinfo::{Pid, System};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use gridload_core::config::MemoryConfig;

/// Source of memory usage samples, in bytes. `None` means the reading could
/// not be taken this tick.
pub trait HeapSampler: Send + 'static {
    fn sample(&mut self) -> Option<u64>;
}

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("cannot resolve own pid: {0}")]
    Pid(String),
}

/// Samples the resident memory of the current process.
pub struct ProcessHeapSampler {
    system: System,
    pid: Pid,
}

impl ProcessHeapSampler {
    pub fn new() -> Result<Self, SamplerError> {
        let pid = sysinfo::get_current_pid().map_err(|e| SamplerError::Pid(e.to_string()))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl HeapSampler for ProcessHeapSampler {
    fn sample(&mut self) -> Option<u64> {
        self.system.refresh_process(self.pid);
        self.system.process(self.pid).map(|p| p.memory())
    }
}

/// Terminal signal: the sampled usage crossed the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardTrip {
    pub heap_bytes: u64,
    pub limit_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryGuard {
    max_heap_bytes: u64,
    interval: Duration,
}

impl MemoryGuard {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            max_heap_bytes: config.max_heap_bytes,
            interval: config.sample_interval,
        }
    }

    pub fn check(&self, heap_bytes: u64) -> Result<(), GuardTrip> {
        if heap_bytes > self.max_heap_bytes {
            Err(GuardTrip {
                heap_bytes,
                limit_bytes: self.max_heap_bytes,
            })
        } else {
            Ok(())
        }
    }

    /// Sample until the threshold is exceeded. Only ever returns a trip.
    pub async fn watch<S: HeapSampler>(self, mut sampler: S) -> GuardTrip {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(heap_bytes) = sampler.sample() else {
                warn!("memory monitor: sample unavailable, skipping this tick");
                continue;
            };
            match self.check(heap_bytes) {
                Ok(()) => info!(heap_bytes, "memory monitor: usage OK"),
                Err(trip) => {
                    error!(
                        heap_bytes = trip.heap_bytes,
                        limit_bytes = trip.limit_bytes,
                        "memory monitor: out of memory"
                    );
                    return trip;
                }
            }
        }
    }

    pub fn spawn<S: HeapSampler>(self, sampler: S) -> JoinHandle<GuardTrip> {
        tokio::spawn(self.watch(sampler))
    }
}
