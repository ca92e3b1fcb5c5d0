//! Downloads and decodes a run's raw results report.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::warn;

use gridload_core::{ResultReport, RunDescriptor};

/// Why a run was skipped. Skips end the run's task early but never affect
/// sibling runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("non-OK status: {0}")]
    NonOkStatus(u16),

    #[error("body read failed: {0}")]
    BodyReadFailed(String),

    #[error("unmarshal failed: {0}")]
    UnmarshalFailed(String),

    #[error("empty report")]
    EmptyReport,
}

pub struct ReportFetcher {
    client: Client,
}

impl ReportFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Fetch the run's report, logging a warning naming the run and URL on skip.
    pub async fn fetch(&self, run: &RunDescriptor) -> Result<ResultReport, SkipReason> {
        let result = self.try_fetch(&run.raw_results_url).await;
        if let Err(reason) = &result {
            warn!(
                run = %run,
                url = %run.raw_results_url,
                reason = %reason,
                "skipping run"
            );
        }
        result
    }

    async fn try_fetch(&self, url: &str) -> Result<ResultReport, SkipReason> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SkipReason::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SkipReason::NonOkStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SkipReason::BodyReadFailed(e.to_string()))?;

        let report = decode_report(body).await?;

        if report.results.is_empty() {
            return Err(SkipReason::EmptyReport);
        }
        Ok(report)
    }
}

/// Parses on the blocking pool; a large report never occupies a runtime worker.
async fn decode_report<B>(body: B) -> Result<ResultReport, SkipReason>
where
    B: AsRef<[u8]> + Send + 'static,
{
    tokio::task::spawn_blocking(move || serde_json::from_slice::<ResultReport>(body.as_ref()))
        .await
        .map_err(|e| SkipReason::UnmarshalFailed(format!("decode task failed: {e}")))?
        .map_err(|e| SkipReason::UnmarshalFailed(e.to_string()))
}
