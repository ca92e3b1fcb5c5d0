use async_trait::async_trait;
use gridload_core::RunDescriptor;

use crate::error::StorageError;

/// Metadata store query producing the runs to load.
#[async_trait]
pub trait RunSource: Send + Sync {
    /// Every run, ascending by creation time, fully materialized.
    ///
    /// Any failure while paging is returned as an error; callers must not
    /// proceed with a partial list.
    async fn fetch_all(&self) -> Result<Vec<RunDescriptor>, StorageError>;
}
