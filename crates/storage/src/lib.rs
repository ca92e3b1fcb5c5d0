pub mod bigtable;
pub mod credentials;
pub mod datastore;
pub mod error;
pub mod run_source;
pub mod store;

pub use bigtable::BigtableStore;
pub use credentials::Credentials;
pub use datastore::DatastoreRunSource;
pub use error::StorageError;
pub use run_source::RunSource;
pub use store::{ColumnStore, RowMutation, RowWriteError, SetCell};

/// Turn a non-2xx response into [`StorageError::Api`], keeping the body for logs.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, StorageError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Api { status, body })
}
