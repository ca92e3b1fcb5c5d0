//! Wide-column store write interface.

use std::fmt;

use async_trait::async_trait;
use gridload_core::{EncodedCell, WriteTimestamp};
use serde::Serialize;

use crate::error::StorageError;

/// Set one cell in a column family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetCell {
    pub family: String,
    pub column: String,
    pub timestamp: WriteTimestamp,
    pub value: Vec<u8>,
}

/// All cell writes destined for one row in a bulk-apply call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowMutation {
    pub row_key: String,
    pub cells: Vec<SetCell>,
}

impl RowMutation {
    /// A mutation writing a single encoded cell into `family`.
    pub fn from_cell(family: &str, cell: EncodedCell) -> Self {
        Self {
            row_key: cell.row_key,
            cells: vec![SetCell {
                family: family.to_string(),
                column: cell.column_key,
                timestamp: cell.timestamp,
                value: cell.value,
            }],
        }
    }
}

/// A mutation the store rejected inside an otherwise accepted bulk-apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWriteError {
    /// Position of the mutation in the submitted batch.
    pub index: usize,
    pub row_key: String,
    pub code: i32,
    pub message: String,
}

impl fmt::Display for RowWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} (#{}): code {}: {}",
            self.row_key, self.index, self.code, self.message
        )
    }
}

/// Bulk-apply primitive of the output store.
///
/// Implementations must accept concurrent calls from many tasks without
/// external locking.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Apply all mutations in one request.
    ///
    /// `Ok` carries the per-row failures (empty when everything landed);
    /// `Err` means the request as a whole failed.
    async fn apply_bulk(&self, mutations: &[RowMutation]) -> Result<Vec<RowWriteError>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cell_targets_family() {
        let cell = EncodedCell {
            row_key: "/a.html".into(),
            column_key: "chrome-1-linux-1@h#2020-01-01T00:00:00Z".into(),
            timestamp: WriteTimestamp(1_000),
            value: b"PASS".to_vec(),
        };
        let m = RowMutation::from_cell("runs", cell);
        assert_eq!(m.row_key, "/a.html");
        assert_eq!(m.cells.len(), 1);
        assert_eq!(m.cells[0].family, "runs");
        assert_eq!(m.cells[0].value, b"PASS");
    }

    #[test]
    fn row_write_error_display_names_row() {
        let e = RowWriteError {
            index: 3,
            row_key: "/b.html".into(),
            code: 8,
            message: "quota".into(),
        };
        assert_eq!(e.to_string(), "row /b.html (#3): code 8: quota");
    }
}
