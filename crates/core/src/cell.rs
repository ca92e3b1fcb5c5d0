use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cell timestamp in microseconds since the epoch, millisecond granularity.
///
/// Captured once per ingestion pass and shared by every cell written in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WriteTimestamp(pub i64);

impl WriteTimestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis() * 1000)
    }

    pub fn micros(self) -> i64 {
        self.0
    }
}

/// One (row, column, timestamp, value) write produced by the row encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedCell {
    pub row_key: String,
    pub column_key: String,
    pub timestamp: WriteTimestamp,
    pub value: Vec<u8>,
}

impl EncodedCell {
    /// The value as text, for logs and assertions.
    pub fn value_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}
