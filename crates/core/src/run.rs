use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One recorded execution of the test suite under a browser/OS/revision.
///
/// Read once from the metadata store and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub browser_name: String,
    pub browser_version: String,
    pub os_name: String,
    pub os_version: String,
    pub full_revision_hash: String,
    pub created_at: DateTime<Utc>,
    pub raw_results_url: String,
}

impl RunDescriptor {
    /// Identity string: `browser-version-os-osversion@hash#createdAtRFC3339`.
    ///
    /// Doubles as the column key for every cell this run writes.
    pub fn id(&self) -> String {
        format!(
            "{}-{}-{}-{}@{}#{}",
            self.browser_name,
            self.browser_version,
            self.os_name,
            self.os_version,
            self.full_revision_hash,
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

impl fmt::Display for RunDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}
