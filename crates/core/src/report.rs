use serde::{Deserialize, Deserializer, Serialize};

/// The JSON document a run uploads: one entry per executed test.
///
/// Unknown top-level fields (`run_info`, `time_start`, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<TestResult>,
}

/// Outcome of one test file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test identifier, e.g. `/dom/nodes/Node-cloneNode.html`.
    pub test: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subtests: Vec<SubTestResult>,
}

/// Outcome of an individual assertion nested in a [`TestResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTestResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl TestResult {
    /// The message, treating an empty string the same as an absent one.
    pub fn message(&self) -> Option<&str> {
        non_empty(self.message.as_deref())
    }
}

impl SubTestResult {
    /// The message, treating an empty string the same as an absent one.
    pub fn message(&self) -> Option<&str> {
        non_empty(self.message.as_deref())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|m| !m.is_empty())
}

/// `null` reads as the type's empty value, the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
