//! Flattens nested test results into wide-column cells.
//!
//! Value layout: `STATUS[#MESSAGE][$SUBSTATUS[#SUBMESSAGE]]`. `#` separates a
//! status from its message, `$` separates the parent result from the
//! sub-result. Empty messages are treated as absent.
//!
//! Every sub-result of a test lands on the test's own row: the row key is
//! never qualified with the subtest name, so sub-results of one test collide
//! on the same (row, column). [`RowEncoder::encode_run`] collapses those
//! collisions before anything reaches the store.

use std::collections::HashMap;

use gridload_core::{EncodedCell, RunDescriptor, SubTestResult, TestResult, WriteTimestamp};

/// Pure mapping from (result, sub-result, run) to cells, stamped with the
/// pass-wide write timestamp.
#[derive(Debug, Clone, Copy)]
pub struct RowEncoder {
    timestamp: WriteTimestamp,
}

impl RowEncoder {
    pub fn new(timestamp: WriteTimestamp) -> Self {
        Self { timestamp }
    }

    pub fn timestamp(&self) -> WriteTimestamp {
        self.timestamp
    }

    pub fn encode(&self, result: &TestResult, run: &RunDescriptor) -> Vec<EncodedCell> {
        self.encode_for_column(result, &run.id())
    }

    /// Like [`encode`](Self::encode) with the run's column key already computed.
    pub fn encode_for_column(&self, result: &TestResult, column_key: &str) -> Vec<EncodedCell> {
        if result.subtests.is_empty() {
            return vec![self.cell(result, column_key, encode_value(result, None))];
        }
        result
            .subtests
            .iter()
            .map(|sub| self.cell(result, column_key, encode_value(result, Some(sub))))
            .collect()
    }

    /// Cells for a whole run, at most one per row.
    ///
    /// All cells of a run share one column, so cells on the same row would
    /// overwrite each other inside a single bulk call in no defined order.
    /// The cell encoded last in report order is the one kept: the last
    /// sub-result of a test, or the last entry when a test is listed twice.
    pub fn encode_run<'a>(
        &'a self,
        results: &'a [TestResult],
        column_key: &'a str,
    ) -> impl Iterator<Item = EncodedCell> + 'a {
        let mut last_entry: HashMap<&str, usize> = HashMap::with_capacity(results.len());
        for (i, result) in results.iter().enumerate() {
            last_entry.insert(result.test.as_str(), i);
        }
        results
            .iter()
            .enumerate()
            .filter(move |&(i, result)| last_entry.get(result.test.as_str()) == Some(&i))
            .filter_map(move |(_, result)| self.encode_for_column(result, column_key).pop())
    }

    fn cell(&self, result: &TestResult, column_key: &str, value: String) -> EncodedCell {
        EncodedCell {
            row_key: result.test.clone(),
            column_key: column_key.to_string(),
            timestamp: self.timestamp,
            value: value.into_bytes(),
        }
    }
}

pub fn encode_value(result: &TestResult, sub: Option<&SubTestResult>) -> String {
    let mut value = status_with_message(&result.status, result.message());
    if let Some(sub) = sub {
        value.push('$');
        value.push_str(&status_with_message(&sub.status, sub.message()));
    }
    value
}

fn status_with_message(status: &str, message: Option<&str>) -> String {
    match message {
        Some(m) => format!("{status}#{m}"),
        None => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn run() -> RunDescriptor {
        RunDescriptor {
            browser_name: "firefox".into(),
            browser_version: "70".into(),
            os_name: "linux".into(),
            os_version: "5.0".into(),
            full_revision_hash: "abc123".into(),
            created_at: chrono::Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            raw_results_url: "https://results.test/firefox.json".into(),
        }
    }

    fn result(status: &str, message: Option<&str>, subs: Vec<SubTestResult>) -> TestResult {
        TestResult {
            test: "/dom/a.html".into(),
            status: status.into(),
            message: message.map(str::to_string),
            subtests: subs,
        }
    }

    fn sub(name: &str, status: &str, message: Option<&str>) -> SubTestResult {
        SubTestResult {
            name: name.into(),
            status: status.into(),
            message: message.map(str::to_string),
        }
    }

    fn values(cells: &[EncodedCell]) -> Vec<String> {
        cells.iter().map(|c| c.value_str().into_owned()).collect()
    }

    #[test]
    fn plain_status() {
        let cells = RowEncoder::new(WriteTimestamp(7)).encode(&result("OK", None, vec![]), &run());
        assert_eq!(values(&cells), ["OK"]);
        assert_eq!(cells[0].row_key, "/dom/a.html");
        assert_eq!(cells[0].column_key, "firefox-70-linux-5.0@abc123#2020-01-01T00:00:00Z");
        assert_eq!(cells[0].timestamp, WriteTimestamp(7));
    }

    #[test]
    fn status_with_message_only() {
        let cells = RowEncoder::new(WriteTimestamp(0))
            .encode(&result("ERROR", Some("boom"), vec![]), &run());
        assert_eq!(values(&cells), ["ERROR#boom"]);
    }

    #[test]
    fn empty_message_is_absent() {
        let cells = RowEncoder::new(WriteTimestamp(0))
            .encode(&result("OK", Some(""), vec![sub("s", "PASS", Some(""))]), &run());
        assert_eq!(values(&cells), ["OK$PASS"]);
    }

    #[test]
    fn all_table_rows() {
        let cases = [
            (None, None, "OK$FAIL"),
            (None, Some("sm"), "OK$FAIL#sm"),
            (Some("m"), None, "OK#m$FAIL"),
            (Some("m"), Some("sm"), "OK#m$FAIL#sm"),
        ];
        for (msg, sub_msg, expected) in cases {
            let r = result("OK", msg, vec![sub("s", "FAIL", sub_msg)]);
            assert_eq!(encode_value(&r, r.subtests.first()), expected);
        }
    }

    #[test]
    fn one_cell_per_subtest_on_parent_row() {
        let r = result(
            "OK",
            None,
            vec![sub("first", "PASS", None), sub("second", "FAIL", Some("nope"))],
        );
        let cells = RowEncoder::new(WriteTimestamp(0)).encode(&r, &run());
        assert_eq!(values(&cells), ["OK$PASS", "OK$FAIL#nope"]);
        assert!(cells.iter().all(|c| c.row_key == "/dom/a.html"));
    }

    fn rows_and_values(cells: &[EncodedCell]) -> Vec<(String, String)> {
        cells
            .iter()
            .map(|c| (c.row_key.clone(), c.value_str().into_owned()))
            .collect()
    }

    #[test]
    fn run_keeps_last_subtest_per_row() {
        let results = vec![
            result("OK", None, vec![sub("x", "PASS", None), sub("y", "FAIL", None)]),
            TestResult {
                test: "/dom/b.html".into(),
                ..result("TIMEOUT", None, vec![])
            },
        ];
        let encoder = RowEncoder::new(WriteTimestamp(0));
        let cells: Vec<_> = encoder.encode_run(&results, "col").collect();
        assert_eq!(
            rows_and_values(&cells),
            [
                ("/dom/a.html".to_string(), "OK$FAIL".to_string()),
                ("/dom/b.html".to_string(), "TIMEOUT".to_string()),
            ]
        );
        assert!(cells.iter().all(|c| c.column_key == "col"));
    }

    #[test]
    fn run_keeps_last_entry_for_repeated_test() {
        let results = vec![
            result("FAIL", None, vec![]),
            TestResult {
                test: "/dom/b.html".into(),
                ..result("PASS", None, vec![])
            },
            result("PASS", Some("retried"), vec![]),
        ];
        let encoder = RowEncoder::new(WriteTimestamp(0));
        let cells: Vec<_> = encoder.encode_run(&results, "col").collect();
        assert_eq!(
            rows_and_values(&cells),
            [
                ("/dom/b.html".to_string(), "PASS".to_string()),
                ("/dom/a.html".to_string(), "PASS#retried".to_string()),
            ]
        );
    }

    fn opt_message() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(String::new())),
            "[a-z ]{1,12}".prop_map(Some),
        ]
    }

    fn expected_part(status: &str, message: &Option<String>) -> String {
        match message.as_deref() {
            Some(m) if !m.is_empty() => format!("{status}#{m}"),
            _ => status.to_string(),
        }
    }

    proptest! {
        #[test]
        fn encoding_matches_literal_composition(
            status in "[A-Z_]{1,10}",
            message in opt_message(),
            subtest in proptest::option::of(("[a-z]{1,8}", "[A-Z_]{1,10}", opt_message())),
        ) {
            let subs = subtest
                .iter()
                .map(|(name, s, m)| SubTestResult { name: name.clone(), status: s.clone(), message: m.clone() })
                .collect::<Vec<_>>();
            let r = TestResult { test: "/t.html".into(), status: status.clone(), message: message.clone(), subtests: subs };
            let cells = RowEncoder::new(WriteTimestamp(0)).encode(&r, &run());

            let mut expected = expected_part(&status, &message);
            if let Some((_, s, m)) = &subtest {
                expected.push('$');
                expected.push_str(&expected_part(s, m));
            }
            prop_assert_eq!(cells.len(), 1);
            prop_assert_eq!(cells[0].value_str().into_owned(), expected);
            prop_assert_eq!(&cells[0].row_key, "/t.html");
        }

        #[test]
        fn row_key_never_carries_subtest_name(
            test in "/[a-z]{1,8}\\.html",
            names in proptest::collection::vec("[a-z]{1,8}", 1..5),
        ) {
            let subs = names
                .iter()
                .map(|n| SubTestResult { name: n.clone(), status: "PASS".into(), message: None })
                .collect::<Vec<_>>();
            let r = TestResult { test: test.clone(), status: "OK".into(), message: None, subtests: subs };
            let cells = RowEncoder::new(WriteTimestamp(0)).encode(&r, &run());
            prop_assert_eq!(cells.len(), names.len());
            for cell in &cells {
                prop_assert_eq!(&cell.row_key, &test);
                prop_assert!(!cell.row_key.contains(':'));
            }
        }

        #[test]
        fn run_writes_each_row_once(
            entries in proptest::collection::vec(("/[a-c]\\.html", 0usize..4), 1..12),
        ) {
            let results: Vec<TestResult> = entries
                .iter()
                .map(|(test, subs)| TestResult {
                    test: test.clone(),
                    status: "OK".into(),
                    message: None,
                    subtests: (0..*subs)
                        .map(|i| SubTestResult { name: format!("s{i}"), status: format!("S{i}"), message: None })
                        .collect(),
                })
                .collect();
            let encoder = RowEncoder::new(WriteTimestamp(0));
            let cells: Vec<_> = encoder.encode_run(&results, "col").collect();

            let distinct: std::collections::HashSet<_> = entries.iter().map(|(t, _)| t.as_str()).collect();
            prop_assert_eq!(cells.len(), distinct.len());
            for cell in &cells {
                let last = results.iter().rev().find(|r| r.test == cell.row_key).unwrap();
                let expected = encode_value(last, last.subtests.last());
                prop_assert_eq!(cell.value_str().into_owned(), expected);
            }
        }
    }
}
