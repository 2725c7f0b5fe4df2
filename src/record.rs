//! Input records and data-source discovery.
//!
//! Input is newline-delimited JSON. Each line is one record and must carry
//! string `DATA_SOURCE` and `RECORD_ID` fields. The line itself is sent to the
//! engine unchanged as the record payload.

use std::collections::HashSet;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{SzResult, TransportError, ValidationError};

/// Field name of the data-source label.
pub const DATA_SOURCE_FIELD: &str = "DATA_SOURCE";
/// Field name of the record identifier.
pub const RECORD_ID_FIELD: &str = "RECORD_ID";

/// One input record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Data-source label.
    pub data_source: String,
    /// Record identifier, unique within its data source.
    pub record_id: String,
    /// The original JSON text of the record.
    pub definition: String,
}

#[derive(Debug, Deserialize)]
struct RecordKeys {
    #[serde(rename = "DATA_SOURCE")]
    data_source: Option<serde_json::Value>,
    #[serde(rename = "RECORD_ID")]
    record_id: Option<serde_json::Value>,
}

fn parse_keys(line: &str, line_number: usize) -> Result<RecordKeys, ValidationError> {
    if !line.trim_start().starts_with('{') {
        return Err(ValidationError::InvalidJson {
            line: line_number,
            message: "expected a JSON object".to_string(),
        });
    }
    serde_json::from_str::<RecordKeys>(line).map_err(|e| ValidationError::InvalidJson {
        line: line_number,
        message: e.to_string(),
    })
}

fn required_string(value: Option<serde_json::Value>, field: &str) -> Result<String, ValidationError> {
    match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s),
        _ => Err(ValidationError::MissingField {
            field: field.to_string(),
        }),
    }
}

impl Record {
    /// Parses one line of input.
    ///
    /// `line_number` is 1-based and only used for error reporting.
    pub fn parse(line: &str, line_number: usize) -> Result<Self, ValidationError> {
        let keys = parse_keys(line, line_number)?;
        let data_source = required_string(keys.data_source, DATA_SOURCE_FIELD)?;
        let record_id = required_string(keys.record_id, RECORD_ID_FIELD)?;
        Ok(Self {
            data_source,
            record_id,
            definition: line.trim_end_matches(['\r', '\n']).to_string(),
        })
    }
}

/// Reads the next line of input as raw bytes and decodes it.
///
/// Returns `Ok(None)` at end of input. A line that is not valid UTF-8 is
/// returned as an `InvalidJson` error for that line only; reader failures
/// are transport errors.
pub(crate) async fn next_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    line_number: usize,
) -> SzResult<Option<Result<String, ValidationError>>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = reader
        .read_until(b'\n', buf)
        .await
        .map_err(|e| TransportError::io("<input>", e))?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8(std::mem::take(buf)).map_err(|e| {
        ValidationError::InvalidJson {
            line: line_number,
            message: format!("line is not valid UTF-8: {}", e.utf8_error()),
        }
    })))
}

/// Extracts the `DATA_SOURCE` label from one line, if it has one.
pub fn data_source_of(line: &str, line_number: usize) -> Result<String, ValidationError> {
    let keys = parse_keys(line, line_number)?;
    required_string(keys.data_source, DATA_SOURCE_FIELD)
}

/// Ordered set of data-source labels.
///
/// Labels keep their first-seen order. Duplicates are dropped by exact string
/// comparison, so `"customers"` and `"CUSTOMERS"` are distinct labels here;
/// the engine decides whether they collide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSourceSet {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl DataSourceSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label. Returns true if it was not present.
    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.seen.contains(&label) {
            return false;
        }
        self.seen.insert(label.clone());
        self.ordered.push(label);
        true
    }

    /// Labels in first-seen order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.ordered
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true if no label has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Returns true if the label has been seen.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.seen.contains(label)
    }

    /// Observes one input line.
    ///
    /// Blank lines are ignored. Lines without a usable label are logged and
    /// skipped; they are reported again when the record is loaded.
    pub fn observe_line(&mut self, line: &str, line_number: usize) {
        if line.trim().is_empty() {
            return;
        }
        match data_source_of(line, line_number) {
            Ok(label) => {
                self.insert(label);
            }
            Err(err) => {
                tracing::warn!(line = line_number, error = %err, "skipping line during data source scan");
            }
        }
    }

    /// Scans every line of an in-memory input.
    pub fn scan_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
        for (idx, line) in lines.into_iter().enumerate() {
            self.observe_line(line, idx + 1);
        }
    }

    /// Scans a reader to the end, adding every label it finds.
    pub async fn scan<R>(&mut self, mut reader: R) -> SzResult<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let mut line_number = 0usize;
        while let Some(line) = next_line(&mut reader, &mut buf, line_number + 1).await? {
            line_number += 1;
            match line {
                Ok(line) => self.observe_line(&line, line_number),
                Err(err) => {
                    tracing::warn!(line = line_number, error = %err, "skipping line during data source scan");
                }
            }
        }
        Ok(line_number)
    }

    /// Scans a file, adding every label it finds.
    pub async fn scan_file(&mut self, path: impl AsRef<std::path::Path>) -> SzResult<usize> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TransportError::io(path, e))?;
        let before = self.len();
        let lines = self.scan(tokio::io::BufReader::new(file)).await?;
        tracing::debug!(path = %path.display(), lines, new_labels = self.len() - before, "scanned input file");
        Ok(lines)
    }
}

impl<S: Into<String>> FromIterator<S> for DataSourceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for label in iter {
            set.insert(label);
        }
        set
    }
}

impl IntoIterator for DataSourceSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ordered.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let line = r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"1070","PRIMARY_NAME_FULL":"Robert Smith"}"#;
        let record = Record::parse(line, 1).unwrap();
        assert_eq!(record.data_source, "CUSTOMERS");
        assert_eq!(record.record_id, "1070");
        assert_eq!(record.definition, line);
    }

    #[test]
    fn test_parse_record_strips_line_ending() {
        let record = Record::parse("{\"DATA_SOURCE\":\"A\",\"RECORD_ID\":\"1\"}\r\n", 1).unwrap();
        assert!(record.definition.ends_with('}'));
    }

    #[test]
    fn test_parse_record_missing_id() {
        let err = Record::parse(r#"{"DATA_SOURCE":"CUSTOMERS"}"#, 3).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field == "RECORD_ID"));
    }

    #[test]
    fn test_parse_record_non_string_source() {
        let err = Record::parse(r#"{"DATA_SOURCE":7,"RECORD_ID":"1"}"#, 1).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { .. }));
    }

    #[test]
    fn test_parse_record_invalid_json() {
        let err = Record::parse("not json", 12).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidJson { line: 12, .. }));
    }

    #[test]
    fn test_data_source_set_first_seen_order() {
        let mut set = DataSourceSet::new();
        set.scan_lines([
            r#"{"DATA_SOURCE":"WATCHLIST","RECORD_ID":"1"}"#,
            r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"2"}"#,
            r#"{"DATA_SOURCE":"WATCHLIST","RECORD_ID":"3"}"#,
            r#"{"DATA_SOURCE":"REFERENCE","RECORD_ID":"4"}"#,
            r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"5"}"#,
        ]);
        assert_eq!(set.as_slice(), ["WATCHLIST", "CUSTOMERS", "REFERENCE"]);
    }

    #[test]
    fn test_data_source_set_exact_match_only() {
        let set: DataSourceSet = ["customers", "CUSTOMERS", "customers"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains("customers"));
        assert!(set.contains("CUSTOMERS"));
    }

    #[test]
    fn test_data_source_set_skips_bad_lines() {
        let mut set = DataSourceSet::new();
        set.scan_lines(["", "garbage", r#"{"RECORD_ID":"1"}"#, r#"{"DATA_SOURCE":"A","RECORD_ID":"2"}"#]);
        assert_eq!(set.as_slice(), ["A"]);
    }

    #[tokio::test]
    async fn test_scan_reader() {
        let input = b"{\"DATA_SOURCE\":\"B\",\"RECORD_ID\":\"1\"}\n{\"DATA_SOURCE\":\"A\",\"RECORD_ID\":\"2\"}\n";
        let mut set = DataSourceSet::new();
        let lines = set.scan(&input[..]).await.unwrap();
        assert_eq!(lines, 2);
        assert_eq!(set.as_slice(), ["B", "A"]);
    }

    #[tokio::test]
    async fn test_scan_skips_line_with_invalid_utf8() {
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"DATA_SOURCE\":\"B\",\"RECORD_ID\":\"1\"}\n");
        input.extend_from_slice(b"{\"DATA_SOURCE\":\"CAF\xe9\",\"RECORD_ID\":\"2\"}\r\n");
        input.extend_from_slice(b"{\"DATA_SOURCE\":\"A\",\"RECORD_ID\":\"3\"}");
        let mut set = DataSourceSet::new();
        let lines = set.scan(&input[..]).await.unwrap();
        assert_eq!(lines, 3);
        assert_eq!(set.as_slice(), ["B", "A"]);
    }

    #[tokio::test]
    async fn test_next_line_strips_line_endings() {
        let mut reader = &b"first\r\nsecond"[..];
        let mut buf = Vec::new();
        assert_eq!(next_line(&mut reader, &mut buf, 1).await.unwrap().unwrap().unwrap(), "first");
        assert_eq!(next_line(&mut reader, &mut buf, 2).await.unwrap().unwrap().unwrap(), "second");
        assert!(next_line(&mut reader, &mut buf, 3).await.unwrap().is_none());
    }
}
