//! Bulk record loading.
//!
//! Records are streamed one line at a time and added independently. A record
//! that fails to parse or is rejected by the engine is reported and skipped;
//! the rest of the batch still loads. Losing the connection or the input
//! stream stops the load.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, BufReader};

use crate::error::{SzError, SzResult, TransportError};
use crate::flags::SzFlags;
use crate::record::{next_line, Record};
use crate::service::SzEngine;

/// A record that could not be loaded.
#[derive(Debug)]
pub struct RecordFailure {
    /// 1-based line number in the input.
    pub line: usize,
    /// Data source, if the line could be parsed that far.
    pub data_source: Option<String>,
    /// Record id, if the line could be parsed that far.
    pub record_id: Option<String>,
    /// Why the record was rejected.
    pub error: SzError,
}

/// Outcome of one input line.
#[derive(Debug)]
pub enum RecordOutcome {
    /// The engine accepted the record.
    Added {
        /// 1-based line number in the input.
        line: usize,
        /// Data source of the record.
        data_source: String,
        /// Record id.
        record_id: String,
        /// Info payload returned by the engine (empty without `WITH_INFO`).
        info: String,
    },
    /// The record was rejected.
    Failed(RecordFailure),
}

/// Counts for a finished load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Non-blank lines seen.
    pub attempted: usize,
    /// Records the engine accepted.
    pub succeeded: usize,
    /// Records that were rejected, in input order.
    pub failures: Vec<RecordFailure>,
}

impl LoadReport {
    /// Number of rejected records.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failures.extend(other.failures);
    }
}

/// Streams records into an engine.
pub struct BulkLoader {
    engine: Arc<dyn SzEngine>,
    flags: SzFlags,
}

impl std::fmt::Debug for BulkLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkLoader").field("flags", &self.flags).finish_non_exhaustive()
    }
}

impl BulkLoader {
    /// Loader that asks for an info payload per record.
    #[must_use]
    pub fn new(engine: Arc<dyn SzEngine>) -> Self {
        Self {
            engine,
            flags: SzFlags::WITH_INFO,
        }
    }

    /// Overrides the flags sent with each `add_record`.
    #[must_use]
    pub fn with_flags(mut self, flags: SzFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Loads one line. Returns `Err` only for failures that should stop the batch.
    async fn load_line(&self, line: &str, line_number: usize) -> SzResult<RecordOutcome> {
        let record = match Record::parse(line, line_number) {
            Ok(record) => record,
            Err(err) => {
                return Ok(RecordOutcome::Failed(RecordFailure {
                    line: line_number,
                    data_source: None,
                    record_id: None,
                    error: err.into(),
                }))
            }
        };

        match self
            .engine
            .add_record(&record.data_source, &record.record_id, &record.definition, self.flags)
            .await
        {
            Ok(info) => Ok(RecordOutcome::Added {
                line: line_number,
                data_source: record.data_source,
                record_id: record.record_id,
                info,
            }),
            Err(err) if err.is_transport() => Err(err),
            Err(err) => Ok(RecordOutcome::Failed(RecordFailure {
                line: line_number,
                data_source: Some(record.data_source),
                record_id: Some(record.record_id),
                error: err,
            })),
        }
    }

    /// Loads every line of `reader`, passing each outcome to `observer`.
    pub async fn load<R, F>(&self, mut reader: R, mut observer: F) -> SzResult<LoadReport>
    where
        R: AsyncBufRead + Unpin,
        F: FnMut(&RecordOutcome),
    {
        let mut report = LoadReport::default();
        let mut buf = Vec::new();
        let mut line_number = 0usize;

        while let Some(line) = next_line(&mut reader, &mut buf, line_number + 1).await? {
            line_number += 1;
            let outcome = match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.load_line(&line, line_number).await?,
                Err(err) => RecordOutcome::Failed(RecordFailure {
                    line: line_number,
                    data_source: None,
                    record_id: None,
                    error: err.into(),
                }),
            };
            report.attempted += 1;
            observer(&outcome);
            match outcome {
                RecordOutcome::Added { .. } => report.succeeded += 1,
                RecordOutcome::Failed(failure) => {
                    tracing::warn!(
                        line = failure.line,
                        data_source = failure.data_source.as_deref().unwrap_or("-"),
                        record_id = failure.record_id.as_deref().unwrap_or("-"),
                        error = %failure.error,
                        "record rejected"
                    );
                    report.failures.push(failure);
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed(),
            "load finished"
        );
        Ok(report)
    }

    /// Loads every line of a file.
    pub async fn load_file<F>(&self, path: impl AsRef<Path>, observer: F) -> SzResult<LoadReport>
    where
        F: FnMut(&RecordOutcome),
    {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TransportError::io(path, e))?;
        tracing::info!(path = %path.display(), "loading records");
        self.load(BufReader::new(file), observer).await
    }
}
