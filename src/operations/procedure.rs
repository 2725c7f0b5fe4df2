//! Scan, synchronize and load over a set of record files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SzResult;
use crate::flags::SzFlags;
use crate::operations::{BulkLoader, ConfigSynchronizer, LoadReport, RecordOutcome, SyncOutcome};
use crate::record::DataSourceSet;
use crate::service::SzAbstractFactory;

/// Result of [`BulkLoadProcedure::run`].
#[derive(Debug)]
pub struct ProcedureReport {
    /// Data sources found in the input, in first-seen order.
    pub data_sources: Vec<String>,
    /// Configuration change made for them.
    pub sync: SyncOutcome,
    /// One report per input file, in input order.
    pub loads: Vec<(PathBuf, LoadReport)>,
}

impl ProcedureReport {
    /// Non-blank lines seen across files.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.loads.iter().map(|(_, r)| r.attempted).sum()
    }

    /// Records accepted across files.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.loads.iter().map(|(_, r)| r.succeeded).sum()
    }

    /// Total rejected records across files.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.loads.iter().map(|(_, r)| r.failed()).sum()
    }
}

/// The configuration-synchronization-and-bulk-load procedure.
///
/// The engine handle is created before the configuration changes, so it
/// relies on the factory's reinitialization to see the new data sources.
pub struct BulkLoadProcedure {
    factory: Arc<dyn SzAbstractFactory>,
    max_attempts: u32,
    skip_unchanged: bool,
    flags: SzFlags,
}

impl std::fmt::Debug for BulkLoadProcedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkLoadProcedure")
            .field("max_attempts", &self.max_attempts)
            .field("skip_unchanged", &self.skip_unchanged)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl BulkLoadProcedure {
    /// Procedure with default attempts that always promotes and loads with `WITH_INFO`.
    #[must_use]
    pub fn new(factory: Arc<dyn SzAbstractFactory>) -> Self {
        Self {
            factory,
            max_attempts: super::DEFAULT_PROMOTE_ATTEMPTS,
            skip_unchanged: false,
            flags: SzFlags::WITH_INFO,
        }
    }

    /// See [`ConfigSynchronizer::max_attempts`].
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// See [`ConfigSynchronizer::skip_unchanged`].
    #[must_use]
    pub fn skip_unchanged(mut self, skip: bool) -> Self {
        self.skip_unchanged = skip;
        self
    }

    /// Flags sent with each `add_record`.
    #[must_use]
    pub fn flags(mut self, flags: SzFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Runs the procedure over `files`, registering new data sources under `comment`.
    pub async fn run<P, F>(&self, files: &[P], comment: &str, mut observer: F) -> SzResult<ProcedureReport>
    where
        P: AsRef<Path>,
        F: FnMut(&Path, &RecordOutcome),
    {
        let mut data_sources = DataSourceSet::new();
        for file in files {
            let seen = data_sources.scan_file(file).await?;
            tracing::debug!(path = %file.as_ref().display(), lines = seen, "scanned records");
        }
        tracing::info!(data_sources = ?data_sources.as_slice(), "found data sources");

        let engine = self.factory.create_engine().await?;

        let sync = ConfigSynchronizer::new(Arc::clone(&self.factory))
            .await?
            .max_attempts(self.max_attempts)
            .skip_unchanged(self.skip_unchanged)
            .synchronize(data_sources.as_slice(), comment)
            .await?;

        let loader = BulkLoader::new(engine).with_flags(self.flags);
        let mut loads = Vec::with_capacity(files.len());
        for file in files {
            let path = file.as_ref();
            let report = loader.load_file(path, |outcome| observer(path, outcome)).await?;
            loads.push((path.to_path_buf(), report));
        }

        Ok(ProcedureReport {
            data_sources: data_sources.into_iter().collect(),
            sync,
            loads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use crate::service::InMemorySenzing;

    fn write_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[tokio::test]
    async fn test_run_over_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(
            dir.path(),
            "a.json",
            &[
                r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"1"}"#,
                r#"{"DATA_SOURCE":"REFERENCE","RECORD_ID":"2"}"#,
            ],
        );
        let b = write_file(
            dir.path(),
            "b.json",
            &[
                r#"{"DATA_SOURCE":"WATCHLIST","RECORD_ID":"3"}"#,
                r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"4"}"#,
            ],
        );

        let service = Arc::new(InMemorySenzing::new());
        let mut seen = Vec::new();
        let report = BulkLoadProcedure::new(service.clone())
            .run(&[a, b], "Add TruthSet datasources", |path, outcome| {
                if matches!(outcome, RecordOutcome::Added { .. }) {
                    seen.push(path.file_name().unwrap().to_string_lossy().into_owned());
                }
            })
            .await
            .unwrap();

        assert_eq!(report.data_sources, ["CUSTOMERS", "REFERENCE", "WATCHLIST"]);
        assert!(report.sync.promoted);
        assert_eq!(report.attempted(), 4);
        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.failed(), 0);
        assert_eq!(seen, ["a.json", "a.json", "b.json", "b.json"]);
        assert_eq!(service.record_count().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_any_change() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(InMemorySenzing::new());
        let err = BulkLoadProcedure::new(service.clone())
            .run(&[dir.path().join("absent.json")], "c", |_, _| {})
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(service.config_count().unwrap(), 1);
    }
}
