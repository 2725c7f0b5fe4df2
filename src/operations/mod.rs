//! Workflow operations built on the service traits.
//!
//! [`ConfigSynchronizer`] registers data sources and promotes a new default
//! configuration, [`BulkLoader`] streams records into an engine, and
//! [`BulkLoadProcedure`] chains scan, synchronize and load over a set of files.

mod configure;
mod load;
mod procedure;

pub use configure::{ConfigBuilder, ConfigSynchronizer, DataSourceEdit, SyncOutcome, DEFAULT_PROMOTE_ATTEMPTS};
pub use load::{BulkLoader, LoadReport, RecordFailure, RecordOutcome};
pub use procedure::{BulkLoadProcedure, ProcedureReport};

/// Pretty-prints a JSON document with two-space indentation.
///
/// Text that is not valid JSON is returned unchanged.
#[must_use]
pub fn pretty_json(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| text.to_string())
}
