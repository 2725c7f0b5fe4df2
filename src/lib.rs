//! # sz-quickstart
//!
//! Client-side workflow for an entity-resolution service reached over gRPC:
//! register the data sources a batch of records needs, promote the new
//! configuration, reinitialize live engine handles and bulk-load the records.
//!
//! ## Core Concepts
//!
//! - **Configuration**: an immutable, versioned JSON document listing data sources
//! - **Default configuration**: the version the service uses, moved by compare-and-swap
//! - **Record**: one JSON object per line, keyed by `DATA_SOURCE` and `RECORD_ID`
//! - **Handle registry**: the engine and diagnostic handles that must follow a promotion
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sz_quickstart::operations::BulkLoadProcedure;
//! use sz_quickstart::transport::GrpcAbstractFactory;
//!
//! let factory = Arc::new(GrpcAbstractFactory::connect("localhost:8261", Duration::from_secs(10)).await?);
//! let report = BulkLoadProcedure::new(factory)
//!     .run(&["customers.json"], "Add user datasources", |_, _| {})
//!     .await?;
//! println!("{} loaded, {} failed", report.succeeded(), report.failed());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod flags;
pub mod help;
pub mod record;

// Service boundary and workflow
pub mod download;
pub mod operations;
pub mod registry;
pub mod service;
pub mod settings;

#[cfg(feature = "transport-grpc")]
pub mod transport;

pub use config::{ConfigDocument, ConfigHandle, ConfigId};
pub use error::{EngineError, SzError, SzResult, TransportError, ValidationError};
pub use flags::SzFlags;
pub use operations::{BulkLoadProcedure, BulkLoader, ConfigSynchronizer, LoadReport, SyncOutcome};
pub use record::{DataSourceSet, Record};
pub use registry::HandleRegistry;
pub use service::{
    InMemorySenzing, Reinitialize, SzAbstractFactory, SzConfig, SzConfigManager, SzDiagnostic, SzEngine,
    SzProduct,
};
pub use settings::Settings;
