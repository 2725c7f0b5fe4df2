//! Service traits for the entity-resolution boundary.
//!
//! One trait per remote component. Everything behind these traits is opaque:
//! the gRPC transport forwards calls to a running service, and the
//! in-memory backend stands in for one in tests and demos.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfigHandle, ConfigId};
use crate::error::SzResult;
use crate::flags::SzFlags;
use crate::help;

/// Components that cache the active configuration and must be told when it changes.
#[async_trait]
pub trait Reinitialize: Send + Sync {
    /// Switches this handle to the given configuration.
    async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()>;
}

/// Edit sessions over configuration documents.
///
/// A session is opened by `create_config` or `import_config` and stays open
/// until `close_config`. Edits never touch a registered configuration; the
/// result has to be exported and registered through [`SzConfigManager`].
#[async_trait]
pub trait SzConfig: Send + Sync {
    /// Opens a session on the built-in template.
    async fn create_config(&self) -> SzResult<ConfigHandle>;

    /// Opens a session on an existing document.
    async fn import_config(&self, config_definition: &str) -> SzResult<ConfigHandle>;

    /// Registers a data source. Fails with a duplicate error if it exists.
    async fn add_data_source(&self, handle: ConfigHandle, data_source_code: &str) -> SzResult<String>;

    /// Removes a data source.
    async fn delete_data_source(&self, handle: ConfigHandle, data_source_code: &str) -> SzResult<()>;

    /// Lists registered data sources as `{"DATA_SOURCES": [...]}`.
    async fn get_data_sources(&self, handle: ConfigHandle) -> SzResult<String>;

    /// Serializes the session's document.
    async fn export_config(&self, handle: ConfigHandle) -> SzResult<String>;

    /// Closes a session and releases its handle.
    async fn close_config(&self, handle: ConfigHandle) -> SzResult<()>;
}

/// Registry of configuration versions and the default pointer.
#[async_trait]
pub trait SzConfigManager: Send + Sync {
    /// Registers a document as a new immutable version.
    async fn add_config(&self, config_definition: &str, config_comment: &str) -> SzResult<ConfigId>;

    /// Fetches a registered document.
    async fn get_config(&self, config_id: ConfigId) -> SzResult<String>;

    /// Lists registered versions as `{"CONFIGS": [...]}`.
    async fn get_configs(&self) -> SzResult<String>;

    /// Id the service uses for new operations.
    async fn get_default_config_id(&self) -> SzResult<ConfigId>;

    /// Moves the default pointer from `current` to `new`.
    ///
    /// Fails with a replace-conflict error when `current` is no longer the
    /// default. Callers are expected to redo their read-edit-write cycle.
    async fn replace_default_config_id(&self, current: ConfigId, new: ConfigId) -> SzResult<()>;

    /// Sets the default pointer unconditionally.
    async fn set_default_config_id(&self, config_id: ConfigId) -> SzResult<()>;
}

/// Diagnostic and maintenance calls.
#[async_trait]
pub trait SzDiagnostic: Reinitialize {
    /// Describes the backing datastore.
    async fn get_datastore_info(&self) -> SzResult<String>;

    /// Removes every loaded record.
    async fn purge_repository(&self) -> SzResult<()>;
}

/// Record ingestion and entity queries.
#[async_trait]
pub trait SzEngine: Reinitialize {
    /// Configuration this handle currently resolves against.
    async fn get_active_config_id(&self) -> SzResult<ConfigId>;

    /// Adds or replaces a record. Returns the info payload when `WITH_INFO` is set.
    async fn add_record(
        &self,
        data_source_code: &str,
        record_id: &str,
        record_definition: &str,
        flags: SzFlags,
    ) -> SzResult<String>;

    /// Deletes a record. Returns the info payload when `WITH_INFO` is set.
    async fn delete_record(&self, data_source_code: &str, record_id: &str, flags: SzFlags) -> SzResult<String>;

    /// Fetches a loaded record.
    async fn get_record(&self, data_source_code: &str, record_id: &str, flags: SzFlags) -> SzResult<String>;

    /// Fetches the entity a record resolved into.
    async fn get_entity_by_record_id(
        &self,
        data_source_code: &str,
        record_id: &str,
        flags: SzFlags,
    ) -> SzResult<String>;

    /// Searches entities by attribute values given as a JSON object.
    async fn search_by_attributes(&self, attributes: &str, search_profile: &str, flags: SzFlags)
        -> SzResult<String>;

    /// Method documentation. Lists every method when `method` is `None`.
    fn help(&self, method: Option<&str>) -> SzResult<String> {
        help::engine_help(method)
    }
}

/// Product metadata.
#[async_trait]
pub trait SzProduct: Send + Sync {
    /// Version information as JSON.
    async fn get_version(&self) -> SzResult<String>;

    /// License information as JSON.
    async fn get_license(&self) -> SzResult<String>;
}

/// Creates component handles bound to one service.
///
/// Engine and diagnostic handles are tracked so `reinitialize` can reach
/// every live one after a configuration change.
#[async_trait]
pub trait SzAbstractFactory: Send + Sync {
    /// Creates a configuration-editing component.
    async fn create_config(&self) -> SzResult<Arc<dyn SzConfig>>;

    /// Creates a configuration-registry component.
    async fn create_config_manager(&self) -> SzResult<Arc<dyn SzConfigManager>>;

    /// Creates a diagnostic handle.
    async fn create_diagnostic(&self) -> SzResult<Arc<dyn SzDiagnostic>>;

    /// Creates an engine handle.
    async fn create_engine(&self) -> SzResult<Arc<dyn SzEngine>>;

    /// Creates a product-metadata component.
    async fn create_product(&self) -> SzResult<Arc<dyn SzProduct>>;

    /// Reinitializes every live handle this factory created.
    async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_config_object_safe(_: &dyn SzConfig) {}
    fn _assert_config_manager_object_safe(_: &dyn SzConfigManager) {}
    fn _assert_diagnostic_object_safe(_: &dyn SzDiagnostic) {}
    fn _assert_engine_object_safe(_: &dyn SzEngine) {}
    fn _assert_product_object_safe(_: &dyn SzProduct) {}
    fn _assert_factory_object_safe(_: &dyn SzAbstractFactory) {}
    fn _assert_reinitialize_object_safe(_: &dyn Reinitialize) {}
}
