//! Configuration synchronization.
//!
//! Makes sure every data source a batch refers to is registered in the
//! service's default configuration. The cycle is read, edit, register,
//! promote, and it restarts from the read when promotion loses a
//! compare-and-swap race.

use std::sync::Arc;

use crate::config::{ConfigHandle, ConfigId};
use crate::error::{SzError, SzResult};
use crate::service::{SzAbstractFactory, SzConfig, SzConfigManager};

/// Default number of read-edit-write cycles before giving up on a moving default pointer.
pub const DEFAULT_PROMOTE_ATTEMPTS: u32 = 3;

/// Result of adding one data source in a [`ConfigBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceEdit {
    /// Newly registered.
    Added,
    /// Already registered; nothing changed.
    AlreadyPresent,
}

/// Mutable edit session over an immutable base configuration.
///
/// The session handle is released by [`ConfigBuilder::finish`] or
/// [`ConfigBuilder::abandon`]; every path through
/// [`ConfigSynchronizer::synchronize`] ends in one of them.
pub struct ConfigBuilder {
    config: Arc<dyn SzConfig>,
    handle: ConfigHandle,
    base_id: ConfigId,
}

impl std::fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("handle", &self.handle)
            .field("base_id", &self.base_id)
            .finish_non_exhaustive()
    }
}

impl ConfigBuilder {
    /// Opens a session on `definition`, which was fetched for `base_id`.
    pub async fn open(config: Arc<dyn SzConfig>, base_id: ConfigId, definition: &str) -> SzResult<Self> {
        let handle = config.import_config(definition).await?;
        Ok(Self {
            config,
            handle,
            base_id,
        })
    }

    /// Configuration this session started from.
    #[must_use]
    pub const fn base_id(&self) -> ConfigId {
        self.base_id
    }

    /// Registers a data source. A duplicate is not an error here.
    pub async fn add_data_source(&self, code: &str) -> SzResult<DataSourceEdit> {
        match self.config.add_data_source(self.handle, code).await {
            Ok(_) => Ok(DataSourceEdit::Added),
            Err(err) if err.is_duplicate() => {
                tracing::warn!(data_source = code, error = %err, "data source already registered");
                Ok(DataSourceEdit::AlreadyPresent)
            }
            Err(err) => Err(err),
        }
    }

    /// Exports the edited document and closes the session.
    pub async fn finish(self) -> SzResult<String> {
        let exported = self.config.export_config(self.handle).await;
        let closed = self.config.close_config(self.handle).await;
        let document = exported?;
        closed?;
        Ok(document)
    }

    /// Closes the session without exporting.
    pub async fn abandon(self) -> SzResult<()> {
        self.config.close_config(self.handle).await
    }
}

/// Outcome of a synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Default configuration before the change.
    pub previous_config_id: ConfigId,
    /// Default configuration after the change.
    pub config_id: ConfigId,
    /// Labels that were newly registered.
    pub added: Vec<String>,
    /// Labels that were already registered.
    pub already_present: Vec<String>,
    /// Read-edit-write cycles used.
    pub attempts: u32,
    /// False when nothing needed to change and promotion was skipped.
    pub promoted: bool,
}

/// Runs the read-edit-register-promote-reinitialize cycle.
pub struct ConfigSynchronizer {
    factory: Arc<dyn SzAbstractFactory>,
    config: Arc<dyn SzConfig>,
    manager: Arc<dyn SzConfigManager>,
    max_attempts: u32,
    skip_unchanged: bool,
}

impl std::fmt::Debug for ConfigSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSynchronizer")
            .field("max_attempts", &self.max_attempts)
            .field("skip_unchanged", &self.skip_unchanged)
            .finish_non_exhaustive()
    }
}

impl ConfigSynchronizer {
    /// Creates the config and config-manager components it needs from `factory`.
    pub async fn new(factory: Arc<dyn SzAbstractFactory>) -> SzResult<Self> {
        let config = factory.create_config().await?;
        let manager = factory.create_config_manager().await?;
        Ok(Self {
            factory,
            config,
            manager,
            max_attempts: DEFAULT_PROMOTE_ATTEMPTS,
            skip_unchanged: false,
        })
    }

    /// Uses explicit components instead of ones created by the factory.
    #[must_use]
    pub fn from_parts(
        factory: Arc<dyn SzAbstractFactory>,
        config: Arc<dyn SzConfig>,
        manager: Arc<dyn SzConfigManager>,
    ) -> Self {
        Self {
            factory,
            config,
            manager,
            max_attempts: DEFAULT_PROMOTE_ATTEMPTS,
            skip_unchanged: false,
        }
    }

    /// Sets how many read-edit-write cycles to try (minimum 1).
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Skips registering and promoting when every label is already present.
    #[must_use]
    pub fn skip_unchanged(mut self, skip: bool) -> Self {
        self.skip_unchanged = skip;
        self
    }

    /// Registers `data_sources` in a new default configuration and
    /// reinitializes the factory's handles against it.
    pub async fn synchronize(&self, data_sources: &[String], comment: &str) -> SzResult<SyncOutcome> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(data_sources, comment, attempt).await {
                Ok(outcome) => {
                    if outcome.promoted {
                        self.factory.reinitialize(outcome.config_id).await?;
                    }
                    return Ok(outcome);
                }
                Err(err) if err.is_replace_conflict() && attempt < self.max_attempts => {
                    tracing::warn!(attempt, max_attempts = self.max_attempts, error = %err, "default configuration moved; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, data_sources: &[String], comment: &str, attempt: u32) -> SzResult<SyncOutcome> {
        let old_id = self.manager.get_default_config_id().await?;
        let old_definition = self.manager.get_config(old_id).await?;
        let builder = ConfigBuilder::open(Arc::clone(&self.config), old_id, &old_definition).await?;

        let mut added = Vec::new();
        let mut already_present = Vec::new();
        for code in data_sources {
            match builder.add_data_source(code).await {
                Ok(DataSourceEdit::Added) => added.push(code.clone()),
                Ok(DataSourceEdit::AlreadyPresent) => already_present.push(code.clone()),
                Err(err) => {
                    abandon_quietly(builder).await;
                    return Err(err);
                }
            }
        }

        if added.is_empty() && self.skip_unchanged {
            builder.abandon().await?;
            tracing::info!(config_id = %old_id, "configuration already has every data source");
            return Ok(SyncOutcome {
                previous_config_id: old_id,
                config_id: old_id,
                added,
                already_present,
                attempts: attempt,
                promoted: false,
            });
        }

        let new_definition = builder.finish().await?;
        let new_id = self.manager.add_config(&new_definition, comment).await?;
        self.manager.replace_default_config_id(old_id, new_id).await?;
        tracing::info!(
            previous = %old_id,
            config_id = %new_id,
            added = added.len(),
            already_present = already_present.len(),
            "promoted configuration"
        );

        Ok(SyncOutcome {
            previous_config_id: old_id,
            config_id: new_id,
            added,
            already_present,
            attempts: attempt,
            promoted: true,
        })
    }
}

async fn abandon_quietly(builder: ConfigBuilder) {
    let handle = builder.handle;
    if let Err(err) = builder.abandon().await {
        log_close_failure(handle, &err);
    }
}

fn log_close_failure(handle: ConfigHandle, err: &SzError) {
    tracing::warn!(handle = %handle, error = %err, "failed to close configuration handle");
}
