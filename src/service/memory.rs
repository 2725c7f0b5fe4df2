//! In-memory service backend.
//!
//! This module provides thread-safe in-memory implementations of the service
//! traits. It is intended for tests, demos and embedded use, and it is what
//! the `sz-playground` binary serves over gRPC.
//!
//! It keeps the parts of the service contract the workflow depends on:
//! immutable configuration versions, a default pointer with compare-and-swap,
//! and engine handles that keep resolving against their active configuration
//! until reinitialized. It does no matching: every record becomes its own
//! entity, and search compares attribute values exactly (case and whitespace
//! insensitive).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::config::{normalize_code, ConfigDocument, ConfigHandle, ConfigId};
use crate::error::{EngineError, SzError, SzResult};
use crate::flags::SzFlags;
use crate::registry::HandleRegistry;
use crate::service::traits::{
    Reinitialize, SzAbstractFactory, SzConfig, SzConfigManager, SzDiagnostic, SzEngine, SzProduct,
};

fn lock_err(context: &'static str) -> SzError {
    SzError::internal(format!("poisoned lock: {context}"))
}

fn bad_input(message: impl Into<String>) -> SzError {
    EngineError::BadInput {
        message: message.into(),
    }
    .into()
}

fn not_found(message: impl Into<String>) -> SzError {
    EngineError::NotFound {
        message: message.into(),
    }
    .into()
}

#[derive(Debug)]
struct StoredConfig {
    definition: String,
    data_sources: HashSet<String>,
    comment: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    data_source: String,
    record_id: String,
    attributes: Map<String, Value>,
    entity_id: i64,
}

type RecordKey = (String, String);

#[derive(Debug, Default)]
struct State {
    configs: BTreeMap<ConfigId, StoredConfig>,
    default_config_id: Option<ConfigId>,
    next_config_id: i64,
    sessions: HashMap<ConfigHandle, ConfigDocument>,
    next_handle: i64,
    records: BTreeMap<RecordKey, StoredRecord>,
    next_entity_id: i64,
}

impl State {
    fn register_config(&mut self, doc: &ConfigDocument, comment: &str) -> ConfigId {
        self.next_config_id += 1;
        let id = ConfigId::new(self.next_config_id);
        self.configs.insert(
            id,
            StoredConfig {
                definition: doc.to_json(),
                data_sources: doc.data_source_codes().into_iter().collect(),
                comment: comment.to_string(),
                created: Utc::now(),
            },
        );
        id
    }

    fn open_session(&mut self, doc: ConfigDocument) -> ConfigHandle {
        self.next_handle += 1;
        let handle = ConfigHandle::new(self.next_handle);
        self.sessions.insert(handle, doc);
        handle
    }

    fn session_mut(&mut self, handle: ConfigHandle) -> SzResult<&mut ConfigDocument> {
        self.sessions
            .get_mut(&handle)
            .ok_or_else(|| bad_input(format!("Invalid configuration handle [{handle}].")))
    }

    fn require_config(&self, config_id: ConfigId) -> SzResult<&StoredConfig> {
        self.configs
            .get(&config_id)
            .ok_or_else(|| not_found(format!("Configuration ID [{config_id}] is not registered.")))
    }

    fn default_id(&self) -> SzResult<ConfigId> {
        self.default_config_id
            .ok_or_else(|| not_found("No default configuration has been set."))
    }
}

type Shared = Arc<RwLock<State>>;

fn read(state: &Shared) -> SzResult<RwLockReadGuard<'_, State>> {
    state.read().map_err(|_| lock_err("service state"))
}

fn write(state: &Shared) -> SzResult<RwLockWriteGuard<'_, State>> {
    state.write().map_err(|_| lock_err("service state"))
}

/// In-memory service and the factory for its component handles.
#[derive(Debug, Clone)]
pub struct InMemorySenzing {
    state: Shared,
    registry: Arc<HandleRegistry>,
}

impl Default for InMemorySenzing {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySenzing {
    /// Creates a service whose default configuration is the built-in template.
    #[must_use]
    pub fn new() -> Self {
        let mut state = State::default();
        let id = state.register_config(&ConfigDocument::template(), "Default configuration");
        state.default_config_id = Some(id);
        Self {
            state: Arc::new(RwLock::new(state)),
            registry: Arc::new(HandleRegistry::new()),
        }
    }

    /// Registry of engine and diagnostic handles created by this factory.
    #[must_use]
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Number of registered configuration versions.
    pub fn config_count(&self) -> SzResult<usize> {
        Ok(read(&self.state)?.configs.len())
    }

    /// Number of loaded records.
    pub fn record_count(&self) -> SzResult<usize> {
        Ok(read(&self.state)?.records.len())
    }

    /// Number of configuration edit sessions still open.
    pub fn open_sessions(&self) -> SzResult<usize> {
        Ok(read(&self.state)?.sessions.len())
    }

    /// Config component bound to this service.
    #[must_use]
    pub fn config(&self) -> MemoryConfig {
        MemoryConfig {
            state: Arc::clone(&self.state),
        }
    }

    /// Config manager component bound to this service.
    #[must_use]
    pub fn config_manager(&self) -> MemoryConfigManager {
        MemoryConfigManager {
            state: Arc::clone(&self.state),
        }
    }

    /// Unregistered engine handle; it does not follow [`SzAbstractFactory::reinitialize`].
    pub fn engine(&self) -> SzResult<MemoryEngine> {
        let active = read(&self.state)?.default_id()?;
        Ok(MemoryEngine {
            state: Arc::clone(&self.state),
            active: RwLock::new(active),
        })
    }

    fn diagnostic(&self) -> SzResult<MemoryDiagnostic> {
        let active = read(&self.state)?.default_id()?;
        Ok(MemoryDiagnostic {
            state: Arc::clone(&self.state),
            active: RwLock::new(active),
        })
    }
}

#[async_trait]
impl SzAbstractFactory for InMemorySenzing {
    async fn create_config(&self) -> SzResult<Arc<dyn SzConfig>> {
        Ok(Arc::new(self.config()))
    }

    async fn create_config_manager(&self) -> SzResult<Arc<dyn SzConfigManager>> {
        Ok(Arc::new(self.config_manager()))
    }

    async fn create_diagnostic(&self) -> SzResult<Arc<dyn SzDiagnostic>> {
        let diagnostic = Arc::new(self.diagnostic()?);
        self.registry.register("diagnostic", &diagnostic)?;
        Ok(diagnostic)
    }

    async fn create_engine(&self) -> SzResult<Arc<dyn SzEngine>> {
        let engine = Arc::new(self.engine()?);
        self.registry.register("engine", &engine)?;
        Ok(engine)
    }

    async fn create_product(&self) -> SzResult<Arc<dyn SzProduct>> {
        Ok(Arc::new(MemoryProduct))
    }

    async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()> {
        read(&self.state)?.require_config(config_id)?;
        self.registry.notify(config_id).await?;
        Ok(())
    }
}

/// In-memory [`SzConfig`].
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    state: Shared,
}

#[async_trait]
impl SzConfig for MemoryConfig {
    async fn create_config(&self) -> SzResult<ConfigHandle> {
        Ok(write(&self.state)?.open_session(ConfigDocument::template()))
    }

    async fn import_config(&self, config_definition: &str) -> SzResult<ConfigHandle> {
        let doc = ConfigDocument::parse(config_definition).map_err(|e| bad_input(e.to_string()))?;
        Ok(write(&self.state)?.open_session(doc))
    }

    async fn add_data_source(&self, handle: ConfigHandle, data_source_code: &str) -> SzResult<String> {
        let mut state = write(&self.state)?;
        let entry = state.session_mut(handle)?.add_data_source(data_source_code)?;
        Ok(json!({ "DSRC_ID": entry.id }).to_string())
    }

    async fn delete_data_source(&self, handle: ConfigHandle, data_source_code: &str) -> SzResult<()> {
        let mut state = write(&self.state)?;
        state.session_mut(handle)?.delete_data_source(data_source_code)?;
        Ok(())
    }

    async fn get_data_sources(&self, handle: ConfigHandle) -> SzResult<String> {
        let mut state = write(&self.state)?;
        Ok(state.session_mut(handle)?.data_sources_json())
    }

    async fn export_config(&self, handle: ConfigHandle) -> SzResult<String> {
        let mut state = write(&self.state)?;
        Ok(state.session_mut(handle)?.to_json())
    }

    async fn close_config(&self, handle: ConfigHandle) -> SzResult<()> {
        let mut state = write(&self.state)?;
        state
            .sessions
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| bad_input(format!("Invalid configuration handle [{handle}].")))
    }
}

/// In-memory [`SzConfigManager`].
#[derive(Debug, Clone)]
pub struct MemoryConfigManager {
    state: Shared,
}

#[async_trait]
impl SzConfigManager for MemoryConfigManager {
    async fn add_config(&self, config_definition: &str, config_comment: &str) -> SzResult<ConfigId> {
        let doc = ConfigDocument::parse(config_definition).map_err(|e| bad_input(e.to_string()))?;
        let id = write(&self.state)?.register_config(&doc, config_comment);
        tracing::debug!(config_id = %id, comment = config_comment, "registered configuration");
        Ok(id)
    }

    async fn get_config(&self, config_id: ConfigId) -> SzResult<String> {
        Ok(read(&self.state)?.require_config(config_id)?.definition.clone())
    }

    async fn get_configs(&self) -> SzResult<String> {
        let state = read(&self.state)?;
        let configs: Vec<Value> = state
            .configs
            .iter()
            .map(|(id, cfg)| {
                json!({
                    "CONFIG_ID": id.get(),
                    "CONFIG_COMMENTS": cfg.comment,
                    "SYS_CREATE_DT": cfg.created.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                })
            })
            .collect();
        Ok(json!({ "CONFIGS": configs }).to_string())
    }

    async fn get_default_config_id(&self) -> SzResult<ConfigId> {
        read(&self.state)?.default_id()
    }

    async fn replace_default_config_id(&self, current: ConfigId, new: ConfigId) -> SzResult<()> {
        let mut state = write(&self.state)?;
        state.require_config(new)?;
        if state.default_config_id != Some(current) {
            let actual = state
                .default_config_id
                .map_or_else(|| "none".to_string(), |id| id.to_string());
            return Err(EngineError::ReplaceConflict {
                message: format!("Current default configuration ID [{actual}] does not match [{current}]."),
            }
            .into());
        }
        state.default_config_id = Some(new);
        Ok(())
    }

    async fn set_default_config_id(&self, config_id: ConfigId) -> SzResult<()> {
        let mut state = write(&self.state)?;
        state.require_config(config_id)?;
        state.default_config_id = Some(config_id);
        Ok(())
    }
}

/// In-memory [`SzDiagnostic`].
#[derive(Debug)]
pub struct MemoryDiagnostic {
    state: Shared,
    active: RwLock<ConfigId>,
}

#[async_trait]
impl Reinitialize for MemoryDiagnostic {
    async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()> {
        read(&self.state)?.require_config(config_id)?;
        *self.active.write().map_err(|_| lock_err("diagnostic config"))? = config_id;
        Ok(())
    }
}

#[async_trait]
impl SzDiagnostic for MemoryDiagnostic {
    async fn get_datastore_info(&self) -> SzResult<String> {
        let active = *self.active.read().map_err(|_| lock_err("diagnostic config"))?;
        Ok(json!({
            "dataStores": [{ "id": "CORE", "type": "memory", "location": "in-process" }],
            "activeConfigId": active.get(),
        })
        .to_string())
    }

    async fn purge_repository(&self) -> SzResult<()> {
        let mut state = write(&self.state)?;
        let purged = state.records.len();
        state.records.clear();
        tracing::info!(purged, "purged repository");
        Ok(())
    }
}

/// In-memory [`SzEngine`].
#[derive(Debug)]
pub struct MemoryEngine {
    state: Shared,
    active: RwLock<ConfigId>,
}

fn record_key(data_source_code: &str, record_id: &str) -> RecordKey {
    (normalize_code(data_source_code), record_id.to_string())
}

fn unknown_record(key: &RecordKey) -> SzError {
    not_found(format!("Unknown record: dsrc[{}], record[{}]", key.0, key.1))
}

fn info_json(data_source: &str, record_id: &str, affected: &[i64], flags: SzFlags) -> String {
    if !flags.contains(SzFlags::WITH_INFO) {
        return String::new();
    }
    let affected: Vec<Value> = affected.iter().map(|id| json!({ "ENTITY_ID": id })).collect();
    json!({
        "DATA_SOURCE": data_source,
        "RECORD_ID": record_id,
        "AFFECTED_ENTITIES": affected,
        "INTERESTING_ENTITIES": { "ENTITIES": [] },
    })
    .to_string()
}

const NAME_FIELDS: &[&str] = &["NAME_FULL", "PRIMARY_NAME_FULL", "NAME_ORG", "PRIMARY_NAME_ORG"];

fn entity_name(attributes: &Map<String, Value>) -> Option<String> {
    for field in NAME_FIELDS {
        if let Some(name) = attributes.get(*field).and_then(Value::as_str) {
            return Some(name.to_string());
        }
    }
    let pick = |a: &str, b: &str| {
        attributes
            .get(a)
            .or_else(|| attributes.get(b))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let parts: Vec<String> = [
        pick("NAME_FIRST", "PRIMARY_NAME_FIRST"),
        pick("NAME_LAST", "PRIMARY_NAME_LAST"),
    ]
    .into_iter()
    .flatten()
    .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn resolved_entity(record: &StoredRecord, flags: SzFlags) -> Value {
    let mut entity = Map::new();
    entity.insert("ENTITY_ID".to_string(), json!(record.entity_id));
    if flags.contains(SzFlags::ENTITY_INCLUDE_ENTITY_NAME) {
        if let Some(name) = entity_name(&record.attributes) {
            entity.insert("ENTITY_NAME".to_string(), json!(name));
        }
    }
    if flags.contains(SzFlags::ENTITY_INCLUDE_RECORD_SUMMARY) {
        entity.insert(
            "RECORD_SUMMARY".to_string(),
            json!([{ "DATA_SOURCE": record.data_source, "RECORD_COUNT": 1 }]),
        );
    }
    let mut rec = Map::new();
    rec.insert("DATA_SOURCE".to_string(), json!(record.data_source));
    rec.insert("RECORD_ID".to_string(), json!(record.record_id));
    if flags.contains(SzFlags::ENTITY_INCLUDE_RECORD_JSON_DATA) {
        rec.insert("JSON_DATA".to_string(), Value::Object(record.attributes.clone()));
    }
    entity.insert("RECORDS".to_string(), json!([Value::Object(rec)]));
    Value::Object(entity)
}

fn normalize_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some(text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
}

impl MemoryEngine {
    fn active(&self) -> SzResult<ConfigId> {
        Ok(*self.active.read().map_err(|_| lock_err("engine config"))?)
    }
}

#[async_trait]
impl Reinitialize for MemoryEngine {
    async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()> {
        read(&self.state)?.require_config(config_id)?;
        *self.active.write().map_err(|_| lock_err("engine config"))? = config_id;
        Ok(())
    }
}

#[async_trait]
impl SzEngine for MemoryEngine {
    async fn get_active_config_id(&self) -> SzResult<ConfigId> {
        self.active()
    }

    async fn add_record(
        &self,
        data_source_code: &str,
        record_id: &str,
        record_definition: &str,
        flags: SzFlags,
    ) -> SzResult<String> {
        let attributes = match serde_json::from_str::<Value>(record_definition) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(bad_input("Record definition must be a JSON object.")),
            Err(e) => return Err(bad_input(format!("Invalid JSON in record definition: {e}"))),
        };
        if record_id.trim().is_empty() {
            return Err(bad_input("Record ID must not be empty."));
        }
        let key = record_key(data_source_code, record_id);
        if let Some(embedded) = attributes.get("DATA_SOURCE").and_then(Value::as_str) {
            if normalize_code(embedded) != key.0 {
                return Err(bad_input(format!(
                    "DATA_SOURCE [{embedded}] in record does not match [{}].",
                    key.0
                )));
            }
        }

        let active = self.active()?;
        let mut state = write(&self.state)?;
        if !state.require_config(active)?.data_sources.contains(&key.0) {
            return Err(EngineError::UnknownDataSource {
                message: format!("Data source code [{}] does not exist.", key.0),
            }
            .into());
        }

        let existing = state.records.get(&key).map(|r| r.entity_id);
        let entity_id = if let Some(id) = existing {
            id
        } else {
            state.next_entity_id += 1;
            state.next_entity_id
        };
        state.records.insert(
            key.clone(),
            StoredRecord {
                data_source: key.0.clone(),
                record_id: key.1.clone(),
                attributes,
                entity_id,
            },
        );
        Ok(info_json(&key.0, &key.1, &[entity_id], flags))
    }

    async fn delete_record(&self, data_source_code: &str, record_id: &str, flags: SzFlags) -> SzResult<String> {
        let key = record_key(data_source_code, record_id);
        let removed = write(&self.state)?.records.remove(&key);
        let affected: Vec<i64> = removed.iter().map(|r| r.entity_id).collect();
        Ok(info_json(&key.0, &key.1, &affected, flags))
    }

    async fn get_record(&self, data_source_code: &str, record_id: &str, _flags: SzFlags) -> SzResult<String> {
        let key = record_key(data_source_code, record_id);
        let state = read(&self.state)?;
        let record = state.records.get(&key).ok_or_else(|| unknown_record(&key))?;
        Ok(json!({
            "DATA_SOURCE": record.data_source,
            "RECORD_ID": record.record_id,
            "JSON_DATA": Value::Object(record.attributes.clone()),
        })
        .to_string())
    }

    async fn get_entity_by_record_id(
        &self,
        data_source_code: &str,
        record_id: &str,
        flags: SzFlags,
    ) -> SzResult<String> {
        let key = record_key(data_source_code, record_id);
        let state = read(&self.state)?;
        let record = state.records.get(&key).ok_or_else(|| unknown_record(&key))?;
        Ok(json!({
            "RESOLVED_ENTITY": resolved_entity(record, flags),
            "RELATED_ENTITIES": [],
        })
        .to_string())
    }

    async fn search_by_attributes(
        &self,
        attributes: &str,
        _search_profile: &str,
        flags: SzFlags,
    ) -> SzResult<String> {
        let query = match serde_json::from_str::<Value>(attributes) {
            Ok(Value::Object(map)) if !map.is_empty() => map,
            Ok(_) => return Err(bad_input("Search attributes must be a non-empty JSON object.")),
            Err(e) => return Err(bad_input(format!("Invalid JSON in search attributes: {e}"))),
        };
        let wanted: Vec<(String, String)> = query
            .iter()
            .filter_map(|(k, v)| normalize_value(v).map(|v| (k.to_ascii_uppercase(), v)))
            .collect();
        if wanted.is_empty() {
            return Err(bad_input("Search attributes contain no usable values."));
        }
        let match_key: String = wanted.iter().map(|(k, _)| format!("+{k}")).collect();

        let state = read(&self.state)?;
        let results: Vec<Value> = state
            .records
            .values()
            .filter(|record| {
                wanted.iter().all(|(field, value)| {
                    record
                        .attributes
                        .get(field)
                        .and_then(normalize_value)
                        .is_some_and(|v| &v == value)
                })
            })
            .map(|record| {
                json!({
                    "MATCH_INFO": { "MATCH_LEVEL_CODE": "RESOLVED", "MATCH_KEY": match_key },
                    "ENTITY": { "RESOLVED_ENTITY": resolved_entity(record, flags) },
                })
            })
            .collect();
        Ok(json!({ "RESOLVED_ENTITIES": results }).to_string())
    }
}

/// In-memory [`SzProduct`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryProduct;

#[async_trait]
impl SzProduct for MemoryProduct {
    async fn get_version(&self) -> SzResult<String> {
        Ok(json!({
            "PRODUCT_NAME": "sz-quickstart in-memory service",
            "VERSION": env!("CARGO_PKG_VERSION"),
            "BUILD_VERSION": env!("CARGO_PKG_VERSION"),
            "COMPATIBILITY_VERSION": { "CONFIG_VERSION": "11" },
        })
        .to_string())
    }

    async fn get_license(&self) -> SzResult<String> {
        Ok(json!({ "licenseType": "IN-MEMORY", "recordLimit": 0 }).to_string())
    }
}
