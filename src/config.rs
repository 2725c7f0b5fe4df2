//! Configuration identifiers and documents.
//!
//! The service owns configuration semantics. On this side a configuration is
//! an opaque JSON document plus the id the service issued for it. The only
//! part read here is the data-source registry at `G2_CONFIG.CFG_DSRC`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{EngineError, ValidationError};

/// Identifier of a registered configuration version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(i64);

impl ConfigId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConfigId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Handle to an open configuration edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigHandle(i64);

impl ConfigHandle {
    /// Wraps a raw handle.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw handle.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConfigHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Data sources at or below this id are reserved for the built-in template.
const FIRST_USER_DSRC_ID: i64 = 1001;

/// One entry of the data-source registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceEntry {
    /// Numeric id assigned by the configuration.
    #[serde(rename = "DSRC_ID")]
    pub id: i64,
    /// Data-source code.
    #[serde(rename = "DSRC_CODE")]
    pub code: String,
}

/// Normalizes a data-source code the way the engine stores it.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Parsed configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    /// Parses a configuration document.
    pub fn parse(definition: &str) -> Result<Self, ValidationError> {
        let root: Value = serde_json::from_str(definition).map_err(|e| ValidationError::InvalidConfigDocument {
            reason: e.to_string(),
        })?;
        let doc = Self { root };
        for (idx, entry) in doc.registry()?.iter().enumerate() {
            serde_json::from_value::<DataSourceEntry>(entry.clone()).map_err(|e| {
                ValidationError::InvalidConfigDocument {
                    reason: format!("G2_CONFIG.CFG_DSRC[{idx}]: {e}"),
                }
            })?;
        }
        Ok(doc)
    }

    /// Minimal document with the two built-in data sources.
    #[must_use]
    pub fn template() -> Self {
        Self {
            root: json!({
                "G2_CONFIG": {
                    "CFG_DSRC": [
                        dsrc_json(1, "TEST"),
                        dsrc_json(2, "SEARCH"),
                    ],
                    "CONFIG_BASE_VERSION": {
                        "VERSION": env!("CARGO_PKG_VERSION"),
                        "COMPATIBILITY_VERSION": { "CONFIG_VERSION": "11" }
                    }
                }
            }),
        }
    }

    fn registry(&self) -> Result<&Vec<Value>, ValidationError> {
        self.root
            .get("G2_CONFIG")
            .and_then(|c| c.get("CFG_DSRC"))
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::InvalidConfigDocument {
                reason: "missing G2_CONFIG.CFG_DSRC array".to_string(),
            })
    }

    fn registry_mut(&mut self) -> Result<&mut Vec<Value>, ValidationError> {
        self.root
            .get_mut("G2_CONFIG")
            .and_then(|c| c.get_mut("CFG_DSRC"))
            .and_then(Value::as_array_mut)
            .ok_or_else(|| ValidationError::InvalidConfigDocument {
                reason: "missing G2_CONFIG.CFG_DSRC array".to_string(),
            })
    }

    /// Registered data sources, in document order.
    ///
    /// Every entry was checked by [`ConfigDocument::parse`], so nothing is
    /// skipped for a parsed document.
    #[must_use]
    pub fn data_sources(&self) -> Vec<DataSourceEntry> {
        self.registry()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| serde_json::from_value::<DataSourceEntry>(e.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registered data-source codes, in document order.
    #[must_use]
    pub fn data_source_codes(&self) -> Vec<String> {
        self.data_sources().into_iter().map(|e| e.code).collect()
    }

    /// Returns true if the code is registered (after normalization).
    #[must_use]
    pub fn contains_data_source(&self, code: &str) -> bool {
        let code = normalize_code(code);
        self.data_sources().iter().any(|e| e.code == code)
    }

    /// Registers a data source and returns its entry.
    ///
    /// # Errors
    /// - `BadInput` if the code is empty
    /// - `DuplicateDataSource` if it is already registered
    /// - `BadInput` if no id is left above the highest registered one
    pub fn add_data_source(&mut self, code: &str) -> Result<DataSourceEntry, EngineError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(EngineError::BadInput {
                message: "Data source code must not be empty.".to_string(),
            });
        }
        let existing = self.data_sources();
        if existing.iter().any(|e| e.code == code) {
            return Err(EngineError::DuplicateDataSource {
                message: format!("Data source code [{code}] already exists."),
            });
        }
        let id = match existing.iter().map(|e| e.id).max() {
            Some(highest) => highest
                .checked_add(1)
                .ok_or_else(|| EngineError::BadInput {
                    message: format!("No data source id is available after [{highest}]."),
                })?
                .max(FIRST_USER_DSRC_ID),
            None => FIRST_USER_DSRC_ID,
        };
        let registry = self.registry_mut().map_err(|e| EngineError::BadInput {
            message: e.to_string(),
        })?;
        registry.push(dsrc_json(id, &code));
        Ok(DataSourceEntry { id, code })
    }

    /// Removes a data source.
    ///
    /// # Errors
    /// - `NotFound` if the code is not registered
    pub fn delete_data_source(&mut self, code: &str) -> Result<(), EngineError> {
        let code = normalize_code(code);
        let registry = self.registry_mut().map_err(|e| EngineError::BadInput {
            message: e.to_string(),
        })?;
        let before = registry.len();
        registry.retain(|e| e.get("DSRC_CODE").and_then(Value::as_str) != Some(code.as_str()));
        if registry.len() == before {
            return Err(EngineError::NotFound {
                message: format!("Data source code [{code}] does not exist."),
            });
        }
        Ok(())
    }

    /// `{"DATA_SOURCES": [...]}` listing.
    #[must_use]
    pub fn data_sources_json(&self) -> String {
        json!({ "DATA_SOURCES": self.data_sources() }).to_string()
    }

    /// Serializes the document.
    #[must_use]
    pub fn to_json(&self) -> String {
        self.root.to_string()
    }
}

fn dsrc_json(id: i64, code: &str) -> Value {
    let mut entry = Map::new();
    entry.insert("DSRC_ID".to_string(), json!(id));
    entry.insert("DSRC_CODE".to_string(), json!(code));
    entry.insert("DSRC_DESC".to_string(), json!(code));
    entry.insert("DSRC_RELY".to_string(), json!(1));
    entry.insert("RETENTION_LEVEL".to_string(), json!("Remember"));
    entry.insert("CONVERSATIONAL".to_string(), json!("No"));
    Value::Object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_has_builtin_sources() {
        let doc = ConfigDocument::template();
        assert_eq!(doc.data_source_codes(), ["TEST", "SEARCH"]);
    }

    #[test]
    fn test_parse_rejects_missing_registry() {
        let err = ConfigDocument::parse(r#"{"G2_CONFIG":{}}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfigDocument { .. }));
    }

    #[test]
    fn test_parse_rejects_malformed_registry_entry() {
        let err = ConfigDocument::parse(
            r#"{"G2_CONFIG":{"CFG_DSRC":[{"DSRC_ID":"1","DSRC_CODE":"TEST"}]}}"#,
        )
        .unwrap_err();
        match err {
            ValidationError::InvalidConfigDocument { reason } => {
                assert!(reason.starts_with("G2_CONFIG.CFG_DSRC[0]"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_add_data_source_when_ids_are_exhausted() {
        let mut doc = ConfigDocument::parse(
            r#"{"G2_CONFIG":{"CFG_DSRC":[{"DSRC_ID":9223372036854775807,"DSRC_CODE":"BIG"}]}}"#,
        )
        .unwrap();
        let before = doc.clone();
        let err = doc.add_data_source("NEW").unwrap_err();
        assert!(matches!(err, EngineError::BadInput { .. }));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_add_data_source_assigns_user_ids() {
        let mut doc = ConfigDocument::template();
        let first = doc.add_data_source("customers").unwrap();
        let second = doc.add_data_source("WATCHLIST").unwrap();
        assert_eq!(first.code, "CUSTOMERS");
        assert_eq!(first.id, 1001);
        assert_eq!(second.id, 1002);
        assert!(doc.contains_data_source("Customers"));
    }

    #[test]
    fn test_add_duplicate_leaves_document_unchanged() {
        let mut doc = ConfigDocument::template();
        doc.add_data_source("CUSTOMERS").unwrap();
        let before = doc.clone();
        let err = doc.add_data_source(" customers ").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDataSource { .. }));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_delete_data_source() {
        let mut doc = ConfigDocument::template();
        doc.delete_data_source("test").unwrap();
        assert_eq!(doc.data_source_codes(), ["SEARCH"]);
        assert!(matches!(doc.delete_data_source("TEST"), Err(EngineError::NotFound { .. })));
    }

    #[test]
    fn test_roundtrip_through_text() {
        let mut doc = ConfigDocument::template();
        doc.add_data_source("REFERENCE").unwrap();
        let reparsed = ConfigDocument::parse(&doc.to_json()).unwrap();
        assert_eq!(reparsed.data_source_codes(), doc.data_source_codes());
    }
}
