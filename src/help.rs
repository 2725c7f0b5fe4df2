//! Local method documentation for engine handles.

use crate::error::{SzResult, ValidationError};

struct MethodDoc {
    name: &'static str,
    signature: &'static str,
    summary: &'static str,
}

const ENGINE_METHODS: &[MethodDoc] = &[
    MethodDoc {
        name: "add_record",
        signature: "add_record(data_source_code: &str, record_id: &str, record_definition: &str, flags: SzFlags) -> String",
        summary: "Loads a record into the repository. With WITH_INFO the result lists affected entities.",
    },
    MethodDoc {
        name: "delete_record",
        signature: "delete_record(data_source_code: &str, record_id: &str, flags: SzFlags) -> String",
        summary: "Removes a record from the repository. With WITH_INFO the result lists affected entities.",
    },
    MethodDoc {
        name: "get_active_config_id",
        signature: "get_active_config_id() -> ConfigId",
        summary: "Returns the id of the configuration this engine handle resolves against.",
    },
    MethodDoc {
        name: "get_entity_by_record_id",
        signature: "get_entity_by_record_id(data_source_code: &str, record_id: &str, flags: SzFlags) -> String",
        summary: "Returns the resolved entity that contains the identified record.",
    },
    MethodDoc {
        name: "get_record",
        signature: "get_record(data_source_code: &str, record_id: &str, flags: SzFlags) -> String",
        summary: "Returns a loaded record as stored by the engine.",
    },
    MethodDoc {
        name: "help",
        signature: "help(method: Option<&str>) -> String",
        summary: "Lists engine methods, or describes one method when a name is given.",
    },
    MethodDoc {
        name: "reinitialize",
        signature: "reinitialize(config_id: ConfigId)",
        summary: "Switches the engine handle to another registered configuration.",
    },
    MethodDoc {
        name: "search_by_attributes",
        signature: "search_by_attributes(attributes: &str, search_profile: &str, flags: SzFlags) -> String",
        summary: "Finds entities whose features match the JSON attributes given.",
    },
];

/// Help text for engine methods.
///
/// With no method, lists every method with its signature. With a method
/// name, describes that method.
pub fn engine_help(method: Option<&str>) -> SzResult<String> {
    match method.map(str::trim).filter(|m| !m.is_empty()) {
        None => {
            let mut out = String::from("Engine methods:\n");
            for doc in ENGINE_METHODS {
                out.push_str("  ");
                out.push_str(doc.signature);
                out.push('\n');
            }
            Ok(out)
        }
        Some(name) => ENGINE_METHODS
            .iter()
            .find(|doc| doc.name == name)
            .map(|doc| format!("{}\n\n{}\n", doc.signature, doc.summary))
            .ok_or_else(|| {
                ValidationError::UnknownMethod {
                    name: name.to_string(),
                }
                .into()
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_all_methods() {
        let text = engine_help(None).unwrap();
        assert!(text.contains("add_record("));
        assert!(text.contains("search_by_attributes("));
    }

    #[test]
    fn test_single_method() {
        let text = engine_help(Some("get_entity_by_record_id")).unwrap();
        assert!(text.starts_with("get_entity_by_record_id(data_source_code: &str"));
        assert!(!text.contains("add_record"));
    }

    #[test]
    fn test_unknown_method() {
        let err = engine_help(Some("frobnicate")).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_blank_method_lists_all() {
        assert_eq!(engine_help(Some("  ")).unwrap(), engine_help(None).unwrap());
    }
}
