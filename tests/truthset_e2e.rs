use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use sz_quickstart::operations::{pretty_json, BulkLoadProcedure, ConfigSynchronizer, RecordOutcome};
use sz_quickstart::service::memory::MemoryConfigManager;
use sz_quickstart::{
    ConfigDocument, ConfigId, InMemorySenzing, SzAbstractFactory, SzConfig, SzConfigManager, SzEngine, SzFlags,
    SzResult,
};

const CUSTOMERS: &[&str] = &[
    r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"1070","NAME_FULL":"Robert Smith","DATE_OF_BIRTH":"11/12/1978","ADDR_FULL":"123 Main St, Las Vegas NV 89132"}"#,
    r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"1071","NAME_FULL":"Bob Smith","DATE_OF_BIRTH":"11/12/1978"}"#,
    r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"1072","NAME_FULL":"Jane Doe"}"#,
];

const REFERENCE: &[&str] = &[
    r#"{"DATA_SOURCE":"REFERENCE","RECORD_ID":"2001","NAME_ORG":"Acme Corp"}"#,
];

const WATCHLIST: &[&str] = &[
    r#"{"DATA_SOURCE":"WATCHLIST","RECORD_ID":"3001","NAME_FULL":"Robert Smith","DATE_OF_BIRTH":"11/12/1978"}"#,
    r#"{"DATA_SOURCE":"WATCHLIST","RECORD_ID":"3002","NAME_FULL":"Evil Twin"}"#,
];

fn write_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

fn truthsets(dir: &Path) -> Vec<PathBuf> {
    vec![
        write_file(dir, "customers.json", CUSTOMERS),
        write_file(dir, "reference.json", REFERENCE),
        write_file(dir, "watchlist.json", WATCHLIST),
    ]
}

#[tokio::test]
async fn truthsets_load_and_customer_1070_is_queryable() {
    let dir = tempfile::tempdir().unwrap();
    let files = truthsets(dir.path());
    let service = Arc::new(InMemorySenzing::new());
    let engine = service.create_engine().await.unwrap();

    let mut infos = Vec::new();
    let report = BulkLoadProcedure::new(service.clone())
        .run(&files, "Add TruthSet datasources", |_, outcome| {
            if let RecordOutcome::Added { info, .. } = outcome {
                infos.push(info.clone());
            }
        })
        .await
        .unwrap();

    assert_eq!(report.data_sources, ["CUSTOMERS", "REFERENCE", "WATCHLIST"]);
    assert_eq!(report.succeeded(), 6);
    assert_eq!(report.failed(), 0);
    assert_eq!(infos.len(), 6);

    let entity = engine
        .get_entity_by_record_id("CUSTOMERS", "1070", SzFlags::ENTITY_INCLUDE_RECORD_SUMMARY)
        .await
        .unwrap();
    let entity: Value = serde_json::from_str(&entity).unwrap();
    assert_eq!(entity["RESOLVED_ENTITY"]["RECORDS"][0]["DATA_SOURCE"], "CUSTOMERS");
    assert_eq!(entity["RESOLVED_ENTITY"]["RECORD_SUMMARY"][0]["DATA_SOURCE"], "CUSTOMERS");

    let hits = engine
        .search_by_attributes(
            r#"{"name_full": "robert smith", "date_of_birth": "11/12/1978"}"#,
            "",
            SzFlags::SEARCH_BY_ATTRIBUTES_DEFAULT_FLAGS,
        )
        .await
        .unwrap();
    let pretty = pretty_json(&hits);
    assert!(pretty.starts_with("{\n  \"RESOLVED_ENTITIES\""));
    let hits: Value = serde_json::from_str(&hits).unwrap();
    let ids: Vec<&str> = hits["RESOLVED_ENTITIES"]
        .as_array()
        .unwrap()
        .iter()
        .map(|hit| hit["ENTITY"]["RESOLVED_ENTITY"]["RECORDS"][0]["RECORD_ID"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["1070", "3001"]);
}

#[tokio::test]
async fn promoted_config_contains_exactly_old_plus_new_labels() {
    let dir = tempfile::tempdir().unwrap();
    let files = truthsets(dir.path());
    let service = Arc::new(InMemorySenzing::new());
    let manager = service.config_manager();
    let before = manager.get_default_config_id().await.unwrap();
    let versions_before = service.config_count().unwrap();

    let report = BulkLoadProcedure::new(service.clone())
        .run(&files, "Add TruthSet datasources", |_, _| {})
        .await
        .unwrap();

    let after = manager.get_default_config_id().await.unwrap();
    assert_ne!(before, after);
    assert_eq!(service.config_count().unwrap(), versions_before + 1);
    assert!(manager.get_config(before).await.is_ok());
    assert_eq!(report.sync.config_id, after);
    let doc = ConfigDocument::parse(&manager.get_config(after).await.unwrap()).unwrap();
    assert_eq!(doc.data_source_codes(), ["TEST", "SEARCH", "CUSTOMERS", "REFERENCE", "WATCHLIST"]);

    let configs: Value = serde_json::from_str(&manager.get_configs().await.unwrap()).unwrap();
    let last = configs["CONFIGS"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["CONFIG_COMMENTS"], "Add TruthSet datasources");
}

#[tokio::test]
async fn running_twice_is_idempotent_for_labels() {
    let dir = tempfile::tempdir().unwrap();
    let files = truthsets(dir.path());
    let service = Arc::new(InMemorySenzing::new());

    let first = BulkLoadProcedure::new(service.clone())
        .run(&files, "first", |_, _| {})
        .await
        .unwrap();
    let second = BulkLoadProcedure::new(service.clone())
        .run(&files, "second", |_, _| {})
        .await
        .unwrap();

    assert!(second.sync.added.is_empty());
    assert_eq!(second.sync.already_present, ["CUSTOMERS", "REFERENCE", "WATCHLIST"]);
    assert!(second.sync.config_id > first.sync.config_id);
    assert_eq!(second.succeeded(), 6);
    assert_eq!(service.record_count().unwrap(), 6);
}

#[tokio::test]
async fn bad_records_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(
        dir.path(),
        "user.json",
        &[
            CUSTOMERS[0],
            r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"9","NAME_FULL":"#,
            CUSTOMERS[1],
            "",
            r#"{"RECORD_ID":"10"}"#,
            CUSTOMERS[2],
        ],
    );
    let service = Arc::new(InMemorySenzing::new());

    let report = BulkLoadProcedure::new(service.clone())
        .run(&[file], "Add user datasources", |_, _| {})
        .await
        .unwrap();

    assert_eq!(report.attempted(), 5);
    assert_eq!(report.succeeded(), 3);
    let failed_lines: Vec<usize> = report.loads[0].1.failures.iter().map(|f| f.line).collect();
    assert_eq!(failed_lines, [2, 5]);
    assert_eq!(service.record_count().unwrap(), 3);
}

#[tokio::test]
async fn latin1_line_fails_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("latin1.json");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(CUSTOMERS[0].as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(b"{\"DATA_SOURCE\":\"CUSTOMERS\",\"RECORD_ID\":\"9\",\"NAME_FULL\":\"Jos\xe9\"}\n");
    bytes.extend_from_slice(CUSTOMERS[1].as_bytes());
    bytes.push(b'\n');
    std::fs::write(&path, bytes).unwrap();
    let service = Arc::new(InMemorySenzing::new());

    let report = BulkLoadProcedure::new(service.clone())
        .run(&[path], "Add user datasources", |_, _| {})
        .await
        .unwrap();

    assert_eq!(report.data_sources, ["CUSTOMERS"]);
    assert_eq!(report.succeeded(), 2);
    let failed_lines: Vec<usize> = report.loads[0].1.failures.iter().map(|f| f.line).collect();
    assert_eq!(failed_lines, [2]);
    assert_eq!(service.record_count().unwrap(), 2);
}

#[tokio::test]
async fn config_round_trips_through_an_edit_session() {
    let service = InMemorySenzing::new();
    let config = service.config();
    let manager = service.config_manager();
    let id = manager.get_default_config_id().await.unwrap();
    let original = manager.get_config(id).await.unwrap();

    let handle = config.import_config(&original).await.unwrap();
    let exported = config.export_config(handle).await.unwrap();
    config.close_config(handle).await.unwrap();

    let a = ConfigDocument::parse(&original).unwrap();
    let b = ConfigDocument::parse(&exported).unwrap();
    assert_eq!(a.data_sources(), b.data_sources());
}

/// Config manager that lets a competing writer promote a configuration
/// right before the first compare-and-swap.
struct RacingManager {
    inner: MemoryConfigManager,
    raced: AtomicBool,
}

#[async_trait]
impl SzConfigManager for RacingManager {
    async fn add_config(&self, config_definition: &str, config_comment: &str) -> SzResult<ConfigId> {
        self.inner.add_config(config_definition, config_comment).await
    }

    async fn get_config(&self, config_id: ConfigId) -> SzResult<String> {
        self.inner.get_config(config_id).await
    }

    async fn get_configs(&self) -> SzResult<String> {
        self.inner.get_configs().await
    }

    async fn get_default_config_id(&self) -> SzResult<ConfigId> {
        self.inner.get_default_config_id().await
    }

    async fn replace_default_config_id(&self, current: ConfigId, new: ConfigId) -> SzResult<()> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut doc = ConfigDocument::parse(&self.inner.get_config(current).await?).unwrap();
            doc.add_data_source("RIVAL").unwrap();
            let rival = self.inner.add_config(&doc.to_json(), "rival").await?;
            self.inner.replace_default_config_id(current, rival).await?;
        }
        self.inner.replace_default_config_id(current, new).await
    }

    async fn set_default_config_id(&self, config_id: ConfigId) -> SzResult<()> {
        self.inner.set_default_config_id(config_id).await
    }
}

#[tokio::test]
async fn replace_conflict_restarts_the_cycle() {
    let service = Arc::new(InMemorySenzing::new());
    let engine = service.create_engine().await.unwrap();
    let manager = Arc::new(RacingManager {
        inner: service.config_manager(),
        raced: AtomicBool::new(false),
    });
    let sync = ConfigSynchronizer::from_parts(service.clone(), Arc::new(service.config()), manager.clone());
    let versions_before = service.config_count().unwrap();

    let outcome = sync.synchronize(&["CUSTOMERS".to_string()], "c").await.unwrap();

    assert!(service.config_count().unwrap() > versions_before);

    assert_eq!(outcome.attempts, 2);
    let default = manager.get_default_config_id().await.unwrap();
    assert_eq!(default, outcome.config_id);
    assert_eq!(engine.get_active_config_id().await.unwrap(), default);
    let doc = ConfigDocument::parse(&manager.get_config(default).await.unwrap()).unwrap();
    assert!(doc.contains_data_source("RIVAL"));
    assert!(doc.contains_data_source("CUSTOMERS"));
    assert_eq!(service.open_sessions().unwrap(), 0);
}

#[tokio::test]
async fn replace_conflict_surfaces_when_attempts_run_out() {
    let service = Arc::new(InMemorySenzing::new());
    let manager = Arc::new(RacingManager {
        inner: service.config_manager(),
        raced: AtomicBool::new(false),
    });
    let sync = ConfigSynchronizer::from_parts(service.clone(), Arc::new(service.config()), manager.clone())
        .max_attempts(1);

    let err = sync.synchronize(&["CUSTOMERS".to_string()], "c").await.unwrap_err();
    assert!(err.is_replace_conflict());
    assert_eq!(service.open_sessions().unwrap(), 0);
}

#[tokio::test]
async fn method_help_lists_get_entity_by_record_id() {
    let service = InMemorySenzing::new();
    let engine = service.create_engine().await.unwrap();
    assert!(engine.help(None).unwrap().contains("get_entity_by_record_id"));
    assert!(engine.help(Some("get_entity_by_record_id")).is_ok());
    assert!(engine.help(Some("no_such_method")).is_err());
}
