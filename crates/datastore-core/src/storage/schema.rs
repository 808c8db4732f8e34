//! Store and table initialization
//!
//! The store is opened the first time any operation needs it. A failure is
//! alerted through the presenter once and then cached: every later operation
//! gets the same error without another attempt.
//!
//! Each table has its own latch. Concurrent first uses all wait on the same
//! creation; a failed creation leaves the latch unset so the next operation
//! tries again. Creation also moves the model's client ID allocator past every
//! client ID already stored in the table.
//!
//! Opening the store touches the file system, so it runs on the blocking pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::types::Value as SqlValue;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::builder;
use crate::config::StoreConfig;
use crate::error::{ConfigurationError, DatastoreResult, SchemaError};
use crate::model::ModelDescriptor;
use crate::presenter::Presenter;

use super::session::{StoreHandle, TxMode, TxOutcome};

/// Opens the store and creates tables on demand
pub struct SchemaManager {
    config: StoreConfig,
    presenter: Arc<dyn Presenter>,
    store: OnceCell<Result<StoreHandle, Arc<ConfigurationError>>>,
    tables: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl SchemaManager {
    pub fn new(config: StoreConfig, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            config,
            presenter,
            store: OnceCell::new(),
            tables: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store handle, opening the store on first call
    pub async fn store(&self) -> Result<StoreHandle, Arc<ConfigurationError>> {
        let opened = self
            .store
            .get_or_init(|| async {
                let config = self.config.clone();
                let opened = tokio::task::spawn_blocking(move || StoreHandle::open(&config))
                    .await
                    .unwrap_or_else(|join| Err(ConfigurationError::Interrupted(join)));
                opened.map_err(|err| {
                    error!(store = %self.config.store_name, "Failed to open store: {}", err);
                    self.presenter.alert(err.title(), &err.to_string());
                    Arc::new(err)
                })
            })
            .await;
        opened.clone()
    }

    /// Store handle if the store was already opened successfully
    pub fn store_if_open(&self) -> Option<StoreHandle> {
        self.store.get().and_then(|opened| opened.as_ref().ok()).cloned()
    }

    /// Make sure the store is open and `model`'s table exists
    pub async fn ensure_ready(&self, model: &ModelDescriptor) -> DatastoreResult<StoreHandle> {
        let store = self.store().await?;
        let latch = self.latch(model.name());
        latch
            .get_or_try_init(|| create_table(&store, model))
            .await
            .map_err(|err| {
                error!(table = err.table(), "Table not ready: {}", err);
                err
            })?;
        Ok(store)
    }

    /// Store handle if it is open and `table` already exists
    pub fn ready_store(&self, table: &str) -> Option<StoreHandle> {
        if self.is_ready(table) {
            self.store_if_open()
        } else {
            None
        }
    }

    /// Whether `table` has been created through this manager
    pub fn is_ready(&self, table: &str) -> bool {
        self.tables()
            .get(table)
            .map(|latch| latch.initialized())
            .unwrap_or(false)
    }

    fn latch(&self, table: &str) -> Arc<OnceCell<()>> {
        Arc::clone(self.tables().entry(table.to_string()).or_default())
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<OnceCell<()>>>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn create_table(store: &StoreHandle, model: &ModelDescriptor) -> Result<(), SchemaError> {
    let table = model.name().to_string();
    let create = builder::create_table(model);
    let highest = builder::max_client_id(model);

    let outcome = store
        .submit(move |session| {
            session.transaction(TxMode::ReadWrite, |tx| {
                tx.execute(&create)?;
                tx.query_rows(&highest)
            })
        })
        .await
        .and_then(|result| result);

    match outcome {
        Ok(TxOutcome::Committed(rows)) => {
            let stored = rows.first().and_then(|row| match row.get(builder::MAX_CLIENT_ID) {
                Some(SqlValue::Integer(id)) => Some(*id),
                _ => None,
            });
            if let Some(client_id) = stored {
                model.records().observe_client_id(client_id);
                debug!(table = %table, client_id, "client IDs continue after stored rows");
            }
            info!(table = %table, "table ready");
            Ok(())
        }
        Ok(TxOutcome::StatementFailed(source)) => Err(SchemaError::Statement { table, source }),
        Err(source) => Err(SchemaError::Transaction { table, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatastoreError;
    use crate::model::{Attribute, Value};
    use crate::storage::session::RawRow;
    use crate::types::DataKind;

    #[derive(Default)]
    struct RecordingPresenter {
        alerts: Mutex<Vec<(String, String)>>,
    }

    impl Presenter for RecordingPresenter {
        fn alert(&self, title: &str, message: &str) {
            self.alerts
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string()));
        }
    }

    fn manager(config: StoreConfig) -> (SchemaManager, Arc<RecordingPresenter>) {
        let presenter = Arc::new(RecordingPresenter::default());
        let manager = SchemaManager::new(config, Arc::clone(&presenter) as Arc<dyn Presenter>);
        (manager, presenter)
    }

    fn user_model() -> Arc<ModelDescriptor> {
        ModelDescriptor::builder("User")
            .attribute("name", Attribute::new(DataKind::String))
            .attribute("age", Attribute::new(DataKind::Integer))
            .build()
            .unwrap()
    }

    fn create_count(store: &StoreHandle) -> usize {
        store
            .recent_statements()
            .iter()
            .filter(|s| s.sql.starts_with("CREATE TABLE"))
            .count()
    }

    async fn table_columns(store: &StoreHandle, table: &str) -> Vec<String> {
        let statement = builder::Statement {
            sql: format!("PRAGMA table_info({})", table),
            params: Vec::new(),
        };
        let outcome = store
            .submit(move |session| {
                session.transaction(TxMode::ReadOnly, |tx| tx.query_rows(&statement))
            })
            .await
            .unwrap()
            .unwrap();
        let TxOutcome::Committed(rows) = outcome else {
            panic!("table_info failed");
        };
        rows.iter()
            .filter_map(|row: &RawRow| match row.get("name") {
                Some(SqlValue::Text(name)) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_ensure_ready_is_idempotent() {
        let (manager, _) = manager(StoreConfig::in_memory("schema"));
        let model = user_model();

        let store = manager.ensure_ready(&model).await.unwrap();
        let first = table_columns(&store, "User").await;
        manager.ensure_ready(&model).await.unwrap();
        let second = table_columns(&store, "User").await;

        assert_eq!(first, vec!["ID", "name", "age", "_client_id"]);
        assert_eq!(first, second);
        assert_eq!(create_count(&store), 1);
        assert!(manager.is_ready("User"));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_creates_once() {
        let (manager, _) = manager(StoreConfig::in_memory("schema"));
        let model = user_model();

        let (a, b, c) = tokio::join!(
            manager.ensure_ready(&model),
            manager.ensure_ready(&model),
            manager.ensure_ready(&model)
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(create_count(&manager.store_if_open().unwrap()), 1);
    }

    #[tokio::test]
    async fn test_failed_creation_is_retried() {
        let (manager, _) = manager(StoreConfig::in_memory("schema"));
        // Names starting with sqlite_ are reserved by the engine
        let model = ModelDescriptor::builder("sqlite_things")
            .attribute("label", Attribute::new(DataKind::String))
            .build()
            .unwrap();

        let err = manager.ensure_ready(&model).await.unwrap_err();
        assert!(matches!(
            err,
            DatastoreError::Schema(SchemaError::Statement { .. })
        ));
        assert!(!manager.is_ready("sqlite_things"));

        assert!(manager.ensure_ready(&model).await.is_err());
        assert_eq!(create_count(&manager.store_if_open().unwrap()), 2);
    }

    #[tokio::test]
    async fn test_client_ids_continue_after_stored_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new("seeded").with_data_dir(dir.path());

        let (first, _) = manager(config.clone());
        let store = first.ensure_ready(&user_model()).await.unwrap();
        let insert = builder::Statement {
            sql: "INSERT INTO User (name, _client_id) VALUES (?, ?)".to_string(),
            params: vec![Value::from("Ann"), Value::Integer(7)],
        };
        store
            .submit(move |session| {
                session.transaction(TxMode::ReadWrite, |tx| tx.execute(&insert))
            })
            .await
            .unwrap()
            .unwrap();
        drop(store);
        drop(first);

        // A later session starts with a fresh model
        let (second, _) = manager(config);
        let model = user_model();
        second.ensure_ready(&model).await.unwrap();
        assert_eq!(model.create_record().client_id(), 8);
    }

    #[tokio::test]
    async fn test_empty_table_leaves_client_ids_alone() {
        let (manager, _) = manager(StoreConfig::in_memory("schema"));
        let model = user_model();
        manager.ensure_ready(&model).await.unwrap();
        assert_eq!(model.create_record().client_id(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_store_opens_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");
        let (manager, _) = manager(StoreConfig::new("pooled").with_data_dir(&data_dir));

        manager.store().await.unwrap();
        assert!(data_dir.join("pooled.db").exists());
        assert!(manager.store_if_open().is_some());
    }

    #[tokio::test]
    async fn test_open_failure_is_alerted_once() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        // A regular file where the data directory should be
        let config = StoreConfig::new("broken").with_data_dir(blocker.path());
        let (manager, presenter) = manager(config);
        let model = user_model();

        for _ in 0..2 {
            let err = manager.ensure_ready(&model).await.unwrap_err();
            assert!(matches!(err, DatastoreError::Configuration(_)));
        }
        assert_eq!(presenter.alerts.lock().unwrap().len(), 1);
        assert!(manager.store_if_open().is_none());
    }
}
