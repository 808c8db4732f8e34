//! Public datastore surface
//!
//! `save`, `find` and `del` validate and build their statement right away and
//! return. The rest runs as a task on the runtime captured by
//! [`Datastore::configure`]: wait until the model's table exists, run the
//! statement, then call back. Malformed requests are rejected with a
//! [`ValidationError`] before anything is queued and no callback runs.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use crate::builder::{self, Statement};
use crate::config::StoreConfig;
use crate::error::{ConfigurationError, DatastoreResult, ValidationError};
use crate::executor::{self, WriteKind};
use crate::model::{ModelDescriptor, RecordState};
use crate::presenter::{LogPresenter, Presenter};
use crate::request::{DeleteRequest, FindRequest, RecordRequest, SaveRequest};
use crate::storage::{SchemaManager, StoreHandle};

struct Inner {
    schema: SchemaManager,
    runtime: Handle,
}

/// Datastore bound to one store
///
/// Cheap to clone; clones share the store and its tables.
#[derive(Clone)]
pub struct Datastore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("store", &self.inner.schema.config().store_name)
            .finish()
    }
}

impl Datastore {
    /// Bind a datastore to the store described by `config`
    ///
    /// The store itself is opened on first use. Must be called from within a
    /// tokio runtime.
    pub fn configure(config: StoreConfig) -> Result<Self, ConfigurationError> {
        Self::configure_with_presenter(config, Arc::new(LogPresenter))
    }

    /// Like [`Datastore::configure`], alerting store failures to `presenter`
    pub fn configure_with_presenter(
        config: StoreConfig,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Self, ConfigurationError> {
        let runtime = Handle::try_current().map_err(|_| ConfigurationError::NoRuntime)?;
        debug!(store = %config.store_name, "datastore configured");
        Ok(Self {
            inner: Arc::new(Inner {
                schema: SchemaManager::new(config, presenter),
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        self.inner.schema.config()
    }

    /// Insert a NEW record or update the dirty fields of a VALID one
    pub fn save(&self, request: SaveRequest) -> Result<(), ValidationError> {
        let (kind, statement) = {
            let record = request.record.lock();
            match record.state() {
                RecordState::New => (WriteKind::Insert, builder::insert(&record)),
                RecordState::Valid => (WriteKind::Update, builder::update(&record)?),
            }
        };
        self.run_write(kind, statement, request);
        Ok(())
    }

    /// Select records; the success callback gets them all as one `Vec`
    pub fn find(&self, request: FindRequest) -> Result<(), ValidationError> {
        let statement = builder::select(&request.model, &request.query)?;
        let FindRequest {
            model, handlers, ..
        } = request;

        if let Some(store) = self.inner.schema.ready_store(model.name()) {
            self.spawn(executor::perform_read(&store, statement, model, handlers));
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            match inner.schema.ensure_ready(&model).await {
                Ok(store) => executor::perform_read(&store, statement, model, handlers).await,
                Err(err) => executor::report_unready(handlers, err),
            }
        });
        Ok(())
    }

    /// Delete a persisted record; it also leaves its model's record manager
    pub fn del(&self, request: DeleteRequest) -> Result<(), ValidationError> {
        let statement = builder::delete(&request.record.lock())?;
        self.run_write(WriteKind::Delete, statement, request);
        Ok(())
    }

    /// Open the store and create `model`'s table now instead of on first use
    ///
    /// Also moves `model`'s client ID allocator past the client IDs already
    /// stored, so call it before creating records against an existing store.
    pub async fn ensure_ready(&self, model: &ModelDescriptor) -> DatastoreResult<()> {
        self.inner.schema.ensure_ready(model).await.map(|_| ())
    }

    /// Most recently executed statements, oldest first
    ///
    /// Empty until the store has been opened.
    pub fn recent_statements(&self) -> Vec<Statement> {
        self.inner
            .schema
            .store_if_open()
            .map(|store| store.recent_statements())
            .unwrap_or_default()
    }

    /// Handle to the open store, if any
    pub fn store(&self) -> Option<StoreHandle> {
        self.inner.schema.store_if_open()
    }

    fn run_write(&self, kind: WriteKind, statement: Statement, request: RecordRequest) {
        let RecordRequest { record, handlers } = request;
        let model = Arc::clone(record.lock().model());

        if let Some(store) = self.inner.schema.ready_store(model.name()) {
            self.spawn(executor::perform_write(
                &store, kind, statement, record, handlers,
            ));
            return;
        }

        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            match inner.schema.ensure_ready(&model).await {
                Ok(store) => {
                    executor::perform_write(&store, kind, statement, record, handlers).await
                }
                Err(err) => executor::report_unready(handlers, err),
            }
        });
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        // Completion is observed through callbacks only
        drop(self.inner.runtime.spawn(task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_outside_runtime() {
        let err = Datastore::configure(StoreConfig::in_memory("provider")).unwrap_err();
        assert!(matches!(err, ConfigurationError::NoRuntime));
    }

    #[tokio::test]
    async fn test_store_opens_lazily() {
        let datastore = Datastore::configure(StoreConfig::in_memory("provider")).unwrap();
        assert!(datastore.store().is_none());
        assert!(datastore.recent_statements().is_empty());
    }
}
