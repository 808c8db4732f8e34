//! Running built statements
//!
//! Each operation is one job on the store worker. The job is queued before
//! the returned future is first polled, so operations started one after the
//! other reach the store in that order.
//!
//! Outcomes are routed three ways:
//! - transaction failure: error callback
//! - statement failure: logged, neither callback runs
//! - commit: side effects, then success callback

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::builder::Statement;
use crate::callback::dispatch;
use crate::error::{DatastoreError, TransactionError};
use crate::mapper;
use crate::model::{ModelDescriptor, RecordHandle};
use crate::reconcile;
use crate::request::Handlers;
use crate::storage::{Session, StoreHandle, TxMode, TxOutcome};

/// Kind of write a record operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// What a committed write produced
#[derive(Debug)]
enum Written {
    Done,
    Inserted(Result<i64, TransactionError>),
}

type WriteResult = Result<TxOutcome<Written>, TransactionError>;

/// Run one write against `record`'s table
pub(crate) fn perform_write(
    store: &StoreHandle,
    kind: WriteKind,
    statement: Statement,
    record: RecordHandle,
    handlers: Handlers<RecordHandle>,
) -> impl Future<Output = ()> + Send + 'static {
    let model = Arc::clone(record.lock().model());
    let table = model.name().to_string();

    let queued = match kind {
        WriteKind::Insert => {
            let table = table.clone();
            store.enqueue(move |session| insert_job(session, &statement, &table))
        }
        WriteKind::Update | WriteKind::Delete => store.enqueue(move |session| -> WriteResult {
            let outcome = session.transaction(TxMode::ReadWrite, |tx| tx.execute(&statement))?;
            Ok(outcome.map(|_| Written::Done))
        }),
    };

    async move {
        let outcome = match queued {
            Ok(job) => job.wait().await.and_then(|result| result),
            Err(err) => Err(err),
        };
        complete_write(kind, &model, outcome, record, handlers);
    }
}

/// Insert, then read back the assigned ID before anything else runs
fn insert_job(session: &mut Session, statement: &Statement, table: &str) -> WriteResult {
    let outcome = session.transaction(TxMode::ReadWrite, |tx| tx.execute(statement))?;
    Ok(match outcome {
        TxOutcome::Committed(_) => {
            TxOutcome::Committed(Written::Inserted(reconcile::last_assigned_id(session, table)))
        }
        TxOutcome::StatementFailed(err) => TxOutcome::StatementFailed(err),
    })
}

fn complete_write(
    kind: WriteKind,
    model: &ModelDescriptor,
    outcome: WriteResult,
    record: RecordHandle,
    handlers: Handlers<RecordHandle>,
) {
    let table = model.name();
    match outcome {
        Err(err) => {
            error!(table, ?kind, "Transaction failed: {}", err);
            dispatch(handlers.on_error, DatastoreError::from(err), "error");
        }
        Ok(TxOutcome::StatementFailed(err)) => {
            // Reported nowhere but the log
            error!(table, ?kind, "{}", err);
        }
        Ok(TxOutcome::Committed(Written::Inserted(Ok(id)))) => {
            reconcile::apply(&record, Some(id));
            info!(table, id, client_id = record.client_id(), "record inserted");
            dispatch(handlers.on_success, record, "success");
        }
        Ok(TxOutcome::Committed(Written::Inserted(Err(err)))) => {
            // The row is committed; only its ID is unknown
            reconcile::apply(&record, None);
            error!(table, "{}", err);
            dispatch(handlers.on_error, DatastoreError::from(err), "error");
        }
        Ok(TxOutcome::Committed(Written::Done)) => {
            if kind == WriteKind::Delete {
                let client_id = record.client_id();
                model.records().remove(client_id);
                debug!(table, client_id, "record removed");
            }
            dispatch(handlers.on_success, record, "success");
        }
    }
}

/// Run a select and deliver the materialized records
pub(crate) fn perform_read(
    store: &StoreHandle,
    statement: Statement,
    model: Arc<ModelDescriptor>,
    handlers: Handlers<Vec<RecordHandle>>,
) -> impl Future<Output = ()> + Send + 'static {
    let queued = store.enqueue(move |session| {
        session.transaction(TxMode::ReadOnly, |tx| tx.query_rows(&statement))
    });

    async move {
        let outcome = match queued {
            Ok(job) => job.wait().await.and_then(|result| result),
            Err(err) => Err(err),
        };

        let table = model.name();
        match outcome {
            Err(err) => {
                error!(table, "Transaction failed: {}", err);
                dispatch(handlers.on_error, DatastoreError::from(err), "error");
            }
            Ok(TxOutcome::StatementFailed(err)) => {
                error!(table, "{}", err);
            }
            Ok(TxOutcome::Committed(rows)) => {
                debug!(table, rows = rows.len(), "select returned");
                let records = mapper::materialize(&model, rows);
                dispatch(handlers.on_success, records, "success");
            }
        }
    }
}

/// Deliver a failure that kept the operation from reaching the store
pub(crate) fn report_unready<T>(handlers: Handlers<T>, err: DatastoreError) {
    error!("Operation not run: {}", err);
    dispatch(handlers.on_error, err, "error");
}
