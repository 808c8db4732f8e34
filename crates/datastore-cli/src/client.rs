//! Awaitable wrappers around the callback API
//!
//! Each wrapper hands a oneshot sender to both callbacks and waits for
//! whichever fires. A statement failure fires neither, so every wait is
//! bounded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::oneshot;

use datastore_core::{
    Datastore, DatastoreError, DeleteRequest, FindRequest, RecordHandle, SaveRequest,
};

/// How long to wait for a callback before giving up
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<Result<T, DatastoreError>>>>>;

fn completion<T: Send + 'static>() -> (
    impl FnOnce(T) + Send + 'static,
    impl FnOnce(DatastoreError) + Send + 'static,
    oneshot::Receiver<Result<T, DatastoreError>>,
) {
    let (tx, rx) = oneshot::channel();
    let ok: Slot<T> = Arc::new(Mutex::new(Some(tx)));
    let err = Arc::clone(&ok);
    (
        move |value| deliver(&ok, Ok(value)),
        move |error| deliver(&err, Err(error)),
        rx,
    )
}

fn deliver<T>(slot: &Slot<T>, result: Result<T, DatastoreError>) {
    let sender = slot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(tx) = sender {
        let _ = tx.send(result);
    }
}

async fn wait<T>(rx: oneshot::Receiver<Result<T, DatastoreError>>) -> Result<T> {
    match tokio::time::timeout(RESPONSE_TIMEOUT, rx).await {
        Ok(Ok(result)) => Ok(result?),
        Ok(Err(_)) => Err(anyhow!("Operation was dropped before completing")),
        Err(_) => Err(anyhow!(
            "No response from the store; the statement probably failed (run with -v for details)"
        )),
    }
}

pub async fn save(datastore: &Datastore, record: RecordHandle) -> Result<RecordHandle> {
    let (on_success, on_error, rx) = completion::<RecordHandle>();
    datastore.save(
        SaveRequest::new(record)
            .on_success(on_success)
            .on_error(on_error),
    )?;
    wait(rx).await
}

pub async fn delete(datastore: &Datastore, record: RecordHandle) -> Result<RecordHandle> {
    let (on_success, on_error, rx) = completion::<RecordHandle>();
    datastore.del(
        DeleteRequest::new(record)
            .on_success(on_success)
            .on_error(on_error),
    )?;
    wait(rx).await
}

pub async fn find(datastore: &Datastore, request: FindRequest) -> Result<Vec<RecordHandle>> {
    let (on_success, on_error, rx) = completion::<Vec<RecordHandle>>();
    datastore.find(request.on_success(on_success).on_error(on_error))?;
    wait(rx).await
}
