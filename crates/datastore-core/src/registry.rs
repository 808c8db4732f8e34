//! In-memory record manager
//!
//! Tracks live records by client ID. The datastore removes a record from
//! here once its delete commits, and registers every record it materializes
//! from a query.
//!
//! Records point at their model and the model owns this index, so entries are
//! held weakly. A record every caller has dropped is gone from the index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::model::{RecordHandle, WeakRecordHandle};

/// Index of live in-memory records, keyed by client ID
pub trait RecordManager: Send + Sync {
    /// Allocate a client ID for a new record
    fn next_client_id(&self) -> i64;

    /// Make sure future allocations never hand out `client_id` again
    fn observe_client_id(&self, client_id: i64);

    fn register(&self, record: RecordHandle);

    fn get(&self, client_id: i64) -> Option<RecordHandle>;

    fn remove(&self, client_id: i64) -> Option<RecordHandle>;

    /// Number of live records
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default [`RecordManager`] backed by a hash map
#[derive(Debug)]
pub struct RecordRegistry {
    records: Mutex<HashMap<i64, WeakRecordHandle>>,
    next_id: AtomicI64,
}

impl Default for RecordRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<i64, WeakRecordHandle>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordManager for RecordRegistry {
    fn next_client_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn observe_client_id(&self, client_id: i64) {
        self.next_id
            .fetch_max(client_id.saturating_add(1), Ordering::Relaxed);
    }

    fn register(&self, record: RecordHandle) {
        let client_id = record.client_id();
        let mut records = self.records();
        records.retain(|_, entry| entry.is_live());
        records.insert(client_id, record.downgrade());
    }

    fn get(&self, client_id: i64) -> Option<RecordHandle> {
        self.records().get(&client_id).and_then(WeakRecordHandle::upgrade)
    }

    fn remove(&self, client_id: i64) -> Option<RecordHandle> {
        self.records()
            .remove(&client_id)
            .and_then(|entry| entry.upgrade())
    }

    fn len(&self) -> usize {
        self.records().values().filter(|entry| entry.is_live()).count()
    }
}
