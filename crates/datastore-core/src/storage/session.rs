//! Store handle and transactions
//!
//! One worker thread owns the SQLite connection. Jobs reach it through an
//! unbounded channel and run strictly one after another, so transactions on
//! a handle are serialized in submission order. Each job answers through a
//! oneshot channel.
//!
//! A transaction ends in one of three ways:
//! - the transaction itself fails (begin/commit, store full) -> [`TransactionError`]
//! - a statement inside it fails -> [`TxOutcome::StatementFailed`], rolled back
//! - it commits -> [`TxOutcome::Committed`]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::builder::Statement;
use crate::config::StoreConfig;
use crate::error::{ConfigurationError, StatementError, TransactionError};

type Job = Box<dyn FnOnce(&mut Session) + Send>;

/// Access mode of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadWrite,
    ReadOnly,
}

/// Result of a transaction that did not fail as a whole
#[derive(Debug)]
pub enum TxOutcome<T> {
    Committed(T),
    StatementFailed(StatementError),
}

impl<T> TxOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TxOutcome<U> {
        match self {
            TxOutcome::Committed(value) => TxOutcome::Committed(f(value)),
            TxOutcome::StatementFailed(err) => TxOutcome::StatementFailed(err),
        }
    }
}

/// One result row: column name and stored value, in column order
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub columns: Vec<(String, SqlValue)>,
}

impl RawRow {
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }
}

/// Bounded record of executed statements
#[derive(Debug)]
struct StatementHistory {
    capacity: usize,
    entries: Mutex<VecDeque<Statement>>,
}

impl StatementHistory {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, VecDeque<Statement>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, statement: &Statement) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(statement.clone());
    }

    fn snapshot(&self) -> Vec<Statement> {
        self.entries().iter().cloned().collect()
    }
}

/// State owned by the worker thread
pub struct Session {
    conn: Connection,
    history: Arc<StatementHistory>,
}

impl Session {
    /// Run `body` inside a transaction
    pub fn transaction<T>(
        &mut self,
        mode: TxMode,
        body: impl FnOnce(&TxScope<'_>) -> Result<T, StatementError>,
    ) -> Result<TxOutcome<T>, TransactionError> {
        let behavior = match mode {
            TxMode::ReadWrite => TransactionBehavior::Immediate,
            TxMode::ReadOnly => TransactionBehavior::Deferred,
        };

        let tx = self
            .conn
            .transaction_with_behavior(behavior)
            .map_err(TransactionError::Begin)?;

        let scope = TxScope {
            tx,
            mode,
            history: &self.history,
        };

        match body(&scope) {
            Ok(value) => {
                scope.tx.commit().map_err(TransactionError::Commit)?;
                Ok(TxOutcome::Committed(value))
            }
            Err(err) => {
                // Dropping the transaction rolls it back
                drop(scope);
                if err.is_quota() {
                    return Err(TransactionError::Quota(err));
                }
                Ok(TxOutcome::StatementFailed(err))
            }
        }
    }
}

/// Statements executed within one open transaction
pub struct TxScope<'a> {
    tx: rusqlite::Transaction<'a>,
    mode: TxMode,
    history: &'a StatementHistory,
}

impl TxScope<'_> {
    fn prepare(&self, statement: &Statement) -> Result<rusqlite::Statement<'_>, StatementError> {
        self.history.push(statement);
        debug!(sql = %statement.sql, params = statement.params.len(), "executing statement");

        let stmt = self
            .tx
            .prepare(&statement.sql)
            .map_err(|source| statement_error(statement, source))?;

        if self.mode == TxMode::ReadOnly && !stmt.readonly() {
            return Err(statement_error(
                statement,
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
                    Some("statement is not read-only".to_string()),
                ),
            ));
        }

        Ok(stmt)
    }

    /// Execute a statement that returns no rows
    pub fn execute(&self, statement: &Statement) -> Result<usize, StatementError> {
        let mut stmt = self.prepare(statement)?;
        stmt.execute(params_from_iter(statement.params.iter()))
            .map_err(|source| statement_error(statement, source))
    }

    /// Run a query and collect every row
    pub fn query_rows(&self, statement: &Statement) -> Result<Vec<RawRow>, StatementError> {
        let mut stmt = self.prepare(statement)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let rows = stmt
            .query_map(params_from_iter(statement.params.iter()), |row| {
                let mut columns = Vec::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    columns.push((name.clone(), row.get::<_, SqlValue>(i)?));
                }
                Ok(RawRow { columns })
            })
            .map_err(|source| statement_error(statement, source))?;

        let collected = rows.collect::<Result<Vec<_>, _>>();
        collected.map_err(|source| statement_error(statement, source))
    }
}

fn statement_error(statement: &Statement, source: rusqlite::Error) -> StatementError {
    StatementError {
        sql: statement.sql.clone(),
        source,
    }
}

/// Handle to an open store
///
/// Cheap to clone. The worker stops once every handle is dropped.
#[derive(Clone)]
pub struct StoreHandle {
    jobs: mpsc::UnboundedSender<Job>,
    history: Arc<StatementHistory>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("closed", &self.jobs.is_closed())
            .finish()
    }
}

impl StoreHandle {
    /// Open the store and start its worker
    pub fn open(config: &StoreConfig) -> Result<Self, ConfigurationError> {
        let conn = open_connection(config)?;
        let history = Arc::new(StatementHistory::new(config.statement_history));
        let (jobs, rx) = mpsc::unbounded_channel();

        let session = Session {
            conn,
            history: Arc::clone(&history),
        };
        std::thread::Builder::new()
            .name(format!("datastore-{}", config.store_name))
            .spawn(move || worker_loop(session, rx))
            .map_err(ConfigurationError::Worker)?;

        info!(store = %config.store_name, in_memory = config.in_memory, "store opened");
        Ok(Self { jobs, history })
    }

    /// Queue `job` on the worker without waiting for it
    ///
    /// Jobs queued from one thread run in the order they were queued.
    pub fn enqueue<T, F>(&self, job: F) -> Result<PendingJob<T>, TransactionError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> T + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        self.jobs
            .send(Box::new(move |session: &mut Session| {
                // Receiver may be gone if the caller stopped waiting
                let _ = reply.send(job(session));
            }))
            .map_err(|_| TransactionError::StoreClosed)?;
        Ok(PendingJob(result))
    }

    /// Queue `job` on the worker and wait for its result
    pub async fn submit<T, F>(&self, job: F) -> Result<T, TransactionError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> T + Send + 'static,
    {
        self.enqueue(job)?.wait().await
    }

    /// Most recently executed statements, oldest first
    pub fn recent_statements(&self) -> Vec<Statement> {
        self.history.snapshot()
    }
}

/// Result of a queued job, not yet awaited
#[derive(Debug)]
pub struct PendingJob<T>(oneshot::Receiver<T>);

impl<T> PendingJob<T> {
    pub async fn wait(self) -> Result<T, TransactionError> {
        self.0.await.map_err(|_| TransactionError::StoreClosed)
    }
}

fn worker_loop(mut session: Session, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.blocking_recv() {
        job(&mut session);
    }
    debug!("store worker stopped");
}

fn open_connection(config: &StoreConfig) -> Result<Connection, ConfigurationError> {
    let name = &config.store_name;
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ConfigurationError::InvalidStoreName(name.clone()));
    }

    let path = if config.in_memory {
        std::path::PathBuf::from(":memory:")
    } else {
        config.store_path()
    };
    let unavailable = |source| ConfigurationError::Unavailable {
        path: path.clone(),
        source,
    };

    let conn = if config.in_memory {
        Connection::open_in_memory().map_err(unavailable)?
    } else {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| {
            ConfigurationError::CreateDirectory {
                path: config.data_dir.clone(),
                source,
            }
        })?;
        Connection::open(&path).map_err(unavailable)?
    };

    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(unavailable)?;

    // Also the first read of the file, which fails for non-database files
    let found: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(unavailable)?;

    if let Some(expected) = config.version {
        if found == 0 {
            conn.execute_batch(&format!("PRAGMA user_version = {};", expected))
                .map_err(unavailable)?;
        } else if found != expected {
            return Err(ConfigurationError::VersionMismatch { expected, found });
        }
    }

    if let Some(size) = config.size.filter(|&size| size > 0) {
        apply_size_quota(&conn, size).map_err(unavailable)?;
    }

    Ok(conn)
}

/// Cap the store at `size` bytes, never below what it already uses
fn apply_size_quota(conn: &Connection, size: u64) -> rusqlite::Result<()> {
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
    let page_size = u64::try_from(page_size).unwrap_or(1).max(1);
    let page_count = u64::try_from(page_count).unwrap_or(0);
    let pages = size.div_ceil(page_size).max(page_count);
    conn.query_row(&format!("PRAGMA max_page_count = {}", pages), [], |_| Ok(()))?;
    Ok(())
}
