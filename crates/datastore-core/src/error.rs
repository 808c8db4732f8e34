//! Error types
//!
//! Failures are split by where they happen and how they are reported:
//!
//! - [`ConfigurationError`]: the store could not be opened. Alerted through the
//!   presenter, cached, never retried.
//! - [`SchemaError`]: a table could not be created. The table stays
//!   uninitialized and the next operation tries again.
//! - [`ValidationError`]: a request is malformed. Returned to the immediate
//!   caller before any I/O; no callback fires.
//! - [`StatementError`]: a single statement failed. Logged only, unless the
//!   store ran out of space, which fails the whole transaction.
//! - [`TransactionError`]: the transaction as a whole failed. Delivered to the
//!   error callback.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// The store could not be opened
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// `configure` was called outside a tokio runtime
    #[error("No async runtime available: configure the datastore from within a tokio runtime")]
    NoRuntime,

    /// The store name is empty or unusable as a file name
    #[error("Invalid store name '{0}'")]
    InvalidStoreName(String),

    /// Failed to create the directory holding the store file
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The storage engine refused to open the store
    #[error("Storage engine unavailable for '{path}': {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The store file carries a different schema version
    #[error("Invalid store version: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The store worker thread could not be started
    #[error("Failed to start store worker: {0}")]
    Worker(#[source] std::io::Error),

    /// Opening the store was cancelled or panicked
    #[error("Store open was interrupted: {0}")]
    Interrupted(#[source] tokio::task::JoinError),
}

impl ConfigurationError {
    /// Short title used when alerting the user
    pub fn title(&self) -> &'static str {
        match self {
            ConfigurationError::VersionMismatch { .. } => "Invalid store version.",
            ConfigurationError::Unavailable { .. } => "Storage not supported.",
            _ => "Unknown error.",
        }
    }
}

/// A table could not be created
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The `CREATE TABLE` statement itself was rejected
    #[error("Failed to create table '{table}': {source}")]
    Statement {
        table: String,
        #[source]
        source: StatementError,
    },

    /// The transaction carrying the statement failed
    #[error("Failed to create table '{table}': {source}")]
    Transaction {
        table: String,
        #[source]
        source: TransactionError,
    },
}

impl SchemaError {
    pub fn table(&self) -> &str {
        match self {
            SchemaError::Statement { table, .. } | SchemaError::Transaction { table, .. } => table,
        }
    }
}

/// A request was rejected before any I/O
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Placeholder count in a constraint differs from its parameter count
    #[error("Constraint needs {expected} parameter(s) but {given} were given: '{statement}'")]
    PlaceholderMismatch {
        statement: String,
        expected: usize,
        given: usize,
    },

    /// Update requested but no field is dirty
    #[error("Nothing to update on '{table}' record {client_id}: no field is marked dirty")]
    NothingToUpdate { table: String, client_id: i64 },

    /// Update or delete of a record that has no store ID
    #[error("Record {client_id} of '{table}' has not been persisted")]
    NotPersisted { table: String, client_id: i64 },

    /// Name that cannot be used as a table or column identifier
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// Identifier reserved for the store's own columns
    #[error("'{0}' is reserved")]
    ReservedName(String),

    /// Attribute declared twice on a model
    #[error("Attribute '{attribute}' declared twice on '{model}'")]
    DuplicateAttribute { model: String, attribute: String },

    /// Attribute not declared on the model
    #[error("Model '{model}' has no attribute '{attribute}'")]
    UnknownAttribute { model: String, attribute: String },

    /// Value does not fit the attribute's kind
    #[error("Attribute '{attribute}' of '{model}' expects {expected}, got {given}")]
    KindMismatch {
        model: String,
        attribute: String,
        expected: crate::DataKind,
        given: &'static str,
    },
}

/// A single statement failed inside an otherwise healthy transaction
#[derive(Error, Debug)]
#[error("Incorrect statement: {sql}: {source}")]
pub struct StatementError {
    pub sql: String,
    #[source]
    pub source: rusqlite::Error,
}

impl StatementError {
    /// The statement failed because the store is full
    pub fn is_quota(&self) -> bool {
        self.source.sqlite_error_code() == Some(rusqlite::ErrorCode::DiskFull)
    }
}

/// The transaction as a whole failed
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Opening the transaction failed
    #[error("Failed to begin transaction: {0}")]
    Begin(#[source] rusqlite::Error),

    /// Committing the transaction failed
    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] rusqlite::Error),

    /// The store reached its size quota
    #[error("Store quota exceeded: {0}")]
    Quota(#[source] StatementError),

    /// The store worker is no longer running
    #[error("Store is closed")]
    StoreClosed,

    /// The store assigned no ID after an insert
    #[error("Could not read the ID assigned to the new '{table}' record")]
    Reconcile {
        table: String,
        #[source]
        source: Option<Box<StatementError>>,
    },
}

/// Failure delivered to an operation's error callback
#[derive(Error, Debug)]
pub enum DatastoreError {
    #[error(transparent)]
    Configuration(#[from] Arc<ConfigurationError>),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Result type for operations that report a [`DatastoreError`]
pub type DatastoreResult<T> = Result<T, DatastoreError>;
