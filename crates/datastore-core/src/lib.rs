//! Datastore Core Library
//!
//! Asynchronous, callback-completed CRUD over an embedded SQLite store.
//! In-memory model records map onto one table per model; the store assigns
//! each inserted row its `ID`, which is written back onto the record before
//! the save's success callback runs.
//!
//! # Architecture
//!
//! - **SQLite**: one worker thread per store runs transactions in order
//! - **Tables**: created lazily, once per model, before the first operation
//! - **Callbacks**: every operation completes through its own success or
//!   error callback, never through a return value
//!
//! # Quick Start
//!
//! ```text
//! let datastore = Datastore::configure(StoreConfig::new("app"))?;
//!
//! let user = ModelDescriptor::builder("User")
//!     .attribute("name", Attribute::new(DataKind::String))
//!     .attribute("age", Attribute::new(DataKind::Integer))
//!     .build()?;
//!
//! let ann = user.create_record_with([("name", Value::from("Ann")), ("age", Value::from(30))])?;
//! datastore.save(SaveRequest::new(ann).on_success(|rec| println!("{:?}", rec.persisted_id())))?;
//!
//! datastore.find(
//!     FindRequest::new(user)
//!         .constraint("WHERE age > ?", vec![Value::from(25)])
//!         .order("age ASC")
//!         .limit(10)
//!         .on_success(|records| println!("{} found", records.len())),
//! )?;
//! ```
//!
//! # Modules
//!
//! - `provider`: `Datastore`, the public entry point
//! - `model`: model descriptors, records and values
//! - `builder`: SQL statements with bound parameters
//! - `storage`: store worker, transactions and table creation
//! - `executor`: runs statements and routes outcomes to callbacks
//! - `mapper`: rows to records
//! - `reconcile`: store-assigned IDs back onto inserted records
//! - `callback`: completion callbacks
//! - `config`: store configuration

pub mod builder;
pub mod callback;
pub mod config;
pub mod error;
mod executor;
pub mod mapper;
pub mod model;
pub mod presenter;
pub mod provider;
pub mod reconcile;
pub mod registry;
pub mod request;
pub mod storage;
pub mod types;

pub use builder::{Constraint, Query, Statement};
pub use callback::{dispatch, Callback, Invocable};
pub use config::StoreConfig;
pub use error::{
    ConfigurationError, DatastoreError, DatastoreResult, SchemaError, StatementError,
    TransactionError, ValidationError,
};
pub use executor::WriteKind;
pub use model::{
    Attribute, ModelDescriptor, ModelRecord, RecordHandle, RecordState, Value, WeakRecordHandle,
    CLIENT_ID_COLUMN, ID_COLUMN,
};
pub use presenter::{LogPresenter, Presenter};
pub use provider::Datastore;
pub use registry::{RecordManager, RecordRegistry};
pub use request::{DeleteRequest, FindRequest, RecordRequest, SaveRequest};
pub use types::DataKind;
