//! Storage layer
//!
//! Owns the SQLite store and the tables in it.
//!
//! ## Architecture
//!
//! - **Session**: worker thread holding the connection; runs transactions
//!   one at a time in submission order
//! - **Schema**: opens the store on first use and creates each model's table
//!   exactly once before any operation on it proceeds

pub mod schema;
pub mod session;

pub use schema::SchemaManager;
pub use session::{PendingJob, RawRow, Session, StoreHandle, TxMode, TxOutcome, TxScope};
