//! Identity reconciliation after insert
//!
//! The store assigns `ID` on insert. It is read back from SQLite's
//! `sqlite_sequence` table in a read-only transaction that runs on the store
//! worker right after the insert commits, so no other write can slip in
//! between.

use rusqlite::types::Value as SqlValue;
use tracing::{debug, warn};

use crate::builder::Statement;
use crate::error::TransactionError;
use crate::model::{RecordHandle, RecordState, Value, ID_COLUMN};
use crate::storage::{Session, TxMode, TxOutcome};

/// Query for the last ID assigned in `table`
pub fn sequence_statement(table: &str) -> Statement {
    Statement {
        sql: format!(
            "SELECT seq AS {} FROM sqlite_sequence WHERE name = ?",
            ID_COLUMN
        ),
        params: vec![Value::from(table)],
    }
}

/// Last ID the store assigned in `table`
pub fn last_assigned_id(session: &mut Session, table: &str) -> Result<i64, TransactionError> {
    let statement = sequence_statement(table);
    let missing = |source| TransactionError::Reconcile {
        table: table.to_string(),
        source,
    };

    match session.transaction(TxMode::ReadOnly, |tx| tx.query_rows(&statement))? {
        TxOutcome::Committed(rows) => {
            let id = rows.first().and_then(|row| match row.get(ID_COLUMN) {
                Some(SqlValue::Integer(id)) => Some(*id),
                _ => None,
            });
            match id {
                Some(id) => {
                    debug!(table, id, "reconciled store id");
                    Ok(id)
                }
                None => {
                    warn!(table, "no sequence entry after insert");
                    Err(missing(None))
                }
            }
        }
        TxOutcome::StatementFailed(err) => {
            warn!(table, "Failed to read sequence: {}", err);
            Err(missing(Some(Box::new(err))))
        }
    }
}

/// Write the reconciled ID onto `record`; it is VALID from here on
pub fn apply(record: &RecordHandle, id: Option<i64>) {
    let mut record = record.lock();
    record.set_persisted_id(id);
    record.set_state(RecordState::Valid);
}
