//! Rows to records
//!
//! Every row of a select becomes a VALID record, in the store's row order.
//! The hidden column supplies the client ID and `ID` the persisted ID. Other
//! columns are converted by the kind of the attribute they belong to; columns
//! the model does not declare are ignored.

use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use tracing::{debug, warn};

use crate::model::{parse_date, ModelDescriptor, RecordHandle, Value, CLIENT_ID_COLUMN, ID_COLUMN};
use crate::storage::RawRow;
use crate::types::DataKind;

/// Turn raw rows into records of `model`
pub fn materialize(model: &Arc<ModelDescriptor>, rows: Vec<RawRow>) -> Vec<RecordHandle> {
    rows.into_iter().map(|row| record_from_row(model, row)).collect()
}

fn record_from_row(model: &Arc<ModelDescriptor>, row: RawRow) -> RecordHandle {
    let mut client_id = None;
    let mut persisted_id = None;
    let mut fields = Vec::with_capacity(row.columns.len());

    for (column, value) in row.columns {
        if column == CLIENT_ID_COLUMN {
            client_id = integer(&value);
            continue;
        }
        if column.eq_ignore_ascii_case(ID_COLUMN) {
            persisted_id = integer(&value);
            continue;
        }

        let Some(attribute) = model.attribute(&column) else {
            debug!(table = model.name(), column = %column, "ignoring undeclared column");
            continue;
        };

        if let Some(value) = convert(attribute.kind, value) {
            fields.push((column, value));
        } else {
            warn!(
                table = model.name(),
                column = %column,
                "skipping column with unsupported stored value"
            );
        }
    }

    model.materialize(client_id, persisted_id, fields)
}

fn integer(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Integer(i) => Some(*i),
        _ => None,
    }
}

/// Convert one stored value for an attribute of `kind`
fn convert(kind: DataKind, value: SqlValue) -> Option<Value> {
    let value = match (kind, value) {
        (_, SqlValue::Null) => Value::Null,
        (DataKind::Date, SqlValue::Text(text)) => match parse_date(&text) {
            Some(date) => Value::Date(date),
            None => {
                warn!(value = %text, "stored date is not in canonical form");
                Value::Text(text)
            }
        },
        (DataKind::Boolean, SqlValue::Integer(i)) => Value::Boolean(i != 0),
        (DataKind::Float, SqlValue::Integer(i)) => Value::Float(i as f64),
        (_, SqlValue::Integer(i)) => Value::Integer(i),
        (_, SqlValue::Real(x)) => Value::Float(x),
        (_, SqlValue::Text(text)) => Value::Text(text),
        (_, SqlValue::Blob(_)) => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attribute, RecordState};
    use chrono::{TimeZone, Utc};

    fn event_model() -> Arc<ModelDescriptor> {
        ModelDescriptor::builder("Event")
            .attribute("title", Attribute::new(DataKind::String))
            .attribute("at", Attribute::new(DataKind::Date))
            .attribute("done", Attribute::new(DataKind::Boolean))
            .attribute("score", Attribute::new(DataKind::Float))
            .build()
            .unwrap()
    }

    fn row(columns: Vec<(&str, SqlValue)>) -> RawRow {
        RawRow {
            columns: columns
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    #[test]
    fn test_materialize_converts_by_kind() {
        let model = event_model();
        let rows = vec![row(vec![
            ("ID", SqlValue::Integer(4)),
            ("title", SqlValue::Text("launch".into())),
            ("at", SqlValue::Text("2024-05-06T07:08:09.010Z".into())),
            ("done", SqlValue::Integer(1)),
            ("score", SqlValue::Integer(3)),
            ("_client_id", SqlValue::Integer(17)),
        ])];

        let records = materialize(&model, rows);
        assert_eq!(records.len(), 1);

        let record = records[0].lock();
        assert_eq!(record.state(), RecordState::Valid);
        assert_eq!(record.persisted_id(), Some(4));
        assert_eq!(record.client_id(), 17);
        assert_eq!(record.get("title"), Some(&Value::from("launch")));
        assert_eq!(
            record.get("at"),
            Some(&Value::Date(
                Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
                    + chrono::Duration::milliseconds(10)
            ))
        );
        assert_eq!(record.get("done"), Some(&Value::Boolean(true)));
        assert_eq!(record.get("score"), Some(&Value::Float(3.0)));
        assert!(!record.is_dirty("title"));
    }

    #[test]
    fn test_materialize_keeps_row_order_and_registers() {
        let model = event_model();
        let rows = (1..=3)
            .map(|n| {
                row(vec![
                    ("ID", SqlValue::Integer(n)),
                    ("title", SqlValue::Text(format!("e{}", n))),
                    ("_client_id", SqlValue::Integer(100 + n)),
                ])
            })
            .collect();

        let records = materialize(&model, rows);
        let ids: Vec<_> = records.iter().map(|r| r.persisted_id()).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
        assert!(model.records().get(102).unwrap().ptr_eq(&records[1]));

        // Fresh records never reuse a client ID seen in a row
        assert!(model.create_record().client_id() > 103);
    }

    #[test]
    fn test_unparseable_date_stays_text() {
        let model = event_model();
        let records = materialize(
            &model,
            vec![row(vec![
                ("at", SqlValue::Text("yesterday".into())),
                ("_client_id", SqlValue::Integer(1)),
            ])],
        );
        assert_eq!(records[0].get("at"), Some(Value::from("yesterday")));
    }

    #[test]
    fn test_undeclared_and_blob_columns_are_skipped() {
        let model = event_model();
        let records = materialize(
            &model,
            vec![row(vec![
                ("extra", SqlValue::Integer(1)),
                ("title", SqlValue::Blob(vec![1, 2])),
                ("_client_id", SqlValue::Integer(1)),
            ])],
        );
        let record = records[0].lock();
        assert_eq!(record.get("title"), None);
        assert_eq!(record.fields().count(), 0);
    }

    #[test]
    fn test_missing_client_id_gets_fresh_one() {
        let model = event_model();
        let records = materialize(&model, vec![row(vec![("ID", SqlValue::Integer(9))])]);
        assert!(records[0].client_id() >= 1);
        assert_eq!(records[0].persisted_id(), Some(9));
    }
}
