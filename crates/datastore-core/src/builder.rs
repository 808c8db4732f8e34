//! SQL statement builder
//!
//! Turns a model or record plus an intent into a [`Statement`]. Values are
//! always bound as `?` parameters. Identifiers come from validated model
//! descriptors and are spliced in directly. Constraint, order and limit text
//! supplied to [`Query`] is passed through as given.

use tracing::error;

use crate::error::ValidationError;
use crate::model::{
    validate_identifier, ModelDescriptor, ModelRecord, Value, CLIENT_ID_COLUMN, ID_COLUMN,
};
use crate::types::column_definition;

/// SQL text plus its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

/// Filter clause with `?` placeholders and matching parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub statement: String,
    pub parameters: Vec<Value>,
}

impl Constraint {
    pub fn new(statement: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            statement: statement.into(),
            parameters,
        }
    }
}

/// Shape of a select
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Option<Vec<String>>,
    pub constraint: Option<Constraint>,
    pub order: Option<String>,
    pub limit: Option<u64>,
}

/// Number of `?` placeholders in `statement`
pub fn count_placeholders(statement: &str) -> usize {
    statement.matches('?').count()
}

/// `CREATE TABLE IF NOT EXISTS` for a model
///
/// Columns: store-assigned `ID`, the declared attributes in order, then the
/// hidden client ID column.
pub fn create_table(model: &ModelDescriptor) -> Statement {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({} INTEGER PRIMARY KEY ASC AUTOINCREMENT UNIQUE",
        model.name(),
        ID_COLUMN
    );
    for (name, attribute) in model.attributes() {
        sql.push_str(", ");
        sql.push_str(&column_definition(name, attribute.kind, attribute.required));
    }
    sql.push_str(&format!(", {} INTEGER NOT NULL)", CLIENT_ID_COLUMN));
    Statement::new(sql, Vec::new())
}

/// Column name of the highest stored client ID
pub const MAX_CLIENT_ID: &str = "max_client_id";

/// Highest client ID stored in a model's table
pub fn max_client_id(model: &ModelDescriptor) -> Statement {
    let sql = format!(
        "SELECT MAX({}) AS {} FROM {}",
        CLIENT_ID_COLUMN,
        MAX_CLIENT_ID,
        model.name()
    );
    Statement::new(sql, Vec::new())
}

/// Insert every field of a record plus its client ID
pub fn insert(record: &ModelRecord) -> Statement {
    let mut columns = Vec::new();
    let mut params = Vec::new();
    for (name, value) in record.fields() {
        columns.push(name);
        params.push(value.clone());
    }
    columns.push(CLIENT_ID_COLUMN);
    params.push(Value::Integer(record.client_id()));

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        record.model().name(),
        columns.join(", "),
        placeholders
    );
    Statement::new(sql, params)
}

/// Update the dirty fields of a persisted record
pub fn update(record: &ModelRecord) -> Result<Statement, ValidationError> {
    let table = record.model().name();
    let id = persisted_id(record)?;

    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (name, value) in record.dirty_fields() {
        if name == ID_COLUMN {
            continue;
        }
        assignments.push(format!("{} = ?", name));
        params.push(value.clone());
    }

    if assignments.is_empty() {
        return Err(ValidationError::NothingToUpdate {
            table: table.to_string(),
            client_id: record.client_id(),
        });
    }
    params.push(Value::Integer(id));

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        ID_COLUMN
    );
    Ok(Statement::new(sql, params))
}

/// Delete a persisted record by its store ID
pub fn delete(record: &ModelRecord) -> Result<Statement, ValidationError> {
    let id = persisted_id(record)?;
    let sql = format!("DELETE FROM {} WHERE {} = ?", record.model().name(), ID_COLUMN);
    Ok(Statement::new(sql, vec![Value::Integer(id)]))
}

fn persisted_id(record: &ModelRecord) -> Result<i64, ValidationError> {
    record
        .persisted_id()
        .ok_or_else(|| ValidationError::NotPersisted {
            table: record.model().name().to_string(),
            client_id: record.client_id(),
        })
}

/// Select rows of a model
///
/// Fails without touching the store when the constraint's placeholder count
/// differs from its parameter count.
pub fn select(model: &ModelDescriptor, query: &Query) -> Result<Statement, ValidationError> {
    let columns = match &query.columns {
        Some(columns) if !columns.is_empty() => {
            let mut columns = columns.clone();
            for column in &columns {
                validate_identifier(column)?;
            }
            for required in [ID_COLUMN, CLIENT_ID_COLUMN] {
                if !columns.iter().any(|c| c.eq_ignore_ascii_case(required)) {
                    columns.push(required.to_string());
                }
            }
            columns.join(", ")
        }
        _ => "*".to_string(),
    };

    let mut sql = format!("SELECT {} FROM {}", columns, model.name());
    let mut params = Vec::new();

    if let Some(constraint) = &query.constraint {
        let expected = count_placeholders(&constraint.statement);
        let given = constraint.parameters.len();
        if expected != given {
            error!(
                "Not enough parameters provided for statement: given: {} needed: {}",
                given, expected
            );
            return Err(ValidationError::PlaceholderMismatch {
                statement: constraint.statement.clone(),
                expected,
                given,
            });
        }
        let clause = constraint.statement.trim();
        if !clause.is_empty() {
            sql.push(' ');
            sql.push_str(clause);
        }
        params = constraint.parameters.clone();
    }

    if let Some(order) = &query.order {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok(Statement::new(sql, params))
}
