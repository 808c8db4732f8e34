//! Per-call operation requests
//!
//! Each call to `save`, `find` or `del` carries its own callbacks in one of
//! these values, so concurrent calls never see each other's handlers.

use std::sync::Arc;

use crate::builder::{Constraint, Query};
use crate::callback::Callback;
use crate::error::DatastoreError;
use crate::model::{ModelDescriptor, RecordHandle, Value};

/// Success and error callbacks of one operation
pub(crate) struct Handlers<T> {
    pub(crate) on_success: Option<Callback<T>>,
    pub(crate) on_error: Option<Callback<DatastoreError>>,
}

impl<T> Default for Handlers<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }
}

/// Save or delete of one record
///
/// The success callback receives the record itself.
pub struct RecordRequest {
    pub(crate) record: RecordHandle,
    pub(crate) handlers: Handlers<RecordHandle>,
}

pub type SaveRequest = RecordRequest;
pub type DeleteRequest = RecordRequest;

impl RecordRequest {
    pub fn new(record: RecordHandle) -> Self {
        Self {
            record,
            handlers: Handlers::default(),
        }
    }

    pub fn on_success(self, f: impl FnOnce(RecordHandle) + Send + 'static) -> Self {
        self.on_success_callback(Callback::plain(f))
    }

    pub fn on_success_callback(mut self, callback: Callback<RecordHandle>) -> Self {
        self.handlers.on_success = Some(callback);
        self
    }

    pub fn on_error(self, f: impl FnOnce(DatastoreError) + Send + 'static) -> Self {
        self.on_error_callback(Callback::plain(f))
    }

    pub fn on_error_callback(mut self, callback: Callback<DatastoreError>) -> Self {
        self.handlers.on_error = Some(callback);
        self
    }

    pub fn record(&self) -> &RecordHandle {
        &self.record
    }
}

/// Select of records of one model
///
/// The success callback receives every matching record as one `Vec`, in the
/// store's row order.
pub struct FindRequest {
    pub(crate) model: Arc<ModelDescriptor>,
    pub(crate) query: Query,
    pub(crate) handlers: Handlers<Vec<RecordHandle>>,
}

impl FindRequest {
    pub fn new(model: Arc<ModelDescriptor>) -> Self {
        Self {
            model,
            query: Query::default(),
            handlers: Handlers::default(),
        }
    }

    /// Columns to select; `ID` and the client ID column are always added
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Filter clause, e.g. `WHERE age > ?`, with one parameter per `?`
    pub fn constraint(mut self, statement: impl Into<String>, parameters: Vec<Value>) -> Self {
        self.query.constraint = Some(Constraint::new(statement, parameters));
        self
    }

    /// `ORDER BY` expression, used as given
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.query.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn on_success(self, f: impl FnOnce(Vec<RecordHandle>) + Send + 'static) -> Self {
        self.on_success_callback(Callback::plain(f))
    }

    pub fn on_success_callback(mut self, callback: Callback<Vec<RecordHandle>>) -> Self {
        self.handlers.on_success = Some(callback);
        self
    }

    pub fn on_error(self, f: impl FnOnce(DatastoreError) + Send + 'static) -> Self {
        self.on_error_callback(Callback::plain(f))
    }

    pub fn on_error_callback(mut self, callback: Callback<DatastoreError>) -> Self {
        self.handlers.on_error = Some(callback);
        self
    }

    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    pub fn query(&self) -> &Query {
        &self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attribute;
    use crate::types::DataKind;

    #[test]
    fn test_find_request_builds_query() {
        let model = ModelDescriptor::builder("User")
            .attribute("age", Attribute::new(DataKind::Integer))
            .build()
            .unwrap();
        let request = FindRequest::new(model)
            .columns(["age"])
            .constraint("WHERE age > ?", vec![Value::from(25)])
            .order("age ASC")
            .limit(10);

        let query = request.query();
        assert_eq!(query.columns, Some(vec!["age".to_string()]));
        assert_eq!(query.order.as_deref(), Some("age ASC"));
        assert_eq!(query.limit, Some(10));
        assert_eq!(
            query.constraint,
            Some(Constraint::new("WHERE age > ?", vec![Value::from(25)]))
        );
        assert!(request.handlers.on_success.is_none());
    }

    #[test]
    fn test_record_request_keeps_its_own_callbacks() {
        let model = ModelDescriptor::builder("User")
            .attribute("age", Attribute::new(DataKind::Integer))
            .build()
            .unwrap();
        let first = RecordRequest::new(model.create_record()).on_success(|_| {});
        let second = RecordRequest::new(model.create_record()).on_error(|_| {});

        assert!(first.handlers.on_success.is_some());
        assert!(first.handlers.on_error.is_none());
        assert!(second.handlers.on_success.is_none());
        assert!(second.handlers.on_error.is_some());
    }
}
