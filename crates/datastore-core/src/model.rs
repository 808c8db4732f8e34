//! Model descriptors and records
//!
//! A [`ModelDescriptor`] names a table and lists its attributes in order.
//! A [`ModelRecord`] is one in-memory instance of a model. Records are shared
//! between the caller and the datastore through [`RecordHandle`], because the
//! datastore writes the store-assigned ID back onto the record after insert.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::Serialize;

use crate::error::ValidationError;
use crate::registry::{RecordManager, RecordRegistry};
use crate::types::DataKind;

/// Store-assigned primary key column
pub const ID_COLUMN: &str = "ID";

/// Hidden column carrying the client identifier of a record
pub const CLIENT_ID_COLUMN: &str = "_client_id";

/// Format a date in its canonical textual form (RFC 3339, milliseconds, `Z`)
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a date from its textual form
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Check that `name` can be spliced into SQL as a bare identifier
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier(name.to_string()))
    }
}

fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case(ID_COLUMN) || name.eq_ignore_ascii_case(CLIENT_ID_COLUMN)
}

/// A field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
        }
    }

    /// Whether this value can be stored in an attribute of `kind`
    pub fn fits(&self, kind: DataKind) -> bool {
        match self {
            Value::Null => true,
            Value::Text(_) => matches!(kind, DataKind::String | DataKind::Text),
            Value::Integer(_) => kind.is_integral() || kind == DataKind::Float,
            Value::Float(_) => kind == DataKind::Float,
            Value::Boolean(_) => kind == DataKind::Boolean,
            Value::Date(_) => kind == DataKind::Date,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Date(d) => f.write_str(&format_date(d)),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as SqlValue;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(x) => ToSqlOutput::Owned(SqlValue::Real(*x)),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Date(d) => ToSqlOutput::Owned(SqlValue::Text(format_date(d))),
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

/// Metadata for one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub kind: DataKind,
    pub required: bool,
}

impl Attribute {
    pub fn new(kind: DataKind) -> Self {
        Self {
            kind,
            required: false,
        }
    }

    /// Mark the attribute as required (`NOT NULL`)
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Table name plus ordered attribute metadata
///
/// The attribute set is fixed once built. Records created through the
/// descriptor are registered with its record manager and stay there until
/// removed or dropped.
pub struct ModelDescriptor {
    name: String,
    attributes: Vec<(String, Attribute)>,
    records: Arc<dyn RecordManager>,
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl ModelDescriptor {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            attributes: Vec::new(),
            records: None,
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(n, a)| (n.as_str(), a))
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.index_of(name).map(|i| &self.attributes[i].1)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|(n, _)| n == name)
    }

    /// Live in-memory records of this model, keyed by client ID
    pub fn records(&self) -> &Arc<dyn RecordManager> {
        &self.records
    }

    /// Create an empty NEW record and register it
    pub fn create_record(self: &Arc<Self>) -> RecordHandle {
        let client_id = self.records.next_client_id();
        let record = RecordHandle::new(ModelRecord {
            model: Arc::clone(self),
            client_id,
            persisted_id: None,
            state: RecordState::New,
            values: vec![None; self.attributes.len()],
            dirty: HashSet::new(),
        });
        self.records.register(record.clone());
        record
    }

    /// Create a NEW record with initial field values
    pub fn create_record_with<K, V, I>(self: &Arc<Self>, values: I) -> Result<RecordHandle, ValidationError>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        // Validate before registering so a bad value leaves no trace
        let mut pending = Vec::new();
        for (name, value) in values {
            let value = value.into();
            self.check_value(name.as_ref(), &value)?;
            pending.push((name.as_ref().to_string(), value));
        }

        let record = self.create_record();
        {
            let mut guard = record.lock();
            for (name, value) in pending {
                guard.set(&name, value)?;
            }
        }
        Ok(record)
    }

    /// Build a VALID record from stored values and register it
    ///
    /// Fields are not marked dirty. A missing client ID gets a fresh one.
    pub(crate) fn materialize(
        self: &Arc<Self>,
        client_id: Option<i64>,
        persisted_id: Option<i64>,
        fields: Vec<(String, Value)>,
    ) -> RecordHandle {
        let client_id = match client_id {
            Some(id) => {
                self.records.observe_client_id(id);
                id
            }
            None => self.records.next_client_id(),
        };

        let mut values = vec![None; self.attributes.len()];
        for (name, value) in fields {
            if let Some(i) = self.index_of(&name) {
                values[i] = Some(value);
            }
        }

        let record = RecordHandle::new(ModelRecord {
            model: Arc::clone(self),
            client_id,
            persisted_id,
            state: RecordState::Valid,
            values,
            dirty: HashSet::new(),
        });
        self.records.register(record.clone());
        record
    }

    fn check_value(&self, name: &str, value: &Value) -> Result<usize, ValidationError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| ValidationError::UnknownAttribute {
                model: self.name.clone(),
                attribute: name.to_string(),
            })?;

        let kind = self.attributes[index].1.kind;
        if !value.fits(kind) {
            return Err(ValidationError::KindMismatch {
                model: self.name.clone(),
                attribute: name.to_string(),
                expected: kind,
                given: value.type_name(),
            });
        }
        Ok(index)
    }
}

/// Builder for [`ModelDescriptor`]
pub struct ModelBuilder {
    name: String,
    attributes: Vec<(String, Attribute)>,
    records: Option<Arc<dyn RecordManager>>,
}

impl ModelBuilder {
    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.push((name.into(), attribute));
        self
    }

    /// Use a specific record manager instead of a fresh [`RecordRegistry`]
    pub fn record_manager(mut self, records: Arc<dyn RecordManager>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn build(self) -> Result<Arc<ModelDescriptor>, ValidationError> {
        validate_identifier(&self.name)?;

        let mut seen = HashSet::new();
        for (name, _) in &self.attributes {
            validate_identifier(name)?;
            if is_reserved(name) {
                return Err(ValidationError::ReservedName(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::DuplicateAttribute {
                    model: self.name.clone(),
                    attribute: name.clone(),
                });
            }
        }

        Ok(Arc::new(ModelDescriptor {
            name: self.name,
            attributes: self.attributes,
            records: self
                .records
                .unwrap_or_else(|| Arc::new(RecordRegistry::new())),
        }))
    }
}

/// Lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Not yet inserted
    New,
    /// Inserted; updates and deletes go by persisted ID
    Valid,
}

/// One in-memory instance of a model
pub struct ModelRecord {
    model: Arc<ModelDescriptor>,
    client_id: i64,
    persisted_id: Option<i64>,
    state: RecordState,
    values: Vec<Option<Value>>,
    dirty: HashSet<String>,
}

impl fmt::Debug for ModelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRecord")
            .field("model", &self.model.name)
            .field("client_id", &self.client_id)
            .field("persisted_id", &self.persisted_id)
            .field("state", &self.state)
            .field("fields", &self.fields().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelRecord {
    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    /// ID assigned by the store, once the insert has been reconciled
    pub fn persisted_id(&self) -> Option<i64> {
        self.persisted_id
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.model
            .index_of(name)
            .and_then(|i| self.values[i].as_ref())
    }

    /// Set a field and mark it dirty
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ValidationError> {
        let value = value.into();
        let index = self.model.check_value(name, &value)?;
        self.values[index] = Some(value);
        self.dirty.insert(name.to_string());
        Ok(())
    }

    /// Fields that hold a value, in attribute order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.model
            .attributes
            .iter()
            .zip(&self.values)
            .filter_map(|((name, _), value)| value.as_ref().map(|v| (name.as_str(), v)))
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    /// Dirty fields, in attribute order
    pub fn dirty_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields().filter(|(name, _)| self.dirty.contains(*name))
    }

    /// Reset all dirty flags
    ///
    /// The datastore never does this itself; call it after an update succeeds.
    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// JSON object with `ID`, the client ID and every field holding a value
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(ID_COLUMN.to_string(), serde_json::json!(self.persisted_id));
        object.insert(CLIENT_ID_COLUMN.to_string(), serde_json::json!(self.client_id));
        for (name, value) in self.fields() {
            let value = match value {
                Value::Date(date) => serde_json::Value::String(format_date(date)),
                other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
            };
            object.insert(name.to_string(), value);
        }
        serde_json::Value::Object(object)
    }

    pub(crate) fn set_persisted_id(&mut self, id: Option<i64>) {
        self.persisted_id = id;
    }

    pub(crate) fn set_state(&mut self, state: RecordState) {
        self.state = state;
    }
}

/// Shared, lockable reference to a record
#[derive(Clone)]
pub struct RecordHandle(Arc<Mutex<ModelRecord>>);

impl RecordHandle {
    fn new(record: ModelRecord) -> Self {
        Self(Arc::new(Mutex::new(record)))
    }

    /// Lock the record
    ///
    /// A panic while the lock was held does not make the record unusable.
    pub fn lock(&self) -> MutexGuard<'_, ModelRecord> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn client_id(&self) -> i64 {
        self.lock().client_id()
    }

    pub fn persisted_id(&self) -> Option<i64> {
        self.lock().persisted_id()
    }

    pub fn state(&self) -> RecordState {
        self.lock().state()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.lock().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), ValidationError> {
        self.lock().set(name, value)
    }

    /// Whether both handles point at the same record
    pub fn ptr_eq(&self, other: &RecordHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Reference that does not keep the record alive
    pub fn downgrade(&self) -> WeakRecordHandle {
        WeakRecordHandle(Arc::downgrade(&self.0))
    }
}

/// Non-owning [`RecordHandle`]
#[derive(Clone)]
pub struct WeakRecordHandle(Weak<Mutex<ModelRecord>>);

impl WeakRecordHandle {
    /// The record, if some handle still owns it
    pub fn upgrade(&self) -> Option<RecordHandle> {
        self.0.upgrade().map(RecordHandle)
    }

    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakRecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakRecordHandle")
            .field(&self.is_live())
            .finish()
    }
}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Ok(guard) => guard.fmt(f),
            Err(_) => f.write_str("RecordHandle(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user_model() -> Arc<ModelDescriptor> {
        ModelDescriptor::builder("User")
            .attribute("name", Attribute::new(DataKind::String))
            .attribute("age", Attribute::new(DataKind::Integer))
            .attribute("born", Attribute::new(DataKind::Date))
            .build()
            .unwrap()
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("User").is_ok());
        assert!(validate_identifier("_private2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("name; DROP TABLE x").is_err());
    }

    #[test]
    fn test_builder_rejects_reserved_and_duplicates() {
        let err = ModelDescriptor::builder("User")
            .attribute("id", Attribute::new(DataKind::Integer))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::ReservedName("id".to_string()));

        let err = ModelDescriptor::builder("User")
            .attribute("name", Attribute::new(DataKind::String))
            .attribute("name", Attribute::new(DataKind::Text))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateAttribute { .. }));
    }

    #[test]
    fn test_create_record_registers_and_is_new() {
        let model = user_model();
        let record = model
            .create_record_with([("name", Value::from("Ann")), ("age", Value::from(30))])
            .unwrap();

        assert_eq!(record.state(), RecordState::New);
        assert_eq!(record.persisted_id(), None);
        assert!(model.records().get(record.client_id()).is_some());

        let guard = record.lock();
        assert!(guard.is_dirty("name"));
        assert!(guard.is_dirty("age"));
        assert!(!guard.is_dirty("born"));
    }

    #[test]
    fn test_fields_follow_attribute_order() {
        let model = user_model();
        let record = model.create_record();
        record.set("age", 41).unwrap();
        record.set("name", "Bob").unwrap();

        let guard = record.lock();
        let names: Vec<&str> = guard.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["name", "age"]);
    }

    #[test]
    fn test_set_checks_kind_and_attribute() {
        let model = user_model();
        let record = model.create_record();

        let err = record.set("age", "thirty").unwrap_err();
        assert!(matches!(err, ValidationError::KindMismatch { .. }));

        let err = record.set("email", "a@b.c").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownAttribute { .. }));

        assert!(record.set("age", Value::Null).is_ok());
    }

    #[test]
    fn test_bad_initial_value_registers_nothing() {
        let model = user_model();
        let result = model.create_record_with([("age", Value::from("x"))]);
        assert!(result.is_err());
        assert_eq!(model.records().len(), 0);
    }

    #[test]
    fn test_mark_clean() {
        let model = user_model();
        let record = model.create_record_with([("name", "Ann")]).unwrap();
        let mut guard = record.lock();
        assert_eq!(guard.dirty_fields().count(), 1);
        guard.mark_clean();
        assert_eq!(guard.dirty_fields().count(), 0);
    }

    #[test]
    fn test_date_text_form() {
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let text = format_date(&date);
        assert_eq!(text, "2024-05-01T12:30:00.000Z");
        assert_eq!(parse_date(&text), Some(date));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_materialize_observes_client_id() {
        let model = user_model();
        let loaded = model.materialize(
            Some(40),
            Some(7),
            vec![("name".to_string(), Value::from("Ann"))],
        );
        assert_eq!(loaded.state(), RecordState::Valid);
        assert_eq!(loaded.persisted_id(), Some(7));
        assert!(!loaded.lock().is_dirty("name"));

        let fresh = model.create_record();
        assert!(fresh.client_id() > 40);
    }

    #[test]
    fn test_to_json() {
        let model = user_model();
        let born = chrono::Utc.with_ymd_and_hms(1990, 4, 1, 12, 0, 0).unwrap();
        let record = model.materialize(
            Some(5),
            Some(2),
            vec![
                ("name".to_string(), Value::from("Ann")),
                ("born".to_string(), Value::Date(born)),
            ],
        );

        let json = record.lock().to_json();
        assert_eq!(
            json,
            serde_json::json!({
                "ID": 2,
                "_client_id": 5,
                "name": "Ann",
                "born": "1990-04-01T12:00:00.000Z",
            })
        );
    }
}
