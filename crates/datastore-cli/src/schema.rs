//! Model definitions loaded from a TOML schema file
//!
//! ```toml
//! [[model]]
//! name = "User"
//!
//! [[model.attribute]]
//! name = "name"
//! kind = "String"
//!
//! [[model.attribute]]
//! name = "age"
//! kind = "Integer"
//! required = true
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use datastore_core::model::parse_date;
use datastore_core::{Attribute, DataKind, ModelDescriptor, Value};

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default, rename = "model")]
    models: Vec<ModelDef>,
}

#[derive(Debug, Deserialize)]
struct ModelDef {
    name: String,
    #[serde(default, rename = "attribute")]
    attributes: Vec<AttributeDef>,
}

#[derive(Debug, Deserialize)]
struct AttributeDef {
    name: String,
    kind: DataKind,
    #[serde(default)]
    required: bool,
}

/// Every model the CLI knows about
pub struct Schema {
    models: Vec<Arc<ModelDescriptor>>,
}

impl Schema {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Invalid schema file: {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: SchemaFile = toml::from_str(content).context("Failed to parse schema TOML")?;

        let mut models = Vec::with_capacity(file.models.len());
        for def in file.models {
            // Table names are case-insensitive in SQLite
            if models
                .iter()
                .any(|m: &Arc<ModelDescriptor>| m.name().eq_ignore_ascii_case(&def.name))
            {
                bail!("Model '{}' defined twice", def.name);
            }

            let mut builder = ModelDescriptor::builder(&def.name);
            for attr in def.attributes {
                let mut attribute = Attribute::new(attr.kind);
                if attr.required {
                    attribute = attribute.required();
                }
                builder = builder.attribute(attr.name, attribute);
            }
            models.push(builder.build()?);
        }

        Ok(Self { models })
    }

    pub fn models(&self) -> &[Arc<ModelDescriptor>] {
        &self.models
    }

    /// Look up a model by name, ignoring case
    pub fn model(&self, name: &str) -> Result<&Arc<ModelDescriptor>> {
        self.models
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("Unknown model: {}", name))
    }
}

/// Split `field=value`
pub fn parse_assignment(text: &str) -> Result<(&str, &str)> {
    text.split_once('=')
        .map(|(field, value)| (field.trim(), value))
        .filter(|(field, _)| !field.is_empty())
        .ok_or_else(|| anyhow!("Expected field=value, got '{}'", text))
}

/// Parse `text` as a value for an attribute of `kind`
///
/// `null` is always Null.
pub fn parse_value(kind: DataKind, text: &str) -> Result<Value> {
    if text == "null" {
        return Ok(Value::Null);
    }

    let value = match kind {
        DataKind::String | DataKind::Text => Value::from(text),
        DataKind::Integer | DataKind::Number | DataKind::Reference => Value::Integer(
            text.parse()
                .with_context(|| format!("'{}' is not an integer", text))?,
        ),
        DataKind::Float => Value::Float(
            text.parse()
                .with_context(|| format!("'{}' is not a number", text))?,
        ),
        DataKind::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Boolean(true),
            "false" | "0" | "no" => Value::Boolean(false),
            _ => bail!("'{}' is not a boolean", text),
        },
        DataKind::Date => Value::Date(
            parse_date(text).ok_or_else(|| anyhow!("'{}' is not an RFC 3339 date", text))?,
        ),
    };
    Ok(value)
}

/// Parse a query parameter whose kind is unknown
///
/// Integers and floats bind as numbers, dates in their canonical text form,
/// anything else as text.
pub fn parse_param(text: &str) -> Value {
    if text == "null" {
        Value::Null
    } else if let Ok(i) = text.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(x) = text.parse::<f64>() {
        Value::Float(x)
    } else if let Ok(date) = text.parse::<DateTime<Utc>>() {
        Value::Date(date)
    } else {
        Value::from(text)
    }
}
