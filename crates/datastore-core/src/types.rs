//! Attribute kinds and their SQLite column mapping
//!
//! Every model attribute declares one of a fixed set of kinds. The kind
//! decides the column type used when the table is created and how stored
//! values are read back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Application-level kind of a model attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    String,
    Text,
    Float,
    Integer,
    Number,
    Reference,
    Date,
    Boolean,
}

impl DataKind {
    /// All kinds, in declaration order
    pub const ALL: [DataKind; 8] = [
        DataKind::String,
        DataKind::Text,
        DataKind::Float,
        DataKind::Integer,
        DataKind::Number,
        DataKind::Reference,
        DataKind::Date,
        DataKind::Boolean,
    ];

    /// Column type used in `CREATE TABLE`
    pub fn column_type(self) -> &'static str {
        match self {
            DataKind::String => "VARCHAR(255)",
            DataKind::Text => "TEXT",
            DataKind::Float => "FLOAT",
            DataKind::Integer | DataKind::Number | DataKind::Reference => "INTEGER",
            DataKind::Date => "VARCHAR(255)",
            DataKind::Boolean => "BOOLEAN",
        }
    }

    /// Whether values of this kind are stored as whole numbers
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            DataKind::Integer | DataKind::Number | DataKind::Reference
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            DataKind::String => "String",
            DataKind::Text => "Text",
            DataKind::Float => "Float",
            DataKind::Integer => "Integer",
            DataKind::Number => "Number",
            DataKind::Reference => "Reference",
            DataKind::Date => "Date",
            DataKind::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown kind name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown data kind '{0}'")]
pub struct UnknownDataKind(pub String);

impl FromStr for DataKind {
    type Err = UnknownDataKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownDataKind(s.to_string()))
    }
}

/// Column definition for one attribute: `name TYPE[ NOT NULL]`
pub fn column_definition(name: &str, kind: DataKind, required: bool) -> String {
    let not_null = if required { " NOT NULL" } else { "" };
    format!("{} {}{}", name, kind.column_type(), not_null)
}
