//! Column types.
//!
//! The type set mirrors a columnar schema: scalar numbers, strings,
//! booleans, raw bytes and homogeneous lists of any of those.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// Type of a single column.
///
/// Written in configuration files as a lowercase name (`int32`, `double`,
/// `str`, `list_str`, ...). A few aliases are accepted on input: `int`,
/// `long`, `string`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Int32,
    Int64,
    Float,
    Double,
    Str,
    Bool,
    Bytes,
    List(Box<FieldType>),
}

impl FieldType {
    /// Returns true when `value` is a valid instance of this type.
    ///
    /// `null` is accepted for every type; absence of a value is not a
    /// type error.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            FieldType::Int32 => value
                .as_i64()
                .is_some_and(|v| i32::try_from(v).is_ok()),
            FieldType::Int64 => value.is_i64(),
            FieldType::Float | FieldType::Double => value.is_number(),
            FieldType::Str => value.is_string(),
            FieldType::Bool => value.is_boolean(),
            // Bytes travel either as an encoded string or as a byte array
            FieldType::Bytes => match value {
                Value::String(_) => true,
                Value::Array(items) => items
                    .iter()
                    .all(|b| b.as_u64().is_some_and(|b| b <= u8::MAX as u64)),
                _ => false,
            },
            FieldType::List(inner) => match value {
                Value::Array(items) => items.iter().all(|item| inner.accepts(item)),
                _ => false,
            },
        }
    }

    /// True for the types an `orderBy` or a numeric field action can read.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Int32 | FieldType::Int64 | FieldType::Float | FieldType::Double
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int32 => write!(f, "int32"),
            FieldType::Int64 => write!(f, "int64"),
            FieldType::Float => write!(f, "float"),
            FieldType::Double => write!(f, "double"),
            FieldType::Str => write!(f, "str"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Bytes => write!(f, "bytes"),
            FieldType::List(inner) => write!(f, "list_{}", inner),
        }
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some(inner) = lower.strip_prefix("list_") {
            return Ok(FieldType::List(Box::new(inner.parse()?)));
        }
        match lower.as_str() {
            "int32" | "int" => Ok(FieldType::Int32),
            "int64" | "long" => Ok(FieldType::Int64),
            "float" => Ok(FieldType::Float),
            "double" => Ok(FieldType::Double),
            "str" | "string" => Ok(FieldType::Str),
            "bool" | "boolean" => Ok(FieldType::Bool),
            "bytes" => Ok(FieldType::Bytes),
            _ => Err(SchemaError::UnknownType(s.to_string())),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.to_string()
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}
