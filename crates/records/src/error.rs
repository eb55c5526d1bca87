//! Error types for the records crate.

use thiserror::Error;

use crate::field::FieldType;

/// Errors raised while building or validating a `DataResult`.
///
/// A value that does not match its declared field type is a contract
/// violation between tasks; it is reported, never coerced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Type name in a configuration file is not one of the supported types
    #[error("unknown field type: {0}")]
    UnknownType(String),

    /// A record supplied as a row is not a JSON object
    #[error("{result}: row {row} is not an object")]
    NotAnObject { result: String, row: usize },

    /// A row value does not match the declared field type
    #[error("{result}: row {row} field '{field}' expects {expected}, found {found}")]
    TypeMismatch {
        result: String,
        row: usize,
        field: String,
        expected: FieldType,
        found: String,
    },
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, SchemaError>;
