//! # Records Crate
//!
//! The tabular data model exchanged between tasks and returned to callers.
//!
//! ## Main Components
//!
//! - **field**: the closed set of column types and the `Field` schema entry
//! - **table**: `DataResult`, an immutable named table of typed rows
//! - **envelope**: the `{code, msg, data}` response wrapper
//! - **error**: schema validation errors
//!
//! ## Example Usage
//!
//! ```ignore
//! use records::{DataResult, Envelope, Field, FieldType};
//! use serde_json::json;
//!
//! let fields = vec![
//!     Field::new("item_id", FieldType::Str),
//!     Field::new("score", FieldType::Double),
//! ];
//! let result = DataResult::from_records(
//!     "popular",
//!     fields,
//!     vec![json!({"item_id": "i1", "score": 0.9})],
//! )?;
//!
//! let envelope = Envelope::success(result.output());
//! ```

pub mod envelope;
pub mod error;
pub mod field;
pub mod table;

// Re-export commonly used types for convenience
pub use envelope::{Envelope, FAILURE_CODE, SUCCESS_CODE};
pub use error::{Result, SchemaError};
pub use field::{Field, FieldType};
pub use table::{DataResult, Row, union_fields};
