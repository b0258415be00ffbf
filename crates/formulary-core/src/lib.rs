//! # formulary-core
//!
//! Core data structures for the formulary formula compiler.
//!
//! This crate provides the schema snapshot every compilation run works against:
//! - [`Schema`] - Indexed tables and fields, loaded from platform metadata JSON
//! - [`Table`], [`Field`] - Tables and their ordered fields
//! - [`FieldType`], [`FieldOptions`] - Basic vs computed fields and their options
//! - [`Aggregation`] - Rollup aggregation functions
//!
//! ## Example
//!
//! ```rust
//! use formulary_core::Schema;
//!
//! let schema = Schema::from_json(r#"{"tables": [{"id": "tbl1", "name": "Orders", "fields": [
//!     {"id": "fldQty", "name": "Qty", "type": "number"},
//!     {"id": "fldDouble", "name": "Double", "type": "formula", "options": {"formula": "{fldQty}*2"}}
//! ]}]}"#).unwrap();
//!
//! assert!(schema.field("fldDouble").unwrap().is_computed());
//! ```

pub mod error;
pub mod schema;

pub use error::{Error, Result};
pub use schema::{Aggregation, ComputedKind, Field, FieldOptions, FieldType, Schema, Table};
