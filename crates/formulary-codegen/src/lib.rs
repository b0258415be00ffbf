//! # formulary-codegen
//!
//! Code generation for computed fields.
//!
//! This crate provides:
//! - The [`CodeGenBackend`] trait and the backend-independent AST walk ([`transpile`])
//! - Python, JavaScript and PostgreSQL backends
//! - Lookup, rollup and count getters reading linked records through a data access object
//! - Module assembly with per-field diagnostics ([`generate_module`])
//!
//! ## Example
//!
//! ```rust
//! use formulary_codegen::{generate_module, GeneratorOptions, Target};
//! use formulary_core::Schema;
//!
//! let schema = Schema::from_json(r#"{"tables": [{"id": "tblItems", "name": "Items", "fields": [
//!     {"id": "fldQty", "name": "Qty", "type": "number"},
//!     {"id": "fldDouble", "name": "Double", "type": "formula",
//!      "options": {"formula": "{fldQty} * 2"}}
//! ]}]}"#).unwrap();
//!
//! let module = generate_module(&schema, &GeneratorOptions::for_target(Target::JavaScript));
//! let source = module.file("computed_fields.js").unwrap();
//! assert!(source.contains("export function getItemsDouble(record, data)"));
//! assert!(module.diagnostics.is_empty());
//! ```

pub mod assembler;
pub mod backend;
pub mod backends;
pub mod error;
pub mod ident;
pub mod lookup;
pub mod options;
pub mod transpiler;

pub use assembler::{generate_module, generate_with_order, GeneratedModule};
pub use backend::{CodeGenBackend, Emitted, EmittedKind, FieldAccess, Getter, GetterBody, ModuleBackend};
pub use backends::{JavaScriptBackend, PythonBackend, SqlBackend};
pub use error::{CodegenError, CodegenResult, Diagnostic, Severity};
pub use ident::IdentAllocator;
pub use lookup::{EmptyDefault, LookupKind, LookupSpec, TargetRead};
pub use options::{GeneratorOptions, NamingConvention, RecordKeys, Target};
pub use transpiler::{transpile, Transpiled};
