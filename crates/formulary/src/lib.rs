//! # formulary
//!
//! A compiler for spreadsheet-style computed fields.
//!
//! Formulary reads a schema of tables and fields, parses every formula, orders computed fields by
//! dependency depth and emits equivalent getters in Python, JavaScript or PostgreSQL.
//!
//! ## Features
//!
//! - Formula lexer, parser and schema resolver
//! - Dependency graph with cycle isolation and computation depths
//! - Python, JavaScript and SQL backends, including lookups and rollups over linked records
//! - Formula compression (inlining helper formula fields)
//! - A reference evaluator with the platform's semantics
//!
//! ## Example
//!
//! ```rust
//! use formulary::prelude::*;
//!
//! let schema = Schema::new(vec![Table::new(
//!     "tblPeople",
//!     "People",
//!     vec![
//!         Field::new("fldFirst", "First", FieldType::SingleLineText),
//!         Field::new("fldLast", "Last", FieldType::SingleLineText),
//!         Field::formula("fldFull", "Full Name", "{fldFirst} & \" \" & {fldLast}"),
//!     ],
//! )])
//! .unwrap();
//!
//! let module = generate_module(&schema, &GeneratorOptions::default());
//! let source = module.file("computed_fields.py").unwrap();
//! assert!(source.contains("def get_people_full_name(record: Dict[str, Any], data: DataAccess) -> Any:"));
//! ```

pub mod compile;
pub mod prelude;

pub use compile::{CompileStats, Compiler};

// Re-export schema types
pub use formulary_core::{
    Aggregation, ComputedKind, Error, Field, FieldOptions, FieldType, Result, Schema, Table,
};

// Re-export the formula front end and analysis
pub use formulary_formula::{
    build_graph, compress, compress_field, compute_order, evaluate, parse, resolve,
    try_compute_order, BinaryOperator, ComputationGraph, Compressed, DependencyGraph, Edge,
    EdgeKind, FieldRef, FormulaError, FormulaNode, FormulaResult, FormulaValue, Literal,
    RecordValues, Resolution, UnaryOperator,
};

// Re-export code generation
pub use formulary_codegen::{
    generate_module, generate_with_order, transpile, CodeGenBackend, CodegenError, Diagnostic,
    GeneratedModule, GeneratorOptions, JavaScriptBackend, NamingConvention, PythonBackend,
    RecordKeys, Severity, SqlBackend, Target,
};
