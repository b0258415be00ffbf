//! Prelude module - common imports for formulary users
//!
//! ```rust
//! use formulary::prelude::*;
//!
//! let value = evaluate(&parse("{fldMissing} + 1").unwrap(), &()).unwrap();
//! assert_eq!(value, FormulaValue::Number(1.0));
//! ```

pub use crate::{
    // Compilation
    compress_field,
    compute_order,
    build_graph,
    generate_module,
    parse,
    CompileStats,
    Compiler,
    GeneratedModule,
    try_compute_order,

    // Evaluation
    evaluate,
    FormulaValue,
    RecordValues,

    // Options
    GeneratorOptions,
    NamingConvention,
    RecordKeys,
    Target,

    // Diagnostics and errors
    CodegenError,
    Diagnostic,
    Error,
    FormulaError,
    Result,
    Severity,

    // Schema types
    Field,
    FieldType,
    Schema,
    Table,
};
