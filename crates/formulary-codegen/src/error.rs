//! Code generation errors and collected diagnostics

use crate::options::Target;
use formulary_formula::FormulaError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for code generation
pub type CodegenResult<T> = std::result::Result<T, CodegenError>;

/// Errors raised while generating code for one field
///
/// None of these abort module generation; the assembler turns them into stub getters and
/// [`Diagnostic`]s.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// Builtin with no mapping in the target
    #[error("Function {name} is not supported for {target}")]
    UnsupportedFunction { name: String, target: Target },

    /// Builtin called with the wrong number of arguments
    #[error("{name} expects {expected} arguments, got {found}")]
    InvalidArguments {
        name: String,
        expected: String,
        found: usize,
    },

    /// Rollup aggregation that is not understood
    #[error("Unsupported rollup aggregation: {0}")]
    UnsupportedAggregation(String),

    /// Lookup, rollup or count field without the options it needs
    #[error("Field {field_id} is missing option {option}")]
    MissingOption {
        field_id: String,
        option: &'static str,
    },

    /// Construct the target cannot express
    #[error("{0}")]
    Unsupported(String),

    #[error(transparent)]
    Formula(#[from] FormulaError),
}

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Output is still usable; the field may be stubbed
    Warning,
    /// The field could not be generated and was stubbed
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A per-field problem reported next to the generated output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub field_id: String,
    pub field_name: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(field_id: &str, field_name: &str, message: impl Into<String>) -> Self {
        Self {
            field_id: field_id.to_string(),
            field_name: field_name.to_string(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(field_id: &str, field_name: &str, message: impl Into<String>) -> Self {
        Self {
            field_id: field_id.to_string(),
            field_name: field_name.to_string(),
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}): {}",
            self.severity, self.field_name, self.field_id, self.message
        )
    }
}
