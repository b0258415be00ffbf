//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur while compiling or evaluating a formula
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Formula text could not be split into tokens
    #[error("Lex error at {position}: {message}")]
    Lex { position: usize, message: String },

    /// Token stream does not form a valid expression
    #[error("Parse error at {position}: expected {expected}, found {found}")]
    Parse {
        position: usize,
        expected: String,
        found: String,
    },

    /// Field id does not exist in the schema
    #[error("Unresolved field reference: {{{field_id}}}")]
    UnresolvedFieldReference { field_id: String },

    /// Computed fields depend on each other in a loop
    #[error("Circular dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// Formula evaluation error
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl FormulaError {
    /// Source offset for lex and parse errors
    pub fn position(&self) -> Option<usize> {
        match self {
            FormulaError::Lex { position, .. } | FormulaError::Parse { position, .. } => {
                Some(*position)
            }
            _ => None,
        }
    }
}
