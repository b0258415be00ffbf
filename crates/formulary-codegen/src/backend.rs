//! Backend traits implemented once per target language

use crate::error::{CodegenError, CodegenResult};
use crate::lookup::{EmptyDefault, LookupSpec};
use crate::options::{GeneratorOptions, Target};
use formulary_core::Table;
use formulary_formula::{BinaryOperator, FieldRef, Literal, UnaryOperator};

/// What produced an emitted fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmittedKind {
    StringLiteral,
    /// Number or boolean literal, or the backend's null
    Literal,
    FieldRef,
    Call,
    Concat,
    /// Any other binary or unary operator
    Operator,
}

/// A fragment of target code and its origin
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub code: String,
    pub kind: EmittedKind,
}

impl Emitted {
    pub fn new(code: impl Into<String>, kind: EmittedKind) -> Self {
        Self {
            code: code.into(),
            kind,
        }
    }

    /// Code safe to embed as an operand: operator results are parenthesised
    pub fn wrapped(&self) -> String {
        match self.kind {
            EmittedKind::Operator | EmittedKind::Concat => format!("({})", self.code),
            _ => self.code.clone(),
        }
    }
}

/// How a field reference is read in generated code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAccess {
    /// Stored value read from the record under `key`
    Stored { key: String },
    /// Computed field read through its generated getter
    Computed { getter: String },
    /// Expression substituted verbatim
    Inline(String),
}

/// Expression-level syntax of one target
///
/// The transpiler walks the AST and calls these once per node, children first.
pub trait CodeGenBackend {
    fn target(&self) -> Target;

    fn transpile_literal(&self, literal: &Literal) -> String;

    fn transpile_field_ref(&self, field: &FieldRef, access: &FieldAccess) -> String;

    /// `left` and `right` arrive already parenthesised where needed
    fn transpile_binary_op(&self, op: BinaryOperator, left: &str, right: &str) -> String;

    fn transpile_unary_op(&self, op: UnaryOperator, operand: &str) -> String;

    /// Map a builtin; the result must be a self-contained expression
    fn transpile_function_call(&self, name: &str, args: &[Emitted]) -> CodegenResult<String>;

    /// The target's null value
    fn null(&self) -> &'static str;

    /// Null-safe text conversion (`null` becomes empty text)
    fn coalesce_text(&self, code: &str) -> String;

    /// Plain text conversion
    fn to_text(&self, code: &str) -> String;

    /// Number conversion for arithmetic operands (`null` becomes 0)
    ///
    /// Targets whose arithmetic already propagates null keep the operand as is.
    fn to_number(&self, operand: &Emitted) -> String {
        operand.wrapped()
    }

    /// Error for a builtin with no mapping
    fn unsupported(&self, name: &str) -> CodegenError {
        CodegenError::UnsupportedFunction {
            name: name.to_string(),
            target: self.target(),
        }
    }
}

/// One generated getter
#[derive(Debug, Clone, PartialEq)]
pub struct Getter<'a> {
    /// Getter function name (column name for SQL)
    pub name: &'a str,
    pub field_id: &'a str,
    pub field_name: &'a str,
    /// Formula text or lookup description shown above the getter
    pub source: Option<String>,
    pub depth: Option<usize>,
    pub body: GetterBody,
}

/// Body of a generated getter
#[derive(Debug, Clone, PartialEq)]
pub enum GetterBody {
    /// A single expression whose value is returned
    Expression(String),
    /// Statements ending in a return, one per line, relatively indented
    Statements(Vec<String>),
    /// Field that could not be generated; returns null
    Stub { reason: String },
}

/// Module-level layout of one target
pub trait ModuleBackend: CodeGenBackend {
    /// Computed same-table references are inlined instead of called
    fn inlines_computed(&self) -> bool {
        false
    }

    /// Getters are written one table section at a time
    ///
    /// Depth order then holds within each section only. Otherwise getters follow the global
    /// depth order and a new section starts whenever the table changes.
    fn groups_by_table(&self) -> bool {
        false
    }

    /// Header, imports, data access declaration and shared helpers
    fn write_prelude(&self, out: &mut String, options: &GeneratorOptions, linked_tables: &[&Table]);

    /// Start a table section; `ident` is the table's unique identifier in the module
    fn begin_table(&self, out: &mut String, table: &Table, ident: &str, options: &GeneratorOptions);

    fn write_getter(&self, out: &mut String, getter: &Getter<'_>, options: &GeneratorOptions);

    fn end_table(&self, out: &mut String, table: &Table, options: &GeneratorOptions);

    /// Trailing exports, if any
    fn write_epilogue(&self, _out: &mut String, _getters: &[String]) {}

    /// Body of a lookup, rollup or count getter
    fn lookup_body(&self, spec: &LookupSpec, null_safety: bool) -> CodegenResult<GetterBody>;

    /// Value returned when a link is empty
    fn render_default(&self, default: EmptyDefault) -> String;
}

/// Check a builtin's argument count
pub fn expect_args(
    name: &str,
    args: &[Emitted],
    min: usize,
    max: Option<usize>,
) -> CodegenResult<()> {
    let found = args.len();
    if found >= min && max.map_or(true, |max| found <= max) {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    };
    Err(CodegenError::InvalidArguments {
        name: name.to_string(),
        expected,
        found,
    })
}

/// Codes of all arguments, joined with `", "`
pub fn join_args(args: &[Emitted]) -> String {
    args.iter()
        .map(|a| a.code.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Push `text` onto `out` indented by `indent` spaces, line by line
pub fn push_indented(out: &mut String, text: &str, indent: usize) {
    for line in text.lines() {
        if !line.is_empty() {
            out.extend(std::iter::repeat(' ').take(indent));
            out.push_str(line);
        }
        out.push('\n');
    }
}

/// Formula text on a single line, for comments
pub fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
