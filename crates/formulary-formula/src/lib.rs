//! # formulary-formula
//!
//! Formula front end and analysis for formulary.
//!
//! This crate provides:
//! - Tokenizing and parsing formula text into an AST
//! - Resolving `{fieldId}` references against a schema
//! - The field dependency graph and computation depths
//! - Formula compression (inlining helper formula fields)
//! - A reference evaluator with the platform's semantics
//!
//! ## Example
//!
//! ```rust
//! use formulary_formula::{evaluate, parse, FormulaValue};
//! use std::collections::HashMap;
//!
//! let ast = parse("IF({fldQty} > 2, \"bulk\", \"single\")").unwrap();
//! let mut record = HashMap::new();
//! record.insert("fldQty".to_string(), FormulaValue::Number(5.0));
//! assert_eq!(
//!     evaluate(&ast, &record).unwrap(),
//!     FormulaValue::String("bulk".into())
//! );
//! ```

pub mod ast;
pub mod compress;
pub mod depth;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod lexer;
pub mod parser;
pub mod resolver;

pub use ast::{BinaryOperator, FieldRef, FormulaNode, Literal, UnaryOperator};
pub use compress::{compress, compress_field, Compressed};
pub use depth::{compute_order, try_compute_order, ComputationGraph};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate, FormulaValue, RecordValues};
pub use graph::{build_graph, DependencyGraph, Edge, EdgeKind, Node, NodeId, ParseFailure};
pub use lexer::{tokenize, Token, TokenCategory, TokenKind};
pub use parser::parse;
pub use resolver::{resolve, Resolution};
