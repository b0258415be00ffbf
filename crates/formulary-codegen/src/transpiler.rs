//! Backend-independent AST walk
//!
//! The walker visits the tree post-order and hands each node to a [`CodeGenBackend`]. It owns the
//! rules every target shares: text coercion in concatenation, number coercion in arithmetic,
//! operand parenthesisation and the replacement of unsupported builtins by the target's null.

use crate::backend::{CodeGenBackend, Emitted, EmittedKind, FieldAccess};
use crate::error::CodegenError;
use formulary_formula::{BinaryOperator, FieldRef, FormulaNode, Literal, UnaryOperator};

/// Generated expression plus the recoverable problems met on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Transpiled {
    pub code: String,
    pub warnings: Vec<CodegenError>,
}

impl Transpiled {
    /// Whether every node had a mapping
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Transpile one formula for a backend
///
/// `access` decides how each field reference is read; `null_safety` makes blank field and
/// function operands read as empty text in concatenation and as 0 in arithmetic.
pub fn transpile<B: CodeGenBackend + ?Sized>(
    node: &FormulaNode,
    backend: &B,
    access: &dyn Fn(&FieldRef) -> FieldAccess,
    null_safety: bool,
) -> Transpiled {
    let mut walker = Walker {
        backend,
        access,
        null_safety,
        warnings: Vec::new(),
    };
    let emitted = walker.emit(node);
    Transpiled {
        code: emitted.code,
        warnings: walker.warnings,
    }
}

struct Walker<'a, B: ?Sized> {
    backend: &'a B,
    access: &'a dyn Fn(&FieldRef) -> FieldAccess,
    null_safety: bool,
    warnings: Vec<CodegenError>,
}

impl<'a, B: CodeGenBackend + ?Sized> Walker<'a, B> {
    fn emit(&mut self, node: &FormulaNode) -> Emitted {
        match node {
            FormulaNode::Literal(lit) => {
                let kind = match lit {
                    Literal::String(_) => EmittedKind::StringLiteral,
                    _ => EmittedKind::Literal,
                };
                Emitted::new(self.backend.transpile_literal(lit), kind)
            }
            FormulaNode::FieldRef(field) => {
                let access = (self.access)(field);
                Emitted::new(
                    self.backend.transpile_field_ref(field, &access),
                    EmittedKind::FieldRef,
                )
            }
            FormulaNode::FunctionCall { name, args } => {
                let args: Vec<Emitted> = args.iter().map(|arg| self.emit(arg)).collect();
                match self.backend.transpile_function_call(name, &args) {
                    Ok(code) => Emitted::new(code, EmittedKind::Call),
                    Err(error) => {
                        tracing::warn!(function = %name, %error, "builtin replaced by null");
                        self.warnings.push(error);
                        Emitted::new(self.backend.null(), EmittedKind::Literal)
                    }
                }
            }
            FormulaNode::BinaryOp {
                op: BinaryOperator::Concat,
                left,
                right,
            } => {
                let l = self.emit(left);
                let r = self.emit(right);
                let l = self.concat_operand(left, l);
                let r = self.concat_operand(right, r);
                Emitted::new(
                    self.backend
                        .transpile_binary_op(BinaryOperator::Concat, &l, &r),
                    EmittedKind::Concat,
                )
            }
            FormulaNode::BinaryOp { op, left, right } => {
                let l = self.emit(left);
                let r = self.emit(right);
                let (l, r) = if op.is_arithmetic() {
                    (self.numeric_operand(l), self.numeric_operand(r))
                } else {
                    (l.wrapped(), r.wrapped())
                };
                Emitted::new(
                    self.backend.transpile_binary_op(*op, &l, &r),
                    EmittedKind::Operator,
                )
            }
            FormulaNode::UnaryOp { op, operand } => {
                let inner = self.emit(operand);
                let inner = match op {
                    UnaryOperator::Negate => self.numeric_operand(inner),
                    UnaryOperator::Not => inner.wrapped(),
                };
                Emitted::new(
                    self.backend.transpile_unary_op(*op, &inner),
                    EmittedKind::Operator,
                )
            }
        }
    }

    /// Text form of one concatenation operand
    fn concat_operand(&self, node: &FormulaNode, emitted: Emitted) -> String {
        match (node, emitted.kind) {
            (_, EmittedKind::StringLiteral | EmittedKind::Concat) => emitted.code,
            (FormulaNode::Literal(lit), _) => self
                .backend
                .transpile_literal(&Literal::String(lit.as_text())),
            (FormulaNode::FieldRef(_) | FormulaNode::FunctionCall { .. }, _) if self.null_safety => {
                self.backend.coalesce_text(&emitted.code)
            }
            _ => self.backend.to_text(&emitted.code),
        }
    }

    /// Operand of an arithmetic operator
    fn numeric_operand(&self, emitted: Emitted) -> String {
        match emitted.kind {
            EmittedKind::FieldRef
            | EmittedKind::Call
            | EmittedKind::StringLiteral
            | EmittedKind::Concat
                if self.null_safety =>
            {
                self.backend.to_number(&emitted)
            }
            _ => emitted.wrapped(),
        }
    }
}
