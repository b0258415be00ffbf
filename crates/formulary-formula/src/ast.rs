//! Formula Abstract Syntax Tree types

use formulary_core::FieldType;

/// Formula expression AST
///
/// Trees are built bottom-up by the parser and never mutated; passes that attach information
/// (such as the schema resolver) build a new tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaNode {
    /// Number, string or boolean literal
    Literal(Literal),
    /// Reference to another field, `{fldXXXX}`
    FieldRef(FieldRef),
    /// Builtin function call, name upper-cased
    FunctionCall { name: String, args: Vec<FormulaNode> },
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaNode>,
        right: Box<FormulaNode>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<FormulaNode>,
    },
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
}

impl Literal {
    /// Text form used when the literal is concatenated
    pub fn as_text(&self) -> String {
        match self {
            Literal::Number(n) => format_number(*n),
            Literal::String(s) => s.clone(),
            Literal::Boolean(true) => "1".to_string(),
            Literal::Boolean(false) => "0".to_string(),
        }
    }
}

/// Field reference, optionally annotated by the schema resolver
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub field_id: String,
    pub field_name: Option<String>,
    /// `None` until resolved, and for ids missing from the schema
    pub field_type: Option<FieldType>,
}

impl FieldRef {
    /// Unresolved reference to a field id
    pub fn new(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            field_name: None,
            field_type: None,
        }
    }

    /// Name for diagnostics, falling back to the id
    pub fn display_name(&self) -> &str {
        self.field_name.as_deref().unwrap_or(&self.field_id)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // Text
    Concat,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl BinaryOperator {
    /// Operator as written in formula text
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Concat => "&",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterEqual
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Negate,
    Not,
}

impl FormulaNode {
    pub fn number(n: f64) -> Self {
        FormulaNode::Literal(Literal::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        FormulaNode::Literal(Literal::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        FormulaNode::Literal(Literal::Boolean(b))
    }

    pub fn field(field_id: impl Into<String>) -> Self {
        FormulaNode::FieldRef(FieldRef::new(field_id))
    }

    pub fn call(name: impl Into<String>, args: Vec<FormulaNode>) -> Self {
        FormulaNode::FunctionCall {
            name: name.into(),
            args,
        }
    }

    pub fn binary(op: BinaryOperator, left: FormulaNode, right: FormulaNode) -> Self {
        FormulaNode::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, operand: FormulaNode) -> Self {
        FormulaNode::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// Visit every node in pre-order
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a FormulaNode)) {
        visit(self);
        match self {
            FormulaNode::Literal(_) | FormulaNode::FieldRef(_) => {}
            FormulaNode::FunctionCall { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            FormulaNode::BinaryOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            FormulaNode::UnaryOp { operand, .. } => operand.walk(visit),
        }
    }

    /// Every referenced field id anywhere in the tree, first occurrence order, no duplicates
    pub fn field_refs(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        self.walk(&mut |node| {
            if let FormulaNode::FieldRef(r) = node {
                if !ids.contains(&r.field_id.as_str()) {
                    ids.push(&r.field_id);
                }
            }
        });
        ids
    }

    /// Every function name called anywhere in the tree
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        self.walk(&mut |node| {
            if let FormulaNode::FunctionCall { name, .. } = node {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        });
        names
    }
}

/// Format a number the way the platform prints it: integers without a fraction
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_refs_whole_tree() {
        let node = FormulaNode::call(
            "IF",
            vec![
                FormulaNode::binary(
                    BinaryOperator::GreaterThan,
                    FormulaNode::field("fldA"),
                    FormulaNode::number(0.0),
                ),
                FormulaNode::unary(UnaryOperator::Negate, FormulaNode::field("fldB")),
                FormulaNode::field("fldA"),
            ],
        );
        assert_eq!(node.field_refs(), vec!["fldA", "fldB"]);
        assert_eq!(node.function_names(), vec!["IF"]);
    }

    #[test]
    fn test_literal_text() {
        assert_eq!(Literal::Number(3.0).as_text(), "3");
        assert_eq!(Literal::Number(2.5).as_text(), "2.5");
        assert_eq!(Literal::Boolean(true).as_text(), "1");
        assert_eq!(Literal::String("x".into()).as_text(), "x");
    }
}
