//! Formula parser
//!
//! A recursive descent parser over the token stream produced by [`crate::lexer`], with the
//! platform's operator precedence.

use crate::ast::{BinaryOperator, FormulaNode, Literal, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::lexer::{tokenize, Token, TokenKind};

/// Parse a formula string into an AST
///
/// A leading `=` is accepted and ignored.
///
/// # Example
/// ```rust
/// use formulary_formula::parse;
///
/// let ast = parse("{fldQty} * {fldPrice}").unwrap();
/// let ast = parse("IF({fldDone}, \"yes\", \"no\")").unwrap();
/// let ast = parse("NOT({fldDone})").unwrap();
/// ```
pub fn parse(formula: &str) -> FormulaResult<FormulaNode> {
    let tokens = tokenize(formula)?;
    let mut parser = FormulaParser::new(tokens);

    if parser.current().kind == TokenKind::Equal {
        parser.consume();
    }

    let expr = parser.parse_expression()?;

    // Make sure we consumed all input
    if parser.current().kind != TokenKind::Eof {
        return Err(parser.error("end of formula"));
    }

    Ok(expr)
}

struct FormulaParser {
    tokens: Vec<Token>,
    index: usize,
}

impl FormulaParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, index: 0 }
    }

    // === Helper methods ===

    fn current(&self) -> &Token {
        // tokenize always ends with Eof, and consume never moves past it
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn consume(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn expect(&mut self, expected: TokenKind) -> FormulaResult<()> {
        if self.current().kind == expected {
            self.consume();
            Ok(())
        } else {
            Err(self.error(&expected.to_string()))
        }
    }

    fn error(&self, expected: &str) -> FormulaError {
        let token = self.current();
        FormulaError::Parse {
            position: token.position,
            expected: expected.to_string(),
            found: token.kind.to_string(),
        }
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, !=, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Unary: -, +, NOT(...)
    // 6. Primary: literals, field references, function calls, parentheses

    fn parse_expression(&mut self) -> FormulaResult<FormulaNode> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> FormulaResult<FormulaNode> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Equal => BinaryOperator::Equal,
                TokenKind::NotEqual => BinaryOperator::NotEqual,
                TokenKind::LessThan => BinaryOperator::LessThan,
                TokenKind::LessEqual => BinaryOperator::LessEqual,
                TokenKind::GreaterThan => BinaryOperator::GreaterThan,
                TokenKind::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.consume();
            let right = self.parse_concatenation()?;
            left = FormulaNode::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_concatenation(&mut self) -> FormulaResult<FormulaNode> {
        let mut left = self.parse_additive()?;

        while self.current().kind == TokenKind::Ampersand {
            self.consume();
            let right = self.parse_additive()?;
            left = FormulaNode::binary(BinaryOperator::Concat, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<FormulaNode> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.consume();
            let right = self.parse_multiplicative()?;
            left = FormulaNode::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<FormulaNode> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                _ => break,
            };

            self.consume();
            let right = self.parse_unary()?;
            left = FormulaNode::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<FormulaNode> {
        match self.current().kind {
            TokenKind::Minus => {
                self.consume();
                let operand = self.parse_unary()?;
                Ok(FormulaNode::unary(UnaryOperator::Negate, operand))
            }
            // Prefix plus (no-op)
            TokenKind::Plus => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> FormulaResult<FormulaNode> {
        match self.current().kind.clone() {
            TokenKind::Number(n) => {
                self.consume();
                Ok(FormulaNode::Literal(Literal::Number(n)))
            }

            TokenKind::String(s) => {
                self.consume();
                Ok(FormulaNode::Literal(Literal::String(s)))
            }

            TokenKind::Boolean(b) => {
                self.consume();
                // TRUE() and FALSE() are the function spellings of the keywords
                if self.current().kind == TokenKind::LeftParen {
                    self.consume();
                    self.expect(TokenKind::RightParen)?;
                }
                Ok(FormulaNode::Literal(Literal::Boolean(b)))
            }

            TokenKind::FieldRef(id) => {
                self.consume();
                Ok(FormulaNode::field(id))
            }

            TokenKind::LeftParen => {
                self.consume();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen)?;
                Ok(expr)
            }

            TokenKind::Identifier(name) => {
                if self.peek_kind(1) != Some(&TokenKind::LeftParen) {
                    self.consume();
                    return Err(self.error("'(' after function name"));
                }
                if name.eq_ignore_ascii_case("NOT") {
                    self.parse_not()
                } else {
                    self.consume();
                    self.parse_function_call(name)
                }
            }

            _ => Err(self.error("expression")),
        }
    }

    fn peek_kind(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.index + offset).map(|t| &t.kind)
    }

    /// `NOT(x)` is the unary logical operator, not a function call
    fn parse_not(&mut self) -> FormulaResult<FormulaNode> {
        let not_token = self.consume();
        self.expect(TokenKind::LeftParen)?;

        if self.current().kind == TokenKind::RightParen {
            return Err(FormulaError::Parse {
                position: not_token.position,
                expected: "one argument to NOT".into(),
                found: "no arguments".into(),
            });
        }

        let operand = self.parse_expression()?;
        if self.current().kind == TokenKind::Comma {
            return Err(FormulaError::Parse {
                position: self.current().position,
                expected: "')' after the single argument to NOT".into(),
                found: "','".into(),
            });
        }
        self.expect(TokenKind::RightParen)?;

        Ok(FormulaNode::unary(UnaryOperator::Not, operand))
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<FormulaNode> {
        self.expect(TokenKind::LeftParen)?;

        let mut args = Vec::new();

        // Parse arguments
        if self.current().kind != TokenKind::RightParen {
            args.push(self.parse_expression()?);

            while self.current().kind == TokenKind::Comma {
                self.consume();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(TokenKind::RightParen)?;

        Ok(FormulaNode::FunctionCall {
            name: name.to_uppercase(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse("42").unwrap(), FormulaNode::number(42.0));
        assert_eq!(parse("=3.14").unwrap(), FormulaNode::number(3.14));
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(parse("\"Hello\"").unwrap(), FormulaNode::string("Hello"));
        assert_eq!(
            parse(r#""Hello \"World\"""#).unwrap(),
            FormulaNode::string("Hello \"World\"")
        );
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(parse("TRUE").unwrap(), FormulaNode::boolean(true));
        assert_eq!(parse("FALSE()").unwrap(), FormulaNode::boolean(false));
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        // 1+(2*3)
        assert_eq!(
            parse("1+2*3").unwrap(),
            FormulaNode::binary(
                BinaryOperator::Add,
                FormulaNode::number(1.0),
                FormulaNode::binary(
                    BinaryOperator::Multiply,
                    FormulaNode::number(2.0),
                    FormulaNode::number(3.0)
                )
            )
        );
    }

    #[test]
    fn test_parse_concat_binds_looser_than_additive() {
        // {a}&(1+2)
        let ast = parse("{a}&1+2").unwrap();
        if let FormulaNode::BinaryOp { op, right, .. } = ast {
            assert_eq!(op, BinaryOperator::Concat);
            assert!(matches!(
                *right,
                FormulaNode::BinaryOp {
                    op: BinaryOperator::Add,
                    ..
                }
            ));
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_comparison_is_lowest() {
        // ({a}&"x") = "yx"
        let ast = parse("{a}&\"x\"=\"yx\"").unwrap();
        assert!(matches!(
            ast,
            FormulaNode::BinaryOp {
                op: BinaryOperator::Equal,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_left_associative() {
        // (10-4)-3
        let ast = parse("10-4-3").unwrap();
        if let FormulaNode::BinaryOp { op, left, right } = ast {
            assert_eq!(op, BinaryOperator::Subtract);
            assert!(matches!(*left, FormulaNode::BinaryOp { .. }));
            assert_eq!(*right, FormulaNode::number(3.0));
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_unary() {
        assert_eq!(
            parse("-{x}").unwrap(),
            FormulaNode::unary(UnaryOperator::Negate, FormulaNode::field("x"))
        );
        assert_eq!(parse("+5").unwrap(), FormulaNode::number(5.0));
    }

    #[test]
    fn test_parse_not_is_unary() {
        assert_eq!(
            parse("not({done})").unwrap(),
            FormulaNode::unary(UnaryOperator::Not, FormulaNode::field("done"))
        );
        assert!(matches!(parse("NOT()"), Err(FormulaError::Parse { .. })));
        assert!(matches!(parse("NOT(1, 2)"), Err(FormulaError::Parse { .. })));
    }

    #[test]
    fn test_parse_function() {
        let ast = parse("sum(1, {a}, 3)").unwrap();
        if let FormulaNode::FunctionCall { name, args } = ast {
            assert_eq!(name, "SUM");
            assert_eq!(args.len(), 3);
            assert_eq!(args[1], FormulaNode::field("a"));
        } else {
            panic!("Expected FunctionCall");
        }

        assert_eq!(parse("NOW()").unwrap(), FormulaNode::call("NOW", vec![]));
    }

    #[test]
    fn test_parse_nested_function() {
        let ast = parse("IF(AND({a}>0,{b}<100),{a}*{b}/100,0)").unwrap();
        if let FormulaNode::FunctionCall { name, args } = ast {
            assert_eq!(name, "IF");
            assert_eq!(args.len(), 3);
            assert!(matches!(&args[0], FormulaNode::FunctionCall { name, .. } if name == "AND"));
        } else {
            panic!("Expected FunctionCall");
        }
    }

    #[test]
    fn test_parse_parentheses() {
        let ast = parse("(1+2)*3").unwrap();
        if let FormulaNode::BinaryOp { op, left, right } = ast {
            assert_eq!(op, BinaryOperator::Multiply);
            assert!(matches!(
                *left,
                FormulaNode::BinaryOp {
                    op: BinaryOperator::Add,
                    ..
                }
            ));
            assert_eq!(*right, FormulaNode::number(3.0));
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_errors() {
        let err = parse("(1+2").unwrap_err();
        assert_eq!(
            err,
            FormulaError::Parse {
                position: 4,
                expected: "')'".into(),
                found: "end of formula".into(),
            }
        );

        let err = parse("1+2)").unwrap_err();
        assert!(
            matches!(err, FormulaError::Parse { position: 3, ref expected, .. } if expected == "end of formula")
        );

        let err = parse("*3").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { position: 0, .. }));

        let err = parse("").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { ref found, .. } if found == "end of formula"));

        let err = parse("SUM(1,").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { .. }));

        let err = parse("total + 1").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { position: 6, .. }));
    }

    #[test]
    fn test_lex_error_propagates() {
        assert!(matches!(parse("1 + 'x"), Err(FormulaError::Lex { .. })));
    }

    fn formula_text() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            (0u32..1000).prop_map(|n| n.to_string()),
            "[a-z]{1,6}".prop_map(|s| format!("\"{s}\"")),
            "fld[A-Za-z0-9]{1,5}".prop_map(|s| format!("{{{s}}}")),
            Just("TRUE".to_string()),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                (
                    inner.clone(),
                    prop::sample::select(vec!["+", "-", "*", "/", "&", "=", "<=", "!="]),
                    inner.clone()
                )
                    .prop_map(|(l, op, r)| format!("{l}{op}{r}")),
                inner.clone().prop_map(|e| format!("({e})")),
                inner.clone().prop_map(|e| format!("-{e}")),
                inner.clone().prop_map(|e| format!("NOT({e})")),
                prop::collection::vec(inner, 0..3)
                    .prop_map(|args| format!("IF({})", args.join(","))),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_parse_is_deterministic(text in formula_text()) {
            let first = parse(&text);
            let second = parse(&text);
            prop_assert!(first.is_ok(), "generated formula failed to parse: {}", text);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_parse_never_panics(text in "[0-9a-zA-Z{}()+*/&\"' ,=<>!.-]{0,40}") {
            let first = parse(&text);
            let second = parse(&text);
            prop_assert_eq!(first, second);
        }
    }
}
