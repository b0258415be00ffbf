//! Formula lexer
//!
//! Splits formula text into tokens. Field references (`{fldXXXX}`) are single tokens carrying the
//! raw id, boolean keywords are recognised before generic identifiers, and two-character
//! operators win over their one-character prefixes.

use crate::error::{FormulaError, FormulaResult};
use std::fmt;

/// Boolean keywords, checked before an identifier is produced
const KEYWORDS: &[(&str, bool)] = &[("TRUE", true), ("FALSE", false)];

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),

    // References and names
    FieldRef(String),
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Delimiters
    LeftParen,
    RightParen,
    Comma,

    // End of input
    Eof,
}

/// Coarse token classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    Literal,
    Identifier,
    Operator,
    Paren,
    Comma,
    End,
}

impl TokenKind {
    pub fn category(&self) -> TokenCategory {
        match self {
            TokenKind::Number(_) | TokenKind::String(_) | TokenKind::Boolean(_) => {
                TokenCategory::Literal
            }
            TokenKind::FieldRef(_) | TokenKind::Identifier(_) => TokenCategory::Identifier,
            TokenKind::LeftParen | TokenKind::RightParen => TokenCategory::Paren,
            TokenKind::Comma => TokenCategory::Comma,
            TokenKind::Eof => TokenCategory::End,
            _ => TokenCategory::Operator,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {n}"),
            TokenKind::String(s) => write!(f, "string {s:?}"),
            TokenKind::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            TokenKind::FieldRef(id) => write!(f, "field reference {{{id}}}"),
            TokenKind::Identifier(name) => write!(f, "identifier '{name}'"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Ampersand => f.write_str("'&'"),
            TokenKind::Equal => f.write_str("'='"),
            TokenKind::NotEqual => f.write_str("'!='"),
            TokenKind::LessThan => f.write_str("'<'"),
            TokenKind::LessEqual => f.write_str("'<='"),
            TokenKind::GreaterThan => f.write_str("'>'"),
            TokenKind::GreaterEqual => f.write_str("'>='"),
            TokenKind::LeftParen => f.write_str("'('"),
            TokenKind::RightParen => f.write_str("')'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Eof => f.write_str("end of formula"),
        }
    }
}

/// A token with its raw source text and byte offset
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: usize,
}

impl Token {
    /// Byte offset one past the end of the token
    pub fn end(&self) -> usize {
        self.position + self.text.len()
    }
}

/// Split formula text into tokens, ending with a single [`TokenKind::Eof`]
pub fn tokenize(input: &str) -> FormulaResult<Vec<Token>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn next_token(&mut self) -> FormulaResult<Token> {
        self.skip_whitespace();
        let start = self.pos;
        let kind = self.scan(start)?;
        Ok(Token {
            kind,
            text: self.input[start..self.pos].to_string(),
            position: start,
        })
    }

    fn scan(&mut self, start: usize) -> FormulaResult<TokenKind> {
        let Some(c) = self.peek_char() else {
            return Ok(TokenKind::Eof);
        };

        // Single-character tokens
        let single = match c {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '&' => Some(TokenKind::Ampersand),
            '=' => Some(TokenKind::Equal),
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            self.advance();
            return Ok(kind);
        }

        // Two-character operators (maximal munch)
        match c {
            '<' => {
                self.advance();
                return Ok(match self.peek_char() {
                    Some('=') => {
                        self.advance();
                        TokenKind::LessEqual
                    }
                    Some('>') => {
                        self.advance();
                        TokenKind::NotEqual
                    }
                    _ => TokenKind::LessThan,
                });
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(TokenKind::GreaterEqual);
                }
                return Ok(TokenKind::GreaterThan);
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(TokenKind::NotEqual);
                }
                return Err(FormulaError::Lex {
                    position: start,
                    message: "expected '=' after '!'".into(),
                });
            }
            _ => {}
        }

        if c == '"' || c == '\'' {
            return self.scan_string(c, start);
        }

        if c == '{' {
            return self.scan_field_ref(start);
        }

        if c.is_ascii_digit()
            || (c == '.' && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()))
        {
            return Ok(self.scan_number());
        }

        if c.is_alphabetic() || c == '_' {
            return Ok(self.scan_identifier());
        }

        Err(FormulaError::Lex {
            position: start,
            message: format!("unexpected character '{c}'"),
        })
    }

    fn scan_string(&mut self, quote: char, start: usize) -> FormulaResult<TokenKind> {
        self.advance(); // opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(FormulaError::Lex {
                        position: start,
                        message: "unterminated string literal".into(),
                    })
                }
                Some('\\') => {
                    self.advance();
                    let escaped = self.peek_char().ok_or_else(|| FormulaError::Lex {
                        position: start,
                        message: "unterminated string literal".into(),
                    })?;
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::String(s));
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_field_ref(&mut self, start: usize) -> FormulaResult<TokenKind> {
        self.advance(); // '{'
        let id_start = self.pos;
        loop {
            match self.peek_char() {
                Some('}') => break,
                Some('{') | None => {
                    return Err(FormulaError::Lex {
                        position: start,
                        message: "unterminated field reference".into(),
                    })
                }
                Some(_) => self.advance(),
            }
        }
        let id = self.input[id_start..self.pos].trim().to_string();
        self.advance(); // '}'

        if id.is_empty() {
            return Err(FormulaError::Lex {
                position: start,
                message: "empty field reference".into(),
            });
        }
        Ok(TokenKind::FieldRef(id))
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;

        // Integer part
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part, only when digits follow
        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E') {
            let sign = self.peek_char_at(1).map_or(false, |c| c == '+' || c == '-');
            let digit_at = if sign { 2 } else { 1 };
            if self
                .peek_char_at(digit_at)
                .map_or(false, |c| c.is_ascii_digit())
            {
                for _ in 0..digit_at {
                    self.advance();
                }
                while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let num: f64 = self.input[start..self.pos].parse().unwrap_or(0.0);
        TokenKind::Number(num)
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let text = &self.input[start..self.pos];

        if let Some((_, value)) = KEYWORDS
            .iter()
            .find(|(kw, _)| kw.eq_ignore_ascii_case(text))
        {
            return TokenKind::Boolean(*value);
        }

        TokenKind::Identifier(text.to_string())
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_booleans_before_identifiers() {
        assert_eq!(
            kinds("TRUE false True_ish"),
            vec![
                TokenKind::Boolean(true),
                TokenKind::Boolean(false),
                TokenKind::Identifier("True_ish".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_field_ref_is_single_token() {
        let tokens = tokenize("{ fldAbc123 }*2").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FieldRef("fldAbc123".into()));
        assert_eq!(tokens[0].text, "{ fldAbc123 }");
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[0].end(), 13);
        assert_eq!(tokens[1].kind, TokenKind::Star);
    }

    #[test]
    fn test_maximal_munch_operators() {
        assert_eq!(
            kinds("<= < <> >= > != ="),
            vec![
                TokenKind::LessEqual,
                TokenKind::LessThan,
                TokenKind::NotEqual,
                TokenKind::GreaterEqual,
                TokenKind::GreaterThan,
                TokenKind::NotEqual,
                TokenKind::Equal,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""say \"hi\"" 'it\'s' "a\\b""#),
            vec![
                TokenKind::String("say \"hi\"".into()),
                TokenKind::String("it's".into()),
                TokenKind::String("a\\b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.5 .25 1e3 2E"),
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.5),
                TokenKind::Number(0.25),
                TokenKind::Number(1000.0),
                TokenKind::Number(2.0),
                TokenKind::Identifier("E".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_errors_carry_position() {
        let err = tokenize("1 + \"open").unwrap_err();
        assert_eq!(err.position(), Some(4));
        assert!(matches!(err, FormulaError::Lex { .. }));

        let err = tokenize("{fld1").unwrap_err();
        assert!(matches!(err, FormulaError::Lex { position: 0, .. }));

        let err = tokenize("{ }").unwrap_err();
        assert!(matches!(err, FormulaError::Lex { .. }));

        let err = tokenize("1 # 2").unwrap_err();
        assert_eq!(err.position(), Some(2));
    }

    #[test]
    fn test_categories() {
        let tokens = tokenize("SUM({a}, 1)").unwrap();
        let cats: Vec<TokenCategory> = tokens.iter().map(|t| t.kind.category()).collect();
        assert_eq!(
            cats,
            vec![
                TokenCategory::Identifier,
                TokenCategory::Paren,
                TokenCategory::Identifier,
                TokenCategory::Comma,
                TokenCategory::Literal,
                TokenCategory::Paren,
                TokenCategory::End,
            ]
        );
    }
}
