//! Formula compression: inline referenced formula fields into one formula
//!
//! Each `{fieldId}` naming a formula field is replaced by that field's own formula, compressed
//! recursively and wrapped in parentheses so operator precedence is preserved.

use crate::lexer::{tokenize, TokenKind};
use ahash::AHashSet;
use formulary_core::Schema;
use lazy_regex::regex;
use std::ops::Range;

/// Result of compressing a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub text: String,
    /// Deepest level of inlining that actually happened
    pub depth_reached: usize,
}

/// Inline formula fields referenced by `formula`, at most `max_depth` levels deep
///
/// Fields in `visited` are never inlined; pass the id of the field that owns `formula` so a
/// self-reference stays a reference. Every branch of the recursion works on its own copy of the
/// visited set, so one helper field may be inlined into several independent branches.
pub fn compress(
    formula: &str,
    schema: &Schema,
    max_depth: usize,
    visited: &AHashSet<String>,
) -> Compressed {
    let (text, depth_reached) = compress_text(formula, schema, max_depth, visited);
    Compressed {
        text,
        depth_reached,
    }
}

/// Compress the formula of a formula field, seeding the visited set with the field itself
pub fn compress_field(field_id: &str, schema: &Schema, max_depth: usize) -> Option<Compressed> {
    let formula = schema.field(field_id)?.formula_text()?;
    let mut visited = AHashSet::new();
    visited.insert(field_id.to_string());
    Some(compress(formula, schema, max_depth, &visited))
}

fn compress_text(
    formula: &str,
    schema: &Schema,
    remaining: usize,
    visited: &AHashSet<String>,
) -> (String, usize) {
    if remaining == 0 {
        return (formula.to_string(), 0);
    }

    // Spans are collected left to right and replaced right to left, so earlier offsets stay valid
    let refs = reference_spans(formula);
    let mut result = formula.to_string();
    let mut depth_reached = 0;

    for (span, field_id) in refs.into_iter().rev() {
        if visited.contains(&field_id) {
            continue;
        }
        let Some(inner) = schema.field(&field_id).and_then(|f| f.formula_text()) else {
            continue;
        };

        let mut branch = visited.clone();
        branch.insert(field_id);

        let inner = inner.trim();
        let inner = inner.strip_prefix('=').unwrap_or(inner).trim();
        let (expanded, depth) = compress_text(inner, schema, remaining - 1, &branch);

        result.replace_range(span, &format!("({expanded})"));
        depth_reached = depth_reached.max(depth + 1);
    }

    (result, depth_reached)
}

/// Byte spans of `{id}` references, left to right
///
/// Uses the lexer so braces inside string literals are ignored; text that does not lex falls
/// back to a plain pattern scan.
fn reference_spans(formula: &str) -> Vec<(Range<usize>, String)> {
    match tokenize(formula) {
        Ok(tokens) => tokens
            .into_iter()
            .filter_map(|token| {
                let span = token.position..token.end();
                match token.kind {
                    TokenKind::FieldRef(id) => Some((span, id)),
                    _ => None,
                }
            })
            .collect(),
        Err(error) => {
            tracing::debug!(%error, "formula does not lex, scanning references by pattern");
            regex!(r"\{([^{}]+)\}")
                .captures_iter(formula)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let id = caps.get(1)?.as_str().trim();
                    (!id.is_empty()).then(|| (whole.range(), id.to_string()))
                })
                .collect()
        }
    }
}
