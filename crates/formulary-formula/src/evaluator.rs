//! Reference evaluator
//!
//! Interprets a formula AST against in-memory record values with the platform's semantics. The
//! code generators emulate the same rules, so this evaluator is the oracle the tests compare
//! generated behaviour and compressed formulas against.

use crate::ast::{format_number, BinaryOperator, FormulaNode, Literal, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    /// Multi-value fields (lookups, array aggregations)
    Array(Vec<FormulaValue>),
    Empty,
}

impl FormulaValue {
    /// Convert to number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::String(s) => s.trim().parse().ok(),
            FormulaValue::Empty => Some(0.0),
            FormulaValue::Array(items) if items.len() == 1 => items[0].as_number(),
            FormulaValue::Array(_) => None,
        }
    }

    /// Force conversion to number for arithmetic
    pub fn to_number(&self) -> FormulaResult<f64> {
        self.as_number()
            .ok_or_else(|| FormulaError::Evaluation(format!("Cannot convert {:?} to number", self)))
    }

    /// Convert to string; blanks become empty text
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "1".to_string(),
            FormulaValue::Boolean(false) => "0".to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(items) => items
                .iter()
                .map(FormulaValue::as_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Platform truthiness: 0, empty text, blank and FALSE are false
    pub fn is_truthy(&self) -> bool {
        match self {
            FormulaValue::Number(n) => *n != 0.0,
            FormulaValue::String(s) => !s.is_empty(),
            FormulaValue::Boolean(b) => *b,
            FormulaValue::Array(items) => !items.is_empty(),
            FormulaValue::Empty => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FormulaValue::Empty)
    }
}

impl From<&Literal> for FormulaValue {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Number(n) => FormulaValue::Number(*n),
            Literal::String(s) => FormulaValue::String(s.clone()),
            Literal::Boolean(b) => FormulaValue::Boolean(*b),
        }
    }
}

/// Source of field values for one record
pub trait RecordValues {
    /// Value of a field; missing fields are [`FormulaValue::Empty`]
    fn value(&self, field_id: &str) -> FormulaValue;
}

impl RecordValues for HashMap<String, FormulaValue> {
    fn value(&self, field_id: &str) -> FormulaValue {
        self.get(field_id).cloned().unwrap_or(FormulaValue::Empty)
    }
}

impl RecordValues for () {
    fn value(&self, _field_id: &str) -> FormulaValue {
        FormulaValue::Empty
    }
}

/// Evaluate a formula expression against one record
pub fn evaluate(expr: &FormulaNode, record: &dyn RecordValues) -> FormulaResult<FormulaValue> {
    match expr {
        FormulaNode::Literal(lit) => Ok(lit.into()),
        FormulaNode::FieldRef(r) => Ok(record.value(&r.field_id)),
        FormulaNode::BinaryOp { op, left, right } => {
            let l = evaluate(left, record)?;
            let r = evaluate(right, record)?;
            evaluate_binary_op(*op, &l, &r)
        }
        FormulaNode::UnaryOp { op, operand } => {
            let value = evaluate(operand, record)?;
            match op {
                UnaryOperator::Negate => Ok(FormulaValue::Number(-value.to_number()?)),
                UnaryOperator::Not => Ok(FormulaValue::Boolean(!value.is_truthy())),
            }
        }
        FormulaNode::FunctionCall { name, args } => evaluate_function(name, args, record),
    }
}

fn evaluate_binary_op(
    op: BinaryOperator,
    left: &FormulaValue,
    right: &FormulaValue,
) -> FormulaResult<FormulaValue> {
    match op {
        BinaryOperator::Add => Ok(FormulaValue::Number(left.to_number()? + right.to_number()?)),
        BinaryOperator::Subtract => {
            Ok(FormulaValue::Number(left.to_number()? - right.to_number()?))
        }
        BinaryOperator::Multiply => {
            Ok(FormulaValue::Number(left.to_number()? * right.to_number()?))
        }
        BinaryOperator::Divide => {
            let divisor = right.to_number()?;
            if divisor == 0.0 {
                return Err(FormulaError::Evaluation("Division by zero".into()));
            }
            Ok(FormulaValue::Number(left.to_number()? / divisor))
        }
        BinaryOperator::Concat => Ok(FormulaValue::String(left.as_string() + &right.as_string())),
        BinaryOperator::Equal => Ok(FormulaValue::Boolean(
            compare_values(left, right) == Some(Ordering::Equal),
        )),
        BinaryOperator::NotEqual => Ok(FormulaValue::Boolean(
            compare_values(left, right) != Some(Ordering::Equal),
        )),
        BinaryOperator::LessThan => Ok(FormulaValue::Boolean(
            compare_values(left, right) == Some(Ordering::Less),
        )),
        BinaryOperator::LessEqual => Ok(FormulaValue::Boolean(matches!(
            compare_values(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        BinaryOperator::GreaterThan => Ok(FormulaValue::Boolean(
            compare_values(left, right) == Some(Ordering::Greater),
        )),
        BinaryOperator::GreaterEqual => Ok(FormulaValue::Boolean(matches!(
            compare_values(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ))),
    }
}

/// Compare two values; blanks compare as the zero value of the other side
fn compare_values(left: &FormulaValue, right: &FormulaValue) -> Option<Ordering> {
    use FormulaValue::*;
    match (left, right) {
        (Number(a), Number(b)) => a.partial_cmp(b),
        (String(a), String(b)) => Some(a.cmp(b)),
        (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
        (Empty, Empty) => Some(Ordering::Equal),
        (Empty, String(s)) => Some("".cmp(s.as_str())),
        (String(s), Empty) => Some(s.as_str().cmp("")),
        (Number(_) | Boolean(_) | Empty, Number(_) | Boolean(_) | Empty) => {
            left.as_number()?.partial_cmp(&right.as_number()?)
        }
        // text never equals a number
        _ => None,
    }
}

/// Evaluate arguments, flattening arrays (for aggregate functions)
fn flat_values(args: &[FormulaNode], record: &dyn RecordValues) -> FormulaResult<Vec<FormulaValue>> {
    let mut values = Vec::new();
    for arg in args {
        flatten_into(evaluate(arg, record)?, &mut values);
    }
    Ok(values)
}

fn flatten_into(value: FormulaValue, out: &mut Vec<FormulaValue>) {
    match value {
        FormulaValue::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other),
    }
}

fn check_args(name: &str, args: &[FormulaNode], min: usize, max: Option<usize>) -> FormulaResult<()> {
    let count = args.len();
    if count < min || max.map_or(false, |max| count > max) {
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        return Err(FormulaError::Evaluation(format!(
            "{name} expects {expected} arguments, got {count}"
        )));
    }
    Ok(())
}

fn arg(args: &[FormulaNode], idx: usize, record: &dyn RecordValues) -> FormulaResult<FormulaValue> {
    match args.get(idx) {
        Some(node) => evaluate(node, record),
        None => Ok(FormulaValue::Empty),
    }
}

fn round_to(value: f64, digits: f64, mode: fn(f64) -> f64) -> f64 {
    let factor = 10f64.powi(digits as i32);
    mode(value * factor) / factor
}

/// Round half away from zero
fn round_half_away(x: f64) -> f64 {
    x.signum() * (x.abs() + 0.5).floor()
}

fn round_up(x: f64) -> f64 {
    x.signum() * x.abs().ceil()
}

fn round_down(x: f64) -> f64 {
    x.trunc()
}

/// Replace the `nth` (1-based) occurrence of `old`, or every occurrence when `nth` is `None`
pub(crate) fn substitute_nth(text: &str, old: &str, new: &str, nth: Option<usize>) -> String {
    if old.is_empty() {
        return text.to_string();
    }
    match nth {
        None => text.replace(old, new),
        Some(n) => match text.match_indices(old).nth(n.saturating_sub(1)) {
            Some((pos, _)) if n > 0 => {
                format!("{}{}{}", &text[..pos], new, &text[pos + old.len()..])
            }
            _ => text.to_string(),
        },
    }
}

/// 1-based char position of `needle` in `haystack` at or after `start`, 0 if absent
fn find_position(needle: &str, haystack: &str, start: usize, fold_case: bool) -> usize {
    let (needle, haystack) = if fold_case {
        (needle.to_lowercase(), haystack.to_lowercase())
    } else {
        (needle.to_string(), haystack.to_string())
    };
    let skip = start.saturating_sub(1);
    let byte_start = match haystack.char_indices().nth(skip) {
        Some((b, _)) => b,
        None if skip == haystack.chars().count() => haystack.len(),
        None => return 0,
    };
    match haystack[byte_start..].find(&needle) {
        Some(b) => haystack[..byte_start + b].chars().count() + 1,
        None => 0,
    }
}

fn evaluate_function(
    name: &str,
    args: &[FormulaNode],
    record: &dyn RecordValues,
) -> FormulaResult<FormulaValue> {
    use FormulaValue as V;

    let text = |idx: usize| -> FormulaResult<String> { Ok(arg(args, idx, record)?.as_string()) };
    let number = |idx: usize| -> FormulaResult<f64> { arg(args, idx, record)?.to_number() };

    match name {
        // === Logical ===
        "IF" => {
            check_args(name, args, 2, Some(3))?;
            if arg(args, 0, record)?.is_truthy() {
                arg(args, 1, record)
            } else {
                arg(args, 2, record)
            }
        }
        "SWITCH" => {
            check_args(name, args, 3, None)?;
            let subject = arg(args, 0, record)?;
            let mut idx = 1;
            while idx + 1 < args.len() {
                let candidate = arg(args, idx, record)?;
                if compare_values(&subject, &candidate) == Some(Ordering::Equal) {
                    return arg(args, idx + 1, record);
                }
                idx += 2;
            }
            // odd remainder is the default
            if idx < args.len() {
                arg(args, idx, record)
            } else {
                Ok(V::Empty)
            }
        }
        "AND" => Ok(V::Boolean(
            flat_values(args, record)?.iter().all(FormulaValue::is_truthy),
        )),
        "OR" => Ok(V::Boolean(
            flat_values(args, record)?.iter().any(FormulaValue::is_truthy),
        )),
        "XOR" => Ok(V::Boolean(
            flat_values(args, record)?
                .iter()
                .filter(|v| v.is_truthy())
                .count()
                % 2
                == 1,
        )),
        "BLANK" => Ok(V::Empty),
        "TRUE" => Ok(V::Boolean(true)),
        "FALSE" => Ok(V::Boolean(false)),

        // === Text ===
        "CONCATENATE" => Ok(V::String(
            flat_values(args, record)?
                .iter()
                .map(FormulaValue::as_string)
                .collect(),
        )),
        "LEN" => Ok(V::Number(text(0)?.chars().count() as f64)),
        "LOWER" => Ok(V::String(text(0)?.to_lowercase())),
        "UPPER" => Ok(V::String(text(0)?.to_uppercase())),
        "TRIM" => Ok(V::String(text(0)?.trim().to_string())),
        "T" => match arg(args, 0, record)? {
            V::String(s) => Ok(V::String(s)),
            _ => Ok(V::String(String::new())),
        },
        "LEFT" => {
            let n = if args.len() > 1 { number(1)? } else { 1.0 };
            Ok(V::String(text(0)?.chars().take(n.max(0.0) as usize).collect()))
        }
        "RIGHT" => {
            let n = if args.len() > 1 { number(1)? } else { 1.0 };
            let s = text(0)?;
            let len = s.chars().count();
            let n = (n.max(0.0) as usize).min(len);
            Ok(V::String(s.chars().skip(len - n).collect()))
        }
        "MID" => {
            check_args(name, args, 3, Some(3))?;
            let start = number(1)?.max(1.0) as usize;
            let count = number(2)?.max(0.0) as usize;
            Ok(V::String(text(0)?.chars().skip(start - 1).take(count).collect()))
        }
        "FIND" | "SEARCH" => {
            check_args(name, args, 2, Some(3))?;
            let start = if args.len() > 2 { number(2)?.max(1.0) as usize } else { 1 };
            let pos = find_position(&text(0)?, &text(1)?, start, name == "SEARCH");
            if pos == 0 && name == "SEARCH" {
                Ok(V::Empty)
            } else {
                Ok(V::Number(pos as f64))
            }
        }
        "SUBSTITUTE" => {
            check_args(name, args, 3, Some(4))?;
            let nth = if args.len() > 3 { Some(number(3)?.max(0.0) as usize) } else { None };
            Ok(V::String(substitute_nth(&text(0)?, &text(1)?, &text(2)?, nth)))
        }
        "REPLACE" => {
            check_args(name, args, 4, Some(4))?;
            let s: Vec<char> = text(0)?.chars().collect();
            let start = (number(1)?.max(1.0) as usize - 1).min(s.len());
            let end = (start + number(2)?.max(0.0) as usize).min(s.len());
            let mut out: String = s[..start].iter().collect();
            out.push_str(&text(3)?);
            out.extend(&s[end..]);
            Ok(V::String(out))
        }
        "REPT" => Ok(V::String(text(0)?.repeat(number(1)?.max(0.0) as usize))),
        "VALUE" => {
            let s = text(0)?;
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | 'e' | 'E'))
                .collect();
            Ok(cleaned.parse().map(V::Number).unwrap_or(V::Empty))
        }

        // === Numeric ===
        "ABS" => Ok(V::Number(number(0)?.abs())),
        "ROUND" => Ok(V::Number(round_to(number(0)?, number(1)?, round_half_away))),
        "ROUNDUP" => Ok(V::Number(round_to(number(0)?, number(1)?, round_up))),
        "ROUNDDOWN" => Ok(V::Number(round_to(number(0)?, number(1)?, round_down))),
        "CEILING" | "FLOOR" => {
            let significance = if args.len() > 1 { number(1)? } else { 1.0 };
            if significance == 0.0 {
                return Ok(V::Number(0.0));
            }
            let scaled = number(0)? / significance;
            let rounded = if name == "CEILING" { scaled.ceil() } else { scaled.floor() };
            Ok(V::Number(rounded * significance))
        }
        "INT" => Ok(V::Number(number(0)?.floor())),
        "MOD" => {
            let divisor = number(1)?;
            if divisor == 0.0 {
                return Err(FormulaError::Evaluation("Division by zero".into()));
            }
            let value = number(0)?;
            Ok(V::Number(value - divisor * (value / divisor).floor()))
        }
        "POWER" => Ok(V::Number(number(0)?.powf(number(1)?))),
        "SQRT" => Ok(V::Number(number(0)?.sqrt())),
        "EXP" => Ok(V::Number(number(0)?.exp())),
        "LOG" => {
            let base = if args.len() > 1 { number(1)? } else { 10.0 };
            Ok(V::Number(number(0)?.log(base)))
        }

        // === Aggregates ===
        "SUM" => Ok(V::Number(
            numbers(flat_values(args, record)?).iter().sum(),
        )),
        "AVERAGE" => {
            let nums = numbers(flat_values(args, record)?);
            if nums.is_empty() {
                Ok(V::Number(0.0))
            } else {
                Ok(V::Number(nums.iter().sum::<f64>() / nums.len() as f64))
            }
        }
        "MAX" => Ok(numbers(flat_values(args, record)?)
            .into_iter()
            .reduce(f64::max)
            .map_or(V::Empty, V::Number)),
        "MIN" => Ok(numbers(flat_values(args, record)?)
            .into_iter()
            .reduce(f64::min)
            .map_or(V::Empty, V::Number)),
        "COUNT" => Ok(V::Number(
            numbers(flat_values(args, record)?).len() as f64,
        )),
        "COUNTA" => Ok(V::Number(
            flat_values(args, record)?
                .iter()
                .filter(|v| !v.is_empty() && *v != &V::String(String::new()))
                .count() as f64,
        )),
        "COUNTALL" => Ok(V::Number(flat_values(args, record)?.len() as f64)),

        // === Arrays ===
        "ARRAYJOIN" => {
            let values = match arg(args, 0, record)? {
                V::Array(items) => items,
                V::Empty => Vec::new(),
                other => vec![other],
            };
            let separator = if args.len() > 1 { text(1)? } else { ", ".to_string() };
            Ok(V::String(
                values
                    .iter()
                    .filter(|v| !v.is_empty())
                    .map(FormulaValue::as_string)
                    .collect::<Vec<_>>()
                    .join(separator.as_str()),
            ))
        }
        "ARRAYUNIQUE" => {
            let mut unique: Vec<FormulaValue> = Vec::new();
            for value in flat_values(args, record)? {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            Ok(V::Array(unique))
        }
        "ARRAYCOMPACT" => Ok(V::Array(
            flat_values(args, record)?
                .into_iter()
                .filter(|v| !v.is_empty() && *v != V::String(String::new()))
                .collect(),
        )),
        "ARRAYFLATTEN" => Ok(V::Array(flat_values(args, record)?)),

        _ => Err(FormulaError::Evaluation(format!(
            "Function {name} is not supported by the evaluator"
        ))),
    }
}

/// Numeric members of a flattened argument list; blanks and text are skipped
fn numbers(values: Vec<FormulaValue>) -> Vec<f64> {
    values
        .into_iter()
        .filter_map(|v| match v {
            FormulaValue::Number(n) => Some(n),
            _ => None,
        })
        .collect()
}
