//! Python 3 backend

use super::{double_quoted, header_lines};
use crate::backend::{
    expect_args, join_args, one_line, push_indented, CodeGenBackend, Emitted, FieldAccess, Getter,
    GetterBody, ModuleBackend,
};
use crate::error::{CodegenError, CodegenResult};
use crate::lookup::{EmptyDefault, LookupKind, LookupSpec, TargetRead};
use crate::options::{GeneratorOptions, Target};
use formulary_core::{Aggregation, Table};
use formulary_formula::ast::format_number;
use formulary_formula::{BinaryOperator, FieldRef, Literal, UnaryOperator};

/// Emits getter functions for Python 3
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonBackend;

const HELPERS: &str = r#"def _text(value):
    if value is None:
        return ""
    if isinstance(value, bool):
        return "1" if value else "0"
    if isinstance(value, float) and value.is_integer():
        return str(int(value))
    if isinstance(value, (list, tuple)):
        return ", ".join(_text(v) for v in value)
    return str(value)


def _num(value):
    if isinstance(value, (list, tuple)) and len(value) == 1:
        value = value[0]
    if value is None:
        return 0
    if isinstance(value, bool):
        return int(value)
    if isinstance(value, str):
        return float(value)
    return value


def _t(value):
    return value if isinstance(value, str) else ""


def _flatten(values):
    out = []
    for value in values:
        if isinstance(value, (list, tuple)):
            out.extend(_flatten(value))
        else:
            out.append(value)
    return out


def _numbers(values):
    return [
        v for v in _flatten(values) if isinstance(v, (int, float)) and not isinstance(v, bool)
    ]


def _average(values):
    return sum(values) / len(values) if values else 0


def _round(value, digits=0):
    factor = 10 ** int(digits)
    return math.copysign(math.floor(abs(value) * factor + 0.5), value) / factor


def _round_up(value, digits=0):
    factor = 10 ** int(digits)
    return math.copysign(math.ceil(abs(value) * factor), value) / factor


def _round_down(value, digits=0):
    factor = 10 ** int(digits)
    return math.copysign(math.floor(abs(value) * factor), value) / factor


def _right(text, count=1):
    text = _text(text)
    count = int(count)
    return text[max(len(text) - count, 0):] if count > 0 else ""


def _search(needle, haystack, start=1):
    pos = _text(haystack).lower().find(_text(needle).lower(), max(int(start) - 1, 0))
    return None if pos < 0 else pos + 1


def _substitute(text, old, new, nth=None):
    text, old, new = _text(text), _text(old), _text(new)
    if not old:
        return text
    if nth is None:
        return text.replace(old, new)
    if int(nth) < 1:
        return text
    pos = text.find(old)
    for _ in range(int(nth) - 1):
        if pos < 0:
            break
        pos = text.find(old, pos + len(old))
    if pos < 0:
        return text
    return text[:pos] + new + text[pos + len(old):]


def _replace(text, start, count, new):
    text = _text(text)
    begin = max(int(start) - 1, 0)
    return text[:begin] + _text(new) + text[begin + max(int(count), 0):]


def _value(text):
    cleaned = "".join(c for c in _text(text) if c.isdigit() or c in ".-eE")
    try:
        return float(cleaned)
    except ValueError:
        return None
"#;

impl PythonBackend {
    /// Read a target value from the linked record bound to `r`
    fn read_linked(read: &TargetRead) -> String {
        match read {
            TargetRead::Stored { key } => format!("r.get({})", double_quoted(key)),
            TargetRead::Computed { getter, .. } => format!("{getter}(r, data)"),
        }
    }

    fn aggregate(aggregation: &Aggregation) -> CodegenResult<String> {
        Ok(match aggregation {
            Aggregation::Sum => "sum(_numbers(values))".to_string(),
            Aggregation::Count => "len(_numbers(values))".to_string(),
            Aggregation::CountA => "len([v for v in values if v != \"\"])".to_string(),
            Aggregation::CountAll => "len(linked)".to_string(),
            Aggregation::Max => "max(_numbers(values), default=None)".to_string(),
            Aggregation::Min => "min(_numbers(values), default=None)".to_string(),
            Aggregation::Average => "_average(_numbers(values))".to_string(),
            Aggregation::ArrayUnique => "list(dict.fromkeys(_flatten(values)))".to_string(),
            Aggregation::ArrayFlatten => "_flatten(values)".to_string(),
            Aggregation::ArrayCompact => {
                "[v for v in _flatten(values) if v is not None and v != \"\"]".to_string()
            }
            Aggregation::ArrayJoin(separator) => format!(
                "{}.join(_text(v) for v in _flatten(values))",
                double_quoted(separator)
            ),
            Aggregation::Unknown(text) => {
                return Err(CodegenError::UnsupportedAggregation(text.clone()))
            }
        })
    }
}

impl CodeGenBackend for PythonBackend {
    fn target(&self) -> Target {
        Target::Python
    }

    fn transpile_literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Number(n) => format_number(*n),
            Literal::String(s) => double_quoted(s),
            Literal::Boolean(true) => "True".to_string(),
            Literal::Boolean(false) => "False".to_string(),
        }
    }

    fn transpile_field_ref(&self, _field: &FieldRef, access: &FieldAccess) -> String {
        match access {
            FieldAccess::Stored { key } => format!("record.get({})", double_quoted(key)),
            FieldAccess::Computed { getter } => format!("{getter}(record, data)"),
            FieldAccess::Inline(code) => code.clone(),
        }
    }

    fn transpile_binary_op(&self, op: BinaryOperator, left: &str, right: &str) -> String {
        let symbol = match op {
            BinaryOperator::Add | BinaryOperator::Concat => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
        };
        format!("{left} {symbol} {right}")
    }

    fn transpile_unary_op(&self, op: UnaryOperator, operand: &str) -> String {
        match op {
            UnaryOperator::Negate => format!("-{operand}"),
            UnaryOperator::Not => format!("not {operand}"),
        }
    }

    fn transpile_function_call(&self, name: &str, args: &[Emitted]) -> CodegenResult<String> {
        let a = |i: usize| args[i].code.as_str();
        let w = |i: usize| args[i].wrapped();
        let all = || join_args(args);

        let code = match name {
            // === Logical ===
            "IF" => {
                expect_args(name, args, 2, Some(3))?;
                let otherwise = if args.len() > 2 { a(2) } else { "None" };
                format!("({} if {} else {})", a(1), a(0), otherwise)
            }
            "SWITCH" => {
                expect_args(name, args, 3, None)?;
                let pairs = &args[1..];
                let mut chain = if pairs.len() % 2 == 1 {
                    pairs[pairs.len() - 1].code.clone()
                } else {
                    "None".to_string()
                };
                for pair in pairs.chunks_exact(2).rev() {
                    chain = format!(
                        "{} if _v == {} else {}",
                        pair[1].code,
                        pair[0].wrapped(),
                        chain
                    );
                }
                format!("(lambda _v: {})({})", chain, a(0))
            }
            "AND" => format!("all([{}])", all()),
            "OR" => format!("any([{}])", all()),
            "XOR" => format!("(sum(1 for _v in [{}] if _v) % 2 == 1)", all()),
            "BLANK" => {
                expect_args(name, args, 0, Some(0))?;
                "None".to_string()
            }
            "TRUE" => "True".to_string(),
            "FALSE" => "False".to_string(),

            // === Text ===
            "CONCATENATE" => format!("\"\".join(_text(_v) for _v in [{}])", all()),
            "LEN" => {
                expect_args(name, args, 1, Some(1))?;
                format!("len(_text({}))", a(0))
            }
            "LOWER" | "UPPER" | "TRIM" => {
                expect_args(name, args, 1, Some(1))?;
                let method = match name {
                    "LOWER" => "lower",
                    "UPPER" => "upper",
                    _ => "strip",
                };
                format!("_text({}).{}()", a(0), method)
            }
            "T" => {
                expect_args(name, args, 1, Some(1))?;
                format!("_t({})", a(0))
            }
            "LEFT" => {
                expect_args(name, args, 1, Some(2))?;
                let count = if args.len() > 1 { a(1) } else { "1" };
                format!("_text({})[:max(int({}), 0)]", a(0), count)
            }
            "RIGHT" => {
                expect_args(name, args, 1, Some(2))?;
                format!("_right({})", all())
            }
            "MID" => {
                expect_args(name, args, 3, Some(3))?;
                format!(
                    "_text({})[max(int({}) - 1, 0):][:max(int({}), 0)]",
                    a(0),
                    a(1),
                    a(2)
                )
            }
            "FIND" => {
                expect_args(name, args, 2, Some(3))?;
                match args.get(2) {
                    Some(start) => format!(
                        "(_text({}).find(_text({}), max(int({}) - 1, 0)) + 1)",
                        a(1),
                        a(0),
                        start.code
                    ),
                    None => format!("(_text({}).find(_text({})) + 1)", a(1), a(0)),
                }
            }
            "SEARCH" => {
                expect_args(name, args, 2, Some(3))?;
                format!("_search({})", all())
            }
            "SUBSTITUTE" => {
                expect_args(name, args, 3, Some(4))?;
                format!("_substitute({})", all())
            }
            "REPLACE" => {
                expect_args(name, args, 4, Some(4))?;
                format!("_replace({})", all())
            }
            "REPT" => {
                expect_args(name, args, 2, Some(2))?;
                format!("(_text({}) * max(int({}), 0))", a(0), a(1))
            }
            "VALUE" => {
                expect_args(name, args, 1, Some(1))?;
                format!("_value({})", a(0))
            }

            // === Numeric ===
            "ABS" => {
                expect_args(name, args, 1, Some(1))?;
                format!("abs({})", a(0))
            }
            "ROUND" | "ROUNDUP" | "ROUNDDOWN" => {
                expect_args(name, args, 1, Some(2))?;
                let helper = match name {
                    "ROUND" => "_round",
                    "ROUNDUP" => "_round_up",
                    _ => "_round_down",
                };
                format!("{}({})", helper, all())
            }
            "CEILING" | "FLOOR" => {
                expect_args(name, args, 1, Some(2))?;
                let func = if name == "CEILING" { "math.ceil" } else { "math.floor" };
                match args.get(1) {
                    Some(significance) => format!(
                        "({}({} / {}) * {})",
                        func,
                        w(0),
                        significance.wrapped(),
                        significance.wrapped()
                    ),
                    None => format!("{}({})", func, a(0)),
                }
            }
            "INT" => {
                expect_args(name, args, 1, Some(1))?;
                format!("math.floor({})", a(0))
            }
            "MOD" => {
                expect_args(name, args, 2, Some(2))?;
                format!("({} % {})", w(0), w(1))
            }
            "POWER" => {
                expect_args(name, args, 2, Some(2))?;
                format!("({} ** {})", w(0), w(1))
            }
            "SQRT" | "EXP" => {
                expect_args(name, args, 1, Some(1))?;
                format!("math.{}({})", name.to_lowercase(), a(0))
            }
            "LOG" => {
                expect_args(name, args, 1, Some(2))?;
                match args.get(1) {
                    Some(base) => format!("math.log({}, {})", a(0), base.code),
                    None => format!("math.log10({})", a(0)),
                }
            }

            // === Aggregates ===
            "SUM" => format!("sum(_numbers([{}]))", all()),
            "AVERAGE" => format!("_average(_numbers([{}]))", all()),
            "MAX" => format!("max(_numbers([{}]), default=None)", all()),
            "MIN" => format!("min(_numbers([{}]), default=None)", all()),
            "COUNT" => format!("len(_numbers([{}]))", all()),
            "COUNTA" => format!(
                "len([_v for _v in _flatten([{}]) if _v is not None and _v != \"\"])",
                all()
            ),
            "COUNTALL" => format!("len(_flatten([{}]))", all()),

            // === Arrays ===
            "ARRAYJOIN" => {
                expect_args(name, args, 1, Some(2))?;
                let separator = match args.get(1) {
                    Some(sep) => format!("_text({})", sep.code),
                    None => double_quoted(", "),
                };
                format!(
                    "{}.join(_text(_v) for _v in _flatten([{}]) if _v is not None)",
                    separator,
                    a(0)
                )
            }
            "ARRAYUNIQUE" => format!("list(dict.fromkeys(_flatten([{}])))", all()),
            "ARRAYCOMPACT" => format!(
                "[_v for _v in _flatten([{}]) if _v is not None and _v != \"\"]",
                all()
            ),
            "ARRAYFLATTEN" => format!("_flatten([{}])", all()),

            // === Record and time ===
            "NOW" => "datetime.datetime.now(datetime.timezone.utc)".to_string(),
            "TODAY" => "datetime.date.today()".to_string(),
            "RECORD_ID" => "record.get(\"id\")".to_string(),

            _ => return Err(self.unsupported(name)),
        };
        Ok(code)
    }

    fn null(&self) -> &'static str {
        "None"
    }

    fn coalesce_text(&self, code: &str) -> String {
        format!("_text({code})")
    }

    fn to_text(&self, code: &str) -> String {
        format!("_text({code})")
    }

    fn to_number(&self, operand: &Emitted) -> String {
        format!("_num({})", operand.code)
    }
}

impl ModuleBackend for PythonBackend {
    fn write_prelude(&self, out: &mut String, options: &GeneratorOptions, linked_tables: &[&Table]) {
        for line in header_lines(options) {
            if line.is_empty() {
                out.push_str("#\n");
            } else {
                out.push_str(&format!("# {line}\n"));
            }
        }
        out.push('\n');
        out.push_str("import datetime\n");
        out.push_str("import math\n");
        out.push_str("from typing import Any, Dict, List, Optional, Protocol\n\n\n");

        out.push_str("# Linked tables read through DataAccess:\n");
        if linked_tables.is_empty() {
            out.push_str("#   (none)\n");
        }
        for table in linked_tables {
            out.push_str(&format!("#   {} ({})\n", table.id, one_line(&table.name)));
        }
        out.push_str("class DataAccess(Protocol):\n");
        out.push_str(
            "    def get_one(self, table_id: str, record_id: str) -> Optional[Dict[str, Any]]: ...\n\n",
        );
        out.push_str(
            "    def get_batch(self, table_id: str, record_ids: List[str]) -> List[Dict[str, Any]]: ...\n\n\n",
        );
        out.push_str(HELPERS);
    }

    fn begin_table(
        &self,
        out: &mut String,
        table: &Table,
        _ident: &str,
        _options: &GeneratorOptions,
    ) {
        out.push_str(&format!(
            "\n\n# Table: {} ({})\n",
            one_line(&table.name),
            table.id
        ));
    }

    fn write_getter(&self, out: &mut String, getter: &Getter<'_>, options: &GeneratorOptions) {
        out.push_str("\n\n");
        if options.depth_comments {
            if let Some(depth) = getter.depth {
                out.push_str(&format!("# depth {depth}\n"));
            }
        }
        match &getter.source {
            Some(source) => out.push_str(&format!(
                "# {} = {}\n",
                one_line(getter.field_name),
                one_line(source)
            )),
            None => out.push_str(&format!("# {}\n", one_line(getter.field_name))),
        }
        out.push_str(&format!(
            "def {}(record: Dict[str, Any], data: DataAccess) -> Any:\n",
            getter.name
        ));

        match &getter.body {
            GetterBody::Stub { reason } => {
                out.push_str(&format!("    # Not generated: {}\n", one_line(reason)));
                out.push_str("    return None\n");
            }
            GetterBody::Expression(code) => {
                out.push_str("    try:\n");
                out.push_str(&format!("        return {code}\n"));
                out.push_str("    except Exception:\n");
                out.push_str("        return None\n");
            }
            GetterBody::Statements(lines) => {
                out.push_str("    try:\n");
                push_indented(out, &lines.join("\n"), 8);
                out.push_str("    except Exception:\n");
                out.push_str("        return None\n");
            }
        }
    }

    fn end_table(&self, _out: &mut String, _table: &Table, _options: &GeneratorOptions) {}

    fn write_epilogue(&self, out: &mut String, getters: &[String]) {
        out.push_str("\n\n__all__ = [\n");
        out.push_str("    \"DataAccess\",\n");
        for name in getters {
            out.push_str(&format!("    {},\n", double_quoted(name)));
        }
        out.push_str("]\n");
    }

    fn lookup_body(&self, spec: &LookupSpec, null_safety: bool) -> CodegenResult<GetterBody> {
        let link = double_quoted(&spec.link_key);
        let table = double_quoted(&spec.linked_table_id);

        let read = match (&spec.kind, &spec.read) {
            (LookupKind::Count, _) => {
                return Ok(GetterBody::Statements(vec![format!(
                    "return len(record.get({link}) or [])"
                )]))
            }
            (_, Some(read)) => Self::read_linked(read),
            (_, None) => {
                return Err(CodegenError::MissingOption {
                    field_id: spec.field_id.clone(),
                    option: "fieldIdInLinkedTable",
                })
            }
        };

        let mut lines = vec![format!("ids = record.get({link}) or []")];
        if null_safety {
            lines.push("if not ids:".to_string());
            lines.push(format!(
                "    return {}",
                self.render_default(spec.empty_default())
            ));
        }

        if spec.fetches_one() {
            lines.push(format!("r = data.get_one({table}, ids[0])"));
            lines.push(format!("return {read} if r is not None else None"));
            return Ok(GetterBody::Statements(lines));
        }

        lines.push(format!("linked = data.get_batch({table}, ids)"));
        match &spec.kind {
            LookupKind::Rollup(Aggregation::CountAll) => {}
            _ => lines.push(format!(
                "values = [v for v in ({read} for r in linked) if v is not None]"
            )),
        }
        let result = match &spec.kind {
            LookupKind::Rollup(aggregation) => Self::aggregate(aggregation)?,
            _ => "_flatten(values)".to_string(),
        };
        lines.push(format!("return {result}"));
        Ok(GetterBody::Statements(lines))
    }

    fn render_default(&self, default: EmptyDefault) -> String {
        match default {
            EmptyDefault::Zero => "0".to_string(),
            EmptyDefault::EmptyText => "\"\"".to_string(),
            EmptyDefault::EmptyList => "[]".to_string(),
            EmptyDefault::Null => "None".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmittedKind;
    use pretty_assertions::assert_eq;

    fn arg(code: &str) -> Emitted {
        Emitted::new(code, EmittedKind::FieldRef)
    }

    fn call(name: &str, args: &[&str]) -> String {
        let args: Vec<Emitted> = args.iter().map(|a| arg(a)).collect();
        PythonBackend.transpile_function_call(name, &args).unwrap()
    }

    #[test]
    fn test_literals() {
        let backend = PythonBackend;
        assert_eq!(backend.transpile_literal(&Literal::Number(3.0)), "3");
        assert_eq!(backend.transpile_literal(&Literal::Number(2.5)), "2.5");
        assert_eq!(backend.transpile_literal(&Literal::Boolean(true)), "True");
        assert_eq!(
            backend.transpile_literal(&Literal::String("it's \"x\"".into())),
            r#""it's \"x\"""#
        );
    }

    #[test]
    fn test_one_based_conversions() {
        assert_eq!(call("FIND", &["n", "h"]), "(_text(h).find(_text(n)) + 1)");
        assert_eq!(
            call("FIND", &["n", "h", "s"]),
            "(_text(h).find(_text(n), max(int(s) - 1, 0)) + 1)"
        );
        assert_eq!(
            call("MID", &["t", "s", "c"]),
            "_text(t)[max(int(s) - 1, 0):][:max(int(c), 0)]"
        );
        assert_eq!(call("SEARCH", &["n", "h"]), "_search(n, h)");
    }

    #[test]
    fn test_logical_functions() {
        assert_eq!(call("IF", &["c", "a"]), "(a if c else None)");
        assert_eq!(
            call("SWITCH", &["x", "1", "\"one\"", "2", "\"two\"", "\"many\""]),
            "(lambda _v: \"one\" if _v == 1 else \"two\" if _v == 2 else \"many\")(x)"
        );
        assert_eq!(call("AND", &["a", "b"]), "all([a, b])");
    }

    #[test]
    fn test_argument_checks() {
        let err = PythonBackend
            .transpile_function_call("MID", &[arg("t")])
            .unwrap_err();
        assert_eq!(
            err,
            CodegenError::InvalidArguments {
                name: "MID".into(),
                expected: "3".into(),
                found: 1
            }
        );
        assert!(matches!(
            PythonBackend.transpile_function_call("REGEX_MATCH", &[]),
            Err(CodegenError::UnsupportedFunction { .. })
        ));
    }

    fn spec(kind: LookupKind, single: bool, read: Option<TargetRead>) -> LookupSpec {
        LookupSpec {
            field_id: "fldX".into(),
            kind,
            link_key: "fldLink".into(),
            linked_table_id: "tblOther".into(),
            linked_table_key: "tblOther".into(),
            single,
            read,
        }
    }

    #[test]
    fn test_rollup_body() {
        let spec = spec(
            LookupKind::Rollup(Aggregation::Sum),
            false,
            Some(TargetRead::Computed {
                field_id: "fldT".into(),
                getter: "get_other_total".into(),
            }),
        );
        assert_eq!(
            PythonBackend.lookup_body(&spec, true).unwrap(),
            GetterBody::Statements(vec![
                "ids = record.get(\"fldLink\") or []".into(),
                "if not ids:".into(),
                "    return 0".into(),
                "linked = data.get_batch(\"tblOther\", ids)".into(),
                "values = [v for v in (get_other_total(r, data) for r in linked) if v is not None]"
                    .into(),
                "return sum(_numbers(values))".into(),
            ])
        );
    }

    #[test]
    fn test_single_lookup_and_count_bodies() {
        let lookup = spec(
            LookupKind::Lookup,
            true,
            Some(TargetRead::Stored { key: "fldName".into() }),
        );
        assert_eq!(
            PythonBackend.lookup_body(&lookup, false).unwrap(),
            GetterBody::Statements(vec![
                "ids = record.get(\"fldLink\") or []".into(),
                "r = data.get_one(\"tblOther\", ids[0])".into(),
                "return r.get(\"fldName\") if r is not None else None".into(),
            ])
        );

        let count = spec(LookupKind::Count, false, None);
        assert_eq!(
            PythonBackend.lookup_body(&count, true).unwrap(),
            GetterBody::Statements(vec!["return len(record.get(\"fldLink\") or [])".into()])
        );
    }

    #[test]
    fn test_countall_counts_records_before_filtering() {
        let spec = spec(
            LookupKind::Rollup(Aggregation::CountAll),
            false,
            Some(TargetRead::Stored { key: "fldA".into() }),
        );
        let GetterBody::Statements(lines) = PythonBackend.lookup_body(&spec, true).unwrap() else {
            panic!("expected statements");
        };
        assert_eq!(lines.last().map(String::as_str), Some("return len(linked)"));
        assert!(!lines.iter().any(|l| l.starts_with("values")));
    }
}
