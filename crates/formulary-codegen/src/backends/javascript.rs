//! JavaScript (ES module) backend

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

/// Emits exported getter functions for JavaScript
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaScriptBackend;

const HELPERS: &str = r#"function _text(value) {
  if (value === null || value === undefined) return "";
  if (typeof value === "boolean") return value ? "1" : "0";
  if (Array.isArray(value)) return value.map(_text).join(", ");
  return String(value);
}

function _num(value) {
  if (Array.isArray(value) && value.length === 1) value = value[0];
  if (value === null || value === undefined) return 0;
  if (typeof value === "boolean") return value ? 1 : 0;
  if (typeof value === "string") return value.trim() === "" ? NaN : Number(value);
  return value;
}

function _t(value) {
  return typeof value === "string" ? value : "";
}

function _flatten(values) {
  return values.reduce(
    (out, value) => (Array.isArray(value) ? out.concat(_flatten(value)) : out.concat([value])),
    []
  );
}

function _numbers(values) {
  return _flatten(values).filter((v) => typeof v === "number" && !Number.isNaN(v));
}

function _average(values) {
  return values.length ? values.reduce((a, b) => a + b, 0) / values.length : 0;
}

function _max(values) {
  return values.length ? Math.max(...values) : null;
}

function _min(values) {
  return values.length ? Math.min(...values) : null;
}

function _round(value, digits = 0) {
  const factor = Math.pow(10, digits);
  return (Math.sign(value) * Math.floor(Math.abs(value) * factor + 0.5)) / factor;
}

function _roundUp(value, digits = 0) {
  const factor = Math.pow(10, digits);
  return (Math.sign(value) * Math.ceil(Math.abs(value) * factor)) / factor;
}

function _roundDown(value, digits = 0) {
  const factor = Math.pow(10, digits);
  return (Math.sign(value) * Math.floor(Math.abs(value) * factor)) / factor;
}

function _mod(value, divisor) {
  return value - divisor * Math.floor(value / divisor);
}

function _right(text, count = 1) {
  const s = _text(text);
  return count > 0 ? s.slice(Math.max(s.length - count, 0)) : "";
}

function _search(needle, haystack, start = 1) {
  const pos = _text(haystack)
    .toLowerCase()
    .indexOf(_text(needle).toLowerCase(), Math.max(start - 1, 0));
  return pos < 0 ? null : pos + 1;
}

function _substitute(text, old, replacement, nth) {
  const s = _text(text);
  const o = _text(old);
  const r = _text(replacement);
  if (!o) return s;
  if (nth === undefined) return s.split(o).join(r);
  if (nth < 1) return s;
  let pos = s.indexOf(o);
  for (let i = 1; i < nth && pos >= 0; i++) {
    pos = s.indexOf(o, pos + o.length);
  }
  if (pos < 0) return s;
  return s.slice(0, pos) + r + s.slice(pos + o.length);
}

function _replace(text, start, count, replacement) {
  const s = _text(text);
  const begin = Math.max(start - 1, 0);
  return s.slice(0, begin) + _text(replacement) + s.slice(begin + Math.max(count, 0));
}

function _value(text) {
  const cleaned = _text(text).replace(/[^0-9.eE-]/g, "");
  const n = parseFloat(cleaned);
  return Number.isNaN(n) ? null : n;
}
"#;

const NOT_NULL: &str = "(v) => v !== null && v !== undefined";

impl JavaScriptBackend {
    fn read_linked(read: &TargetRead) -> String {
        match read {
            TargetRead::Stored { key } => format!("r[{}]", double_quoted(key)),
            TargetRead::Computed { getter, .. } => format!("{getter}(r, data)"),
        }
    }

    fn aggregate(aggregation: &Aggregation) -> CodegenResult<String> {
        Ok(match aggregation {
            Aggregation::Sum => "_numbers(values).reduce((a, b) => a + b, 0)".to_string(),
            Aggregation::Count => "_numbers(values).length".to_string(),
            Aggregation::CountA => "values.filter((v) => v !== \"\").length".to_string(),
            Aggregation::CountAll => "linked.length".to_string(),
            Aggregation::Max => "_max(_numbers(values))".to_string(),
            Aggregation::Min => "_min(_numbers(values))".to_string(),
            Aggregation::Average => "_average(_numbers(values))".to_string(),
            Aggregation::ArrayUnique => "[...new Set(_flatten(values))]".to_string(),
            Aggregation::ArrayFlatten => "_flatten(values)".to_string(),
            Aggregation::ArrayCompact => format!(
                "_flatten(values).filter({NOT_NULL} && v !== \"\")"
            ),
            Aggregation::ArrayJoin(separator) => format!(
                "_flatten(values).map(_text).join({})",
                double_quoted(separator)
            ),
            Aggregation::Unknown(text) => {
                return Err(CodegenError::UnsupportedAggregation(text.clone()))
            }
        })
    }
}

impl CodeGenBackend for JavaScriptBackend {
    fn target(&self) -> Target {
        Target::JavaScript
    }

    fn transpile_literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Number(n) => format_number(*n),
            Literal::String(s) => double_quoted(s),
            Literal::Boolean(b) => b.to_string(),
        }
    }

    fn transpile_field_ref(&self, _field: &FieldRef, access: &FieldAccess) -> String {
        match access {
            FieldAccess::Stored { key } => format!("record[{}]", double_quoted(key)),
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
            BinaryOperator::Equal => "===",
            BinaryOperator::NotEqual => "!==",
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
            UnaryOperator::Not => format!("!{operand}"),
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
                let otherwise = if args.len() > 2 { w(2) } else { "null".to_string() };
                format!("({} ? {} : {})", w(0), w(1), otherwise)
            }
            "SWITCH" => {
                expect_args(name, args, 3, None)?;
                let pairs = &args[1..];
                let mut chain = if pairs.len() % 2 == 1 {
                    pairs[pairs.len() - 1].wrapped()
                } else {
                    "null".to_string()
                };
                for pair in pairs.chunks_exact(2).rev() {
                    chain = format!(
                        "_v === {} ? {} : {}",
                        pair[0].wrapped(),
                        pair[1].wrapped(),
                        chain
                    );
                }
                format!("((_v) => ({}))({})", chain, a(0))
            }
            "AND" => format!("[{}].every(Boolean)", all()),
            "OR" => format!("[{}].some(Boolean)", all()),
            "XOR" => format!("([{}].filter(Boolean).length % 2 === 1)", all()),
            "BLANK" => {
                expect_args(name, args, 0, Some(0))?;
                "null".to_string()
            }
            "TRUE" => "true".to_string(),
            "FALSE" => "false".to_string(),

            // === Text ===
            "CONCATENATE" => format!("[{}].map(_text).join(\"\")", all()),
            "LEN" => {
                expect_args(name, args, 1, Some(1))?;
                format!("_text({}).length", a(0))
            }
            "LOWER" | "UPPER" | "TRIM" => {
                expect_args(name, args, 1, Some(1))?;
                let method = match name {
                    "LOWER" => "toLowerCase",
                    "UPPER" => "toUpperCase",
                    _ => "trim",
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
                format!("_text({}).slice(0, Math.max({}, 0))", a(0), count)
            }
            "RIGHT" => {
                expect_args(name, args, 1, Some(2))?;
                format!("_right({})", all())
            }
            "MID" => {
                expect_args(name, args, 3, Some(3))?;
                format!(
                    "_text({}).substring({} - 1).substring(0, Math.max({}, 0))",
                    a(0),
                    w(1),
                    a(2)
                )
            }
            "FIND" => {
                expect_args(name, args, 2, Some(3))?;
                match args.get(2) {
                    Some(start) => format!(
                        "(_text({}).indexOf(_text({}), Math.max({} - 1, 0)) + 1)",
                        a(1),
                        a(0),
                        start.wrapped()
                    ),
                    None => format!("(_text({}).indexOf(_text({})) + 1)", a(1), a(0)),
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
                format!("_text({}).repeat(Math.max({}, 0))", a(0), a(1))
            }
            "VALUE" => {
                expect_args(name, args, 1, Some(1))?;
                format!("_value({})", a(0))
            }

            // === Numeric ===
            "ABS" => {
                expect_args(name, args, 1, Some(1))?;
                format!("Math.abs({})", a(0))
            }
            "ROUND" | "ROUNDUP" | "ROUNDDOWN" => {
                expect_args(name, args, 1, Some(2))?;
                let helper = match name {
                    "ROUND" => "_round",
                    "ROUNDUP" => "_roundUp",
                    _ => "_roundDown",
                };
                format!("{}({})", helper, all())
            }
            "CEILING" | "FLOOR" => {
                expect_args(name, args, 1, Some(2))?;
                let func = if name == "CEILING" { "Math.ceil" } else { "Math.floor" };
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
                format!("Math.floor({})", a(0))
            }
            "MOD" => {
                expect_args(name, args, 2, Some(2))?;
                format!("_mod({})", all())
            }
            "POWER" => {
                expect_args(name, args, 2, Some(2))?;
                format!("Math.pow({})", all())
            }
            "SQRT" | "EXP" => {
                expect_args(name, args, 1, Some(1))?;
                format!("Math.{}({})", name.to_lowercase(), a(0))
            }
            "LOG" => {
                expect_args(name, args, 1, Some(2))?;
                match args.get(1) {
                    Some(base) => format!("(Math.log({}) / Math.log({}))", a(0), base.code),
                    None => format!("Math.log10({})", a(0)),
                }
            }

            // === Aggregates ===
            "SUM" => format!("_numbers([{}]).reduce((a, b) => a + b, 0)", all()),
            "AVERAGE" => format!("_average(_numbers([{}]))", all()),
            "MAX" => format!("_max(_numbers([{}]))", all()),
            "MIN" => format!("_min(_numbers([{}]))", all()),
            "COUNT" => format!("_numbers([{}]).length", all()),
            "COUNTA" => format!(
                "_flatten([{}]).filter({NOT_NULL} && v !== \"\").length",
                all()
            ),
            "COUNTALL" => format!("_flatten([{}]).length", all()),

            // === Arrays ===
            "ARRAYJOIN" => {
                expect_args(name, args, 1, Some(2))?;
                let separator = match args.get(1) {
                    Some(sep) => format!("_text({})", sep.code),
                    None => double_quoted(", "),
                };
                format!(
                    "_flatten([{}]).filter({NOT_NULL}).map(_text).join({})",
                    a(0),
                    separator
                )
            }
            "ARRAYUNIQUE" => format!("[...new Set(_flatten([{}]))]", all()),
            "ARRAYCOMPACT" => format!(
                "_flatten([{}]).filter({NOT_NULL} && v !== \"\")",
                all()
            ),
            "ARRAYFLATTEN" => format!("_flatten([{}])", all()),

            // === Record and time ===
            "NOW" => "new Date()".to_string(),
            "TODAY" => "new Date(new Date().toDateString())".to_string(),
            "RECORD_ID" => "record[\"id\"]".to_string(),

            _ => return Err(self.unsupported(name)),
        };
        Ok(code)
    }

    fn null(&self) -> &'static str {
        "null"
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

/// Text safe inside a block comment
fn comment_safe(text: &str) -> String {
    one_line(text).replace("*/", "* /")
}

impl ModuleBackend for JavaScriptBackend {
    fn write_prelude(&self, out: &mut String, options: &GeneratorOptions, linked_tables: &[&Table]) {
        for line in header_lines(options) {
            if line.is_empty() {
                out.push_str("//\n");
            } else {
                out.push_str(&format!("// {line}\n"));
            }
        }
        out.push('\n');

        out.push_str("/**\n");
        out.push_str(" * Record access for lookup, rollup and count getters.\n");
        out.push_str(" *\n");
        out.push_str(" * Linked tables:\n");
        if linked_tables.is_empty() {
            out.push_str(" *   (none)\n");
        }
        for table in linked_tables {
            out.push_str(&format!(
                " *   {} ({})\n",
                comment_safe(&table.id),
                comment_safe(&table.name)
            ));
        }
        out.push_str(" *\n");
        out.push_str(" * @typedef {Object} DataAccess\n");
        out.push_str(
            " * @property {(tableId: string, recordId: string) => (Object|null)} getOne\n",
        );
        out.push_str(
            " * @property {(tableId: string, recordIds: string[]) => Object[]} getBatch\n",
        );
        out.push_str(" */\n\n");
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
            "\n// Table: {} ({})\n",
            one_line(&table.name),
            table.id
        ));
    }

    fn write_getter(&self, out: &mut String, getter: &Getter<'_>, options: &GeneratorOptions) {
        out.push('\n');
        if options.depth_comments {
            if let Some(depth) = getter.depth {
                out.push_str(&format!("// depth {depth}\n"));
            }
        }
        match &getter.source {
            Some(source) => out.push_str(&format!(
                "// {} = {}\n",
                one_line(getter.field_name),
                one_line(source)
            )),
            None => out.push_str(&format!("// {}\n", one_line(getter.field_name))),
        }
        out.push_str(&format!("export function {}(record, data) {{\n", getter.name));

        match &getter.body {
            GetterBody::Stub { reason } => {
                out.push_str(&format!("  // Not generated: {}\n", one_line(reason)));
                out.push_str("  return null;\n");
            }
            GetterBody::Expression(code) => {
                out.push_str("  try {\n");
                out.push_str(&format!("    return {code};\n"));
                out.push_str("  } catch (err) {\n");
                out.push_str("    return null;\n");
                out.push_str("  }\n");
            }
            GetterBody::Statements(lines) => {
                out.push_str("  try {\n");
                push_indented(out, &lines.join("\n"), 4);
                out.push_str("  } catch (err) {\n");
                out.push_str("    return null;\n");
                out.push_str("  }\n");
            }
        }
        out.push_str("}\n");
    }

    fn end_table(&self, _out: &mut String, _table: &Table, _options: &GeneratorOptions) {}

    fn lookup_body(&self, spec: &LookupSpec, null_safety: bool) -> CodegenResult<GetterBody> {
        let link = double_quoted(&spec.link_key);
        let table = double_quoted(&spec.linked_table_id);

        let read = match (&spec.kind, &spec.read) {
            (LookupKind::Count, _) => {
                return Ok(GetterBody::Statements(vec![format!(
                    "return (record[{link}] ?? []).length;"
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

        let mut lines = vec![format!("const ids = record[{link}] ?? [];")];
        if null_safety {
            lines.push("if (ids.length === 0) {".to_string());
            lines.push(format!(
                "  return {};",
                self.render_default(spec.empty_default())
            ));
            lines.push("}".to_string());
        }

        if spec.fetches_one() {
            lines.push(format!("const r = data.getOne({table}, ids[0]);"));
            lines.push(format!("return r ? {read} : null;"));
            return Ok(GetterBody::Statements(lines));
        }

        lines.push(format!("const linked = data.getBatch({table}, ids);"));
        match &spec.kind {
            LookupKind::Rollup(Aggregation::CountAll) => {}
            _ => lines.push(format!(
                "const values = linked.map((r) => {read}).filter({NOT_NULL});"
            )),
        }
        let result = match &spec.kind {
            LookupKind::Rollup(aggregation) => Self::aggregate(aggregation)?,
            _ => "_flatten(values)".to_string(),
        };
        lines.push(format!("return {result};"));
        Ok(GetterBody::Statements(lines))
    }

    fn render_default(&self, default: EmptyDefault) -> String {
        match default {
            EmptyDefault::Zero => "0".to_string(),
            EmptyDefault::EmptyText => "\"\"".to_string(),
            EmptyDefault::EmptyList => "[]".to_string(),
            EmptyDefault::Null => "null".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmittedKind;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: &[&str]) -> String {
        let args: Vec<Emitted> = args
            .iter()
            .map(|a| Emitted::new(*a, EmittedKind::FieldRef))
            .collect();
        JavaScriptBackend.transpile_function_call(name, &args).unwrap()
    }

    #[test]
    fn test_one_based_conversions() {
        assert_eq!(call("FIND", &["n", "h"]), "(_text(h).indexOf(_text(n)) + 1)");
        assert_eq!(
            call("MID", &["t", "s", "c"]),
            "_text(t).substring(s - 1).substring(0, Math.max(c, 0))"
        );
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(call("IF", &["c", "a", "b"]), "(c ? a : b)");
        assert_eq!(
            call("SWITCH", &["x", "1", "\"one\""]),
            "((_v) => (_v === 1 ? \"one\" : null))(x)"
        );
    }

    #[test]
    fn test_aggregates_ignore_non_numbers() {
        assert_eq!(
            call("SUM", &["a", "b"]),
            "_numbers([a, b]).reduce((a, b) => a + b, 0)"
        );
        assert_eq!(call("MAX", &["a"]), "_max(_numbers([a]))");
    }

    #[test]
    fn test_rollup_body_uses_camel_case_access() {
        let spec = LookupSpec {
            field_id: "fldSpend".into(),
            kind: LookupKind::Rollup(Aggregation::ArrayJoin("; ".into())),
            link_key: "fldOrders".into(),
            linked_table_id: "tblOrders".into(),
            linked_table_key: "tblOrders".into(),
            single: false,
            read: Some(TargetRead::Stored { key: "fldNo".into() }),
        };
        assert_eq!(
            JavaScriptBackend.lookup_body(&spec, true).unwrap(),
            GetterBody::Statements(vec![
                "const ids = record[\"fldOrders\"] ?? [];".into(),
                "if (ids.length === 0) {".into(),
                "  return \"\";".into(),
                "}".into(),
                "const linked = data.getBatch(\"tblOrders\", ids);".into(),
                "const values = linked.map((r) => r[\"fldNo\"]).filter((v) => v !== null && v !== undefined);".into(),
                "return _flatten(values).map(_text).join(\"; \");".into(),
            ])
        );
    }

    #[test]
    fn test_stub_getter_returns_null() {
        let mut out = String::new();
        let getter = Getter {
            name: "getOrdersNow",
            field_id: "fldNow",
            field_name: "Now",
            source: Some("FOO()".into()),
            depth: Some(0),
            body: GetterBody::Stub {
                reason: "Function FOO is not supported for javascript".into(),
            },
        };
        JavaScriptBackend.write_getter(&mut out, &getter, &GeneratorOptions::default());
        assert_eq!(
            out,
            "\n// depth 0\n// Now = FOO()\nexport function getOrdersNow(record, data) {\n  // Not generated: Function FOO is not supported for javascript\n  return null;\n}\n"
        );
    }
}
