//! PostgreSQL backend: one view per table
//!
//! Link fields are expected to hold arrays of record ids and every table to carry an `id`
//! column. Computed columns of the same table are inlined, lookups and rollups become correlated
//! subqueries over the linked table.

use super::header_lines;
use crate::backend::{
    expect_args, join_args, one_line, CodeGenBackend, Emitted, EmittedKind, FieldAccess, Getter,
    GetterBody, ModuleBackend,
};
use crate::error::{CodegenError, CodegenResult};
use crate::lookup::{EmptyDefault, LookupKind, LookupSpec, TargetRead};
use crate::options::{GeneratorOptions, RecordKeys, Target};
use formulary_core::{Aggregation, Table};
use formulary_formula::ast::format_number;
use formulary_formula::{BinaryOperator, FieldRef, Literal, UnaryOperator};

/// Emits `CREATE OR REPLACE VIEW` statements for PostgreSQL
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBackend;

/// Quote an identifier
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal
fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Argument as text; string literals are already text
fn text_arg(arg: &Emitted) -> String {
    match arg.kind {
        EmittedKind::StringLiteral => arg.code.clone(),
        _ => format!("CAST({} AS TEXT)", arg.code),
    }
}

fn not_supported(what: &str) -> CodegenError {
    CodegenError::Unsupported(format!("{what} is not supported for sql"))
}

impl SqlBackend {
    fn aggregate(aggregation: &Aggregation, value: &str) -> CodegenResult<String> {
        Ok(match aggregation {
            Aggregation::Sum => format!("COALESCE(SUM({value}), 0)"),
            Aggregation::Count => format!("COUNT({value})"),
            Aggregation::CountA => format!("COUNT(NULLIF(CAST({value} AS TEXT), ''))"),
            Aggregation::CountAll => "COUNT(*)".to_string(),
            Aggregation::Max => format!("MAX({value})"),
            Aggregation::Min => format!("MIN({value})"),
            Aggregation::Average => format!("COALESCE(AVG({value}), 0)"),
            Aggregation::ArrayUnique => format!(
                "COALESCE(ARRAY_AGG(DISTINCT {value}) FILTER (WHERE {value} IS NOT NULL), '{{}}')"
            ),
            Aggregation::ArrayFlatten => format!(
                "COALESCE(ARRAY_AGG({value}) FILTER (WHERE {value} IS NOT NULL), '{{}}')"
            ),
            Aggregation::ArrayCompact => format!(
                "COALESCE(ARRAY_AGG({value}) FILTER (WHERE {value} IS NOT NULL AND CAST({value} AS TEXT) <> ''), '{{}}')"
            ),
            Aggregation::ArrayJoin(separator) => format!(
                "COALESCE(STRING_AGG(CAST({value} AS TEXT), {}), '')",
                quote_literal(separator)
            ),
            Aggregation::Unknown(text) => {
                return Err(CodegenError::UnsupportedAggregation(text.clone()))
            }
        })
    }
}

impl CodeGenBackend for SqlBackend {
    fn target(&self) -> Target {
        Target::Sql
    }

    fn transpile_literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Number(n) => format_number(*n),
            Literal::String(s) => quote_literal(s),
            Literal::Boolean(true) => "TRUE".to_string(),
            Literal::Boolean(false) => "FALSE".to_string(),
        }
    }

    fn transpile_field_ref(&self, _field: &FieldRef, access: &FieldAccess) -> String {
        match access {
            FieldAccess::Stored { key } => format!("t.{}", quote_ident(key)),
            FieldAccess::Inline(code) => code.clone(),
            // columns of the same SELECT cannot see each other
            FieldAccess::Computed { .. } => "NULL".to_string(),
        }
    }

    fn transpile_binary_op(&self, op: BinaryOperator, left: &str, right: &str) -> String {
        let symbol = match op {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => {
                return format!("CAST({left} AS NUMERIC) / NULLIF({right}, 0)");
            }
            BinaryOperator::Concat => "||",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
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
            UnaryOperator::Not => format!("NOT {operand}"),
        }
    }

    fn transpile_function_call(&self, name: &str, args: &[Emitted]) -> CodegenResult<String> {
        let a = |i: usize| args[i].code.as_str();
        let w = |i: usize| args[i].wrapped();
        let t = |i: usize| text_arg(&args[i]);
        let all = || join_args(args);

        let code = match name {
            // === Logical ===
            "IF" => {
                expect_args(name, args, 2, Some(3))?;
                let otherwise = if args.len() > 2 { a(2) } else { "NULL" };
                format!("CASE WHEN {} THEN {} ELSE {} END", a(0), a(1), otherwise)
            }
            "SWITCH" => {
                expect_args(name, args, 3, None)?;
                let pairs = &args[1..];
                let mut code = format!("CASE {}", a(0));
                for pair in pairs.chunks_exact(2) {
                    code.push_str(&format!(" WHEN {} THEN {}", pair[0].code, pair[1].code));
                }
                if pairs.len() % 2 == 1 {
                    code.push_str(&format!(" ELSE {}", pairs[pairs.len() - 1].code));
                }
                code.push_str(" END");
                code
            }
            "AND" | "OR" => {
                expect_args(name, args, 1, None)?;
                let separator = format!(" {name} ");
                let joined = args
                    .iter()
                    .map(Emitted::wrapped)
                    .collect::<Vec<_>>()
                    .join(separator.as_str());
                format!("({joined})")
            }
            "BLANK" => {
                expect_args(name, args, 0, Some(0))?;
                "NULL".to_string()
            }
            "TRUE" => "TRUE".to_string(),
            "FALSE" => "FALSE".to_string(),

            // === Text ===
            "CONCATENATE" => format!("CONCAT({})", all()),
            "LEN" => {
                expect_args(name, args, 1, Some(1))?;
                format!("LENGTH({})", t(0))
            }
            "LOWER" | "UPPER" | "TRIM" => {
                expect_args(name, args, 1, Some(1))?;
                format!("{}({})", name, t(0))
            }
            "LEFT" | "RIGHT" => {
                expect_args(name, args, 1, Some(2))?;
                let count = if args.len() > 1 { a(1) } else { "1" };
                format!("{}({}, {})", name, t(0), count)
            }
            "MID" => {
                expect_args(name, args, 3, Some(3))?;
                format!("SUBSTRING({} FROM {} FOR {})", t(0), a(1), a(2))
            }
            "FIND" => {
                expect_args(name, args, 2, Some(3))?;
                if args.len() > 2 {
                    return Err(not_supported("FIND with a start position"));
                }
                format!("STRPOS({}, {})", t(1), t(0))
            }
            "SEARCH" => {
                expect_args(name, args, 2, Some(3))?;
                if args.len() > 2 {
                    return Err(not_supported("SEARCH with a start position"));
                }
                format!("NULLIF(STRPOS(LOWER({}), LOWER({})), 0)", t(1), t(0))
            }
            "SUBSTITUTE" => {
                expect_args(name, args, 3, Some(4))?;
                if args.len() > 3 {
                    return Err(not_supported("SUBSTITUTE of one occurrence"));
                }
                format!("REPLACE({}, {}, {})", t(0), t(1), t(2))
            }
            "REPLACE" => {
                expect_args(name, args, 4, Some(4))?;
                format!("OVERLAY({} PLACING {} FROM {} FOR {})", t(0), t(3), a(1), a(2))
            }
            "REPT" => {
                expect_args(name, args, 2, Some(2))?;
                format!("REPEAT({}, {})", t(0), a(1))
            }

            // === Numeric ===
            "ABS" | "SQRT" | "EXP" => {
                expect_args(name, args, 1, Some(1))?;
                format!("{}({})", name, a(0))
            }
            "ROUND" | "ROUNDDOWN" => {
                expect_args(name, args, 1, Some(2))?;
                let func = if name == "ROUND" { "ROUND" } else { "TRUNC" };
                let digits = if args.len() > 1 { a(1) } else { "0" };
                format!("{}(CAST({} AS NUMERIC), {})", func, a(0), digits)
            }
            "CEILING" | "FLOOR" => {
                expect_args(name, args, 1, Some(2))?;
                let func = if name == "CEILING" { "CEIL" } else { "FLOOR" };
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
                format!("FLOOR({})", a(0))
            }
            "MOD" | "POWER" => {
                expect_args(name, args, 2, Some(2))?;
                format!("{}({})", name, all())
            }
            "LOG" => {
                expect_args(name, args, 1, Some(2))?;
                match args.get(1) {
                    Some(base) => format!("LOG({}, {})", base.code, a(0)),
                    None => format!("LOG({})", a(0)),
                }
            }
            "SUM" => {
                expect_args(name, args, 1, None)?;
                let terms = args
                    .iter()
                    .map(|arg| format!("COALESCE({}, 0)", arg.code))
                    .collect::<Vec<_>>()
                    .join(" + ");
                format!("({terms})")
            }
            "MAX" | "MIN" => {
                expect_args(name, args, 1, None)?;
                let func = if name == "MAX" { "GREATEST" } else { "LEAST" };
                format!("{}({})", func, all())
            }

            // === Record and time ===
            "NOW" => "NOW()".to_string(),
            "TODAY" => "CURRENT_DATE".to_string(),
            "RECORD_ID" => "t.\"id\"".to_string(),

            _ => return Err(self.unsupported(name)),
        };
        Ok(code)
    }

    fn null(&self) -> &'static str {
        "NULL"
    }

    fn coalesce_text(&self, code: &str) -> String {
        format!("COALESCE(CAST({code} AS TEXT), '')")
    }

    fn to_text(&self, code: &str) -> String {
        format!("CAST({code} AS TEXT)")
    }
}

impl ModuleBackend for SqlBackend {
    fn inlines_computed(&self) -> bool {
        true
    }

    fn groups_by_table(&self) -> bool {
        true
    }

    fn write_prelude(&self, out: &mut String, options: &GeneratorOptions, linked_tables: &[&Table]) {
        for line in header_lines(options) {
            if line.is_empty() {
                out.push_str("--\n");
            } else {
                out.push_str(&format!("-- {line}\n"));
            }
        }
        out.push_str("--\n");
        out.push_str("-- Link columns hold arrays of record ids; every table has an \"id\" column.\n");
        out.push_str("-- Linked tables:");
        if linked_tables.is_empty() {
            out.push_str(" (none)");
        }
        out.push('\n');
        for table in linked_tables {
            out.push_str(&format!("--   {} ({})\n", table.id, one_line(&table.name)));
        }
    }

    fn begin_table(&self, out: &mut String, table: &Table, ident: &str, _options: &GeneratorOptions) {
        out.push_str(&format!(
            "\n-- Table: {} ({})\n",
            one_line(&table.name),
            table.id
        ));
        out.push_str(&format!(
            "CREATE OR REPLACE VIEW {} AS\nSELECT\n    t.*",
            quote_ident(ident)
        ));
    }

    fn write_getter(&self, out: &mut String, getter: &Getter<'_>, options: &GeneratorOptions) {
        out.push_str(",\n");
        if options.depth_comments {
            if let Some(depth) = getter.depth {
                out.push_str(&format!("    -- depth {depth}\n"));
            }
        }
        match &getter.source {
            Some(source) => out.push_str(&format!(
                "    -- {} = {}\n",
                one_line(getter.field_name),
                one_line(source)
            )),
            None => out.push_str(&format!("    -- {}\n", one_line(getter.field_name))),
        }
        let column = quote_ident(getter.name);
        match &getter.body {
            GetterBody::Expression(code) => {
                out.push_str(&format!("    {code} AS {column}"));
            }
            GetterBody::Stub { reason } => {
                out.push_str(&format!("    -- Not generated: {}\n", one_line(reason)));
                out.push_str(&format!("    NULL AS {column}"));
            }
            GetterBody::Statements(_) => {
                out.push_str("    -- Not generated: statement bodies have no SQL form\n");
                out.push_str(&format!("    NULL AS {column}"));
            }
        }
    }

    fn end_table(&self, out: &mut String, table: &Table, options: &GeneratorOptions) {
        let source = match options.record_keys {
            RecordKeys::FieldId => &table.id,
            RecordKeys::FieldName => &table.name,
        };
        out.push_str(&format!("\nFROM {} AS t;\n", quote_ident(source)));
    }

    fn lookup_body(&self, spec: &LookupSpec, _null_safety: bool) -> CodegenResult<GetterBody> {
        let link = format!("t.{}", quote_ident(&spec.link_key));
        let from = format!("FROM {} AS l", quote_ident(&spec.linked_table_key));

        let key = match (&spec.kind, &spec.read) {
            (LookupKind::Count, _) => {
                return Ok(GetterBody::Expression(format!(
                    "COALESCE(CARDINALITY({link}), 0)"
                )))
            }
            (_, Some(TargetRead::Stored { key })) => key,
            (_, Some(TargetRead::Computed { field_id, .. })) => {
                return Err(not_supported(&format!(
                    "reading computed field {field_id} through a link"
                )))
            }
            (_, None) => {
                return Err(CodegenError::MissingOption {
                    field_id: spec.field_id.clone(),
                    option: "fieldIdInLinkedTable",
                })
            }
        };
        let value = format!("l.{}", quote_ident(key));

        let code = match &spec.kind {
            LookupKind::Lookup if spec.single => {
                format!("(SELECT {value} {from} WHERE l.\"id\" = {link}[1])")
            }
            LookupKind::Lookup => format!(
                "COALESCE((SELECT ARRAY_AGG({value}) {from} WHERE l.\"id\" = ANY({link}) AND {value} IS NOT NULL), '{{}}')"
            ),
            LookupKind::Rollup(aggregation) => format!(
                "(SELECT {} {from} WHERE l.\"id\" = ANY({link}))",
                Self::aggregate(aggregation, &value)?
            ),
            LookupKind::Count => format!("COALESCE(CARDINALITY({link}), 0)"),
        };
        Ok(GetterBody::Expression(code))
    }

    fn render_default(&self, default: EmptyDefault) -> String {
        match default {
            EmptyDefault::Zero => "0".to_string(),
            EmptyDefault::EmptyText => "''".to_string(),
            EmptyDefault::EmptyList => "'{}'".to_string(),
            EmptyDefault::Null => "NULL".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: &[(&str, EmittedKind)]) -> CodegenResult<String> {
        let args: Vec<Emitted> = args.iter().map(|(c, k)| Emitted::new(*c, *k)).collect();
        SqlBackend.transpile_function_call(name, &args)
    }

    #[test]
    fn test_literals_and_identifiers() {
        assert_eq!(
            SqlBackend.transpile_literal(&Literal::String("it's".into())),
            "'it''s'"
        );
        assert_eq!(quote_ident("Order \"Total\""), "\"Order \"\"Total\"\"\"");
    }

    #[test]
    fn test_native_one_based_functions() {
        let text = ("'hello'", EmittedKind::StringLiteral);
        let field = ("t.\"fldN\"", EmittedKind::FieldRef);
        assert_eq!(
            call("MID", &[text, ("2", EmittedKind::Literal), ("3", EmittedKind::Literal)]).unwrap(),
            "SUBSTRING('hello' FROM 2 FOR 3)"
        );
        assert_eq!(
            call("FIND", &[field, text]).unwrap(),
            "STRPOS('hello', CAST(t.\"fldN\" AS TEXT))"
        );
        assert!(matches!(
            call("FIND", &[field, text, ("2", EmittedKind::Literal)]),
            Err(CodegenError::Unsupported(_))
        ));
    }

    #[test]
    fn test_division_guards_zero() {
        assert_eq!(
            SqlBackend.transpile_binary_op(BinaryOperator::Divide, "t.\"a\"", "t.\"b\""),
            "CAST(t.\"a\" AS NUMERIC) / NULLIF(t.\"b\", 0)"
        );
    }

    #[test]
    fn test_array_functions_are_not_scalar() {
        assert!(matches!(
            call("ARRAYJOIN", &[("t.\"x\"", EmittedKind::FieldRef)]),
            Err(CodegenError::UnsupportedFunction { .. })
        ));
    }

    #[test]
    fn test_rollup_subquery() {
        let spec = LookupSpec {
            field_id: "fldSpend".into(),
            kind: LookupKind::Rollup(Aggregation::Sum),
            link_key: "fldOrders".into(),
            linked_table_id: "tblOrders".into(),
            linked_table_key: "tblOrders".into(),
            single: false,
            read: Some(TargetRead::Stored { key: "fldAmount".into() }),
        };
        assert_eq!(
            SqlBackend.lookup_body(&spec, true).unwrap(),
            GetterBody::Expression(
                "(SELECT COALESCE(SUM(l.\"fldAmount\"), 0) FROM \"tblOrders\" AS l WHERE l.\"id\" = ANY(t.\"fldOrders\"))".into()
            )
        );

        let computed = LookupSpec {
            read: Some(TargetRead::Computed {
                field_id: "fldTotal".into(),
                getter: "total".into(),
            }),
            ..spec
        };
        assert!(matches!(
            SqlBackend.lookup_body(&computed, true),
            Err(CodegenError::Unsupported(_))
        ));
    }
}
