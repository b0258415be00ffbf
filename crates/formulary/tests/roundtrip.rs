//! Generated Python and JavaScript run against the reference evaluator
//!
//! The interpreter tests execute the generated module with `python3` or `node` and skip when
//! the interpreter is not installed.

use formulary::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};

/// (field id, name, formula, reads blanks safely)
const FORMULAS: &[(&str, &str, &str, bool)] = &[
    ("fldFlagText", "Flag Text", r#""x" & {fldFlag} & "|" & ({fldA} / 2)"#, true),
    ("fldCompare", "Compare", r#""x" & ({fldA} > 0) & "|" & ({fldA} / 2)"#, false),
    ("fldPlus", "Plus", "{fldA} + 1", true),
    ("fldNeg", "Neg", "-{fldA} * 2", true),
    ("fldJoin", "Join", r#"{fldS} & "-" & {fldA}"#, true),
    ("fldFind", "Find", r#"FIND("c", {fldS})"#, true),
    ("fldMid", "Mid", "MID({fldS}, 2, 3)", true),
    ("fldDouble", "Double", "{fldPlus} * 2", true),
];

fn schema() -> Schema {
    let mut fields = vec![
        Field::new("fldA", "A", FieldType::Number),
        Field::new("fldS", "S", FieldType::SingleLineText),
        Field::new("fldFlag", "Flag", FieldType::Checkbox),
    ];
    fields.extend(
        FORMULAS
            .iter()
            .map(|(id, name, formula, _)| Field::formula(*id, *name, *formula)),
    );
    Schema::new(vec![Table::new("tblMix", "Mix", fields)]).unwrap()
}

/// Stored values of each test record; the last one is blank
fn records() -> Vec<HashMap<String, FormulaValue>> {
    let record = |values: &[(&str, FormulaValue)]| -> HashMap<String, FormulaValue> {
        values
            .iter()
            .map(|(id, value)| (id.to_string(), value.clone()))
            .collect()
    };
    vec![
        record(&[
            ("fldA", FormulaValue::Number(4.0)),
            ("fldS", FormulaValue::String("abcdef".into())),
            ("fldFlag", FormulaValue::Boolean(true)),
        ]),
        record(&[
            ("fldA", FormulaValue::Number(3.0)),
            ("fldS", FormulaValue::String("xyz".into())),
            ("fldFlag", FormulaValue::Boolean(false)),
        ]),
        record(&[]),
    ]
}

fn to_json(value: &FormulaValue) -> Value {
    match value {
        FormulaValue::Number(n) => json!(n),
        FormulaValue::String(s) => json!(s),
        FormulaValue::Boolean(b) => json!(b),
        FormulaValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        FormulaValue::Empty => Value::Null,
    }
}

/// Evaluator results for every formula field, in `FORMULAS` order
///
/// Computed fields are evaluated level by level so dependents see their inputs.
fn expected(compiler: &Compiler, stored: &HashMap<String, FormulaValue>) -> Vec<FormulaValue> {
    let mut values = stored.clone();
    for ids in compiler.order().levels().values() {
        for id in ids {
            let field = compiler.schema().field(id).unwrap();
            let ast = parse(field.formula_text().unwrap()).unwrap();
            let value = evaluate(&ast, &values).unwrap();
            values.insert(id.clone(), value);
        }
    }
    FORMULAS
        .iter()
        .map(|(id, ..)| values.value(id))
        .collect()
}

fn records_json() -> String {
    let records: Vec<Value> = records()
        .iter()
        .map(|record| {
            Value::Object(
                record
                    .iter()
                    .map(|(id, value)| (id.clone(), to_json(value)))
                    .collect(),
            )
        })
        .collect();
    // a JSON string literal is also a valid Python and JavaScript string literal
    serde_json::to_string(&serde_json::to_string(&records).unwrap()).unwrap()
}

/// Run `program` with `script` on stdin; `None` when the program is not installed
fn run(program: &str, args: &[&str], script: &str) -> Option<Value> {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(error) => {
            eprintln!("skipping: {program} is not available ({error})");
            return None;
        }
    };
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "{program} failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    Some(serde_json::from_slice(&output.stdout).unwrap())
}

fn same(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

fn assert_matches_evaluator(compiler: &Compiler, target: &str, results: &Value) {
    let rows = results.as_array().unwrap();
    let records = records();
    assert_eq!(rows.len(), records.len());
    for (index, (row, record)) in rows.iter().zip(&records).enumerate() {
        let blank = record.is_empty();
        for (column, value) in expected(compiler, record).iter().enumerate() {
            let (id, _, formula, blank_safe) = FORMULAS[column];
            if blank && !blank_safe {
                continue;
            }
            let actual = &row[column];
            assert!(
                same(actual, &to_json(value)),
                "{target} record {index} {id} `{formula}`: generated {actual}, evaluator {value:?}"
            );
        }
    }
}

fn getter_names(convention: fn(&str) -> String) -> Vec<String> {
    FORMULAS.iter().map(|(_, name, ..)| convention(name)).collect()
}

#[test]
fn test_evaluator_results() {
    let compiler = Compiler::new(schema());
    let results: Vec<Vec<FormulaValue>> = records()
        .iter()
        .map(|record| expected(&compiler, record))
        .collect();

    let text = |s: &str| FormulaValue::String(s.into());
    let number = FormulaValue::Number;
    assert_eq!(
        results[0],
        vec![
            text("x1|2"),
            text("x1|2"),
            number(5.0),
            number(-8.0),
            text("abcdef-4"),
            number(3.0),
            text("bcd"),
            number(10.0),
        ]
    );
    assert_eq!(results[1][0], text("x0|1.5"));
    assert_eq!(results[1][5], number(0.0));
    assert_eq!(
        results[2],
        vec![
            text("x|0"),
            text("x0|0"),
            number(1.0),
            number(-0.0),
            text("-"),
            number(0.0),
            text(""),
            number(2.0),
        ]
    );
}

#[test]
fn test_generated_modules_use_shared_conversions() {
    let compiler = Compiler::new(schema());

    let module = compiler.generate(&GeneratorOptions::default());
    assert!(module.diagnostics.is_empty(), "{:?}", module.diagnostics);
    let source = module.source().unwrap();
    assert!(source.contains("\ndef _num(value):\n"));
    assert!(source.contains(
        "return \"x\" + _text(record.get(\"fldFlag\")) + \"|\" + _text(_num(record.get(\"fldA\")) / 2)"
    ));
    assert!(source.contains("return _num(get_mix_plus(record, data)) * 2"));

    let module = compiler.generate(&GeneratorOptions::for_target(Target::JavaScript));
    let source = module.source().unwrap();
    assert!(source.contains("\nfunction _num(value) {\n"));
    assert!(source.contains("return (-_num(record[\"fldA\"])) * 2;"));
    assert!(source.contains("return _text(record[\"fldS\"]) + \"-\" + _text(record[\"fldA\"]);"));
}

#[test]
fn test_python_matches_evaluator() {
    let compiler = Compiler::new(schema());
    let module = compiler.generate(&GeneratorOptions::default());
    let calls = getter_names(|name| format!("get_mix_{}", name.to_lowercase().replace(' ', "_")))
        .iter()
        .map(|getter| format!("{getter}(r, None)"))
        .collect::<Vec<_>>()
        .join(", ");
    let script = format!(
        "{}\n\nimport json\n_records = json.loads({})\nprint(json.dumps([[{calls}] for r in _records]))\n",
        module.source().unwrap(),
        records_json()
    );
    let Some(results) = run("python3", &["-"], &script) else {
        return;
    };
    assert_matches_evaluator(&compiler, "python", &results);
}

#[test]
fn test_javascript_matches_evaluator() {
    let compiler = Compiler::new(schema());
    let module = compiler.generate(&GeneratorOptions::for_target(Target::JavaScript));
    let calls = getter_names(|name| format!("getMix{}", name.replace(' ', "")))
        .iter()
        .map(|getter| format!("{getter}(r, null)"))
        .collect::<Vec<_>>()
        .join(", ");
    let script = format!(
        "{}\n\nconst _records = JSON.parse({});\nconsole.log(JSON.stringify(_records.map((r) => [{calls}])));\n",
        module.source().unwrap(),
        records_json()
    );
    let Some(results) = run("node", &["--input-type=module", "-"], &script) else {
        return;
    };
    assert_matches_evaluator(&compiler, "javascript", &results);
}
