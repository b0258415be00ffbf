//! Target backends

mod javascript;
mod python;
mod sql;

pub use javascript::JavaScriptBackend;
pub use python::PythonBackend;
pub use sql::SqlBackend;

use crate::options::GeneratorOptions;

/// Double-quoted string literal valid in both Python and JavaScript
pub(crate) fn double_quoted(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

/// Lines of the module header comment
pub(crate) fn header_lines(options: &GeneratorOptions) -> Vec<String> {
    let mut lines: Vec<String> = match &options.header_comment {
        Some(comment) => comment.lines().map(str::to_string).collect(),
        None => vec!["Generated by formulary. Do not edit.".to_string()],
    };
    lines.push(format!("Module: {}", options.module_name));
    lines
}
