//! Generator options

use formulary_core::Field;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target language of a generated module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Python,
    #[serde(alias = "js")]
    JavaScript,
    /// PostgreSQL views
    Sql,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::Python => "python",
            Target::JavaScript => "javascript",
            Target::Sql => "sql",
        }
    }

    /// File extension of modules for this target
    pub fn extension(self) -> &'static str {
        match self {
            Target::Python => "py",
            Target::JavaScript => "js",
            Target::Sql => "sql",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case convention for generated identifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NamingConvention {
    /// snake_case for Python and SQL, camelCase for JavaScript
    #[default]
    TargetDefault,
    SnakeCase,
    CamelCase,
}

/// How generated code keys record values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKeys {
    /// `record["fldXXXX"]`; stable across renames
    #[default]
    FieldId,
    /// `record["Field Name"]`
    FieldName,
}

impl RecordKeys {
    /// Key under which a field's value is stored in a record
    pub fn key<'a>(self, field: &'a Field) -> &'a str {
        match self {
            RecordKeys::FieldId => &field.id,
            RecordKeys::FieldName => &field.name,
        }
    }
}

/// Options for generating a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneratorOptions {
    /// Target language (default: Python)
    pub target: Target,
    /// Identifier case convention
    pub naming: NamingConvention,
    /// Record keying scheme
    pub record_keys: RecordKeys,
    /// Coalesce nulls in concatenation and guard empty links (default: true)
    pub null_safety: bool,
    /// Emit a depth comment before each getter
    pub depth_comments: bool,
    /// Base name of the generated file
    pub module_name: String,
    /// Comment placed at the top of the module
    pub header_comment: Option<String>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            target: Target::Python,
            naming: NamingConvention::TargetDefault,
            record_keys: RecordKeys::FieldId,
            null_safety: true,
            depth_comments: true,
            module_name: "computed_fields".to_string(),
            header_comment: None,
        }
    }
}

impl GeneratorOptions {
    /// Default options for a target
    pub fn for_target(target: Target) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Name of the generated file
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.module_name, self.target.extension())
    }
}
