//! Schema metadata: tables, fields and their computed-field options

use crate::error::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform field type
///
/// Only the distinction between basic and computed types matters to the compiler; the remaining
/// variants exist so schemas round-trip with their original type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    SingleLineText,
    MultilineText,
    RichText,
    Email,
    Url,
    PhoneNumber,
    Number,
    Currency,
    Percent,
    Duration,
    Rating,
    Checkbox,
    Date,
    DateTime,
    SingleSelect,
    MultipleSelects,
    MultipleAttachments,
    #[serde(alias = "link")]
    MultipleRecordLinks,
    Formula,
    #[serde(alias = "lookup")]
    MultipleLookupValues,
    Rollup,
    Count,
    AutoNumber,
    CreatedTime,
    LastModifiedTime,
    CreatedBy,
    LastModifiedBy,
    Barcode,
    Button,
    /// Any type name this crate does not know about
    #[serde(other)]
    Other,
}

/// The four computed field kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputedKind {
    Formula,
    Lookup,
    Rollup,
    Count,
}

impl FieldType {
    /// Computed kind, or `None` for basic (stored) fields
    pub fn computed_kind(self) -> Option<ComputedKind> {
        match self {
            FieldType::Formula => Some(ComputedKind::Formula),
            FieldType::MultipleLookupValues => Some(ComputedKind::Lookup),
            FieldType::Rollup => Some(ComputedKind::Rollup),
            FieldType::Count => Some(ComputedKind::Count),
            _ => None,
        }
    }

    /// Whether values of this field are derived from other fields
    pub fn is_computed(self) -> bool {
        self.computed_kind().is_some()
    }

    /// Whether this field links records of another table
    pub fn is_link(self) -> bool {
        self == FieldType::MultipleRecordLinks
    }

    /// Whether values are numeric
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Number
                | FieldType::Currency
                | FieldType::Percent
                | FieldType::Duration
                | FieldType::Rating
                | FieldType::AutoNumber
                | FieldType::Count
        )
    }

    /// Platform name of the type
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::SingleLineText => "singleLineText",
            FieldType::MultilineText => "multilineText",
            FieldType::RichText => "richText",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::PhoneNumber => "phoneNumber",
            FieldType::Number => "number",
            FieldType::Currency => "currency",
            FieldType::Percent => "percent",
            FieldType::Duration => "duration",
            FieldType::Rating => "rating",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::DateTime => "dateTime",
            FieldType::SingleSelect => "singleSelect",
            FieldType::MultipleSelects => "multipleSelects",
            FieldType::MultipleAttachments => "multipleAttachments",
            FieldType::MultipleRecordLinks => "multipleRecordLinks",
            FieldType::Formula => "formula",
            FieldType::MultipleLookupValues => "multipleLookupValues",
            FieldType::Rollup => "rollup",
            FieldType::Count => "count",
            FieldType::AutoNumber => "autoNumber",
            FieldType::CreatedTime => "createdTime",
            FieldType::LastModifiedTime => "lastModifiedTime",
            FieldType::CreatedBy => "createdBy",
            FieldType::LastModifiedBy => "lastModifiedBy",
            FieldType::Barcode => "barcode",
            FieldType::Button => "button",
            FieldType::Other => "other",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific field options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldOptions {
    /// Formula source text (formula fields)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Field ids the platform reports as referenced by the formula
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_field_ids: Option<Vec<String>>,
    /// Table whose records a link field points at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_table_id: Option<String>,
    /// Matching link field on the other side of a link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inverse_link_field_id: Option<String>,
    /// Link holds at most one record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefers_single_record_link: Option<bool>,
    /// Link field a lookup/rollup/count reads through
    #[serde(alias = "linkedFieldId", skip_serializing_if = "Option::is_none")]
    pub record_link_field_id: Option<String>,
    /// Field read from each linked record (lookup/rollup)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id_in_linked_table: Option<String>,
    /// Rollup aggregation, e.g. `SUM` or `SUM(values)`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<String>,
}

/// Rollup aggregation function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Sum,
    Count,
    CountA,
    CountAll,
    Max,
    Min,
    Average,
    ArrayUnique,
    ArrayFlatten,
    ArrayCompact,
    /// Join values with a separator
    ArrayJoin(String),
    /// Aggregation text that is not understood
    Unknown(String),
}

impl Aggregation {
    /// Parse an aggregation from `SUM`, `sum(values)` or `ARRAYJOIN(values, "; ")`
    pub fn parse(text: &str) -> Aggregation {
        let trimmed = text.trim();
        let (name, args) = match trimmed.find('(') {
            Some(open) if trimmed.ends_with(')') => {
                (&trimmed[..open], &trimmed[open + 1..trimmed.len() - 1])
            }
            _ => (trimmed, ""),
        };

        match name.trim().to_uppercase().as_str() {
            "SUM" => Aggregation::Sum,
            "COUNT" => Aggregation::Count,
            "COUNTA" => Aggregation::CountA,
            "COUNTALL" => Aggregation::CountAll,
            "MAX" => Aggregation::Max,
            "MIN" => Aggregation::Min,
            "AVERAGE" => Aggregation::Average,
            "ARRAYUNIQUE" => Aggregation::ArrayUnique,
            "ARRAYFLATTEN" => Aggregation::ArrayFlatten,
            "ARRAYCOMPACT" => Aggregation::ArrayCompact,
            "ARRAYJOIN" => Aggregation::ArrayJoin(join_separator(args)),
            _ => Aggregation::Unknown(trimmed.to_string()),
        }
    }

    /// Canonical upper-case name
    pub fn name(&self) -> &str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Count => "COUNT",
            Aggregation::CountA => "COUNTA",
            Aggregation::CountAll => "COUNTALL",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
            Aggregation::Average => "AVERAGE",
            Aggregation::ArrayUnique => "ARRAYUNIQUE",
            Aggregation::ArrayFlatten => "ARRAYFLATTEN",
            Aggregation::ArrayCompact => "ARRAYCOMPACT",
            Aggregation::ArrayJoin(_) => "ARRAYJOIN",
            Aggregation::Unknown(text) => text,
        }
    }

    /// Whether the result is a collection
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Aggregation::ArrayUnique | Aggregation::ArrayFlatten | Aggregation::ArrayCompact
        )
    }
}

/// Separator argument of `ARRAYJOIN(values, sep)`, defaulting to `", "`
fn join_separator(args: &str) -> String {
    let Some((_, sep)) = args.split_once(',') else {
        return ", ".to_string();
    };
    let sep = sep.trim();
    let quoted = sep.len() >= 2
        && ((sep.starts_with('"') && sep.ends_with('"'))
            || (sep.starts_with('\'') && sep.ends_with('\'')));
    if quoted {
        sep[1..sep.len() - 1].to_string()
    } else {
        ", ".to_string()
    }
}

/// A single field of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Owning table, filled in when the schema is indexed
    #[serde(skip)]
    pub table_id: String,
    #[serde(default)]
    pub options: FieldOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    /// Create a field with default options
    pub fn new(id: impl Into<String>, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            field_type,
            table_id: String::new(),
            options: FieldOptions::default(),
            description: None,
        }
    }

    /// Builder: formula field with the given source text
    pub fn formula(id: impl Into<String>, name: impl Into<String>, formula: &str) -> Self {
        let mut field = Self::new(id, name, FieldType::Formula);
        field.options.formula = Some(formula.to_string());
        field
    }

    /// Builder: link field pointing at `linked_table_id`
    pub fn link(
        id: impl Into<String>,
        name: impl Into<String>,
        linked_table_id: impl Into<String>,
    ) -> Self {
        let mut field = Self::new(id, name, FieldType::MultipleRecordLinks);
        field.options.linked_table_id = Some(linked_table_id.into());
        field
    }

    /// Builder: lookup of `target` through `link`
    pub fn lookup(
        id: impl Into<String>,
        name: impl Into<String>,
        link: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let mut field = Self::new(id, name, FieldType::MultipleLookupValues);
        field.options.record_link_field_id = Some(link.into());
        field.options.field_id_in_linked_table = Some(target.into());
        field
    }

    /// Builder: rollup of `target` through `link`
    pub fn rollup(
        id: impl Into<String>,
        name: impl Into<String>,
        link: impl Into<String>,
        target: impl Into<String>,
        aggregation: &str,
    ) -> Self {
        let mut field = Self::new(id, name, FieldType::Rollup);
        field.options.record_link_field_id = Some(link.into());
        field.options.field_id_in_linked_table = Some(target.into());
        field.options.aggregation = Some(aggregation.to_string());
        field
    }

    /// Builder: count of records linked through `link`
    pub fn count(id: impl Into<String>, name: impl Into<String>, link: impl Into<String>) -> Self {
        let mut field = Self::new(id, name, FieldType::Count);
        field.options.record_link_field_id = Some(link.into());
        field
    }

    pub fn is_computed(&self) -> bool {
        self.field_type.is_computed()
    }

    pub fn computed_kind(&self) -> Option<ComputedKind> {
        self.field_type.computed_kind()
    }

    /// Formula source, for formula fields only
    pub fn formula_text(&self) -> Option<&str> {
        match self.field_type {
            FieldType::Formula => self.options.formula.as_deref(),
            _ => None,
        }
    }

    /// Link field a lookup/rollup/count reads through
    pub fn link_field_id(&self) -> Option<&str> {
        self.options.record_link_field_id.as_deref()
    }

    /// Target field in the linked table (lookup/rollup)
    pub fn target_field_id(&self) -> Option<&str> {
        self.options.field_id_in_linked_table.as_deref()
    }

    /// Table a link field points at
    pub fn linked_table_id(&self) -> Option<&str> {
        self.options.linked_table_id.as_deref()
    }

    /// Inverse link declared on a link field
    pub fn inverse_link_field_id(&self) -> Option<&str> {
        self.options.inverse_link_field_id.as_deref()
    }

    /// Whether a link field holds at most one record
    pub fn prefers_single_record(&self) -> bool {
        self.options.prefers_single_record_link.unwrap_or(false)
    }

    /// Parsed rollup aggregation
    pub fn aggregation(&self) -> Option<Aggregation> {
        self.options.aggregation.as_deref().map(Aggregation::parse)
    }
}

/// A table and its ordered fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_field_id: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Table {
    /// Create a table from its fields
    pub fn new(id: impl Into<String>, name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            primary_field_id: None,
            fields,
        }
    }

    /// Find a field of this table by id
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }
}

/// Location of a field inside [`Schema::tables`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldLocation {
    table: usize,
    field: usize,
}

#[derive(Deserialize)]
struct SchemaDef {
    tables: Vec<Table>,
}

/// An indexed snapshot of all tables and fields
///
/// Built once per compilation run and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "SchemaDef")]
pub struct Schema {
    tables: Vec<Table>,
    fields_by_id: AHashMap<String, FieldLocation>,
    tables_by_id: AHashMap<String, usize>,
}

impl TryFrom<SchemaDef> for Schema {
    type Error = Error;

    fn try_from(def: SchemaDef) -> Result<Self> {
        Schema::new(def.tables)
    }
}

impl Schema {
    /// Index the given tables, filling in each field's owning table id
    pub fn new(mut tables: Vec<Table>) -> Result<Self> {
        let mut fields_by_id = AHashMap::new();
        let mut tables_by_id = AHashMap::new();

        for (t_idx, table) in tables.iter_mut().enumerate() {
            if table.id.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "table '{}' has an empty id",
                    table.name
                )));
            }
            if tables_by_id.insert(table.id.clone(), t_idx).is_some() {
                return Err(Error::DuplicateTable(table.id.clone()));
            }

            for (f_idx, field) in table.fields.iter_mut().enumerate() {
                if field.id.is_empty() {
                    return Err(Error::InvalidSchema(format!(
                        "field '{}' in table '{}' has an empty id",
                        field.name, table.name
                    )));
                }
                field.table_id = table.id.clone();
                let loc = FieldLocation {
                    table: t_idx,
                    field: f_idx,
                };
                if fields_by_id.insert(field.id.clone(), loc).is_some() {
                    return Err(Error::DuplicateField(field.id.clone()));
                }
            }
        }

        Ok(Self {
            tables,
            fields_by_id,
            tables_by_id,
        })
    }

    /// Parse schema metadata of the form `{"tables": [...]}`
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse schema metadata from an already decoded JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Look up a table by id
    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables_by_id.get(id).map(|&idx| &self.tables[idx])
    }

    /// Look up a field by id, across all tables
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields_by_id
            .get(id)
            .map(|loc| &self.tables[loc.table].fields[loc.field])
    }

    /// Table owning the given field
    pub fn table_of(&self, field_id: &str) -> Option<&Table> {
        self.fields_by_id
            .get(field_id)
            .map(|loc| &self.tables[loc.table])
    }

    /// Table a link field points at
    pub fn linked_table(&self, link_field_id: &str) -> Option<&Table> {
        self.field(link_field_id)
            .and_then(|f| f.linked_table_id())
            .and_then(|id| self.table(id))
    }

    /// All fields in declaration order (table by table)
    pub fn fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.tables.iter().flat_map(|t| t.fields.iter())
    }

    /// All computed fields in declaration order
    pub fn computed_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields().filter(|f| f.is_computed())
    }

    /// Position of a field in declaration order, used for stable sorting
    pub fn declaration_index(&self, field_id: &str) -> Option<(usize, usize)> {
        self.fields_by_id
            .get(field_id)
            .map(|loc| (loc.table, loc.field))
    }

    pub fn field_count(&self) -> usize {
        self.fields_by_id.len()
    }
}
