//! Lookup, rollup and count fields
//!
//! A [`LookupSpec`] resolves everything a backend needs to read values through a link field:
//! the link's record key, the linked table and how the target value is read. Backends turn it into
//! a getter body with [`crate::backend::ModuleBackend::lookup_body`].

use crate::error::{CodegenError, CodegenResult};
use crate::options::RecordKeys;
use formulary_core::{Aggregation, ComputedKind, Field, Schema};

/// What a lookup-style field computes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKind {
    /// Values of the target field
    Lookup,
    /// Target values reduced with an aggregation
    Rollup(Aggregation),
    /// Number of linked records
    Count,
}

/// How a target value is read from a linked record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRead {
    /// Stored value under `key`
    Stored { key: String },
    /// Computed field read through its getter
    Computed { field_id: String, getter: String },
}

/// Value a lookup-style getter returns when nothing is linked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyDefault {
    Zero,
    EmptyText,
    EmptyList,
    Null,
}

/// Resolved read path of a lookup, rollup or count field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSpec {
    pub field_id: String,
    pub kind: LookupKind,
    /// Record key of the link field on the current table
    pub link_key: String,
    /// Id of the linked table, passed to data access
    pub linked_table_id: String,
    /// Name of the linked table as stored (id or name, per record keys)
    pub linked_table_key: String,
    /// Link holds at most one record
    pub single: bool,
    /// Target read; `None` for count fields
    pub read: Option<TargetRead>,
}

impl LookupSpec {
    /// Resolve a lookup, rollup or count field against the schema
    ///
    /// `getter_of` names the generated getter of a computed target field.
    pub fn from_field(
        field: &Field,
        schema: &Schema,
        keys: RecordKeys,
        getter_of: &dyn Fn(&str) -> Option<String>,
    ) -> CodegenResult<Self> {
        let missing = |option: &'static str| CodegenError::MissingOption {
            field_id: field.id.clone(),
            option,
        };

        let kind = match field.computed_kind() {
            Some(ComputedKind::Lookup) => LookupKind::Lookup,
            Some(ComputedKind::Count) => LookupKind::Count,
            Some(ComputedKind::Rollup) => {
                match field.aggregation().ok_or_else(|| missing("aggregation"))? {
                    Aggregation::Unknown(text) => {
                        return Err(CodegenError::UnsupportedAggregation(text))
                    }
                    aggregation => LookupKind::Rollup(aggregation),
                }
            }
            _ => {
                return Err(CodegenError::Unsupported(format!(
                    "field {} is not a lookup, rollup or count",
                    field.id
                )))
            }
        };

        let link_id = field
            .link_field_id()
            .ok_or_else(|| missing("recordLinkFieldId"))?;
        let link = schema
            .field(link_id)
            .ok_or_else(|| missing("recordLinkFieldId"))?;

        let target = match kind {
            LookupKind::Count => None,
            _ => {
                let target_id = field
                    .target_field_id()
                    .ok_or_else(|| missing("fieldIdInLinkedTable"))?;
                Some(
                    schema
                        .field(target_id)
                        .ok_or_else(|| missing("fieldIdInLinkedTable"))?,
                )
            }
        };

        // a link without linkedTableId still points wherever its target lives
        let linked_table = schema
            .linked_table(link_id)
            .or_else(|| target.and_then(|t| schema.table_of(&t.id)))
            .ok_or_else(|| missing("linkedTableId"))?;

        let read = match target {
            Some(target) if target.is_computed() => {
                let getter = getter_of(&target.id).ok_or_else(|| missing("fieldIdInLinkedTable"))?;
                Some(TargetRead::Computed {
                    field_id: target.id.clone(),
                    getter,
                })
            }
            Some(target) => Some(TargetRead::Stored {
                key: keys.key(target).to_string(),
            }),
            None => None,
        };

        Ok(Self {
            field_id: field.id.clone(),
            kind,
            link_key: keys.key(link).to_string(),
            linked_table_id: linked_table.id.clone(),
            linked_table_key: match keys {
                RecordKeys::FieldId => linked_table.id.clone(),
                RecordKeys::FieldName => linked_table.name.clone(),
            },
            single: link.prefers_single_record(),
            read,
        })
    }

    /// Value returned when the link is empty
    pub fn empty_default(&self) -> EmptyDefault {
        match &self.kind {
            LookupKind::Count => EmptyDefault::Zero,
            LookupKind::Lookup if self.single => EmptyDefault::Null,
            LookupKind::Lookup => EmptyDefault::EmptyList,
            LookupKind::Rollup(aggregation) => aggregation_default(aggregation),
        }
    }

    /// Whether the link is read with a single-record fetch
    pub fn fetches_one(&self) -> bool {
        self.single && self.kind == LookupKind::Lookup
    }

    /// One-line description for the comment above the getter
    pub fn describe(&self) -> String {
        let target = match &self.read {
            Some(TargetRead::Stored { key }) => key.as_str(),
            Some(TargetRead::Computed { field_id, .. }) => field_id.as_str(),
            None => "",
        };
        match &self.kind {
            LookupKind::Lookup => format!("lookup {} via {}", target, self.link_key),
            LookupKind::Rollup(aggregation) => {
                format!("{}({}) via {}", aggregation.name(), target, self.link_key)
            }
            LookupKind::Count => format!("count of {}", self.link_key),
        }
    }
}

/// Empty-input value of an aggregation
pub fn aggregation_default(aggregation: &Aggregation) -> EmptyDefault {
    match aggregation {
        Aggregation::Sum
        | Aggregation::Count
        | Aggregation::CountA
        | Aggregation::CountAll
        | Aggregation::Average => EmptyDefault::Zero,
        Aggregation::ArrayUnique | Aggregation::ArrayFlatten | Aggregation::ArrayCompact => {
            EmptyDefault::EmptyList
        }
        Aggregation::ArrayJoin(_) => EmptyDefault::EmptyText,
        Aggregation::Max | Aggregation::Min | Aggregation::Unknown(_) => EmptyDefault::Null,
    }
}
