//! Schema resolution of field references

use crate::ast::{FieldRef, FormulaNode};
use crate::error::FormulaError;
use formulary_core::Schema;

/// A resolved tree plus the references that were not found in the schema
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub node: FormulaNode,
    /// One [`FormulaError::UnresolvedFieldReference`] per missing id, in first-seen order
    pub unresolved: Vec<FormulaError>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Missing ids, in first-seen order
    pub fn unresolved_ids(&self) -> impl Iterator<Item = &str> {
        self.unresolved.iter().filter_map(|error| match error {
            FormulaError::UnresolvedFieldReference { field_id } => Some(field_id.as_str()),
            _ => None,
        })
    }
}

/// Attach field names and types to every field reference found in the schema
///
/// Unknown ids are left with no type and reported in [`Resolution::unresolved`]; this is not an
/// error, code generation proceeds treating them as plain stored values.
pub fn resolve(node: &FormulaNode, schema: &Schema) -> Resolution {
    let mut unresolved = Vec::new();
    let node = resolve_node(node, schema, &mut unresolved);
    Resolution { node, unresolved }
}

fn resolve_node(
    node: &FormulaNode,
    schema: &Schema,
    unresolved: &mut Vec<FormulaError>,
) -> FormulaNode {
    match node {
        FormulaNode::Literal(lit) => FormulaNode::Literal(lit.clone()),
        FormulaNode::FieldRef(r) => match schema.field(&r.field_id) {
            Some(field) => FormulaNode::FieldRef(FieldRef {
                field_id: r.field_id.clone(),
                field_name: Some(field.name.clone()),
                field_type: Some(field.field_type),
            }),
            None => {
                tracing::warn!(field_id = %r.field_id, "unresolved field reference");
                let error = FormulaError::UnresolvedFieldReference {
                    field_id: r.field_id.clone(),
                };
                if !unresolved.contains(&error) {
                    unresolved.push(error);
                }
                FormulaNode::FieldRef(FieldRef::new(r.field_id.clone()))
            }
        },
        FormulaNode::FunctionCall { name, args } => FormulaNode::FunctionCall {
            name: name.clone(),
            args: args
                .iter()
                .map(|arg| resolve_node(arg, schema, unresolved))
                .collect(),
        },
        FormulaNode::BinaryOp { op, left, right } => FormulaNode::binary(
            *op,
            resolve_node(left, schema, unresolved),
            resolve_node(right, schema, unresolved),
        ),
        FormulaNode::UnaryOp { op, operand } => {
            FormulaNode::unary(*op, resolve_node(operand, schema, unresolved))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use formulary_core::{Field, FieldType, Table};
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        Schema::new(vec![Table::new(
            "tbl1",
            "People",
            vec![
                Field::new("fldFirst", "First", FieldType::SingleLineText),
                Field::new("fldAge", "Age", FieldType::Number),
            ],
        )])
        .unwrap()
    }

    #[test]
    fn test_resolve_attaches_name_and_type() {
        let ast = parse("IF({fldAge} > 17, {fldFirst}, \"minor\")").unwrap();
        let resolution = resolve(&ast, &schema());
        assert!(resolution.is_complete());

        let mut refs = Vec::new();
        resolution.node.walk(&mut |node| {
            if let FormulaNode::FieldRef(r) = node {
                refs.push(r.clone());
            }
        });
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].field_name.as_deref(), Some("Age"));
        assert_eq!(refs[0].field_type, Some(FieldType::Number));
        assert_eq!(refs[1].display_name(), "First");
    }

    #[test]
    fn test_unknown_reference_is_recoverable() {
        let ast = parse("{fldMissing} & {fldFirst} & {fldMissing}").unwrap();
        let resolution = resolve(&ast, &schema());
        assert_eq!(
            resolution.unresolved,
            vec![FormulaError::UnresolvedFieldReference {
                field_id: "fldMissing".to_string()
            }]
        );
        assert_eq!(resolution.unresolved_ids().collect::<Vec<_>>(), vec!["fldMissing"]);
        assert_eq!(
            resolution.unresolved[0].to_string(),
            "Unresolved field reference: {fldMissing}"
        );

        let mut missing_type = None;
        resolution.node.walk(&mut |node| {
            if let FormulaNode::FieldRef(r) = node {
                if r.field_id == "fldMissing" {
                    missing_type = Some(r.field_type);
                }
            }
        });
        assert_eq!(missing_type, Some(None));
    }
}
