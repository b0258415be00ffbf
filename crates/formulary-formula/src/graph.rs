//! Dependency graph over tables and fields
//!
//! Edges point from a dependent field to the field it depends on. The graph is built once per
//! schema snapshot and is read-only afterwards.

use crate::error::FormulaError;
use crate::parser::parse;
use ahash::{AHashMap, AHashSet};
use formulary_core::{ComputedKind, FieldType, Schema};
use std::collections::VecDeque;
use std::fmt;

/// Identity of a graph node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    Table(String),
    Field(String),
}

/// A table or field node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Owning table (field nodes only)
    pub table_id: Option<String>,
    /// Field type (field nodes only)
    pub field_type: Option<FieldType>,
}

/// Relationship carried by an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Formula references the field
    FormulaRef,
    /// Lookup reads the target field of linked records
    Lookup,
    /// Lookup reads through the link field
    LookupVia,
    /// Rollup aggregates the target field of linked records
    Rollup,
    /// Rollup reads through the link field
    RollupVia,
    /// Count of records in the link field
    Count,
    /// Link field and its inverse (added in both directions)
    RecordLink,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::FormulaRef => "formula-ref",
            EdgeKind::Lookup => "lookup",
            EdgeKind::LookupVia => "lookup-via",
            EdgeKind::Rollup => "rollup",
            EdgeKind::RollupVia => "rollup-via",
            EdgeKind::Count => "count",
            EdgeKind::RecordLink => "record-link",
        }
    }

    /// Edges that order computation
    pub fn is_hierarchical(self) -> bool {
        matches!(
            self,
            EdgeKind::FormulaRef | EdgeKind::Lookup | EdgeKind::Rollup | EdgeKind::Count
        )
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// A formula that could not be parsed while building the graph
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub field_id: String,
    pub error: FormulaError,
}

/// Dependency graph for computed fields
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    node_index: AHashMap<NodeId, usize>,
    edges: Vec<Edge>,
    edge_set: AHashSet<Edge>,
    /// Field -> outgoing edge indices (what it depends on)
    precedents: AHashMap<String, Vec<usize>>,
    /// Field -> incoming edge indices (what depends on it)
    dependents: AHashMap<String, Vec<usize>>,
    /// Field ids in schema declaration order
    field_order: Vec<String>,
    computed: AHashSet<String>,
    parse_failures: Vec<ParseFailure>,
    /// (field, referenced id) pairs where the id is not in the schema
    unresolved: Vec<(String, String)>,
}

/// Build the dependency graph for every table and field of a schema
pub fn build_graph(schema: &Schema) -> DependencyGraph {
    DependencyGraph::build(schema)
}

impl DependencyGraph {
    /// Build the graph from a schema snapshot
    pub fn build(schema: &Schema) -> Self {
        let mut graph = Self::default();

        for table in schema.tables() {
            graph.add_node(Node {
                id: NodeId::Table(table.id.clone()),
                name: table.name.clone(),
                table_id: None,
                field_type: None,
            });
            for field in &table.fields {
                graph.add_node(Node {
                    id: NodeId::Field(field.id.clone()),
                    name: field.name.clone(),
                    table_id: Some(table.id.clone()),
                    field_type: Some(field.field_type),
                });
                graph.field_order.push(field.id.clone());
                if field.is_computed() {
                    graph.computed.insert(field.id.clone());
                }
            }
        }

        for field in schema.fields() {
            match field.computed_kind() {
                Some(ComputedKind::Formula) => {
                    let referenced = match field.options.formula.as_deref().map(parse) {
                        Some(Ok(ast)) => ast.field_refs().into_iter().map(String::from).collect(),
                        Some(Err(error)) => {
                            tracing::warn!(field_id = %field.id, %error, "formula failed to parse");
                            graph.parse_failures.push(ParseFailure {
                                field_id: field.id.clone(),
                                error,
                            });
                            field.options.referenced_field_ids.clone().unwrap_or_default()
                        }
                        None => field.options.referenced_field_ids.clone().unwrap_or_default(),
                    };
                    for target in referenced {
                        graph.add_edge_checked(schema, &field.id, &target, EdgeKind::FormulaRef);
                    }
                }
                Some(kind @ (ComputedKind::Lookup | ComputedKind::Rollup)) => {
                    let (via, target_kind) = if kind == ComputedKind::Lookup {
                        (EdgeKind::LookupVia, EdgeKind::Lookup)
                    } else {
                        (EdgeKind::RollupVia, EdgeKind::Rollup)
                    };
                    if let Some(link) = field.link_field_id() {
                        graph.add_edge_checked(schema, &field.id, link, via);
                    }
                    if let Some(target) = field.target_field_id() {
                        graph.add_edge_checked(schema, &field.id, target, target_kind);
                    }
                }
                Some(ComputedKind::Count) => {
                    if let Some(link) = field.link_field_id() {
                        graph.add_edge_checked(schema, &field.id, link, EdgeKind::Count);
                    }
                }
                None => {
                    if let Some(inverse) = field.inverse_link_field_id() {
                        if field.field_type.is_link() && schema.field(inverse).is_some() {
                            graph.add_edge(&field.id, inverse, EdgeKind::RecordLink);
                            graph.add_edge(inverse, &field.id, EdgeKind::RecordLink);
                        }
                    }
                }
            }
        }

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            parse_failures = graph.parse_failures.len(),
            "built dependency graph"
        );

        graph
    }

    fn add_node(&mut self, node: Node) {
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    fn add_edge_checked(&mut self, schema: &Schema, from: &str, to: &str, kind: EdgeKind) {
        if schema.field(to).is_some() {
            self.add_edge(from, to, kind);
        } else {
            self.unresolved.push((from.to_string(), to.to_string()));
        }
    }

    /// Add a dependency: `from` depends on `to`
    fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        let edge = Edge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        };
        if !self.edge_set.insert(edge.clone()) {
            return;
        }
        let idx = self.edges.len();
        self.edges.push(edge);
        self.precedents.entry(from.to_string()).or_default().push(idx);
        self.dependents.entry(to.to_string()).or_default().push(idx);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    /// Field ids in schema declaration order
    pub fn field_ids(&self) -> &[String] {
        &self.field_order
    }

    pub fn is_computed(&self, field_id: &str) -> bool {
        self.computed.contains(field_id)
    }

    /// Edges leaving a field, of any kind
    pub fn edges_from<'a>(&'a self, field_id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.precedents
            .get(field_id)
            .into_iter()
            .flat_map(move |idxs| idxs.iter().map(move |&i| &self.edges[i]))
    }

    /// Edges arriving at a field, of any kind
    pub fn edges_to<'a>(&'a self, field_id: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.dependents
            .get(field_id)
            .into_iter()
            .flat_map(move |idxs| idxs.iter().map(move |&i| &self.edges[i]))
    }

    /// Fields this field depends on through computation-ordering edges
    pub fn dependencies<'a>(&'a self, field_id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges_from(field_id)
            .filter(|e| e.kind.is_hierarchical())
            .map(|e| e.to.as_str())
    }

    /// Fields that depend on this field through computation-ordering edges
    pub fn dependents<'a>(&'a self, field_id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges_to(field_id)
            .filter(|e| e.kind.is_hierarchical())
            .map(|e| e.from.as_str())
    }

    /// Every field that transitively depends on `field_id`, nearest first
    pub fn downstream_of(&self, field_id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = AHashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(field_id.to_string());
        queue.push_back(field_id.to_string());

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents(&current) {
                if visited.insert(dependent.to_string()) {
                    result.push(dependent.to_string());
                    queue.push_back(dependent.to_string());
                }
            }
        }

        result
    }

    /// Edges of one kind
    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Formulas that failed to parse while the graph was built
    pub fn parse_failures(&self) -> &[ParseFailure] {
        &self.parse_failures
    }

    /// References to ids missing from the schema, as (field, referenced id)
    pub fn unresolved_references(&self) -> &[(String, String)] {
        &self.unresolved
    }

    pub fn field_count(&self) -> usize {
        self.field_order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formulary_core::{Field, Table};
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut link = Field::link("fldOrderCustomer", "Customer", "tblCustomers");
        link.options.inverse_link_field_id = Some("fldCustomerOrders".into());
        let mut inverse = Field::link("fldCustomerOrders", "Orders", "tblOrders");
        inverse.options.inverse_link_field_id = Some("fldOrderCustomer".into());

        Schema::new(vec![
            Table::new(
                "tblOrders",
                "Orders",
                vec![
                    Field::new("fldQty", "Qty", FieldType::Number),
                    Field::new("fldPrice", "Price", FieldType::Currency),
                    Field::formula(
                        "fldTotal",
                        "Total",
                        "IF({fldQty} > 0, ROUND({fldQty} * {fldPrice}, 2), 0)",
                    ),
                    link,
                    Field::lookup("fldCustName", "Customer Name", "fldOrderCustomer", "fldName"),
                ],
            ),
            Table::new(
                "tblCustomers",
                "Customers",
                vec![
                    Field::new("fldName", "Name", FieldType::SingleLineText),
                    inverse,
                    Field::rollup(
                        "fldSpend",
                        "Spend",
                        "fldCustomerOrders",
                        "fldTotal",
                        "SUM(values)",
                    ),
                    Field::count("fldOrderCount", "Order Count", "fldCustomerOrders"),
                ],
            ),
        ])
        .unwrap()
    }

    fn edge(from: &str, to: &str, kind: EdgeKind) -> Edge {
        Edge {
            from: from.into(),
            to: to.into(),
            kind,
        }
    }

    #[test]
    fn test_nodes_for_tables_and_fields() {
        let graph = build_graph(&schema());
        assert_eq!(graph.nodes().len(), 2 + 9);
        assert!(graph.node(&NodeId::Table("tblOrders".into())).is_some());
        let total = graph.node(&NodeId::Field("fldTotal".into())).unwrap();
        assert_eq!(total.table_id.as_deref(), Some("tblOrders"));
        assert_eq!(graph.field_count(), 9);
    }

    #[test]
    fn test_formula_refs_from_whole_tree() {
        let graph = build_graph(&schema());
        let edges: Vec<&Edge> = graph.edges_from("fldTotal").collect();
        assert_eq!(
            edges,
            vec![
                &edge("fldTotal", "fldQty", EdgeKind::FormulaRef),
                &edge("fldTotal", "fldPrice", EdgeKind::FormulaRef),
            ]
        );
    }

    #[test]
    fn test_lookup_rollup_count_edges() {
        let graph = build_graph(&schema());

        let lookup: Vec<&Edge> = graph.edges_from("fldCustName").collect();
        assert_eq!(
            lookup,
            vec![
                &edge("fldCustName", "fldOrderCustomer", EdgeKind::LookupVia),
                &edge("fldCustName", "fldName", EdgeKind::Lookup),
            ]
        );

        let rollup: Vec<&Edge> = graph.edges_from("fldSpend").collect();
        assert_eq!(
            rollup,
            vec![
                &edge("fldSpend", "fldCustomerOrders", EdgeKind::RollupVia),
                &edge("fldSpend", "fldTotal", EdgeKind::Rollup),
            ]
        );

        let deps: Vec<&str> = graph.dependencies("fldOrderCount").collect();
        assert_eq!(deps, vec!["fldCustomerOrders"]);
    }

    #[test]
    fn test_record_links_bidirectional_and_deduplicated() {
        let graph = build_graph(&schema());
        let links: Vec<&Edge> = graph.edges_of_kind(EdgeKind::RecordLink).collect();
        assert_eq!(links.len(), 2);
        assert!(links.contains(&&edge(
            "fldOrderCustomer",
            "fldCustomerOrders",
            EdgeKind::RecordLink
        )));
        assert!(links.contains(&&edge(
            "fldCustomerOrders",
            "fldOrderCustomer",
            EdgeKind::RecordLink
        )));
        // record links never order computation
        assert_eq!(graph.dependencies("fldOrderCustomer").count(), 0);
    }

    #[test]
    fn test_downstream_of() {
        let graph = build_graph(&schema());
        assert_eq!(
            graph.downstream_of("fldQty"),
            vec!["fldTotal".to_string(), "fldSpend".to_string()]
        );
        assert!(graph.downstream_of("fldName").contains(&"fldCustName".to_string()));
    }

    #[test]
    fn test_parse_failure_falls_back_to_referenced_ids() {
        let mut broken = Field::formula("fldBroken", "Broken", "{fldA} + (");
        broken.options.referenced_field_ids = Some(vec!["fldA".into(), "fldGone".into()]);
        let schema = Schema::new(vec![Table::new(
            "tbl",
            "T",
            vec![Field::new("fldA", "A", FieldType::Number), broken],
        )])
        .unwrap();

        let graph = build_graph(&schema);
        assert_eq!(graph.parse_failures().len(), 1);
        assert_eq!(graph.parse_failures()[0].field_id, "fldBroken");
        assert_eq!(graph.dependencies("fldBroken").collect::<Vec<_>>(), vec!["fldA"]);
        assert_eq!(
            graph.unresolved_references(),
            &[("fldBroken".to_string(), "fldGone".to_string())]
        );
    }
}
