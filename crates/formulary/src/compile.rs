//! Compilation session over one schema snapshot
//!
//! A [`Compiler`] builds the dependency graph and the depth order on first use and shares them
//! between every generation and analysis call.
//!
//! # Example
//!
//! ```rust
//! use formulary::prelude::*;
//!
//! let compiler = Compiler::from_json(r#"{"tables": [{"id": "tblItems", "name": "Items", "fields": [
//!     {"id": "fldQty", "name": "Qty", "type": "number"},
//!     {"id": "fldDouble", "name": "Double", "type": "formula", "options": {"formula": "{fldQty} * 2"}},
//!     {"id": "fldQuad", "name": "Quad", "type": "formula", "options": {"formula": "{fldDouble} * 2"}}
//! ]}]}"#).unwrap();
//!
//! assert_eq!(compiler.order().depth_of("fldQuad"), Some(1));
//! assert_eq!(compiler.compress("fldQuad", 5).unwrap().text, "({fldQty} * 2) * 2");
//!
//! let module = compiler.generate(&GeneratorOptions::default());
//! assert!(module.file("computed_fields.py").is_some());
//! ```

use crate::{
    build_graph, compress_field, compute_order, generate_with_order, ComputationGraph, Compressed,
    DependencyGraph, GeneratedModule, GeneratorOptions, Result, Schema,
};
use once_cell::unsync::OnceCell;

/// Summary of a schema's computed fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileStats {
    /// Number of computed fields
    pub computed_fields: usize,
    /// Number of fields placed in a depth level
    pub ordered_fields: usize,
    /// Number of depth levels
    pub levels: usize,
    /// Number of distinct dependency cycles
    pub cycles: usize,
    /// Fields on or behind a cycle
    pub blocked_fields: usize,
    /// Formulas that failed to parse
    pub parse_failures: usize,
    /// References to ids missing from the schema
    pub unresolved_references: usize,
}

/// One schema snapshot plus its lazily built analysis
#[derive(Debug)]
pub struct Compiler {
    schema: Schema,
    graph: OnceCell<DependencyGraph>,
    order: OnceCell<ComputationGraph>,
}

impl Compiler {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            graph: OnceCell::new(),
            order: OnceCell::new(),
        }
    }

    /// Load schema metadata of the form `{"tables": [...]}`
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(Schema::from_json(json)?))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Dependency graph of every field
    pub fn graph(&self) -> &DependencyGraph {
        self.graph.get_or_init(|| {
            let graph = build_graph(&self.schema);
            tracing::debug!(
                fields = graph.field_count(),
                edges = graph.edges().len(),
                "dependency graph built"
            );
            graph
        })
    }

    /// Depth levels of the computed fields
    pub fn order(&self) -> &ComputationGraph {
        self.order.get_or_init(|| {
            let order = compute_order(self.graph());
            tracing::debug!(
                levels = order.levels().len(),
                cycles = order.cycles().len(),
                "computation order built"
            );
            order
        })
    }

    /// Generate the module for one target
    pub fn generate(&self, options: &GeneratorOptions) -> GeneratedModule {
        generate_with_order(&self.schema, self.graph(), self.order(), options)
    }

    /// Inline the helper formulas of a formula field, at most `max_depth` levels deep
    ///
    /// Returns `None` when the field does not exist or is not a formula field.
    pub fn compress(&self, field_id: &str, max_depth: usize) -> Option<Compressed> {
        compress_field(field_id, &self.schema, max_depth)
    }

    pub fn stats(&self) -> CompileStats {
        let graph = self.graph();
        let order = self.order();
        CompileStats {
            computed_fields: self.schema.computed_fields().count(),
            ordered_fields: order.len(),
            levels: order.levels().len(),
            cycles: order.cycles().len(),
            blocked_fields: order.blocked().len(),
            parse_failures: graph.parse_failures().len(),
            unresolved_references: graph.unresolved_references().len(),
        }
    }
}

impl From<Schema> for Compiler {
    fn from(schema: Schema) -> Self {
        Self::new(schema)
    }
}
