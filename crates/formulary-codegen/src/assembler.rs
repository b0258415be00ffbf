//! Module assembly: one generated file for a whole schema
//!
//! The assembler orders computed fields by depth, asks the backend for each getter and collects
//! every per-field problem as a [`Diagnostic`]. A field that cannot be generated becomes a stub
//! returning null, so the emitted module is always complete.

use crate::backend::{FieldAccess, Getter, GetterBody, ModuleBackend};
use crate::backends::{JavaScriptBackend, PythonBackend, SqlBackend};
use crate::error::{CodegenError, Diagnostic, Severity};
use crate::ident::IdentAllocator;
use crate::lookup::LookupSpec;
use crate::options::{GeneratorOptions, Target};
use crate::transpiler::transpile;
use ahash::{AHashMap, AHashSet};
use formulary_core::{ComputedKind, Field, Schema, Table};
use formulary_formula::{
    build_graph, compute_order, parse, resolve, ComputationGraph, DependencyGraph, FieldRef,
    FormulaNode,
};
use std::collections::BTreeMap;

/// Output of [`generate_module`]
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedModule {
    /// File name -> source text
    pub files: BTreeMap<String, String>,
    /// Per-field problems, in emission order
    pub diagnostics: Vec<Diagnostic>,
    /// Depth levels the module was emitted in
    pub order: ComputationGraph,
}

impl GeneratedModule {
    /// Source of a generated file
    pub fn file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// Source of the only generated file
    pub fn source(&self) -> Option<&str> {
        self.files.values().next().map(String::as_str)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Diagnostics reported for one field
    pub fn diagnostics_for<'a>(&'a self, field_id: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.field_id == field_id)
    }
}

/// Generate the module for every computed field of a schema
pub fn generate_module(schema: &Schema, options: &GeneratorOptions) -> GeneratedModule {
    let graph = build_graph(schema);
    let order = compute_order(&graph);
    generate_with_order(schema, &graph, &order, options)
}

/// Generate a module from an already built graph and order
pub fn generate_with_order(
    schema: &Schema,
    graph: &DependencyGraph,
    order: &ComputationGraph,
    options: &GeneratorOptions,
) -> GeneratedModule {
    tracing::debug!(
        target_language = %options.target,
        fields = graph.field_count(),
        levels = order.levels().len(),
        cycles = order.cycles().len(),
        "generating module"
    );
    match options.target {
        Target::Python => Assembler::new(&PythonBackend, schema, order, options).run(),
        Target::JavaScript => Assembler::new(&JavaScriptBackend, schema, order, options).run(),
        Target::Sql => Assembler::new(&SqlBackend, schema, order, options).run(),
    }
}

struct Assembler<'a, B> {
    backend: &'a B,
    schema: &'a Schema,
    order: &'a ComputationGraph,
    options: &'a GeneratorOptions,
    /// Field id -> getter name (column name for SQL)
    getters: AHashMap<String, String>,
    /// Table id -> identifier
    tables: AHashMap<String, String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, B: ModuleBackend> Assembler<'a, B> {
    fn new(
        backend: &'a B,
        schema: &'a Schema,
        order: &'a ComputationGraph,
        options: &'a GeneratorOptions,
    ) -> Self {
        let mut assembler = Self {
            backend,
            schema,
            order,
            options,
            getters: AHashMap::new(),
            tables: AHashMap::new(),
            diagnostics: Vec::new(),
        };
        assembler.allocate_names();
        assembler
    }

    fn allocate_names(&mut self) {
        let target = self.options.target;
        let naming = self.options.naming;
        let mut module = IdentAllocator::new(target, naming);
        let mut table_names = IdentAllocator::new(target, naming);

        for table in self.schema.tables() {
            let ident = match target {
                Target::Sql => table_names.allocate(&[table.name.as_str(), "computed"]),
                Target::Python | Target::JavaScript => table_names.allocate(&[table.name.as_str()]),
            };
            self.tables.insert(table.id.clone(), ident);

            // view columns share a namespace with the stored columns of their table
            let mut columns = IdentAllocator::new(target, naming);
            if target == Target::Sql {
                columns.reserve("id");
                for field in table.fields.iter().filter(|f| !f.is_computed()) {
                    columns.reserve(self.options.record_keys.key(field));
                }
            }

            for field in table.fields.iter().filter(|f| f.is_computed()) {
                let name = match target {
                    Target::Sql => columns.allocate(&[field.name.as_str()]),
                    Target::Python | Target::JavaScript => {
                        module.allocate(&["get", table.name.as_str(), field.name.as_str()])
                    }
                };
                self.getters.insert(field.id.clone(), name);
            }
        }
    }

    /// Tables read through links, in first-use order
    fn linked_tables(&self) -> Vec<&'a Table> {
        let schema = self.schema;
        let mut seen = AHashSet::new();
        let mut tables = Vec::new();
        for field in schema.computed_fields() {
            if field.computed_kind() == Some(ComputedKind::Formula) {
                continue;
            }
            let linked = field
                .link_field_id()
                .and_then(|link| schema.linked_table(link))
                .or_else(|| {
                    field
                        .target_field_id()
                        .and_then(|target| schema.table_of(target))
                });
            if let Some(table) = linked {
                if seen.insert(table.id.as_str()) {
                    tables.push(table);
                }
            }
        }
        tables
    }

    /// Computed fields grouped into consecutive same-table sections
    ///
    /// Fields are sorted by depth, then table, then declaration order, with blocked fields
    /// last. Backends that group by table get one section per table, sorted the same way
    /// within it.
    fn sections(&self) -> Vec<(&'a Table, Vec<&'a Field>)> {
        let schema = self.schema;
        let mut fields: Vec<(usize, usize, &'a Table, &'a Field)> = schema
            .tables()
            .iter()
            .enumerate()
            .flat_map(|(table_index, table)| {
                table
                    .fields
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.is_computed())
                    .map(move |(index, field)| (table_index, index, table, field))
            })
            .collect();

        let grouped = self.backend.groups_by_table();
        fields.sort_by_key(|(table_index, index, _, field)| {
            let depth = self.order.depth_of(&field.id);
            let group = if grouped { *table_index } else { 0 };
            (group, depth.is_none(), depth.unwrap_or(0), *table_index, *index)
        });

        let mut sections: Vec<(&'a Table, Vec<&'a Field>)> = Vec::new();
        for (_, _, table, field) in fields {
            match sections.last_mut() {
                Some((current, section)) if current.id == table.id => section.push(field),
                _ => sections.push((table, vec![field])),
            }
        }
        sections
    }

    fn run(mut self) -> GeneratedModule {
        let mut out = String::new();
        let linked = self.linked_tables();
        self.backend.write_prelude(&mut out, self.options, &linked);

        let mut emitted = Vec::new();
        for (table, fields) in self.sections() {
            let ident = self
                .tables
                .get(&table.id)
                .cloned()
                .unwrap_or_else(|| table.id.clone());
            self.backend.begin_table(&mut out, table, &ident, self.options);

            // SQL: expressions of this table's generated columns, for inlining
            let mut inline: AHashMap<String, String> = AHashMap::new();
            for field in fields {
                let Some(name) = self.getters.get(&field.id).cloned() else {
                    continue;
                };
                let (source, body) = self.getter_body(field, &inline);
                if self.backend.inlines_computed() {
                    if let GetterBody::Expression(code) = &body {
                        inline.insert(field.id.clone(), format!("({code})"));
                    }
                }
                let getter = Getter {
                    name: &name,
                    field_id: &field.id,
                    field_name: &field.name,
                    source,
                    depth: self.order.depth_of(&field.id),
                    body,
                };
                self.backend.write_getter(&mut out, &getter, self.options);
                emitted.push(name);
            }
            self.backend.end_table(&mut out, table, self.options);
        }
        self.backend.write_epilogue(&mut out, &emitted);
        tracing::debug!(
            file = %self.options.file_name(),
            getters = emitted.len(),
            diagnostics = self.diagnostics.len(),
            "module generated"
        );
        let mut files = BTreeMap::new();
        files.insert(self.options.file_name(), out);
        GeneratedModule {
            files,
            diagnostics: self.diagnostics,
            order: self.order.clone(),
        }
    }

    /// Comment source and body of one computed field
    fn getter_body(
        &mut self,
        field: &Field,
        inline: &AHashMap<String, String>,
    ) -> (Option<String>, GetterBody) {
        let source = field.formula_text().map(str::to_string);

        if let Some(cycle) = self.order.cycle_of(&field.id) {
            let reason = format!("circular dependency: {}", cycle.join(" -> "));
            return (source, self.stub(field, Severity::Error, reason));
        }
        if self.order.is_blocked(&field.id) {
            let reason = "depends on a field in a circular dependency".to_string();
            return (source, self.stub(field, Severity::Error, reason));
        }

        match field.computed_kind() {
            Some(ComputedKind::Formula) => {
                let body = self.formula_body(field, inline);
                (source, body)
            }
            Some(ComputedKind::Lookup | ComputedKind::Rollup | ComputedKind::Count) => {
                self.lookup_body(field)
            }
            None => (
                source,
                self.stub(field, Severity::Error, "not a computed field".to_string()),
            ),
        }
    }

    fn formula_body(&mut self, field: &Field, inline: &AHashMap<String, String>) -> GetterBody {
        let Some(text) = field.formula_text() else {
            let error = CodegenError::MissingOption {
                field_id: field.id.clone(),
                option: "formula",
            };
            return self.stub(field, Severity::Error, error.to_string());
        };
        let ast = match parse(text) {
            Ok(ast) => ast,
            Err(error) => return self.stub(field, Severity::Error, error.to_string()),
        };

        let resolution = resolve(&ast, self.schema);
        for error in &resolution.unresolved {
            self.diagnostics.push(Diagnostic::warning(
                &field.id,
                &field.name,
                format!("{error}; read as a stored value"),
            ));
        }

        let schema = self.schema;
        let keys = self.options.record_keys;
        let inlines = self.backend.inlines_computed();
        let getters = &self.getters;
        let access = |r: &FieldRef| -> FieldAccess {
            match schema.field(&r.field_id) {
                Some(target) if target.is_computed() && inlines => FieldAccess::Inline(
                    inline
                        .get(&target.id)
                        .cloned()
                        .unwrap_or_else(|| "NULL".to_string()),
                ),
                Some(target) if target.is_computed() => match getters.get(&target.id) {
                    Some(getter) => FieldAccess::Computed {
                        getter: getter.clone(),
                    },
                    None => FieldAccess::Stored {
                        key: keys.key(target).to_string(),
                    },
                },
                Some(target) => FieldAccess::Stored {
                    key: keys.key(target).to_string(),
                },
                None => FieldAccess::Stored {
                    key: r.field_id.clone(),
                },
            }
        };

        let transpiled = transpile(&resolution.node, self.backend, &access, self.options.null_safety);
        if inlines {
            self.warn_missing_inlines(field, &resolution.node, inline);
        }
        if transpiled.is_clean() {
            return GetterBody::Expression(transpiled.code);
        }

        let reason = transpiled
            .warnings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        for warning in &transpiled.warnings {
            self.diagnostics
                .push(Diagnostic::warning(&field.id, &field.name, warning.to_string()));
        }
        tracing::warn!(field_id = %field.id, %reason, "field stubbed");
        GetterBody::Stub { reason }
    }

    /// Computed references with no inlined expression, which read as NULL
    fn warn_missing_inlines(
        &mut self,
        field: &Field,
        node: &FormulaNode,
        inline: &AHashMap<String, String>,
    ) {
        for id in node.field_refs() {
            let missing = self
                .schema
                .field(id)
                .map_or(false, |target| target.is_computed() && !inline.contains_key(id));
            if missing {
                self.diagnostics.push(Diagnostic::warning(
                    &field.id,
                    &field.name,
                    format!("depends on {{{id}}}, which was not generated; read as NULL"),
                ));
            }
        }
    }

    fn lookup_body(&mut self, field: &Field) -> (Option<String>, GetterBody) {
        let getters = &self.getters;
        let spec = LookupSpec::from_field(field, self.schema, self.options.record_keys, &|id: &str| {
            getters.get(id).cloned()
        });
        let result = spec.and_then(|spec| {
            let body = self.backend.lookup_body(&spec, self.options.null_safety)?;
            Ok((spec.describe(), body))
        });
        match result {
            Ok((source, body)) => (Some(source), body),
            Err(error) => {
                let severity = match error {
                    CodegenError::MissingOption { .. } => Severity::Error,
                    _ => Severity::Warning,
                };
                (None, self.stub(field, severity, error.to_string()))
            }
        }
    }

    fn stub(&mut self, field: &Field, severity: Severity, reason: String) -> GetterBody {
        tracing::warn!(field_id = %field.id, %severity, %reason, "field stubbed");
        let diagnostic = match severity {
            Severity::Warning => Diagnostic::warning(&field.id, &field.name, reason.clone()),
            Severity::Error => Diagnostic::error(&field.id, &field.name, reason.clone()),
        };
        self.diagnostics.push(diagnostic);
        GetterBody::Stub { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formulary_core::FieldType;
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        Schema::new(vec![
            Table::new(
                "tblOrders",
                "Orders",
                vec![
                    Field::new("fldQty", "Qty", FieldType::Number),
                    Field::new("fldPrice", "Price", FieldType::Currency),
                    Field::formula("fldLabel", "Label", "\"Order: \" & {fldTotal}"),
                    Field::formula("fldTotal", "Total", "{fldQty} * {fldPrice}"),
                    Field::link("fldCustomer", "Customer", "tblCustomers"),
                ],
            ),
            Table::new(
                "tblCustomers",
                "Customers",
                vec![
                    Field::new("fldName", "Name", FieldType::SingleLineText),
                    Field::link("fldOrders", "Orders", "tblOrders"),
                    Field::rollup("fldSpend", "Spend", "fldOrders", "fldQty", "SUM(values)"),
                    Field::count("fldOrderCount", "Order Count", "fldOrders"),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_python_module_in_depth_order() {
        let module = generate_module(&schema(), &GeneratorOptions::default());
        assert!(module.diagnostics.is_empty(), "{:?}", module.diagnostics);
        let source = module.file("computed_fields.py").unwrap();

        let total = source.find("def get_orders_total(").unwrap();
        let label = source.find("def get_orders_label(").unwrap();
        assert!(total < label);
        assert!(source.contains("return \"Order: \" + _text(get_orders_total(record, data))"));
        assert!(source.contains("def get_customers_spend("));
        assert!(source.contains("#   tblOrders (Orders)"));
        assert!(source.contains("# depth 1\n# Label = \"Order: \" & {fldTotal}\n"));
        assert!(source.contains("    \"get_customers_order_count\",\n"));
    }

    #[test]
    fn test_unsupported_function_is_stubbed() {
        let schema = Schema::new(vec![Table::new(
            "tbl",
            "Things",
            vec![
                Field::new("fldA", "A", FieldType::Number),
                Field::formula("fldOdd", "Odd", "WORKDAY({fldA}, 2)"),
            ],
        )])
        .unwrap();
        let module = generate_module(&schema, &GeneratorOptions::for_target(Target::JavaScript));
        let source = module.source().unwrap();
        assert!(source.contains("// Not generated: Function WORKDAY is not supported for javascript"));
        assert_eq!(
            module.diagnostics,
            vec![Diagnostic::warning(
                "fldOdd",
                "Odd",
                "Function WORKDAY is not supported for javascript"
            )]
        );
        assert!(!module.has_errors());
    }

    #[test]
    fn test_cycle_is_isolated() {
        let schema = Schema::new(vec![Table::new(
            "tbl",
            "Loop",
            vec![
                Field::new("fldN", "N", FieldType::Number),
                Field::formula("fldA", "A", "{fldB} + 1"),
                Field::formula("fldB", "B", "{fldA} + 1"),
                Field::formula("fldC", "C", "{fldN} * 2"),
            ],
        )])
        .unwrap();
        let module = generate_module(&schema, &GeneratorOptions::default());
        let source = module.source().unwrap();
        assert!(source.contains("return _num(record.get(\"fldN\")) * 2\n"));
        assert!(source.contains("# Not generated: circular dependency: fldA -> fldB -> fldA"));
        assert!(module.has_errors());
        assert_eq!(module.diagnostics_for("fldC").count(), 0);
        assert_eq!(module.diagnostics_for("fldA").count(), 1);
    }

    #[test]
    fn test_sql_inlines_same_table_columns() {
        let module = generate_module(&schema(), &GeneratorOptions::for_target(Target::Sql));
        let source = module.file("computed_fields.sql").unwrap();
        assert!(source.contains("CREATE OR REPLACE VIEW \"orders_computed\" AS"));
        assert!(source.contains("    t.\"fldQty\" * t.\"fldPrice\" AS \"total\""));
        assert!(source.contains(
            "'Order: ' || COALESCE(CAST((t.\"fldQty\" * t.\"fldPrice\") AS TEXT), '') AS \"label\""
        ));
        assert!(source.contains("FROM \"tblOrders\" AS t;"));
        assert!(source.contains("COALESCE(CARDINALITY(t.\"fldOrders\"), 0) AS \"order_count\""));
    }

    #[test]
    fn test_missing_link_options_are_errors() {
        let schema = Schema::new(vec![Table::new(
            "tbl",
            "Things",
            vec![Field::lookup("fldL", "L", "fldMissing", "fldX")],
        )])
        .unwrap();
        let module = generate_module(&schema, &GeneratorOptions::default());
        assert!(module.has_errors());
        assert!(module
            .source()
            .unwrap()
            .contains("# Not generated: Field fldL is missing option recordLinkFieldId"));
    }

    fn two_tables() -> Schema {
        Schema::new(vec![
            Table::new(
                "tbl1",
                "One",
                vec![
                    Field::new("fldN", "N", FieldType::Number),
                    Field::formula("fldG", "G", "{fldN} + 1"),
                    Field::formula("fldF", "F", "{fldG} * 2"),
                ],
            ),
            Table::new(
                "tbl2",
                "Two",
                vec![
                    Field::new("fldM", "M", FieldType::Number),
                    Field::formula("fldH", "H", "{fldM} + 1"),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_getters_follow_depth_order_across_tables() {
        let module = generate_module(&two_tables(), &GeneratorOptions::default());
        let source = module.source().unwrap();
        let g = source.find("def get_one_g(").unwrap();
        let h = source.find("def get_two_h(").unwrap();
        let f = source.find("def get_one_f(").unwrap();
        assert!(g < h && h < f, "g={g} h={h} f={f}");
        assert_eq!(source.matches("# Table: One (tbl1)").count(), 2);
        assert!(source.contains("    \"get_one_g\",\n    \"get_two_h\",\n    \"get_one_f\",\n"));

        let module = generate_module(&two_tables(), &GeneratorOptions::for_target(Target::JavaScript));
        let source = module.source().unwrap();
        let h = source.find("export function getTwoH(").unwrap();
        let f = source.find("export function getOneF(").unwrap();
        assert!(h < f);
    }

    #[test]
    fn test_sql_views_group_by_table() {
        let module = generate_module(&two_tables(), &GeneratorOptions::for_target(Target::Sql));
        let source = module.source().unwrap();
        assert_eq!(source.matches("CREATE OR REPLACE VIEW").count(), 2);
        let one = source.find("CREATE OR REPLACE VIEW \"one_computed\"").unwrap();
        let f = source.find("AS \"f\"").unwrap();
        let two = source.find("CREATE OR REPLACE VIEW \"two_computed\"").unwrap();
        assert!(one < f && f < two);
        assert!(source.contains("(t.\"fldN\" + 1) * 2 AS \"f\""));
    }

    #[test]
    fn test_unresolved_reference_is_a_warning() {
        let schema = Schema::new(vec![Table::new(
            "tbl",
            "Things",
            vec![Field::formula("fldA", "A", "{fldGone} & \"x\"")],
        )])
        .unwrap();
        let module = generate_module(&schema, &GeneratorOptions::default());
        assert_eq!(
            module.diagnostics,
            vec![Diagnostic::warning(
                "fldA",
                "A",
                "Unresolved field reference: {fldGone}; read as a stored value"
            )]
        );
        assert!(module
            .source()
            .unwrap()
            .contains("return _text(record.get(\"fldGone\")) + \"x\""));
    }

    #[test]
    fn test_sql_warns_when_inlined_column_is_missing() {
        let schema = Schema::new(vec![Table::new(
            "tbl",
            "Words",
            vec![
                Field::new("fldS", "S", FieldType::SingleLineText),
                Field::formula("fldPos", "Pos", "FIND(\"a\", {fldS}, 2)"),
                Field::formula("fldNext", "Next", "{fldPos} + 1"),
            ],
        )])
        .unwrap();
        let module = generate_module(&schema, &GeneratorOptions::for_target(Target::Sql));
        let source = module.source().unwrap();
        assert!(source.contains("    NULL + 1 AS \"next\""));

        let next: Vec<&Diagnostic> = module.diagnostics_for("fldNext").collect();
        assert_eq!(
            next,
            vec![&Diagnostic::warning(
                "fldNext",
                "Next",
                "depends on {fldPos}, which was not generated; read as NULL"
            )]
        );
        assert_eq!(module.diagnostics_for("fldPos").count(), 1);
    }
}
