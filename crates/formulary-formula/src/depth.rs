//! Computation depth (topological levels) over the dependency graph

use crate::error::{FormulaError, FormulaResult};
use crate::graph::DependencyGraph;
use ahash::AHashMap;
use std::collections::BTreeMap;

/// Computed fields grouped by computation depth
///
/// depth(f) is 0 when f has no computed dependencies, otherwise one more than the deepest
/// computed dependency. References to basic fields are inputs and add no depth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputationGraph {
    levels: BTreeMap<usize, Vec<String>>,
    depths: AHashMap<String, usize>,
    cycles: Vec<Vec<String>>,
    blocked: Vec<String>,
}

/// Compute depth levels, excluding fields on or behind a cycle
///
/// Cycles are reported through [`ComputationGraph::cycles`]; every field not affected by one is
/// still ordered.
pub fn compute_order(graph: &DependencyGraph) -> ComputationGraph {
    let mut walker = DepthWalker {
        graph,
        states: AHashMap::new(),
        stack: Vec::new(),
        cycles: Vec::new(),
    };

    for id in graph.field_ids() {
        if graph.is_computed(id) {
            walker.visit(id);
        }
    }

    let mut order = ComputationGraph {
        cycles: walker.cycles,
        ..ComputationGraph::default()
    };

    // Second pass keeps declaration order within each level
    for id in graph.field_ids() {
        match walker.states.get(id.as_str()) {
            Some(State::Done(depth)) => {
                order.levels.entry(*depth).or_default().push(id.clone());
                order.depths.insert(id.clone(), *depth);
            }
            Some(State::Failed) => order.blocked.push(id.clone()),
            _ => {}
        }
    }

    for cycle in &order.cycles {
        tracing::warn!(cycle = %cycle.join(" -> "), "circular field dependency");
    }
    tracing::debug!(
        levels = order.levels.len(),
        fields = order.depths.len(),
        blocked = order.blocked.len(),
        "computed field depths"
    );

    order
}

/// Like [`compute_order`], but fails on the first cycle
pub fn try_compute_order(graph: &DependencyGraph) -> FormulaResult<ComputationGraph> {
    let order = compute_order(graph);
    match order.cycles.first() {
        Some(cycle) => Err(FormulaError::CyclicDependency {
            cycle: cycle.clone(),
        }),
        None => Ok(order),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Visiting,
    Done(usize),
    Failed,
}

struct DepthWalker<'g> {
    graph: &'g DependencyGraph,
    states: AHashMap<&'g str, State>,
    stack: Vec<&'g str>,
    cycles: Vec<Vec<String>>,
}

impl<'g> DepthWalker<'g> {
    fn visit(&mut self, id: &'g str) -> Option<usize> {
        match self.states.get(id) {
            Some(State::Done(depth)) => return Some(*depth),
            Some(State::Failed) => return None,
            Some(State::Visiting) => {
                let start = self.stack.iter().position(|s| *s == id).unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(id.to_string());
                self.cycles.push(cycle);
                return None;
            }
            None => {}
        }

        self.states.insert(id, State::Visiting);
        self.stack.push(id);

        let graph = self.graph;
        let mut depth = 0;
        let mut ok = true;
        for dep in graph.dependencies(id) {
            if !graph.is_computed(dep) {
                continue;
            }
            match self.visit(dep) {
                Some(d) => depth = depth.max(d + 1),
                None => ok = false,
            }
        }

        self.stack.pop();
        if ok {
            self.states.insert(id, State::Done(depth));
            Some(depth)
        } else {
            self.states.insert(id, State::Failed);
            None
        }
    }
}

impl ComputationGraph {
    /// Depth -> fields at that depth, in declaration order
    pub fn levels(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.levels
    }

    pub fn depth_of(&self, field_id: &str) -> Option<usize> {
        self.depths.get(field_id).copied()
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.levels.keys().next_back().copied()
    }

    /// All ordered fields, shallowest level first
    pub fn ordered_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.levels.values().flat_map(|ids| ids.iter().map(String::as_str))
    }

    /// Cycles found, each closed on its first field
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Computed fields excluded because they sit on or depend on a cycle
    pub fn blocked(&self) -> &[String] {
        &self.blocked
    }

    pub fn is_blocked(&self, field_id: &str) -> bool {
        self.blocked.iter().any(|id| id == field_id)
    }

    /// Cycle a blocked field belongs to, if it is on one
    pub fn cycle_of(&self, field_id: &str) -> Option<&[String]> {
        self.cycles
            .iter()
            .find(|cycle| cycle.iter().any(|id| id == field_id))
            .map(Vec::as_slice)
    }

    /// Whether a change to `changed` requires recomputing `field`
    pub fn requires_recompute(&self, graph: &DependencyGraph, changed: &str, field: &str) -> bool {
        if changed == field {
            return true;
        }
        if let (Some(from), Some(to)) = (self.depth_of(changed), self.depth_of(field)) {
            // dependents always sit strictly deeper
            if to <= from {
                return false;
            }
        }
        graph.downstream_of(changed).iter().any(|id| id == field)
    }

    /// Number of ordered fields
    pub fn len(&self) -> usize {
        self.depths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }
}
