// Dependency Validator (§4.6): builds the Math reference graph and Axis
// link graph, topologically sorts both, and surfaces typed cycle errors.
// Also enforces the CELL-per-Math invariant. Grounded in
// `original_source/core/entity/Var.py` (the `LinkedVar` comment noting
// the original never guards against reference cycles — this validator is
// the guard the original lacks).

use crate::error::{NodeId, Result, XdfError};
use crate::model::{Axis, Document, MathKey, ParameterKind, Var};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A directed graph over string node ids, built once and topologically
/// sorted via Kahn's algorithm.
struct Graph {
    edges: HashMap<NodeId, Vec<NodeId>>,
}

impl Graph {
    fn new() -> Graph {
        Graph {
            edges: HashMap::new(),
        }
    }

    fn node(&mut self, id: &str) {
        self.edges.entry(id.to_string()).or_default();
    }

    fn edge(&mut self, from: &str, to: &str) {
        self.node(from);
        self.node(to);
        self.edges.get_mut(from).unwrap().push(to.to_string());
    }

    /// Kahn's algorithm. `Ok(order)` on success; `Err(cycle)` names one
    /// cycle's members on failure (not necessarily the only one).
    fn topo_sort(&self) -> core::result::Result<Vec<NodeId>, Vec<NodeId>> {
        let mut indegree: HashMap<&str, usize> =
            self.edges.keys().map(|k| (k.as_str(), 0)).collect();
        for targets in self.edges.values() {
            for t in targets {
                *indegree.get_mut(t.as_str()).unwrap() += 1;
            }
        }

        let mut queue: Vec<&str> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(k, _)| *k)
            .collect();
        queue.sort();

        let mut order = Vec::new();
        let mut i = 0;
        while i < queue.len() {
            let n = queue[i];
            i += 1;
            order.push(n.to_string());
            let mut newly_free = Vec::new();
            for t in &self.edges[n] {
                let d = indegree.get_mut(t.as_str()).unwrap();
                *d -= 1;
                if *d == 0 {
                    newly_free.push(t.as_str());
                }
            }
            newly_free.sort();
            queue.extend(newly_free);
        }

        if order.len() == self.edges.len() {
            Ok(order)
        } else {
            let remaining: HashSet<&str> = self
                .edges
                .keys()
                .map(String::as_str)
                .filter(|k| !order.contains(&k.to_string()))
                .collect();
            let mut cycle: Vec<NodeId> = remaining.into_iter().map(String::from).collect();
            cycle.sort();
            Err(cycle)
        }
    }
}

fn math_node_id(param_idx: usize, key: &MathKey) -> NodeId {
    match *key {
        MathKey::Global => format!("{param_idx}:global"),
        MathKey::Row(r) => format!("{param_idx}:row{r}"),
        MathKey::Column(c) => format!("{param_idx}:col{c}"),
        MathKey::Cell(r, c) => format!("{param_idx}:cell{r}_{c}"),
    }
}

/// All Maths belonging to `param_idx` (a Scalar/Function has one; a
/// Table's ZAxis has every row/col/cell/global equation, per §4.6 "for a
/// Table, that includes *all* of its ZAxis Maths").
fn maths_of(doc: &Document, param_idx: usize) -> Vec<NodeId> {
    let param = doc.parameter(param_idx);
    match &param.kind {
        ParameterKind::Scalar(s) => vec![math_node_id(param_idx, &s.math.key)],
        ParameterKind::Function(f) => {
            let mut out = Vec::new();
            if let Axis::Embedded { math, .. } = &f.x {
                out.push(math_node_id(param_idx, &math.key));
            }
            if let Axis::Embedded { math, .. } = &f.y {
                out.push(math_node_id(param_idx, &math.key));
            }
            out
        }
        ParameterKind::Table(t) => {
            if let Axis::Z { equations, .. } = &t.z {
                equations
                    .iter()
                    .map(|eq| math_node_id(param_idx, &eq.key))
                    .collect()
            } else {
                vec![]
            }
        }
        ParameterKind::Flag(_) | ParameterKind::Patch(_) => vec![],
    }
}

fn all_maths(doc: &Document) -> Vec<(usize, &crate::model::Math)> {
    let mut out = Vec::new();
    for (i, param) in doc.parameters.iter().enumerate() {
        match &param.kind {
            ParameterKind::Scalar(s) => out.push((i, &s.math)),
            ParameterKind::Function(f) => {
                if let Axis::Embedded { math, .. } = &f.x {
                    out.push((i, math));
                }
                if let Axis::Embedded { math, .. } = &f.y {
                    out.push((i, math));
                }
            }
            ParameterKind::Table(t) => {
                if let Axis::Z { equations, .. } = &t.z {
                    for eq in equations {
                        out.push((i, eq));
                    }
                }
            }
            ParameterKind::Flag(_) | ParameterKind::Patch(_) => {}
        }
    }
    out
}

fn build_math_graph(doc: &Document) -> Graph {
    let mut g = Graph::new();
    for (param_idx, math) in all_maths(doc) {
        let from = math_node_id(param_idx, &math.key);
        g.node(&from);
        for var in math.vars.values() {
            if let Var::Linked { param } = var {
                for to in maths_of(doc, *param) {
                    g.edge(&from, &to);
                }
            }
        }
    }
    g
}

fn build_axis_graph(doc: &Document) -> Graph {
    let mut g = Graph::new();
    for (i, param) in doc.parameters.iter().enumerate() {
        g.node(&i.to_string());
        if let ParameterKind::Table(t) = &param.kind {
            for axis in [&t.x, &t.y, &t.z] {
                if let Axis::TableLinked { target } = axis {
                    g.edge(&i.to_string(), &target.to_string());
                }
            }
        }
    }
    g
}

/// Count live (`precalc == false`) `CELL` calls in a Math's IR (§4.6).
fn live_cell_count(ir: &crate::ir::Ir) -> usize {
    use crate::ir::Ir;
    match ir {
        Ir::Literal(_) | Ir::Name(_) => 0,
        Ir::Func(head, args) if head == "CELL" => {
            let precalc = args
                .get(1)
                .map(|a| matches!(a, Ir::Literal(v) if *v != 0.0))
                .unwrap_or(false);
            let here = if precalc { 0 } else { 1 };
            here + args.iter().map(live_cell_count).sum::<usize>()
        }
        Ir::Func(_, args) => args.iter().map(live_cell_count).sum(),
    }
}

/// Run both reference-graph checks and the CELL-count check (§4.6).
/// Errors whose `ErrorKind` is in `ignore` are swallowed rather than
/// propagated, per §7's tolerant-loading policy.
pub fn validate(
    doc: &Document,
    document_path: &Path,
    ignore: &HashSet<crate::error::ErrorKind>,
) -> Result<()> {
    let math_graph = build_math_graph(doc);
    if let Err(cycle) = math_graph.topo_sort() {
        let err = XdfError::MathCycle {
            cycle,
            document: PathBuf::from(document_path),
        };
        if !ignore.contains(&err.kind()) {
            return Err(err);
        }
    }

    let axis_graph = build_axis_graph(doc);
    if let Err(cycle) = axis_graph.topo_sort() {
        let err = XdfError::AxisCycle {
            cycle,
            document: PathBuf::from(document_path),
        };
        if !ignore.contains(&err.kind()) {
            return Err(err);
        }
    }

    for (param_idx, math) in all_maths(doc) {
        let ir = math.ir()?;
        if live_cell_count(&ir) > 1 {
            let err = XdfError::CellEquationError {
                id: math_node_id(param_idx, &math.key),
            };
            if !ignore.contains(&err.kind()) {
                return Err(err);
            }
        }
    }

    Ok(())
}
