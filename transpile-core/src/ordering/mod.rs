//! Dependency ordering for multi-unit translation.
//!
//! Units (top-level C definitions) form a directed graph where `A → B` means
//! "A references a symbol defined in B". Mutually recursive units are grouped
//! with Tarjan's SCC algorithm and translated together; the condensed DAG is
//! ordered so every SCC comes after the SCCs it depends on.
//!
//! ```text
//! A → B → C        order: [C] [B] [A]
//! A ⇄ B → C        order: [C] [A, B]
//! ```
//!
//! [`Schedule`] exposes the same partial order incrementally so independent
//! SCCs can be translated concurrently.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

/// Why one unit depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeReason {
    Call,
    Type,
}

/// Index-based unit graph. Unit names are unique; insertion order is kept
/// and used for every tie-break so ordering is deterministic.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, EdgeReason>,
    index: HashMap<String, NodeIndex>,
}

/// A strongly connected component of the unit graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scc {
    /// Position in [`DependencyOrder::sccs`].
    pub id: usize,
    /// Member unit names in insertion order.
    pub units: Vec<String>,
    /// Ids of SCCs this one depends on (all smaller than `id`).
    pub depends_on: Vec<usize>,
}

impl Scc {
    pub fn label(&self) -> String {
        self.units.join(", ")
    }

    pub fn is_cycle(&self) -> bool {
        self.units.len() > 1
    }
}

/// SCCs in dependency-first topological order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyOrder {
    pub sccs: Vec<Scc>,
}

impl DependencyOrder {
    pub fn len(&self) -> usize {
        self.sccs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sccs.is_empty()
    }

    /// Unit names flattened in processing order.
    pub fn units(&self) -> Vec<&str> {
        self.sccs
            .iter()
            .flat_map(|s| s.units.iter().map(String::as_str))
            .collect()
    }

    /// SCC ids that (transitively) depend on `id`.
    pub fn dependents_of(&self, id: usize) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            for scc in &self.sccs {
                if scc.depends_on.contains(&current) && out.insert(scc.id) {
                    frontier.push(scc.id);
                }
            }
        }
        out
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit (no-op if already present).
    pub fn add_unit(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Record that `from` references `to`. Both are added if missing.
    /// Self references and duplicate edges are ignored.
    pub fn add_dependency(&mut self, from: &str, to: &str, reason: EdgeReason) {
        if from == to {
            self.add_unit(from);
            return;
        }
        let a = self.add_unit(from);
        let b = self.add_unit(to);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, reason);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn unit_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Direct dependencies of `name` with the edge reason, in insertion order.
    pub fn dependencies_of(&self, name: &str) -> Vec<(&str, EdgeReason)> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<(NodeIndex, EdgeReason)> = self
            .graph
            .edges(idx)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        deps.sort_by_key(|(n, _)| n.index());
        deps.into_iter()
            .map(|(n, r)| (self.graph[n].as_str(), r))
            .collect()
    }

    /// Condense into SCCs and order them dependencies-first.
    pub fn order(&self) -> DependencyOrder {
        let components = tarjan_scc(&self.graph);

        // component index for every node; members sorted by insertion order
        let mut members: Vec<Vec<NodeIndex>> = components
            .into_iter()
            .map(|mut c| {
                c.sort_by_key(|n| n.index());
                c
            })
            .collect();
        members.sort_by_key(|c| c[0].index());

        let mut comp_of = vec![0usize; self.graph.node_count()];
        for (ci, comp) in members.iter().enumerate() {
            for n in comp {
                comp_of[n.index()] = ci;
            }
        }

        let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); members.len()];
        for edge in self.graph.edge_references() {
            let (from, to) = (comp_of[edge.source().index()], comp_of[edge.target().index()]);
            if from != to {
                deps[from].insert(to);
            }
        }

        // Kahn's algorithm; among ready components pick the earliest-inserted.
        let mut remaining: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
        for (ci, ds) in deps.iter().enumerate() {
            for &d in ds {
                dependents[d].push(ci);
            }
        }
        let mut ready: BTreeSet<usize> =
            (0..members.len()).filter(|&c| remaining[c] == 0).collect();
        let mut position = vec![usize::MAX; members.len()];
        let mut ordered = Vec::with_capacity(members.len());

        while let Some(ci) = ready.pop_first() {
            position[ci] = ordered.len();
            ordered.push(ci);
            for &dep in &dependents[ci] {
                remaining[dep] -= 1;
                if remaining[dep] == 0 {
                    ready.insert(dep);
                }
            }
        }

        let sccs = ordered
            .iter()
            .enumerate()
            .map(|(id, &ci)| Scc {
                id,
                units: members[ci].iter().map(|n| self.graph[*n].clone()).collect(),
                depends_on: deps[ci]
                    .iter()
                    .map(|d| position[*d])
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            })
            .collect();

        DependencyOrder { sccs }
    }

    /// Breadth-first dependency closure of `name`, nearest first, excluding itself.
    pub fn dependency_closure(
        &self,
        name: &str,
        max_hops: usize,
        max_entries: usize,
    ) -> Vec<(String, EdgeReason, usize)> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::from([name]);
        let mut frontier: Vec<&str> = vec![name];
        for hop in 1..=max_hops {
            let mut next = Vec::new();
            for unit in frontier {
                for (dep, reason) in self.dependencies_of(unit) {
                    if seen.insert(dep) {
                        out.push((dep.to_string(), reason, hop));
                        if out.len() >= max_entries {
                            return out;
                        }
                        next.push(dep);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SccStatus {
    Pending,
    Running,
    Done,
    Failed,
    /// A dependency failed.
    Blocked,
}

/// Incremental readiness tracker over a [`DependencyOrder`].
#[derive(Debug, Clone)]
pub struct Schedule {
    order: DependencyOrder,
    status: Vec<SccStatus>,
}

impl Schedule {
    pub fn new(order: DependencyOrder) -> Self {
        let status = vec![SccStatus::Pending; order.len()];
        Self { order, status }
    }

    pub fn order(&self) -> &DependencyOrder {
        &self.order
    }

    pub fn status(&self, id: usize) -> Option<SccStatus> {
        self.status.get(id).copied()
    }

    /// Pending SCCs whose dependencies are all done, in order.
    pub fn ready(&self) -> Vec<usize> {
        self.order
            .sccs
            .iter()
            .filter(|s| self.status[s.id] == SccStatus::Pending)
            .filter(|s| s.depends_on.iter().all(|d| self.status[*d] == SccStatus::Done))
            .map(|s| s.id)
            .collect()
    }

    pub fn start(&mut self, id: usize) {
        if let Some(s) = self.status.get_mut(id) {
            *s = SccStatus::Running;
        }
    }

    pub fn complete(&mut self, id: usize) {
        if let Some(s) = self.status.get_mut(id) {
            *s = SccStatus::Done;
        }
    }

    /// Mark `id` failed and every transitive dependent blocked. Returns the blocked ids.
    pub fn fail(&mut self, id: usize) -> Vec<usize> {
        if let Some(s) = self.status.get_mut(id) {
            *s = SccStatus::Failed;
        }
        let blocked: Vec<usize> = self.order.dependents_of(id).into_iter().collect();
        for &b in &blocked {
            if self.status[b] == SccStatus::Pending {
                self.status[b] = SccStatus::Blocked;
            }
        }
        blocked
    }

    /// Nothing pending or running.
    pub fn is_finished(&self) -> bool {
        self.status
            .iter()
            .all(|s| !matches!(s, SccStatus::Pending | SccStatus::Running))
    }

    pub fn with_status(&self, status: SccStatus) -> Vec<usize> {
        (0..self.status.len())
            .filter(|&i| self.status[i] == status)
            .collect()
    }
}
