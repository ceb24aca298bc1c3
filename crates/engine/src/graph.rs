//! Dependency graph for formula cells.
//!
//! Nodes are interned cell references addressed by integer index; edges are
//! adjacency lists of indices, so the graph itself never holds cyclic
//! ownership even when the formulas do.
//!
//! # Edge Direction
//!
//! ```text
//! X → Y  means  "X depends on Y"  (Y is a precedent of X)
//! ```

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::CellRef;

/// Index of a node in the graph arena.
pub type NodeId = u32;

/// Directed dependency graph over interned cell references.
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** if Y ∈ deps\[X\] then X ∈ dependents\[Y\].
/// 2. **No duplicate edges:** `add_dependency` is idempotent.
/// 3. Built once per evaluation session; read-only after cycle detection.
#[derive(Default, Debug, Clone)]
pub struct CellGraph {
    /// Arena: node id → reference.
    refs: Vec<CellRef>,
    /// Interning map: reference → node id.
    index: FxHashMap<CellRef, NodeId>,
    /// deps[X] = nodes X depends on.
    deps: Vec<Vec<NodeId>>,
    /// dependents[Y] = nodes depending on Y.
    dependents: Vec<Vec<NodeId>>,
}

impl CellGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Add a node for this reference if missing, returning its id.
    pub fn intern(&mut self, r: &CellRef) -> NodeId {
        if let Some(&id) = self.index.get(r) {
            return id;
        }
        let id = self.refs.len() as NodeId;
        self.refs.push(r.clone());
        self.index.insert(r.clone(), id);
        self.deps.push(Vec::new());
        self.dependents.push(Vec::new());
        id
    }

    /// Look up a node id without inserting.
    pub fn node(&self, r: &CellRef) -> Option<NodeId> {
        self.index.get(r).copied()
    }

    /// The reference interned at this node.
    pub fn cell_ref(&self, id: NodeId) -> &CellRef {
        &self.refs[id as usize]
    }

    /// Record that `cell` depends on `dep`.
    ///
    /// Both endpoints are interned on demand; edges to references that never
    /// appear as cells are harmless (they just never block scheduling).
    pub fn add_dependency(&mut self, cell: &CellRef, dep: &CellRef) {
        let from = self.intern(cell);
        let to = self.intern(dep);
        if self.deps[from as usize].contains(&to) {
            return;
        }
        self.deps[from as usize].push(to);
        self.dependents[to as usize].push(from);
    }

    /// Add a cell node and one edge per dependency.
    pub fn add_cell(&mut self, cell: &CellRef, deps: &[CellRef]) {
        self.intern(cell);
        for dep in deps {
            self.add_dependency(cell, dep);
        }
    }

    /// Nodes this node depends on.
    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        &self.deps[id as usize]
    }

    /// Nodes depending on this node.
    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        &self.dependents[id as usize]
    }

    /// Find all circular-reference groups: strongly connected components of
    /// size > 1.
    ///
    /// A single cell whose formula references its own address forms a size-1
    /// component with a self-edge; those are deliberately NOT flagged here.
    /// The backend reports them as cycle errors instead.
    ///
    /// Iterative Tarjan's, so deep graphs don't overflow the call stack.
    /// Deterministic: roots visited in node-id order, each group sorted by
    /// node id, groups ordered by discovery.
    pub fn circular_groups(&self) -> Vec<Vec<NodeId>> {
        let n = self.refs.len();
        if n == 0 {
            return Vec::new();
        }

        const UNVISITED: u32 = u32::MAX;
        let mut indices = vec![UNVISITED; n];
        let mut lowlinks = vec![0u32; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<NodeId> = Vec::new();
        let mut counter: u32 = 0;
        let mut groups: Vec<Vec<NodeId>> = Vec::new();

        struct Frame {
            node: NodeId,
            next: usize,
        }

        for root in 0..n as NodeId {
            if indices[root as usize] != UNVISITED {
                continue;
            }

            let mut dfs: Vec<Frame> = Vec::new();
            indices[root as usize] = counter;
            lowlinks[root as usize] = counter;
            counter += 1;
            stack.push(root);
            on_stack[root as usize] = true;
            dfs.push(Frame { node: root, next: 0 });

            while let Some(frame) = dfs.last_mut() {
                let v = frame.node;
                if frame.next < self.deps[v as usize].len() {
                    let w = self.deps[v as usize][frame.next];
                    frame.next += 1;

                    if indices[w as usize] == UNVISITED {
                        indices[w as usize] = counter;
                        lowlinks[w as usize] = counter;
                        counter += 1;
                        stack.push(w);
                        on_stack[w as usize] = true;
                        dfs.push(Frame { node: w, next: 0 });
                    } else if on_stack[w as usize] {
                        let w_idx = indices[w as usize];
                        if w_idx < lowlinks[v as usize] {
                            lowlinks[v as usize] = w_idx;
                        }
                    }
                } else {
                    dfs.pop();
                    let v_low = lowlinks[v as usize];

                    if let Some(parent) = dfs.last() {
                        let p = parent.node as usize;
                        if v_low < lowlinks[p] {
                            lowlinks[p] = v_low;
                        }
                    }

                    if v_low == indices[v as usize] {
                        let mut scc = Vec::new();
                        loop {
                            let w = stack.pop().expect("Tarjan stack underflow");
                            on_stack[w as usize] = false;
                            scc.push(w);
                            if w == v {
                                break;
                            }
                        }
                        if scc.len() > 1 {
                            scc.sort_unstable();
                            groups.push(scc);
                        }
                    }
                }
            }
        }

        groups
    }

    /// Union of all circular groups.
    pub fn circular_members(&self) -> FxHashSet<NodeId> {
        self.circular_groups().into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(addr: &str) -> CellRef {
        CellRef::new("Sheet1", addr)
    }

    #[test]
    fn test_empty_graph() {
        let graph = CellGraph::new();
        assert!(graph.is_empty());
        assert!(graph.circular_groups().is_empty());
    }

    #[test]
    fn test_intern_idempotent() {
        let mut graph = CellGraph::new();
        let a = graph.intern(&r("A1"));
        let b = graph.intern(&r("A1"));
        assert_eq!(a, b);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_edges_are_bidirectional() {
        let mut graph = CellGraph::new();
        graph.add_cell(&r("B1"), &[r("A1")]);

        let b1 = graph.node(&r("B1")).unwrap();
        let a1 = graph.node(&r("A1")).unwrap();
        assert_eq!(graph.dependencies(b1), &[a1]);
        assert_eq!(graph.dependents(a1), &[b1]);
        assert!(graph.dependencies(a1).is_empty());
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = CellGraph::new();
        graph.add_dependency(&r("B1"), &r("A1"));
        graph.add_dependency(&r("B1"), &r("A1"));
        let b1 = graph.node(&r("B1")).unwrap();
        assert_eq!(graph.dependencies(b1).len(), 1);
    }

    #[test]
    fn test_unknown_dependency_gets_a_node() {
        // C1 references a cell nobody ever decodes; the edge is harmless.
        let mut graph = CellGraph::new();
        graph.add_cell(&r("C1"), &[CellRef::new("Missing", "Q99")]);
        assert_eq!(graph.len(), 2);
        assert!(graph.circular_groups().is_empty());
    }

    #[test]
    fn test_two_cell_cycle() {
        let mut graph = CellGraph::new();
        graph.add_cell(&r("A1"), &[r("B1")]);
        graph.add_cell(&r("B1"), &[r("A1")]);

        let groups = graph.circular_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_chain_is_not_circular() {
        // A → B → C, no back edge.
        let mut graph = CellGraph::new();
        graph.add_cell(&r("A1"), &[r("B1")]);
        graph.add_cell(&r("B1"), &[r("C1")]);

        assert!(graph.circular_groups().is_empty());
    }

    #[test]
    fn test_self_loop_not_flagged() {
        // A1 = A1 + 1: size-1 component, stays unflagged.
        let mut graph = CellGraph::new();
        graph.add_cell(&r("A1"), &[r("A1")]);

        assert!(graph.circular_groups().is_empty());
        let a1 = graph.node(&r("A1")).unwrap();
        assert_eq!(graph.dependencies(a1), &[a1]);
    }

    #[test]
    fn test_three_cell_cycle() {
        let mut graph = CellGraph::new();
        graph.add_cell(&r("A1"), &[r("C1")]);
        graph.add_cell(&r("B1"), &[r("A1")]);
        graph.add_cell(&r("C1"), &[r("B1")]);

        let members = graph.circular_members();
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn test_downstream_of_cycle_excluded() {
        // A ↔ B circular, C depends on A but is not itself circular.
        let mut graph = CellGraph::new();
        graph.add_cell(&r("A1"), &[r("B1")]);
        graph.add_cell(&r("B1"), &[r("A1")]);
        graph.add_cell(&r("C1"), &[r("A1")]);

        let members = graph.circular_members();
        assert_eq!(members.len(), 2);
        assert!(!members.contains(&graph.node(&r("C1")).unwrap()));
    }

    #[test]
    fn test_disjoint_cycles_are_separate_groups() {
        let mut graph = CellGraph::new();
        graph.add_cell(&r("A1"), &[r("B1")]);
        graph.add_cell(&r("B1"), &[r("A1")]);
        graph.add_cell(&r("C1"), &[r("D1")]);
        graph.add_cell(&r("D1"), &[r("C1")]);

        let groups = graph.circular_groups();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.len() == 2));
    }

    #[test]
    fn test_determinism() {
        let build = || {
            let mut graph = CellGraph::new();
            graph.add_cell(&r("A1"), &[r("B1"), r("C1")]);
            graph.add_cell(&r("B1"), &[r("A1")]);
            graph.add_cell(&r("C1"), &[r("A1")]);
            graph.circular_groups()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let mut graph = CellGraph::new();
        for i in 1..5000u32 {
            graph.add_cell(&r(&format!("A{}", i + 1)), &[r(&format!("A{i}"))]);
        }
        assert!(graph.circular_groups().is_empty());
    }
}
