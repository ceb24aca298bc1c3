//! Dependency-ordered evaluation batches.
//!
//! Kahn's algorithm over the non-circular formula cells. Cells in the same
//! batch have no dependency on one another, so a batch can go to the backend
//! as one combined request (or be evaluated concurrently).

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::CellRef;
use crate::graph::{CellGraph, NodeId};

/// Scheduling failed because the supposedly acyclic cell set contains a
/// cycle. That means cycle detection upstream is broken — fatal for the
/// session, never retried.
#[derive(Debug, Clone)]
pub enum ScheduleError {
    UnexpectedCycle { cells: Vec<CellRef> },
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedCycle { cells } => {
                let shown: Vec<String> = cells.iter().take(5).map(|c| c.to_string()).collect();
                if cells.len() <= 5 {
                    write!(f, "scheduling found an undetected cycle: {}", shown.join(" → "))
                } else {
                    write!(
                        f,
                        "scheduling found an undetected cycle among {} cells: {} → ...",
                        cells.len(),
                        shown.join(" → ")
                    )
                }
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Order `schedulable` nodes into dependency-safe batches.
///
/// Only edges between two schedulable nodes count for ordering; edges to
/// plain values, circular cells, or unknown references are always satisfied.
/// Self-edges are ignored (a self-looping cell is not blocked by itself).
///
/// Guarantee: for every counted edge X→Y, `batch_index(Y) < batch_index(X)`.
/// Batches and their contents are in node-id order for deterministic output.
pub fn schedule_batches(
    graph: &CellGraph,
    schedulable: &FxHashSet<NodeId>,
) -> Result<Vec<Vec<NodeId>>, ScheduleError> {
    if schedulable.is_empty() {
        return Ok(Vec::new());
    }

    // In-degree restricted to the schedulable set.
    let mut in_degree: FxHashMap<NodeId, usize> = FxHashMap::default();
    for &node in schedulable {
        let count = graph
            .dependencies(node)
            .iter()
            .filter(|&&dep| dep != node && schedulable.contains(&dep))
            .count();
        in_degree.insert(node, count);
    }

    let mut ready: Vec<NodeId> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&node, _)| node)
        .collect();
    ready.sort_unstable();

    let mut batches: Vec<Vec<NodeId>> = Vec::new();
    let mut released = 0usize;

    while !ready.is_empty() {
        let batch = std::mem::take(&mut ready);
        released += batch.len();

        for &node in &batch {
            for &dep in graph.dependents(node) {
                if dep == node || !schedulable.contains(&dep) {
                    continue;
                }
                let deg = in_degree
                    .get_mut(&dep)
                    .expect("schedulable node missing from in-degree map");
                *deg -= 1;
                if *deg == 0 {
                    ready.push(dep);
                }
            }
        }

        ready.sort_unstable();
        batches.push(batch);
    }

    if released < schedulable.len() {
        // Something never reached in-degree 0: a cycle leaked past detection.
        let mut stuck: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(&node, _)| node)
            .collect();
        stuck.sort_unstable();
        let cells = stuck.iter().map(|&n| graph.cell_ref(n).clone()).collect();
        return Err(ScheduleError::UnexpectedCycle { cells });
    }

    Ok(batches)
}
