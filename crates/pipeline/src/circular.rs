//! Circular-reference resolution.
//!
//! Each circular group goes through two stages:
//!
//! 1. **Backend-native attempt** — the whole group is submitted as one batch,
//!    leaning on whatever iterative handling the backend has. Cells it
//!    answers with a cycle error stay pending.
//! 2. **Iterative fallback** — pending cells are seeded at `0` (numeric) or
//!    `""` (text) and re-evaluated round by round, substituting the previous
//!    round's working values, until the largest change drops below the
//!    convergence threshold or the iteration cap is hit.
//!
//! Seeds come from zero, never from the workbook's stored values: seeding
//! from the baseline would make validation compare the baseline to itself.

use rustc_hash::FxHashMap;
use serde::Serialize;

use gridcheck_engine::{Cell, CellKind, CellRef, EngineChoice};
use gridcheck_protocol::QueryOutcome;

use crate::cache::{EvalCache, Slot};
use crate::evaluator::{apply_slot, Evaluator};
use crate::stats::SessionStats;

/// Terminal state of one circular group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GroupOutcome {
    /// The backend resolved every member natively.
    Resolved,
    /// The fallback iteration converged below the threshold.
    Converged { iterations: u32 },
    /// Iteration cap reached; last iterates were kept.
    MaxIterations { iterations: u32 },
    /// Neither stage produced a value for any member.
    Unresolved,
}

/// Per-group result reported to the persistence collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub cells: Vec<String>,
    #[serde(flatten)]
    pub outcome: GroupOutcome,
}

pub struct CircularResolver<'a> {
    evaluator: &'a Evaluator,
    max_iterations: u32,
    threshold: f64,
}

impl<'a> CircularResolver<'a> {
    pub fn new(evaluator: &'a Evaluator, max_iterations: u32, threshold: f64) -> Self {
        Self {
            evaluator,
            max_iterations,
            threshold,
        }
    }

    /// Resolve one group, writing members' values and cache entries.
    pub fn resolve_group(
        &self,
        cells: &mut [Cell],
        index: &FxHashMap<CellRef, usize>,
        group: &[CellRef],
        cache: &mut EvalCache,
        stats: &mut SessionStats,
    ) -> GroupReport {
        let mut members: Vec<CellRef> = group.to_vec();
        members.sort();
        let names: Vec<String> = members.iter().map(|r| r.to_string()).collect();

        // Stage 1: hand the whole group to the backend.
        let mut pending: Vec<CellRef> = Vec::new();
        match self
            .evaluator
            .probe(cells, index, &members, &FxHashMap::default(), cache)
        {
            Ok(outcomes) => {
                for r in &members {
                    match outcomes.get(r) {
                        Some(QueryOutcome::Number { value }) => {
                            self.commit(cells, index, cache, r, Slot::Number(*value), EngineChoice::BackendNative);
                        }
                        Some(QueryOutcome::Text { value }) => {
                            self.commit(cells, index, cache, r, Slot::Text(value.clone()), EngineChoice::BackendNative);
                        }
                        Some(QueryOutcome::Error { value }) => {
                            stats.count_formula_error(value);
                            pending.push(r.clone());
                        }
                        Some(QueryOutcome::Empty) | None => pending.push(r.clone()),
                    }
                }
            }
            Err(_) => {
                stats.backend_errors += members.len();
                pending = members.clone();
            }
        }

        if pending.is_empty() {
            stats.groups_resolved_native += 1;
            return GroupReport {
                cells: names,
                outcome: GroupOutcome::Resolved,
            };
        }
        // Stage 2: Jacobi-style iteration over the still-pending members.
        let mut working: FxHashMap<CellRef, Option<Slot>> = pending
            .iter()
            .map(|r| {
                let seed = match index.get(r).map(|&i| cells[i].kind) {
                    Some(CellKind::TextFormula) => Slot::Text(String::new()),
                    _ => Slot::Number(0.0),
                };
                (r.clone(), Some(seed))
            })
            .collect();

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            iterations += 1;
            let overlay: FxHashMap<CellRef, Slot> = working
                .iter()
                .filter_map(|(r, slot)| slot.clone().map(|s| (r.clone(), s)))
                .collect();

            let mut next: FxHashMap<CellRef, Option<Slot>> = FxHashMap::default();
            let mut max_change: f64 = 0.0;

            for r in &pending {
                let outcome = self
                    .evaluator
                    .probe(cells, index, std::slice::from_ref(r), &overlay, cache);
                let slot = match outcome {
                    Ok(map) => match map.get(r) {
                        Some(QueryOutcome::Number { value }) => {
                            if let Some(Some(Slot::Number(old))) = working.get(r) {
                                max_change = max_change.max((value - old).abs());
                            }
                            Some(Slot::Number(*value))
                        }
                        Some(QueryOutcome::Text { value }) => Some(Slot::Text(value.clone())),
                        Some(QueryOutcome::Error { value }) => {
                            stats.count_formula_error(value);
                            None
                        }
                        Some(QueryOutcome::Empty) | None => None,
                    },
                    Err(_) => {
                        stats.backend_errors += 1;
                        None
                    }
                };
                next.insert(r.clone(), slot);
            }

            working = next;
            if max_change < self.threshold {
                converged = true;
                break;
            }
        }
        stats.max_fallback_iterations = stats.max_fallback_iterations.max(iterations);

        let mut resolved_fallback = 0;
        for r in &pending {
            match working.get(r).cloned().flatten() {
                Some(slot) => {
                    self.commit(cells, index, cache, r, slot, EngineChoice::IterativeFallback);
                    resolved_fallback += 1;
                }
                None => cache.set_unresolved(r.clone()),
            }
        }

        let outcome = if resolved_fallback == 0 {
            // Iteration added nothing, whatever the backend managed natively.
            stats.groups_failed += 1;
            GroupOutcome::Unresolved
        } else if converged {
            stats.groups_converged += 1;
            GroupOutcome::Converged { iterations }
        } else {
            stats.groups_max_iterations += 1;
            GroupOutcome::MaxIterations { iterations }
        };

        GroupReport {
            cells: names,
            outcome,
        }
    }

    fn commit(
        &self,
        cells: &mut [Cell],
        index: &FxHashMap<CellRef, usize>,
        cache: &mut EvalCache,
        r: &CellRef,
        slot: Slot,
        engine: EngineChoice,
    ) {
        if let Some(&i) = index.get(r) {
            apply_slot(&mut cells[i], &slot, engine);
        }
        cache.resolve_unresolved(r.clone(), slot);
    }
}
