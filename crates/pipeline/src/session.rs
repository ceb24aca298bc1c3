//! The evaluation session.
//!
//! Stage order: count cells → build graph → detect cycles → schedule →
//! evaluate batches → resolve circular groups → validate → report. Stages
//! run sequentially; each owns the cell fields it writes, so nothing here
//! needs locks.
//!
//! Cancellation is cooperative: the token is checked between stages and
//! between batches (a backend call is atomic from our side), and a cancelled
//! session still reports everything it finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use gridcheck_backend::CalcBackend;
use gridcheck_config::Settings;
use gridcheck_engine::{
    schedule_batches, Cell, CellGraph, CellKind, CellRef, EngineChoice, NodeId, ScheduleError,
};
use gridcheck_validate::{validate_cells, ValidationReport};

use crate::cache::{EvalCache, Slot};
use crate::circular::{CircularResolver, GroupReport};
use crate::evaluator::{apply_slot, Evaluator};
use crate::progress::{NoopProgress, ProgressSink};
use crate::stats::SessionStats;

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    /// Cancelled between stages; resolved work is kept.
    Cancelled,
}

/// Hard session failures.
///
/// Everything recoverable (backend outages, formula errors, convergence
/// failures) becomes counts instead; only internal inconsistency aborts.
#[derive(Debug)]
pub enum SessionError {
    Schedule(ScheduleError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schedule(e) => write!(f, "internal scheduling inconsistency: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ScheduleError> for SessionError {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}

/// Everything the persistence collaborator receives for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub status: SessionStatus,
    pub stats: SessionStats,
    pub validation: ValidationReport,
    pub groups: Vec<GroupReport>,
    pub engine_version: String,
    pub run_at: String,
    pub cells: Vec<Cell>,
}

/// One workbook evaluation run.
pub struct Session {
    settings: Settings,
    evaluator: Evaluator,
    progress: Box<dyn ProgressSink>,
    cancel: CancelToken,
}

impl Session {
    pub fn new(settings: Settings, backend: Arc<dyn CalcBackend>) -> Self {
        Self {
            settings,
            evaluator: Evaluator::new(backend),
            progress: Box::new(NoopProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Token callers can use to cancel this session from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the full pipeline over one workbook's cells.
    pub fn run(&self, mut cells: Vec<Cell>) -> Result<SessionReport, SessionError> {
        let mut stats = SessionStats::new();
        let mut group_reports: Vec<GroupReport> = Vec::new();

        stats.total_cells = cells.len();
        for cell in &cells {
            match cell.kind {
                CellKind::Value => stats.value_cells += 1,
                CellKind::Formula => stats.formula_cells += 1,
                CellKind::TextFormula => stats.text_formula_cells += 1,
            }
        }

        // Build the dependency graph.
        self.progress
            .report("dependencies", 30.0, "building dependency graph");
        let index: FxHashMap<CellRef, usize> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.cell_ref(), i))
            .collect();
        let mut graph = CellGraph::new();
        for cell in &cells {
            if cell.is_formula() {
                graph.add_cell(&cell.cell_ref(), &cell.depends_on);
            } else {
                graph.intern(&cell.cell_ref());
            }
        }

        // Detect circular groups and annotate membership.
        let groups: Vec<Vec<CellRef>> = graph
            .circular_groups()
            .into_iter()
            .map(|group| group.into_iter().map(|n| graph.cell_ref(n).clone()).collect())
            .collect();
        stats.circular_groups = groups.len();
        for group in &groups {
            for r in group {
                if let Some(&i) = index.get(r) {
                    cells[i].is_circular = true;
                    stats.circular_cells += 1;
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(self.finish(cells, stats, group_reports, SessionStatus::Cancelled));
        }

        // Order the acyclic formulas.
        self.progress
            .report("scheduling", 42.0, "ordering formulas by dependency");
        let schedulable: FxHashSet<NodeId> = cells
            .iter()
            .filter(|c| c.is_formula() && !c.is_circular)
            .filter_map(|c| graph.node(&c.cell_ref()))
            .collect();
        let batches = schedule_batches(&graph, &schedulable)?;
        stats.batches = batches.len();

        // Evaluate batch by batch.
        let mut cache = EvalCache::new();
        let total_batches = batches.len();
        for (batch_idx, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(self.finish(cells, stats, group_reports, SessionStatus::Cancelled));
            }
            let percent = 45.0 + 25.0 * (batch_idx as f64 / total_batches.max(1) as f64);
            self.progress.report(
                "evaluation",
                percent,
                &format!(
                    "evaluating batch {}/{} ({} formulas)",
                    batch_idx + 1,
                    total_batches,
                    batch.len()
                ),
            );

            let mut to_backend: Vec<CellRef> = Vec::new();
            for &node in batch {
                let r = graph.cell_ref(node).clone();
                let Some(&i) = index.get(&r) else { continue };
                let cell = &mut cells[i];
                match cell.kind {
                    CellKind::TextFormula => {
                        // Local fast path; text formulas never reach the backend.
                        match cell.formula.as_deref().and_then(evaluate_text_formula) {
                            Some(text) => {
                                cell.calculated_text = Some(text.clone());
                                cell.engine = EngineChoice::BackendNative;
                                cache.insert(r, Slot::Text(text));
                            }
                            None => cache.set_unresolved(r),
                        }
                    }
                    CellKind::Formula => {
                        if let Some(v) = cell.formula.as_deref().and_then(parse_constant_formula) {
                            cell.calculated_number = Some(v);
                            cell.engine = EngineChoice::BackendNative;
                            cache.insert(r, Slot::Number(v));
                        } else {
                            to_backend.push(r);
                        }
                    }
                    CellKind::Value => {}
                }
            }

            self.evaluator
                .run_batch(&cells, &index, &to_backend, &mut cache, &mut stats);
            for r in &to_backend {
                let Some(&i) = index.get(r) else { continue };
                if let Some(slot) = cache.get(r).cloned() {
                    apply_slot(&mut cells[i], &slot, EngineChoice::BackendNative);
                }
            }
        }

        // Resolve circular groups.
        if !groups.is_empty() {
            let resolver = CircularResolver::new(
                &self.evaluator,
                self.settings.max_circular_iterations,
                self.settings.convergence_threshold,
            );
            let total_groups = groups.len();
            for (group_idx, group) in groups.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    return Ok(self.finish(cells, stats, group_reports, SessionStatus::Cancelled));
                }
                let percent = 70.0 + 10.0 * (group_idx as f64 / total_groups as f64);
                self.progress.report(
                    "circular",
                    percent,
                    &format!(
                        "resolving circular group {}/{} ({} cells)",
                        group_idx + 1,
                        total_groups,
                        group.len()
                    ),
                );
                let report =
                    resolver.resolve_group(&mut cells, &index, group, &mut cache, &mut stats);
                group_reports.push(report);
            }
        }

        Ok(self.finish(cells, stats, group_reports, SessionStatus::Completed))
    }

    /// Validation plus report assembly. Also the cancellation exit, so a
    /// partial session still accounts for everything it touched.
    fn finish(
        &self,
        mut cells: Vec<Cell>,
        mut stats: SessionStats,
        groups: Vec<GroupReport>,
        status: SessionStatus,
    ) -> SessionReport {
        self.progress
            .report("validation", 97.0, "validating calculated values");
        let validation = validate_cells(
            &mut cells,
            self.settings.tolerance,
            self.settings.exact_epsilon,
        );
        stats.exact_matches = validation.exact_matches;
        stats.within_tolerance = validation.within_tolerance;
        stats.mismatches = validation.mismatches;
        stats.unresolved = validation.unresolved;

        self.progress.report("complete", 100.0, "session complete");

        SessionReport {
            status,
            stats,
            validation,
            groups,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            cells,
        }
    }
}

/// Evaluate the text formulas that don't need a backend: `=""` and
/// `="literal"`. Anything else returns `None`.
fn evaluate_text_formula(formula: &str) -> Option<String> {
    let body = formula.trim().strip_prefix("=\"")?.strip_suffix('"')?;
    if body.contains('"') {
        return None;
    }
    Some(body.to_string())
}

/// Constant numeric formulas (`=5`, `=3.25`) resolve locally.
fn parse_constant_formula(formula: &str) -> Option<f64> {
    let body = formula.trim().strip_prefix('=')?.trim();
    body.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_text_formula() {
        assert_eq!(evaluate_text_formula("=\"\""), Some(String::new()));
        assert_eq!(evaluate_text_formula("=\"done\""), Some("done".into()));
        assert_eq!(evaluate_text_formula(" =\"x\" "), Some("x".into()));
        assert_eq!(evaluate_text_formula("=CONCAT(A1,B1)"), None);
        assert_eq!(evaluate_text_formula("=\"a\"&\"b\""), None);
        assert_eq!(evaluate_text_formula("=5"), None);
    }

    #[test]
    fn test_parse_constant_formula() {
        assert_eq!(parse_constant_formula("=5"), Some(5.0));
        assert_eq!(parse_constant_formula("=3.25"), Some(3.25));
        assert_eq!(parse_constant_formula("= 2 "), Some(2.0));
        assert_eq!(parse_constant_formula("=5+10"), None);
        assert_eq!(parse_constant_formula("=A1"), None);
        assert_eq!(parse_constant_formula("=inf"), None);
        assert_eq!(parse_constant_formula("=NaN"), None);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
