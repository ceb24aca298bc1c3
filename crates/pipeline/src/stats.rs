//! Session statistics.
//!
//! One accumulator threaded through the stages and returned with the report.

use serde::Serialize;

use crate::evaluator::ErrorClass;

/// Aggregate counters for one evaluation session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub total_cells: usize,
    pub value_cells: usize,
    pub formula_cells: usize,
    pub text_formula_cells: usize,

    /// Cells that are members of some circular group.
    pub circular_cells: usize,
    pub circular_groups: usize,
    pub groups_resolved_native: usize,
    pub groups_converged: usize,
    pub groups_max_iterations: usize,
    pub groups_failed: usize,
    /// Largest fallback iteration count across all groups.
    pub max_fallback_iterations: u32,

    pub batches: usize,
    /// Whole-batch transport/backend failures, one per affected query.
    pub backend_errors: usize,
    /// Typed formula errors by severity class.
    pub routine_formula_errors: usize,
    pub serious_formula_errors: usize,
    pub cycle_errors: usize,
    pub other_formula_errors: usize,
    /// Queries the backend answered with `empty` (or not at all).
    pub empty_results: usize,

    /// Validation outcome counts (filled in by the validation stage).
    pub exact_matches: usize,
    pub within_tolerance: usize,
    pub mismatches: usize,
    pub unresolved: usize,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn count_formula_error(&mut self, code: &str) {
        match ErrorClass::of(code) {
            ErrorClass::Routine => self.routine_formula_errors += 1,
            ErrorClass::Serious => self.serious_formula_errors += 1,
            ErrorClass::Cycle => self.cycle_errors += 1,
            ErrorClass::Other => self.other_formula_errors += 1,
        }
    }

    /// Typed formula errors across all severity classes.
    pub fn formula_errors(&self) -> usize {
        self.routine_formula_errors
            + self.serious_formula_errors
            + self.cycle_errors
            + self.other_formula_errors
    }

    /// Format as a concise one-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} cells ({} formulas, {} text formulas), {} batches, {} circular in {} groups, \
             {} exact, {} within tolerance, {} mismatched, {} unresolved",
            self.total_cells,
            self.formula_cells,
            self.text_formula_cells,
            self.batches,
            self.circular_cells,
            self.circular_groups,
            self.exact_matches,
            self.within_tolerance,
            self.mismatches,
            self.unresolved,
        )
    }

    /// Format as a one-line log entry.
    ///
    /// Format: `[session] 628 cells  batches=7  circular=4/2  errors=1  mismatches=0  unresolved=3`
    pub fn log_line(&self) -> String {
        format!(
            "[session] {} cells  batches={}  circular={}/{}  errors={}  mismatches={}  unresolved={}",
            self.total_cells,
            self.batches,
            self.circular_cells,
            self.circular_groups,
            self.backend_errors + self.formula_errors(),
            self.mismatches,
            self.unresolved,
        )
    }
}
