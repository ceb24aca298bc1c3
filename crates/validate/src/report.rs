use serde::Serialize;

use gridcheck_engine::Cell;

use crate::classify::check_cell;
use crate::model::{CellCheck, CheckBucket};

/// Detail entries are capped so a badly broken workbook doesn't balloon the
/// report; counts always cover everything.
const MAX_DETAIL_CELLS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Partial,
    Failed,
}

/// Summary of one validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    /// Formula cells examined.
    pub total: usize,
    pub exact_matches: usize,
    pub within_tolerance: usize,
    pub mismatches: usize,
    pub unresolved: usize,
    /// Formula cells that resolved but had no stored baseline to compare.
    pub no_baseline: usize,
    pub tolerance: f64,
    /// First `shown` problem cells (mismatched or unresolved), in cell order.
    pub problem_cells: Vec<CellCheck>,
    pub total_problems: usize,
    pub shown: usize,
}

/// Validate every formula cell, marking mismatches on the cells themselves.
///
/// The validator is the only stage that writes `has_mismatch` /
/// `mismatch_diff`.
pub fn validate_cells(cells: &mut [Cell], tolerance: f64, exact_epsilon: f64) -> ValidationReport {
    let mut total = 0;
    let mut exact_matches = 0;
    let mut within_tolerance = 0;
    let mut mismatches = 0;
    let mut unresolved = 0;
    let mut no_baseline = 0;
    let mut problems: Vec<CellCheck> = Vec::new();

    for cell in cells.iter_mut() {
        if !cell.is_formula() {
            continue;
        }
        total += 1;

        match check_cell(cell, tolerance, exact_epsilon) {
            Some(check) => {
                match check.bucket {
                    CheckBucket::ExactMatch => exact_matches += 1,
                    CheckBucket::WithinTolerance => within_tolerance += 1,
                    CheckBucket::Mismatch => {
                        mismatches += 1;
                        cell.has_mismatch = true;
                        cell.mismatch_diff = check.diff;
                    }
                    CheckBucket::Unresolved => unresolved += 1,
                }
                if check.bucket == CheckBucket::Mismatch || check.bucket == CheckBucket::Unresolved
                {
                    problems.push(check);
                }
            }
            None => no_baseline += 1,
        }
    }

    let status = if mismatches == 0 && unresolved == 0 {
        ValidationStatus::Passed
    } else if exact_matches + within_tolerance > 0 {
        ValidationStatus::Partial
    } else {
        ValidationStatus::Failed
    };

    let total_problems = problems.len();
    problems.truncate(MAX_DETAIL_CELLS);
    let shown = problems.len();

    ValidationReport {
        status,
        total,
        exact_matches,
        within_tolerance,
        mismatches,
        unresolved,
        no_baseline,
        tolerance,
        problem_cells: problems,
        total_problems,
        shown,
    }
}

impl ValidationReport {
    /// Concise one-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{:?}: {} formulas, {} exact, {} within tolerance, {} mismatched, {} unresolved",
            self.status,
            self.total,
            self.exact_matches,
            self.within_tolerance,
            self.mismatches,
            self.unresolved,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcheck_engine::Cell;

    fn resolved(addr: &str, raw: f64, calc: f64) -> Cell {
        let mut cell = Cell::formula("Sheet1", addr, "=X", Some(raw));
        cell.calculated_number = Some(calc);
        cell
    }

    #[test]
    fn test_all_matched_passes() {
        let mut cells = vec![
            resolved("A1", 1.0, 1.0),
            resolved("A2", 2.0, 2.0 + 1e-8),
            Cell::number("Sheet1", "A3", 9.0),
        ];
        let report = validate_cells(&mut cells, 1e-6, 1e-10);
        assert_eq!(report.status, ValidationStatus::Passed);
        assert_eq!(report.total, 2);
        assert_eq!(report.exact_matches, 1);
        assert_eq!(report.within_tolerance, 1);
        assert!(report.problem_cells.is_empty());
    }

    #[test]
    fn test_mismatch_marks_cell() {
        let mut cells = vec![resolved("A1", 1.0, 1.0), resolved("A2", 5.0, 7.0)];
        let report = validate_cells(&mut cells, 1e-6, 1e-10);
        assert_eq!(report.status, ValidationStatus::Partial);
        assert_eq!(report.mismatches, 1);
        assert!(cells[1].has_mismatch);
        assert_eq!(cells[1].mismatch_diff, Some(2.0));
        assert!(!cells[0].has_mismatch);
        assert_eq!(report.problem_cells.len(), 1);
        assert_eq!(report.problem_cells[0].cell_ref, "Sheet1!A2");
    }

    #[test]
    fn test_unresolved_counted_separately() {
        let mut cells = vec![
            Cell::formula("Sheet1", "A1", "=X", Some(3.0)),
            resolved("A2", 5.0, 9.0),
        ];
        let report = validate_cells(&mut cells, 1e-6, 1e-10);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.mismatches, 1);
        assert_eq!(report.status, ValidationStatus::Failed);
        // Unresolved is not a mismatch: the cell is not flagged.
        assert!(!cells[0].has_mismatch);
    }

    #[test]
    fn test_detail_cap() {
        let mut cells: Vec<Cell> = (0..150)
            .map(|i| resolved(&format!("A{}", i + 1), 0.0, 1.0))
            .collect();
        let report = validate_cells(&mut cells, 1e-6, 1e-10);
        assert_eq!(report.total_problems, 150);
        assert_eq!(report.shown, 100);
        assert_eq!(report.problem_cells.len(), 100);
        assert_eq!(report.mismatches, 150);
    }

    #[test]
    fn test_no_baseline_counted() {
        let mut cell = Cell::formula("Sheet1", "A1", "=X", None);
        cell.calculated_number = Some(1.0);
        let mut cells = vec![cell];
        let report = validate_cells(&mut cells, 1e-6, 1e-10);
        assert_eq!(report.no_baseline, 1);
        assert_eq!(report.status, ValidationStatus::Passed);
    }
}
