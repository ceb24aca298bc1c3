use gridcheck_engine::Cell;

use crate::model::{CellCheck, CheckBucket, CheckKind};

/// Classify one formula cell against the workbook's stored result.
///
/// Returns `None` for value cells and for formula cells that resolved but
/// have no stored baseline to compare against (the caller counts those
/// separately).
///
/// Numeric: `diff < exact_epsilon` is an exact match, `diff ≤ tolerance`
/// still matches, anything larger is a mismatch with the diff recorded.
/// Text: exact string equality or mismatch, diff reported as the absolute
/// difference in string length.
pub fn check_cell(cell: &Cell, tolerance: f64, exact_epsilon: f64) -> Option<CellCheck> {
    if !cell.is_formula() {
        return None;
    }

    let base = |bucket, kind, diff| CellCheck {
        cell_ref: cell.cell_ref().to_string(),
        bucket,
        kind,
        formula: cell.formula.clone(),
        expected_number: None,
        actual_number: None,
        expected_text: None,
        actual_text: None,
        diff,
        is_circular: cell.is_circular,
    };

    if let (Some(actual), Some(expected)) = (cell.calculated_number, cell.raw_number) {
        let diff = (actual - expected).abs();
        let bucket = if diff < exact_epsilon {
            CheckBucket::ExactMatch
        } else if diff <= tolerance {
            CheckBucket::WithinTolerance
        } else {
            CheckBucket::Mismatch
        };
        let mut check = base(bucket, CheckKind::Numeric, Some(diff));
        check.expected_number = Some(expected);
        check.actual_number = Some(actual);
        return Some(check);
    }

    if let (Some(actual), Some(expected)) = (&cell.calculated_text, &cell.raw_text) {
        let (bucket, diff) = if actual == expected {
            (CheckBucket::ExactMatch, 0.0)
        } else {
            let len_diff = (actual.chars().count() as i64 - expected.chars().count() as i64).abs();
            (CheckBucket::Mismatch, len_diff as f64)
        };
        let mut check = base(bucket, CheckKind::Text, Some(diff));
        check.expected_text = Some(expected.clone());
        check.actual_text = Some(actual.clone());
        return Some(check);
    }

    if !cell.is_resolved() {
        // Evaluation produced nothing; report what was expected.
        let kind = if cell.raw_text.is_some() {
            CheckKind::Text
        } else {
            CheckKind::Numeric
        };
        let mut check = base(CheckBucket::Unresolved, kind, None);
        check.expected_number = cell.raw_number;
        check.expected_text = cell.raw_text.clone();
        return Some(check);
    }

    // Resolved, but the workbook stored nothing comparable.
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcheck_engine::Cell;

    const TOL: f64 = 1e-6;
    const EPS: f64 = 1e-10;

    fn resolved(raw: f64, calc: f64) -> Cell {
        let mut cell = Cell::formula("Sheet1", "A1", "=X", Some(raw));
        cell.calculated_number = Some(calc);
        cell
    }

    #[test]
    fn test_exact_match() {
        let check = check_cell(&resolved(15.0, 15.0), TOL, EPS).unwrap();
        assert_eq!(check.bucket, CheckBucket::ExactMatch);
        assert_eq!(check.kind, CheckKind::Numeric);
        assert_eq!(check.diff, Some(0.0));
    }

    #[test]
    fn test_within_tolerance() {
        let check = check_cell(&resolved(1.0, 1.0 + 5e-7), TOL, EPS).unwrap();
        assert_eq!(check.bucket, CheckBucket::WithinTolerance);
    }

    #[test]
    fn test_boundary_diff_equal_to_tolerance_matches() {
        let check = check_cell(&resolved(0.0, 1e-6), TOL, EPS).unwrap();
        assert_eq!(check.bucket, CheckBucket::WithinTolerance);
    }

    #[test]
    fn test_mismatch_iff_diff_exceeds_tolerance() {
        let check = check_cell(&resolved(100.0, 100.5), TOL, EPS).unwrap();
        assert_eq!(check.bucket, CheckBucket::Mismatch);
        assert_eq!(check.diff, Some(0.5));
        assert_eq!(check.expected_number, Some(100.0));
        assert_eq!(check.actual_number, Some(100.5));
    }

    #[test]
    fn test_unresolved_is_not_a_mismatch() {
        let cell = Cell::formula("Sheet1", "A1", "=X", Some(3.0));
        let check = check_cell(&cell, TOL, EPS).unwrap();
        assert_eq!(check.bucket, CheckBucket::Unresolved);
        assert_eq!(check.expected_number, Some(3.0));
        assert_eq!(check.actual_number, None);
    }

    #[test]
    fn test_text_match_and_mismatch() {
        let mut cell = Cell::text_formula("Sheet1", "A1", "=\"done\"", Some("done".into()));
        cell.calculated_text = Some("done".into());
        let check = check_cell(&cell, TOL, EPS).unwrap();
        assert_eq!(check.bucket, CheckBucket::ExactMatch);
        assert_eq!(check.kind, CheckKind::Text);

        cell.calculated_text = Some("done!".into());
        let check = check_cell(&cell, TOL, EPS).unwrap();
        assert_eq!(check.bucket, CheckBucket::Mismatch);
        assert_eq!(check.diff, Some(1.0));
    }

    #[test]
    fn test_value_cells_skipped() {
        let cell = Cell::number("Sheet1", "A1", 5.0);
        assert!(check_cell(&cell, TOL, EPS).is_none());
    }

    #[test]
    fn test_resolved_without_baseline_skipped() {
        let mut cell = Cell::formula("Sheet1", "A1", "=X", None);
        cell.calculated_number = Some(1.0);
        assert!(check_cell(&cell, TOL, EPS).is_none());
    }
}
