use serde::Serialize;

/// Validation verdict for one formula cell.
///
/// `Unresolved` is deliberately its own bucket: "we computed nothing" and
/// "we computed the wrong thing" are different failures, and folding them
/// together hides which one a workbook suffers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckBucket {
    ExactMatch,
    WithinTolerance,
    Mismatch,
    Unresolved,
}

impl std::fmt::Display for CheckBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactMatch => write!(f, "exact_match"),
            Self::WithinTolerance => write!(f, "within_tolerance"),
            Self::Mismatch => write!(f, "mismatch"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// Which comparison produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Numeric,
    Text,
}

/// One classified cell.
#[derive(Debug, Clone, Serialize)]
pub struct CellCheck {
    pub cell_ref: String,
    pub bucket: CheckBucket,
    pub kind: CheckKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_number: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_number: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_text: Option<String>,
    /// Absolute numeric diff, or text length diff (a coarse heuristic, not an
    /// edit distance).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<f64>,
    pub is_circular: bool,
}
