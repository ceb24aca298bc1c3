//! gridcheck calculation-backend protocol — v1 Frozen Wire Format
//!
//! This crate defines the canonical request/response types exchanged with a
//! calculation backend. The wire format is a single JSON document each way:
//! the pipeline writes one `EvalRequest`, the backend answers with one
//! `EvalResponse`. Transport is the backend adapter's business.
//!
//! # Protocol Version
//!
//! This is **protocol v1** — the wire format is frozen. Changes require a
//! version bump in `PROTOCOL_VERSION` and new golden vectors in the tests
//! below.
//!
//! # Coordinates
//!
//! `row`/`col` are zero-based: `A1 → (0,0)`, `Z1 → (0,25)`, `AA1 → (0,26)`.

use serde::{Deserialize, Serialize};

/// Current protocol version. Increment for breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Pipeline → Backend
// =============================================================================

/// One batch evaluation request.
///
/// `sheets` is a self-contained snapshot: every value the queried formulas
/// may read, plus the formula text of the queried cells themselves. The
/// backend must not retain state across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRequest {
    pub sheets: Vec<SheetPayload>,
    pub queries: Vec<Query>,
}

/// All cells of one sheet relevant to this request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetPayload {
    pub name: String,
    pub cells: Vec<CellPayload>,
}

/// A single snapshot cell: either a formula to evaluate or a literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellPayload {
    pub row: u32,
    pub col: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PayloadValue>,
}

impl CellPayload {
    pub fn formula(row: u32, col: u32, formula: impl Into<String>) -> Self {
        Self {
            row,
            col,
            formula: Some(formula.into()),
            value: None,
        }
    }

    pub fn number(row: u32, col: u32, value: f64) -> Self {
        Self {
            row,
            col,
            formula: None,
            value: Some(PayloadValue::Number(value)),
        }
    }

    pub fn text(row: u32, col: u32, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            formula: None,
            value: Some(PayloadValue::Text(value.into())),
        }
    }
}

/// Literal snapshot value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Number(f64),
    Text(String),
}

/// One cell the backend should resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
    /// Sheet-qualified reference echoed back in the result.
    pub cell_ref: String,
}

// =============================================================================
// Backend → Pipeline
// =============================================================================

/// Whole-batch response.
///
/// `success: false` means the batch as a whole failed (`results` absent);
/// partial success is never expressed on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<QueryResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvalResponse {
    pub fn completed(results: Vec<QueryResult>) -> Self {
        Self {
            success: true,
            results: Some(results),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            results: None,
            error: Some(error.into()),
        }
    }
}

/// Typed outcome for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub cell_ref: String,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
}

/// The backend's verdict on one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryOutcome {
    Number { value: f64 },
    Text { value: String },
    /// Spreadsheet error code, e.g. `#DIV/0!`, `#REF!`, `#CYCLE!`.
    Error { value: String },
    Empty,
}
