//! Cell records and identity.
//!
//! A `Cell` is one decoded workbook cell as handed over by the upstream
//! decoder, plus the lifecycle fields the pipeline fills in: circularity,
//! computed value, evaluation path, and mismatch classification.
//!
//! # Invariant
//!
//! `calculated_number`/`calculated_text` are never assigned from
//! `raw_number`/`raw_text` for formula cells. The raw fields are the
//! workbook's own stored results and exist only as a comparison baseline.
//! The single documented exception is the plain-value passthrough for
//! `kind == Value` cells, done at construction time.

use serde::{Deserialize, Serialize};

use crate::addr;

/// Sheet-qualified cell reference, e.g. `Summary!B24`.
///
/// Used as graph identity and as the evaluation-cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub sheet: String,
    pub addr: String,
}

impl CellRef {
    pub fn new(sheet: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            addr: addr.into(),
        }
    }

    /// Parse a qualified reference (`"Summary!B24"`).
    ///
    /// References without a sheet qualifier are rejected; the decoder
    /// qualifies every dependency with its sheet before handing cells over.
    pub fn parse(s: &str) -> Option<Self> {
        let (sheet, addr) = s.split_once('!')?;
        if sheet.is_empty() || addr::parse_a1(addr).is_none() {
            return None;
        }
        Some(Self::new(sheet, addr))
    }

    /// Zero-based `(row, col)` of the address part.
    pub fn coordinates(&self) -> Option<(u32, u32)> {
        addr::parse_a1(&self.addr)
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.sheet, self.addr)
    }
}

/// What a cell contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Literal number or text, no formula.
    Value,
    /// Formula with a numeric result.
    Formula,
    /// Formula with a text result (`=""`, `="label"`, CONCAT-style).
    TextFormula,
}

/// Which evaluation path produced a cell's computed value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineChoice {
    /// Not evaluated (plain value, or evaluation failed).
    #[default]
    None,
    /// Resolved by the calculation backend directly.
    BackendNative,
    /// Resolved by the iterative circular-reference solver.
    IterativeFallback,
}

/// One workbook cell flowing through an evaluation session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cell {
    pub sheet: String,
    /// A1 address within the sheet, e.g. `B24`.
    pub addr: String,
    /// Zero-based row index.
    pub row: u32,
    /// Zero-based column index.
    pub col: u32,
    pub kind: CellKind,
    /// Formula source text, present iff `kind != Value`.
    #[serde(default)]
    pub formula: Option<String>,
    /// Sheet-qualified references extracted from the formula upstream.
    /// May name cells that don't exist in the workbook.
    #[serde(default)]
    pub depends_on: Vec<CellRef>,
    /// The workbook's own stored numeric result. Comparison baseline only.
    #[serde(default)]
    pub raw_number: Option<f64>,
    /// The workbook's own stored text result. Comparison baseline only.
    #[serde(default)]
    pub raw_text: Option<String>,
    /// Our computed numeric result. `None` until evaluated; stays `None` on failure.
    #[serde(default)]
    pub calculated_number: Option<f64>,
    /// Our computed text result.
    #[serde(default)]
    pub calculated_text: Option<String>,
    #[serde(default)]
    pub engine: EngineChoice,
    /// Set once by cycle detection, immutable thereafter.
    #[serde(default)]
    pub is_circular: bool,
    #[serde(default)]
    pub has_mismatch: bool,
    /// Absolute numeric diff (or text length diff) when `has_mismatch`.
    #[serde(default)]
    pub mismatch_diff: Option<f64>,
}

impl Cell {
    /// Base constructor; derives `row`/`col` from the address.
    ///
    /// Decoders that already know the coordinates can set them directly.
    pub fn new(sheet: impl Into<String>, addr: impl Into<String>, kind: CellKind) -> Self {
        let addr = addr.into();
        let (row, col) = addr::parse_a1(&addr).unwrap_or((0, 0));
        Self {
            sheet: sheet.into(),
            addr,
            row,
            col,
            kind,
            formula: None,
            depends_on: Vec::new(),
            raw_number: None,
            raw_text: None,
            calculated_number: None,
            calculated_text: None,
            engine: EngineChoice::None,
            is_circular: false,
            has_mismatch: false,
            mismatch_diff: None,
        }
    }

    /// Plain numeric value cell.
    pub fn number(sheet: impl Into<String>, addr: impl Into<String>, value: f64) -> Self {
        let mut cell = Self::new(sheet, addr, CellKind::Value);
        cell.raw_number = Some(value);
        cell
    }

    /// Plain text value cell.
    ///
    /// The stored text is mirrored into `calculated_text` (the documented
    /// plain-value passthrough) so validation can cover value cells too.
    pub fn text(sheet: impl Into<String>, addr: impl Into<String>, value: impl Into<String>) -> Self {
        let mut cell = Self::new(sheet, addr, CellKind::Value);
        let value = value.into();
        cell.calculated_text = Some(value.clone());
        cell.raw_text = Some(value);
        cell
    }

    /// Numeric formula cell with the workbook's stored result as baseline.
    pub fn formula(
        sheet: impl Into<String>,
        addr: impl Into<String>,
        formula: impl Into<String>,
        raw_number: Option<f64>,
    ) -> Self {
        let mut cell = Self::new(sheet, addr, CellKind::Formula);
        cell.formula = Some(formula.into());
        cell.raw_number = raw_number;
        cell
    }

    /// Text formula cell with the workbook's stored result as baseline.
    pub fn text_formula(
        sheet: impl Into<String>,
        addr: impl Into<String>,
        formula: impl Into<String>,
        raw_text: Option<String>,
    ) -> Self {
        let mut cell = Self::new(sheet, addr, CellKind::TextFormula);
        cell.formula = Some(formula.into());
        cell.raw_text = raw_text;
        cell
    }

    /// Attach the pre-extracted dependency list.
    pub fn with_deps(mut self, deps: Vec<CellRef>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Sheet-qualified reference for this cell.
    pub fn cell_ref(&self) -> CellRef {
        CellRef::new(self.sheet.clone(), self.addr.clone())
    }

    pub fn is_formula(&self) -> bool {
        self.kind != CellKind::Value
    }

    /// True once some evaluation path produced a result.
    pub fn is_resolved(&self) -> bool {
        self.calculated_number.is_some() || self.calculated_text.is_some()
    }
}
