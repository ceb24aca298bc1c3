//! Test backends.
//!
//! `ScriptedBackend` answers from a canned table; `ArithmeticBackend`
//! actually evaluates `+ - * /` formulas against the request snapshot,
//! recursing through referenced formulas and reporting `#CYCLE!` when a
//! reference chain loops. Together they exercise the pipeline end to end
//! without a real calculation process.

use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};

use gridcheck_backend::{BackendError, CalcBackend};
use gridcheck_engine::addr;
use gridcheck_protocol::{EvalRequest, EvalResponse, PayloadValue, QueryOutcome, QueryResult};

/// Canned-response backend. Queries without a scripted outcome come back
/// `empty`.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    outcomes: FxHashMap<String, QueryOutcome>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that rejects every batch.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn number(mut self, cell_ref: &str, value: f64) -> Self {
        self.outcomes
            .insert(cell_ref.to_string(), QueryOutcome::Number { value });
        self
    }

    pub fn text(mut self, cell_ref: &str, value: &str) -> Self {
        self.outcomes.insert(
            cell_ref.to_string(),
            QueryOutcome::Text {
                value: value.to_string(),
            },
        );
        self
    }

    pub fn error(mut self, cell_ref: &str, code: &str) -> Self {
        self.outcomes.insert(
            cell_ref.to_string(),
            QueryOutcome::Error {
                value: code.to_string(),
            },
        );
        self
    }

    /// How many batches this backend has seen.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl CalcBackend for ScriptedBackend {
    fn evaluate(&self, request: &EvalRequest) -> Result<EvalResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = &self.failure {
            return Ok(EvalResponse::failed(message.clone()));
        }
        let results = request
            .queries
            .iter()
            .map(|q| QueryResult {
                cell_ref: q.cell_ref.clone(),
                outcome: self
                    .outcomes
                    .get(&q.cell_ref)
                    .cloned()
                    .unwrap_or(QueryOutcome::Empty),
            })
            .collect();
        Ok(EvalResponse::completed(results))
    }
}

type Coord = (String, u32, u32);

/// Minimal real evaluator over the snapshot: numbers, cell references
/// (optionally sheet-qualified), `+ - * /`, unary minus, and parentheses.
///
/// Unknown references read as 0, like an empty spreadsheet cell. Reference
/// chains that loop yield `#CYCLE!`, mirroring how a real backend surfaces
/// circular formulas it was asked to evaluate one at a time.
#[derive(Debug, Default)]
pub struct ArithmeticBackend {
    calls: AtomicUsize,
}

impl ArithmeticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl CalcBackend for ArithmeticBackend {
    fn evaluate(&self, request: &EvalRequest) -> Result<EvalResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let mut values: FxHashMap<Coord, PayloadValue> = FxHashMap::default();
        let mut formulas: FxHashMap<Coord, String> = FxHashMap::default();
        for sheet in &request.sheets {
            for cell in &sheet.cells {
                let key = (sheet.name.clone(), cell.row, cell.col);
                if let Some(v) = &cell.value {
                    values.insert(key, v.clone());
                } else if let Some(f) = &cell.formula {
                    formulas.insert(key, f.clone());
                }
            }
        }

        let env = SnapshotEnv { values, formulas };
        let results = request
            .queries
            .iter()
            .map(|q| {
                let key = (q.sheet.clone(), q.row, q.col);
                let outcome = match env.values.get(&key) {
                    Some(PayloadValue::Number(v)) => QueryOutcome::Number { value: *v },
                    Some(PayloadValue::Text(t)) => QueryOutcome::Text { value: t.clone() },
                    None => match env.formulas.get(&key) {
                        Some(_) => {
                            let mut visiting = FxHashSet::default();
                            match env.eval_cell(&key, &mut visiting) {
                                Ok(value) => QueryOutcome::Number { value },
                                Err(code) => QueryOutcome::Error { value: code },
                            }
                        }
                        None => QueryOutcome::Empty,
                    },
                };
                QueryResult {
                    cell_ref: q.cell_ref.clone(),
                    outcome,
                }
            })
            .collect();
        Ok(EvalResponse::completed(results))
    }
}

struct SnapshotEnv {
    values: FxHashMap<Coord, PayloadValue>,
    formulas: FxHashMap<Coord, String>,
}

impl SnapshotEnv {
    fn eval_cell(&self, key: &Coord, visiting: &mut FxHashSet<Coord>) -> Result<f64, String> {
        if let Some(value) = self.values.get(key) {
            return match value {
                PayloadValue::Number(v) => Ok(*v),
                PayloadValue::Text(_) => Err("#VALUE!".into()),
            };
        }
        let Some(formula) = self.formulas.get(key) else {
            // Empty cell reads as zero.
            return Ok(0.0);
        };
        if !visiting.insert(key.clone()) {
            return Err("#CYCLE!".into());
        }
        let body = formula.strip_prefix('=').unwrap_or(formula);
        let result = Parser::new(body, &key.0, self, visiting).parse();
        visiting.remove(key);
        result
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    sheet: &'a str,
    env: &'a SnapshotEnv,
    visiting: &'a mut FxHashSet<Coord>,
}

impl<'a> Parser<'a> {
    fn new(
        input: &'a str,
        sheet: &'a str,
        env: &'a SnapshotEnv,
        visiting: &'a mut FxHashSet<Coord>,
    ) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            sheet,
            env,
            visiting,
        }
    }

    fn parse(mut self) -> Result<f64, String> {
        let value = self.expr()?;
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err("#NAME?".into());
        }
        Ok(value)
    }

    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                b'+' => {
                    self.pos += 1;
                    value += self.term()?;
                }
                b'-' => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                b'*' => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                b'/' => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    if rhs == 0.0 {
                        return Err("#DIV/0!".into());
                    }
                    value /= rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err("#NAME?".into());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.reference(),
            _ => Err("#NAME?".into()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while self
            .input
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == b'.')
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| "#NAME?".to_string())
    }

    fn reference(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while self
            .input
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
        {
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| "#NAME?".to_string())?
            .to_string();

        let (sheet, addr_text) = if self.input.get(self.pos) == Some(&b'!') {
            self.pos += 1;
            let addr_start = self.pos;
            while self
                .input
                .get(self.pos)
                .is_some_and(|c| c.is_ascii_alphanumeric())
            {
                self.pos += 1;
            }
            let addr_text = std::str::from_utf8(&self.input[addr_start..self.pos])
                .map_err(|_| "#NAME?".to_string())?
                .to_string();
            (token, addr_text)
        } else {
            (self.sheet.to_string(), token)
        };

        let (row, col) = addr::parse_a1(&addr_text).ok_or_else(|| "#NAME?".to_string())?;
        self.env.eval_cell(&(sheet, row, col), self.visiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcheck_protocol::{CellPayload, Query, SheetPayload};

    fn query(sheet: &str, addr_text: &str) -> Query {
        let (row, col) = addr::parse_a1(addr_text).unwrap();
        Query {
            sheet: sheet.into(),
            row,
            col,
            cell_ref: format!("{sheet}!{addr_text}"),
        }
    }

    fn eval_one(sheets: Vec<SheetPayload>, q: Query) -> QueryOutcome {
        let backend = ArithmeticBackend::new();
        let response = backend
            .evaluate(&EvalRequest {
                sheets,
                queries: vec![q],
            })
            .unwrap();
        response.results.unwrap().remove(0).outcome
    }

    #[test]
    fn test_arithmetic_with_references() {
        let sheets = vec![SheetPayload {
            name: "Sheet1".into(),
            cells: vec![
                CellPayload::number(0, 0, 5.0),
                CellPayload::number(0, 1, 10.0),
                CellPayload::formula(0, 2, "=(A1+B1)*2-1"),
            ],
        }];
        assert_eq!(
            eval_one(sheets, query("Sheet1", "C1")),
            QueryOutcome::Number { value: 29.0 }
        );
    }

    #[test]
    fn test_cross_sheet_reference() {
        let sheets = vec![
            SheetPayload {
                name: "Inputs".into(),
                cells: vec![CellPayload::number(0, 0, 4.0)],
            },
            SheetPayload {
                name: "Calc".into(),
                cells: vec![CellPayload::formula(0, 0, "=Inputs!A1*3")],
            },
        ];
        assert_eq!(
            eval_one(sheets, query("Calc", "A1")),
            QueryOutcome::Number { value: 12.0 }
        );
    }

    #[test]
    fn test_chained_formulas_recurse() {
        let sheets = vec![SheetPayload {
            name: "Sheet1".into(),
            cells: vec![
                CellPayload::number(0, 0, 2.0),
                CellPayload::formula(0, 1, "=A1+1"),
                CellPayload::formula(0, 2, "=B1*10"),
            ],
        }];
        assert_eq!(
            eval_one(sheets, query("Sheet1", "C1")),
            QueryOutcome::Number { value: 30.0 }
        );
    }

    #[test]
    fn test_cycle_reported() {
        let sheets = vec![SheetPayload {
            name: "Sheet1".into(),
            cells: vec![
                CellPayload::formula(0, 0, "=B1+1"),
                CellPayload::formula(0, 1, "=A1/2"),
            ],
        }];
        assert_eq!(
            eval_one(sheets, query("Sheet1", "A1")),
            QueryOutcome::Error {
                value: "#CYCLE!".into()
            }
        );
    }

    #[test]
    fn test_division_by_zero() {
        let sheets = vec![SheetPayload {
            name: "Sheet1".into(),
            cells: vec![CellPayload::formula(0, 0, "=1/0")],
        }];
        assert_eq!(
            eval_one(sheets, query("Sheet1", "A1")),
            QueryOutcome::Error {
                value: "#DIV/0!".into()
            }
        );
    }

    #[test]
    fn test_unknown_reference_reads_zero() {
        let sheets = vec![SheetPayload {
            name: "Sheet1".into(),
            cells: vec![CellPayload::formula(0, 0, "=Z99+1")],
        }];
        assert_eq!(
            eval_one(sheets, query("Sheet1", "A1")),
            QueryOutcome::Number { value: 1.0 }
        );
    }

    #[test]
    fn test_unsupported_syntax_is_name_error() {
        let sheets = vec![SheetPayload {
            name: "Sheet1".into(),
            cells: vec![CellPayload::formula(0, 0, "=SUM(A1:A5)")],
        }];
        assert_eq!(
            eval_one(sheets, query("Sheet1", "A1")),
            QueryOutcome::Error {
                value: "#NAME?".into()
            }
        );
    }

    #[test]
    fn test_scripted_backend_counts_calls() {
        let backend = ScriptedBackend::new().number("S!A1", 1.0);
        let request = EvalRequest {
            sheets: vec![],
            queries: vec![query("S", "A1")],
        };
        backend.evaluate(&request).unwrap();
        backend.evaluate(&request).unwrap();
        assert_eq!(backend.calls(), 2);
    }
}
