//! Batch evaluation through the calculation backend.
//!
//! One combined request per batch; typed results land in the cache. A
//! whole-batch failure (transport error, backend rejection, timeout) marks
//! every queried cell unresolved — partial success is never assumed.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use gridcheck_backend::{BackendError, CalcBackend};
use gridcheck_engine::{Cell, CellRef, EngineChoice};
use gridcheck_protocol::{EvalRequest, QueryOutcome};

use crate::cache::{EvalCache, Slot};
use crate::snapshot;
use crate::stats::SessionStats;

/// Severity class of a spreadsheet error code.
///
/// `#DIV/0!` in a model is routine; `#REF!` or `#NAME?` usually means the
/// decode or the formula itself is broken and deserves a closer look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Routine,
    Serious,
    Cycle,
    Other,
}

impl ErrorClass {
    pub fn of(code: &str) -> Self {
        match code {
            "#DIV/0!" | "#NULL!" => Self::Routine,
            "#REF!" | "#NAME?" => Self::Serious,
            "#CYCLE!" => Self::Cycle,
            _ => Self::Other,
        }
    }
}

/// Copy a resolved slot onto a cell and record the evaluation path.
pub(crate) fn apply_slot(cell: &mut Cell, slot: &Slot, engine: EngineChoice) {
    match slot {
        Slot::Number(v) => {
            cell.calculated_number = Some(*v);
            cell.engine = engine;
        }
        Slot::Text(t) => {
            cell.calculated_text = Some(t.clone());
            cell.engine = engine;
        }
        Slot::Unresolved => {}
    }
}

/// Adapter between scheduled batches and the backend protocol.
pub struct Evaluator {
    backend: Arc<dyn CalcBackend>,
}

impl Evaluator {
    pub fn new(backend: Arc<dyn CalcBackend>) -> Self {
        Self { backend }
    }

    /// Resolve `refs` into the cache. Already-cached references are skipped.
    pub fn run_batch(
        &self,
        cells: &[Cell],
        index: &FxHashMap<CellRef, usize>,
        refs: &[CellRef],
        cache: &mut EvalCache,
        stats: &mut SessionStats,
    ) {
        let to_query: Vec<CellRef> = refs.iter().filter(|r| !cache.contains(r)).cloned().collect();
        if to_query.is_empty() {
            return;
        }

        match self.probe(cells, index, &to_query, &FxHashMap::default(), cache) {
            Ok(outcomes) => {
                for r in to_query {
                    match outcomes.get(&r) {
                        Some(QueryOutcome::Number { value }) => {
                            cache.insert(r, Slot::Number(*value));
                        }
                        Some(QueryOutcome::Text { value }) => {
                            cache.insert(r, Slot::Text(value.clone()));
                        }
                        Some(QueryOutcome::Error { value }) => {
                            stats.count_formula_error(value);
                            cache.set_unresolved(r);
                        }
                        Some(QueryOutcome::Empty) | None => {
                            stats.empty_results += 1;
                            cache.set_unresolved(r);
                        }
                    }
                }
            }
            Err(_) => {
                // Whole batch lost; every query becomes unresolved.
                stats.backend_errors += to_query.len();
                for r in to_query {
                    cache.set_unresolved(r);
                }
            }
        }
    }

    /// One raw round-trip: snapshot, request, typed outcomes.
    ///
    /// Leaves the cache untouched — the circular resolver uses this to probe
    /// working values without committing anything.
    pub fn probe(
        &self,
        cells: &[Cell],
        index: &FxHashMap<CellRef, usize>,
        refs: &[CellRef],
        overlay: &FxHashMap<CellRef, Slot>,
        cache: &EvalCache,
    ) -> Result<FxHashMap<CellRef, QueryOutcome>, BackendError> {
        let querying: FxHashSet<CellRef> = refs.iter().cloned().collect();
        let request = EvalRequest {
            sheets: snapshot::build_sheets(cells, cache, &querying, overlay),
            queries: snapshot::build_queries(cells, index, refs),
        };

        let response = self.backend.evaluate(&request)?;
        if !response.success {
            return Err(BackendError::Failed(
                response.error.unwrap_or_else(|| "unspecified failure".into()),
            ));
        }
        let results = response
            .results
            .ok_or_else(|| BackendError::Parse("success response without results".into()))?;

        let by_name: FxHashMap<String, CellRef> =
            refs.iter().map(|r| (r.to_string(), r.clone())).collect();

        let mut outcomes = FxHashMap::default();
        for result in results {
            if let Some(r) = by_name.get(&result.cell_ref) {
                outcomes.insert(r.clone(), result.outcome);
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::ScriptedBackend;
    use gridcheck_engine::Cell;

    fn r(addr: &str) -> CellRef {
        CellRef::new("Sheet1", addr)
    }

    fn fixture() -> (Vec<Cell>, FxHashMap<CellRef, usize>) {
        let cells = vec![
            Cell::number("Sheet1", "A1", 5.0),
            Cell::formula("Sheet1", "B1", "=A1+10", Some(15.0)),
            Cell::formula("Sheet1", "C1", "=A1/0", None),
        ];
        let index = cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.cell_ref(), i))
            .collect();
        (cells, index)
    }

    #[test]
    fn test_error_class() {
        assert_eq!(ErrorClass::of("#DIV/0!"), ErrorClass::Routine);
        assert_eq!(ErrorClass::of("#NULL!"), ErrorClass::Routine);
        assert_eq!(ErrorClass::of("#REF!"), ErrorClass::Serious);
        assert_eq!(ErrorClass::of("#NAME?"), ErrorClass::Serious);
        assert_eq!(ErrorClass::of("#CYCLE!"), ErrorClass::Cycle);
        assert_eq!(ErrorClass::of("#VALUE!"), ErrorClass::Other);
    }

    #[test]
    fn test_run_batch_caches_typed_results() {
        let (cells, index) = fixture();
        let backend = ScriptedBackend::new()
            .number("Sheet1!B1", 15.0)
            .error("Sheet1!C1", "#DIV/0!");
        let evaluator = Evaluator::new(Arc::new(backend));
        let mut cache = EvalCache::new();
        let mut stats = SessionStats::new();

        evaluator.run_batch(&cells, &index, &[r("B1"), r("C1")], &mut cache, &mut stats);

        assert_eq!(cache.number(&r("B1")), Some(15.0));
        assert!(cache.contains(&r("C1")));
        assert!(!cache.is_resolved(&r("C1")));
        assert_eq!(stats.routine_formula_errors, 1);
        assert_eq!(stats.backend_errors, 0);
    }

    #[test]
    fn test_run_batch_skips_cached() {
        let (cells, index) = fixture();
        let backend = Arc::new(ScriptedBackend::new().number("Sheet1!B1", 15.0));
        let evaluator = Evaluator::new(backend.clone());
        let mut cache = EvalCache::new();
        let mut stats = SessionStats::new();

        cache.insert(r("B1"), Slot::Number(15.0));
        evaluator.run_batch(&cells, &index, &[r("B1")], &mut cache, &mut stats);

        assert_eq!(backend.calls(), 0, "fully cached batch must not hit the backend");
    }

    #[test]
    fn test_whole_batch_failure_marks_all_unresolved() {
        let (cells, index) = fixture();
        let evaluator = Evaluator::new(Arc::new(ScriptedBackend::failing("backend down")));
        let mut cache = EvalCache::new();
        let mut stats = SessionStats::new();

        evaluator.run_batch(&cells, &index, &[r("B1"), r("C1")], &mut cache, &mut stats);

        assert!(cache.contains(&r("B1")) && !cache.is_resolved(&r("B1")));
        assert!(cache.contains(&r("C1")) && !cache.is_resolved(&r("C1")));
        assert_eq!(stats.backend_errors, 2);
    }

    #[test]
    fn test_missing_result_is_unresolved() {
        let (cells, index) = fixture();
        // Backend answers with an empty result list.
        let evaluator = Evaluator::new(Arc::new(ScriptedBackend::new()));
        let mut cache = EvalCache::new();
        let mut stats = SessionStats::new();

        evaluator.run_batch(&cells, &index, &[r("B1")], &mut cache, &mut stats);
        assert!(cache.contains(&r("B1")) && !cache.is_resolved(&r("B1")));
    }
}
