//! Session-scoped evaluation cache.
//!
//! Maps cell references to their resolved values for the lifetime of one
//! session. Entries are written once as batches complete; the one sanctioned
//! exception is the circular resolver upgrading an `Unresolved` entry to a
//! converged value.

use rustc_hash::FxHashMap;

use gridcheck_engine::CellRef;

/// Cached evaluation result for one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Number(f64),
    Text(String),
    /// Evaluation was attempted and produced nothing usable.
    Unresolved,
}

impl Slot {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Slot::Unresolved)
    }
}

#[derive(Debug, Default)]
pub struct EvalCache {
    slots: FxHashMap<CellRef, Slot>,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True once any outcome (including `Unresolved`) is recorded.
    pub fn contains(&self, r: &CellRef) -> bool {
        self.slots.contains_key(r)
    }

    pub fn get(&self, r: &CellRef) -> Option<&Slot> {
        self.slots.get(r)
    }

    pub fn is_resolved(&self, r: &CellRef) -> bool {
        self.get(r).is_some_and(Slot::is_resolved)
    }

    pub fn number(&self, r: &CellRef) -> Option<f64> {
        match self.get(r) {
            Some(Slot::Number(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, r: &CellRef) -> Option<&str> {
        match self.get(r) {
            Some(Slot::Text(t)) => Some(t),
            _ => None,
        }
    }

    /// Record an outcome. Callers skip cells that already have an entry, so
    /// under normal operation every cell is written exactly once.
    pub fn insert(&mut self, r: CellRef, slot: Slot) {
        self.slots.insert(r, slot);
    }

    pub fn set_unresolved(&mut self, r: CellRef) {
        self.slots.insert(r, Slot::Unresolved);
    }

    /// Circular-resolver upgrade: fills a vacant or `Unresolved` entry, but
    /// never clobbers a value some earlier stage already resolved.
    pub fn resolve_unresolved(&mut self, r: CellRef, slot: Slot) {
        match self.slots.get(&r) {
            Some(existing) if existing.is_resolved() => {}
            _ => {
                self.slots.insert(r, slot);
            }
        }
    }
}
