//! Backend snapshot assembly.
//!
//! Each request carries everything the queried formulas may read: plain
//! values, previously resolved formula results, and the formula text of the
//! cells being queried. Unresolved formulas outside the query set are left
//! out entirely — the backend must never see a formula it wasn't asked to
//! evaluate, or it would chase cycles on its own.

use rustc_hash::{FxHashMap, FxHashSet};

use gridcheck_engine::{Cell, CellKind, CellRef};
use gridcheck_protocol::{CellPayload, Query, SheetPayload};

use crate::cache::{EvalCache, Slot};

fn payload_for_slot(row: u32, col: u32, slot: &Slot) -> Option<CellPayload> {
    match slot {
        Slot::Number(v) => Some(CellPayload::number(row, col, *v)),
        Slot::Text(t) => Some(CellPayload::text(row, col, t.clone())),
        Slot::Unresolved => None,
    }
}

/// Build the per-sheet snapshot for one request.
///
/// `querying` cells contribute their formula text; `overlay` substitutes
/// working values for circular group members mid-iteration and takes
/// precedence over everything except the query set itself.
pub fn build_sheets(
    cells: &[Cell],
    cache: &EvalCache,
    querying: &FxHashSet<CellRef>,
    overlay: &FxHashMap<CellRef, Slot>,
) -> Vec<SheetPayload> {
    let mut order: Vec<String> = Vec::new();
    let mut by_sheet: FxHashMap<String, Vec<CellPayload>> = FxHashMap::default();

    let mut push = |sheet: &str, payload: CellPayload| {
        if !by_sheet.contains_key(sheet) {
            order.push(sheet.to_string());
        }
        by_sheet.entry(sheet.to_string()).or_default().push(payload);
    };

    for cell in cells {
        let r = cell.cell_ref();

        if querying.contains(&r) {
            // Text formulas are never sent to the backend as formulas; a
            // query against one comes back empty.
            if cell.kind == CellKind::Formula {
                if let Some(formula) = &cell.formula {
                    push(&cell.sheet, CellPayload::formula(cell.row, cell.col, formula.clone()));
                }
            }
            continue;
        }

        if let Some(slot) = overlay.get(&r) {
            if let Some(payload) = payload_for_slot(cell.row, cell.col, slot) {
                push(&cell.sheet, payload);
            }
            continue;
        }

        match cell.kind {
            CellKind::Formula | CellKind::TextFormula => {
                if let Some(slot) = cache.get(&r) {
                    if let Some(payload) = payload_for_slot(cell.row, cell.col, slot) {
                        push(&cell.sheet, payload);
                    }
                }
                // Unresolved or unevaluated formulas stay out of the snapshot.
            }
            CellKind::Value => {
                if let Some(v) = cell.raw_number {
                    push(&cell.sheet, CellPayload::number(cell.row, cell.col, v));
                } else if let Some(t) = &cell.raw_text {
                    push(&cell.sheet, CellPayload::text(cell.row, cell.col, t.clone()));
                }
            }
        }
    }

    order
        .into_iter()
        .map(|name| {
            let cells = by_sheet.remove(&name).unwrap_or_default();
            SheetPayload { name, cells }
        })
        .collect()
}

/// Build the query list for a set of cell references.
pub fn build_queries(
    cells: &[Cell],
    index: &FxHashMap<CellRef, usize>,
    refs: &[CellRef],
) -> Vec<Query> {
    refs.iter()
        .filter_map(|r| {
            let &i = index.get(r)?;
            let cell = &cells[i];
            Some(Query {
                sheet: cell.sheet.clone(),
                row: cell.row,
                col: cell.col,
                cell_ref: r.to_string(),
            })
        })
        .collect()
}
