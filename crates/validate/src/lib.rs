//! `gridcheck-validate` — computed-vs-stored reconciliation.
//!
//! Pure classification crate: receives evaluated cells, compares each
//! computed value against the workbook's own stored result, and returns
//! bucketed per-cell checks plus a summary report. No backend or IO
//! dependencies.

pub mod classify;
pub mod model;
pub mod report;

pub use classify::check_cell;
pub use model::{CellCheck, CheckBucket, CheckKind};
pub use report::{validate_cells, ValidationReport, ValidationStatus};
