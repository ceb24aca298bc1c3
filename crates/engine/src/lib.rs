//! `gridcheck-engine` — cells, dependency graph, scheduling.
//!
//! Pure data crate: receives decoded cell records, builds the dependency
//! graph, finds circular-reference groups, and orders the remaining formula
//! cells into dependency-safe evaluation batches. No I/O and no backend
//! dependencies.

pub mod addr;
pub mod cell;
pub mod graph;
pub mod schedule;

pub use cell::{Cell, CellKind, CellRef, EngineChoice};
pub use graph::{CellGraph, NodeId};
pub use schedule::{schedule_batches, ScheduleError};
