//! `gridcheck-pipeline` — the evaluation session.
//!
//! Wires the engine, backend, and validator into one session: build the
//! dependency graph, detect circular groups, evaluate the acyclic formulas
//! in dependency-ordered batches through the calculation backend, resolve
//! circular groups (backend-native first, iterative fallback second), then
//! reconcile every computed value against the workbook's stored results.
//!
//! One session owns one workbook's cells, cache, and stats; independent
//! sessions share nothing and may run concurrently.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use gridcheck_backend::SubprocessBackend;
//! use gridcheck_config::Settings;
//! use gridcheck_pipeline::Session;
//!
//! let settings = Settings::load_default()?;
//! let backend = SubprocessBackend::new(
//!     settings.backend.program.clone(),
//!     settings.backend.args.clone(),
//!     settings.backend_timeout(),
//! );
//! let report = Session::new(settings, Arc::new(backend)).run(cells)?;
//! println!("{}", report.stats.log_line());
//! ```

pub mod cache;
pub mod circular;
pub mod evaluator;
pub mod harness;
pub mod progress;
pub mod session;
pub mod snapshot;
pub mod stats;

pub use cache::{EvalCache, Slot};
pub use circular::{CircularResolver, GroupOutcome, GroupReport};
pub use evaluator::Evaluator;
pub use progress::{ChannelProgress, NoopProgress, ProgressEvent, ProgressLog, ProgressSink};
pub use session::{CancelToken, Session, SessionError, SessionReport, SessionStatus};
pub use stats::SessionStats;
