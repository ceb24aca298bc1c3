//! Calculation backend adapter.
//!
//! The pipeline talks to whatever actually evaluates formulas through the
//! [`CalcBackend`] trait: one blocking request/response round-trip per batch.
//! The stock implementation shells out to a wrapper subprocess
//! ([`SubprocessBackend`]); a persistent worker pool can replace it without
//! touching pipeline code.

mod subprocess;

pub use subprocess::SubprocessBackend;

use gridcheck_protocol::{EvalRequest, EvalResponse};

/// A calculation backend honoring the batch request/response contract.
///
/// Implementations must be deterministic: the same snapshot and queries
/// produce the same results. Each request is self-contained; no state may be
/// retained across calls.
pub trait CalcBackend: Send + Sync {
    /// Evaluate one batch. Blocking, bounded by the implementation's timeout.
    ///
    /// `Err` means the transport itself failed; a response with
    /// `success: false` means the backend ran but rejected the batch. Callers
    /// treat both as whole-batch failure.
    fn evaluate(&self, request: &EvalRequest) -> Result<EvalResponse, BackendError>;
}

/// Error type for backend transport operations.
#[derive(Debug)]
pub enum BackendError {
    /// The backend process could not be started.
    Spawn(String),
    /// Reading/writing the backend streams failed, or it exited abnormally.
    Io(String),
    /// The bounded wait elapsed; the backend was killed.
    Timeout(u64),
    /// The backend produced output that is not a valid response.
    Parse(String),
    /// The backend ran but reported the whole batch as failed.
    Failed(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Spawn(msg) => write!(f, "could not start backend: {}", msg),
            BackendError::Io(msg) => write!(f, "backend I/O error: {}", msg),
            BackendError::Timeout(secs) => {
                write!(f, "backend did not answer within {}s", secs)
            }
            BackendError::Parse(msg) => write!(f, "unparseable backend response: {}", msg),
            BackendError::Failed(msg) => write!(f, "backend rejected batch: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}
