//! Error taxonomy for the dispatch engine.
//!
//! A dispatch engine meant to sit behind a transport layer needs callers
//! to match on failure kind, so this crate uses `thiserror` for a closed,
//! typed error enum rather than a boxed trait object.

use thiserror::Error;

/// All fallible outcomes the dispatch engine's public API can produce.
///
/// Infeasibility (no route fits) and lease-unavailability are *not*
/// represented here — they are ordinary result values (`None`, or
/// [`crate::concurrency::LeaseOutcome::Unavailable`]), not errors, since
/// a caller routinely sees them and must not treat them as exceptional.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Caller-supplied input failed a structural or range check.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An id lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A state-changing request targeted a passenger already in a terminal state.
    #[error("terminal state conflict: {0}")]
    TerminalState(String),

    /// A version-checked update observed a stale version.
    #[error("concurrency conflict: expected version {expected}, store had {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// The persistence layer reported a failure unrelated to a version check.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A programming error: inputs that should never reach this code path
    /// (e.g. asking for the centroid of zero passengers). A defect to
    /// surface, not a condition to recover from.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
