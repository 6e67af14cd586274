//! Capture error types.

use contracts::{ContractError, SourceError};
use thiserror::Error;

/// Failure to produce a value at a target timestamp.
///
/// Recovered locally by the orchestrator as a `None` field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    #[error("no samples buffered")]
    Empty,

    #[error("target {target} precedes earliest sample {earliest}")]
    TooOld { target: f64, earliest: f64 },

    #[error("target {target} is beyond latest sample {latest}")]
    Stale { target: f64, latest: f64 },
}

impl InterpolationError {
    /// Short label used in logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            InterpolationError::Empty => "empty",
            InterpolationError::TooOld { .. } => "too_old",
            InterpolationError::Stale { .. } => "stale",
        }
    }
}

/// Frameset assembly failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    #[error("no frames received within {elapsed_ms} ms ({required} required)")]
    Timeout { required: usize, elapsed_ms: u64 },

    #[error("partial frameset: received {received} of {required} frames")]
    PartialData { received: usize, required: usize },

    #[error("frameset cannot be routed: {reason}")]
    Unroutable { reason: String },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Failure of one `capture()` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// No complete frameset before the deadline; the caller may retry
    #[error("capture timed out: received {received} of {required} frames")]
    Timeout { received: usize, required: usize },

    /// Capture timestamp did not advance and the replay policy rejects it
    #[error("capture timestamp {current} does not follow previous {previous}")]
    OutOfOrder { previous: f64, current: f64 },

    /// Frames arrived but could not be assigned to their roles
    #[error("frameset cannot be routed: {0}")]
    Unroutable(String),

    /// Hardware failure, propagated unchanged
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("capture called before start()")]
    NotStarted,
}

impl From<AssemblyError> for CaptureError {
    fn from(err: AssemblyError) -> Self {
        match err {
            AssemblyError::Timeout { required, .. } => CaptureError::Timeout {
                received: 0,
                required,
            },
            AssemblyError::PartialData { received, required } => {
                CaptureError::Timeout { received, required }
            }
            AssemblyError::Unroutable { reason } => CaptureError::Unroutable(reason),
            AssemblyError::Source(source) => CaptureError::Source(source),
        }
    }
}

/// Failure while releasing the hardware.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("failed to stop source '{name}': {source}")]
    Source {
        name: String,
        #[source]
        source: ContractError,
    },
}
