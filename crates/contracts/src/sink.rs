//! Sink traits - capture output interfaces
//!
//! `EventSink` is what the capture core emits into (synchronously, from the
//! consumer thread). `DataSink` is the async writer driven by a dispatcher
//! worker.

use crate::{CaptureEvent, ContractError};

/// Consumer of capture results and inter-frame motion events
///
/// `emit` is called on the capture thread and must not block for long.
pub trait EventSink: Send + Sync {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one event
    ///
    /// # Errors
    /// Failures are logged by the caller and never abort a capture.
    fn emit(&self, event: CaptureEvent) -> Result<(), ContractError>;
}

/// Async writer
///
/// All worker-backed sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one event
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, event: &CaptureEvent) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
