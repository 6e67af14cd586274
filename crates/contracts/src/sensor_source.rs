//! SensorSource trait - hardware stream source abstraction
//!
//! Defines the interface through which device callback threads deliver
//! samples, decoupling the synchronization core from concrete devices.

use std::sync::Arc;

use crate::{ContractError, SensorPacket};

/// Event delivered by a source callback thread
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A decoded sample
    Packet(SensorPacket),
    /// The device went away; not retried by the core
    Disconnected { reason: String },
}

/// Sensor data callback type
///
/// Invoked on the source's own thread(s), once per sample. Implementations
/// must return promptly and never block.
pub type SensorDataCallback = Arc<dyn Fn(SourceEvent) + Send + Sync>;

/// Hardware stream source trait
///
/// Abstracts real devices and mock/scripted sources. The core only consumes
/// pushes and never calls back into the source while processing.
///
/// # Example
///
/// ```ignore
/// let source: Box<dyn SensorSource> = Box::new(MockDevice::new(config));
/// source.listen(Arc::new(|event| {
///     println!("Received: {:?}", event);
/// }));
/// // ... capture ...
/// source.stop()?;
/// ```
pub trait SensorSource: Send + Sync {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Register data callback
    ///
    /// Repeated calls while already listening are ignored.
    fn listen(&self, callback: SensorDataCallback);

    /// Stop listening and release the hardware
    ///
    /// # Errors
    /// Returns the teardown failure instead of swallowing it.
    fn stop(&self) -> Result<(), ContractError>;

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
