//! # Ingestion
//!
//! Sensor sources feeding the capture core.
//!
//! Responsibilities:
//! - `MockDevice`: threaded device simulation (images, IMU, pose) with
//!   configurable rates, clock offset and silent streams
//! - `ScriptedSource`: deterministic event replay for tests
//! - Raw motion buffer decoding into `SensorPacket`
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{MockDevice, MockDeviceConfig};
//! use contracts::{CaptureMode, SensorSource};
//!
//! let device = MockDevice::new(MockDeviceConfig::for_mode(CaptureMode::RgbDepth));
//! let mut orchestrator = CaptureOrchestrator::new(config, Box::new(device), clock, sink);
//! orchestrator.start();
//! let observation = orchestrator.capture()?;
//! ```

mod config;
mod decode;
mod error;
mod mock;
mod scripted;

// Re-exports
pub use config::{ImageStreamConfig, IngestionMetrics, MetricsSnapshot, MockDeviceConfig};
pub use contracts::SensorPacket;
pub use decode::{decode_motion, depth_to_bytes, encode_motion, pod_slice_to_bytes, RawMotion};
pub use error::{IngestionError, Result};
pub use mock::MockDevice;
pub use scripted::{ScriptStep, ScriptedSource};
