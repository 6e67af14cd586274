//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Sample timestamps are device clock units (milliseconds by default, f64)
//! - Observations additionally carry the corrected timestamp in seconds
//! - Host time comes from an injected [`Clock`]

mod blueprint;
mod capture_config;
mod clock;
mod error;
mod observation;
mod sensor;
mod sensor_source;
mod sink;

pub use blueprint::*;
pub use capture_config::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::*;
pub use observation::*;
pub use sensor::*;
pub use sensor_source::{SensorDataCallback, SensorSource, SourceEvent};
pub use sink::*;
