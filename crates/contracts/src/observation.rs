//! CompositeObservation - capture output
//!
//! Time-aligned frameset plus pose/IMU state interpolated at its timestamp.

use std::collections::BTreeMap;

use nalgebra::Matrix6;
use serde::{Deserialize, Serialize};

use crate::{CaptureMode, ImageFrame, MotionSample, Pose3D, PoseSample};

/// Slot an image frame is routed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRole {
    /// RGB (or IR used as RGB) image
    Color,
    /// Depth image
    Depth,
    /// Left image of a stereo pair
    Left,
    /// Right image of a stereo pair
    Right,
    /// Synchronized extra stream that is not handed to the pipeline
    Auxiliary,
}

/// Time-aligned group of image frames treated as one logical frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSet {
    pub mode: CaptureMode,
    /// Minimum member timestamp (device units)
    pub timestamp: f64,
    pub frames: BTreeMap<FrameRole, ImageFrame>,
    /// Number of frames received from the source
    pub received: usize,
}

impl FrameSet {
    pub fn get(&self, role: FrameRole) -> Option<&ImageFrame> {
        self.frames.get(&role)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Odometry pose in the base frame with a confidence-derived covariance
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OdometryEstimate {
    pub pose: Pose3D,
    /// 6x6 covariance (translation rows first)
    pub covariance: Matrix6<f64>,
    pub confidence: u32,
}

/// Unit returned by one capture call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeObservation {
    /// Monotonically increasing capture sequence number
    pub sequence: u64,
    pub frameset: FrameSet,
    /// Corrected frameset timestamp (device units)
    pub timestamp: f64,
    /// Corrected frameset timestamp (seconds)
    pub timestamp_s: f64,
    /// Whether host time was substituted for the device timestamp
    pub clock_corrected: bool,
    pub interpolated_pose: Option<PoseSample>,
    /// (gyro, accel)
    pub interpolated_motion: Option<(MotionSample, MotionSample)>,
    pub odometry: Option<OdometryEstimate>,
}

/// Inter-frame IMU event replayed at motion-sensor rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionEvent {
    /// Gyro sample timestamp (device units)
    pub timestamp: f64,
    pub timestamp_s: f64,
    pub gyro: MotionSample,
    pub accel: MotionSample,
}

/// Event delivered to an [`EventSink`](crate::EventSink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CaptureEvent {
    Observation(CompositeObservation),
    Motion(MotionEvent),
}

impl CaptureEvent {
    /// Event timestamp in device units
    pub fn timestamp(&self) -> f64 {
        match self {
            CaptureEvent::Observation(obs) => obs.timestamp,
            CaptureEvent::Motion(event) => event.timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CaptureEvent::Observation(_) => "observation",
            CaptureEvent::Motion(_) => "motion",
        }
    }
}
