//! Capture configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{Pose3D, StreamKind};

/// Default per-stream buffer capacity
pub const MAX_SAMPLES: usize = 1000;

/// Image stream combination produced by the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Color + depth
    #[default]
    RgbDepth,
    /// Infrared used as color + depth
    IrDepth,
    /// Left + right infrared
    StereoIr,
    /// Left + right fisheye (tracking camera)
    Fisheye,
    /// Color + depth + infrared, all three hardware-synchronized
    RgbDepthIr,
}

impl CaptureMode {
    /// Streams a complete frameset must contain (multiset)
    pub fn required_streams(self) -> Vec<StreamKind> {
        match self {
            CaptureMode::RgbDepth => vec![StreamKind::Color, StreamKind::Depth],
            CaptureMode::IrDepth => vec![StreamKind::Infrared, StreamKind::Depth],
            CaptureMode::StereoIr => vec![StreamKind::Infrared, StreamKind::Infrared],
            CaptureMode::Fisheye => vec![StreamKind::Fisheye, StreamKind::Fisheye],
            CaptureMode::RgbDepthIr => {
                vec![StreamKind::Color, StreamKind::Depth, StreamKind::Infrared]
            }
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CaptureConfig {
    /// Image stream combination
    #[serde(default)]
    pub mode: CaptureMode,

    /// Overrides the streams required by `mode`
    #[serde(default)]
    #[validate(length(min = 1, max = 3))]
    pub required_streams: Option<Vec<StreamKind>>,

    #[serde(default)]
    #[validate(nested)]
    pub assembly: AssemblyConfig,

    #[serde(default)]
    #[validate(nested)]
    pub interpolation: InterpolationConfig,

    #[serde(default)]
    #[validate(nested)]
    pub clock: ClockConfig,

    #[serde(default)]
    #[validate(nested)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub replay: ReplayConfig,

    #[serde(default)]
    pub odometry: OdometryConfig,
}

impl CaptureConfig {
    /// Streams required for a complete frameset
    pub fn required_streams(&self) -> Vec<StreamKind> {
        self.required_streams
            .clone()
            .unwrap_or_else(|| self.mode.required_streams())
    }
}

/// Frameset assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AssemblyConfig {
    /// First wait on the frame source (ms)
    #[validate(range(min = 1))]
    pub initial_timeout_ms: u64,
    /// Subsequent waits while the frameset is incomplete (ms)
    #[validate(range(min = 1))]
    pub retry_timeout_ms: u64,
    /// Overall retry deadline (seconds)
    #[validate(range(min = 0.0))]
    pub deadline_s: f64,
    /// Max timestamp spread of frames grouped into one set (device units)
    #[validate(range(min = 0.0))]
    pub frameset_tolerance: f64,
    /// Image frames queued between callbacks and assembly
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            initial_timeout_ms: 5000,
            retry_timeout_ms: 100,
            deadline_s: 2.0,
            frameset_tolerance: 20.0,
            queue_capacity: 32,
        }
    }
}

/// Pose/IMU interpolation configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Wait budget for late motion samples (ms, 0 = no wait)
    pub max_wait_ms: u64,
    /// Poll interval while waiting (ms)
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,
    /// Streams share a device-corrected clock; disables extrapolation
    pub global_time_sync: bool,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 35,
            poll_interval_ms: 1,
            global_time_sync: true,
        }
    }
}

/// Device/host clock configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClockConfig {
    /// Device timestamp units per second (1000 = milliseconds)
    #[validate(range(exclusive_min = 0.0))]
    pub device_units_per_second: f64,
    /// Device/host divergence beyond which host time is substituted (seconds)
    #[validate(range(exclusive_min = 0.0))]
    pub skew_threshold_s: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            device_units_per_second: 1000.0,
            skew_threshold_s: 1e9,
        }
    }
}

/// Buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum samples kept per motion/pose stream
    #[validate(range(min = 1))]
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_SAMPLES,
        }
    }
}

/// Inter-frame motion replay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Replay every gyro sample between two captures as a motion event
    #[serde(default)]
    pub inter_frame: bool,
    /// What to do when a capture is not newer than the previous one
    #[serde(default)]
    pub out_of_order: OutOfOrderPolicy,
}

/// Handling of a capture timestamp that does not advance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfOrderPolicy {
    /// Log, skip replay, keep the previous timestamp
    #[default]
    Skip,
    /// Log, skip replay, adopt the new timestamp
    Resync,
    /// Fail the capture
    Reject,
}

/// Pose stream configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdometryConfig {
    /// Device provides a pose stream
    #[serde(default)]
    pub provided: bool,
    /// Base-to-pose-sensor transform
    #[serde(default)]
    pub local_transform: Option<TransformConfig>,
}

impl OdometryConfig {
    pub fn local_pose(&self) -> Pose3D {
        self.local_transform
            .map(|t| t.to_pose())
            .unwrap_or_else(Pose3D::identity)
    }
}

/// Translation (m) + roll/pitch/yaw (rad)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl TransformConfig {
    pub fn to_pose(self) -> Pose3D {
        Pose3D::from_parts(
            nalgebra::Translation3::new(self.x, self.y, self.z),
            nalgebra::UnitQuaternion::from_euler_angles(self.roll, self.pitch, self.yaw),
        )
    }
}
