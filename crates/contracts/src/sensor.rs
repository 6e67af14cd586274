//! SensorPacket - hardware callback output
//!
//! Raw, already-decoded samples pushed by sensor callback threads.

use bytes::Bytes;
use nalgebra::{Isometry3, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid 6-DoF transform (translation + unit quaternion rotation).
pub type Pose3D = Isometry3<f64>;

/// Kind of stream a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Color,
    Depth,
    Infrared,
    Fisheye,
    Gyro,
    Accel,
    Pose,
}

impl StreamKind {
    /// Image-type streams go through frameset assembly; the rest are buffered.
    pub fn is_image(self) -> bool {
        matches!(
            self,
            StreamKind::Color | StreamKind::Depth | StreamKind::Infrared | StreamKind::Fisheye
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
            StreamKind::Infrared => "infrared",
            StreamKind::Fisheye => "fisheye",
            StreamKind::Gyro => "gyro",
            StreamKind::Accel => "accel",
            StreamKind::Pose => "pose",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inertial channel of a [`MotionSample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    Gyro,
    Accel,
}

impl MotionKind {
    pub fn stream_kind(self) -> StreamKind {
        match self {
            MotionKind::Gyro => StreamKind::Gyro,
            MotionKind::Accel => StreamKind::Accel,
        }
    }
}

/// Timestamped value stored in a time series.
///
/// `timestamp` is in device clock units (milliseconds for the default
/// configuration).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample<V> {
    pub timestamp: f64,
    pub value: V,
}

impl<V> Sample<V> {
    pub fn new(timestamp: f64, value: V) -> Self {
        Self { timestamp, value }
    }
}

/// Gyroscope (rad/s) or accelerometer (m/s²) reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub kind: MotionKind,
    pub vector: Vector3<f64>,
}

impl MotionSample {
    pub fn gyro(x: f64, y: f64, z: f64) -> Self {
        Self {
            kind: MotionKind::Gyro,
            vector: Vector3::new(x, y, z),
        }
    }

    pub fn accel(x: f64, y: f64, z: f64) -> Self {
        Self {
            kind: MotionKind::Accel,
            vector: Vector3::new(x, y, z),
        }
    }
}

/// 6-DoF pose reported by a tracking module.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub transform: Pose3D,
    /// Tracker confidence (0 = failed .. 3 = high)
    pub confidence: u32,
}

/// Pixel layout of an [`ImageFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    Y8,
    Z16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Y8 => 1,
            PixelFormat::Z16 => 2,
        }
    }
}

/// Decoded image delivered by an image stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFrame {
    pub stream_kind: StreamKind,
    /// Physical stream index (e.g. 1 = left IR, 2 = right IR)
    pub stream_index: u8,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Opaque pixel buffer (zero-copy)
    pub data: Bytes,
}

/// Sensor payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorPayload {
    Image(ImageFrame),
    Motion(Vector3<f64>),
    Pose(PoseSample),
}

/// Sample pushed by a hardware callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorPacket {
    pub kind: StreamKind,
    /// Device clock timestamp
    pub timestamp: f64,
    pub payload: SensorPayload,
}

impl SensorPacket {
    pub fn image(frame: ImageFrame) -> Self {
        Self {
            kind: frame.stream_kind,
            timestamp: frame.timestamp,
            payload: SensorPayload::Image(frame),
        }
    }

    pub fn motion(kind: MotionKind, timestamp: f64, vector: Vector3<f64>) -> Self {
        Self {
            kind: kind.stream_kind(),
            timestamp,
            payload: SensorPayload::Motion(vector),
        }
    }

    pub fn pose(timestamp: f64, pose: PoseSample) -> Self {
        Self {
            kind: StreamKind::Pose,
            timestamp,
            payload: SensorPayload::Pose(pose),
        }
    }
}
