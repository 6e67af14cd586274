//! Raw device buffer decoding
//!
//! Motion samples arrive as three packed native-endian `f32` values, the way
//! HID-style IMUs report them.

use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use contracts::{MotionKind, SensorPacket};
use nalgebra::Vector3;

use crate::error::{IngestionError, Result};

/// Packed motion vector as delivered by the device
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RawMotion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl RawMotion {
    pub const SIZE: usize = std::mem::size_of::<RawMotion>();

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

impl From<Vector3<f64>> for RawMotion {
    fn from(v: Vector3<f64>) -> Self {
        Self {
            x: v.x as f32,
            y: v.y as f32,
            z: v.z as f32,
        }
    }
}

/// Decode one motion sample buffer into a packet
pub fn decode_motion(kind: MotionKind, timestamp: f64, data: &[u8]) -> Result<SensorPacket> {
    let raw: RawMotion =
        bytemuck::try_pod_read_unaligned(data).map_err(|e| IngestionError::DecodeFailed {
            kind: kind.stream_kind(),
            message: format!("{e:?} ({} bytes, expected {})", data.len(), RawMotion::SIZE),
        })?;

    if ![raw.x, raw.y, raw.z].iter().all(|c| c.is_finite()) {
        return Err(IngestionError::DecodeFailed {
            kind: kind.stream_kind(),
            message: "non-finite component".into(),
        });
    }

    Ok(SensorPacket::motion(kind, timestamp, raw.to_vector()))
}

/// Encode a motion vector into the device's packed layout
#[inline]
pub fn encode_motion(vector: Vector3<f64>) -> Bytes {
    pod_slice_to_bytes(&[RawMotion::from(vector)])
}

/// Safely convert slice implementing bytemuck::Pod to bytes::Bytes
#[inline]
pub fn pod_slice_to_bytes<T: Pod>(slice: &[T]) -> Bytes {
    Bytes::copy_from_slice(bytemuck::cast_slice(slice))
}

/// Depth buffer (`Z16`) from per-pixel millimetre values
pub fn depth_to_bytes(depth_mm: &[u16]) -> Bytes {
    pod_slice_to_bytes(depth_mm)
}
