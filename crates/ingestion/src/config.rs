//! Mock device configuration and ingestion counters

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{CaptureMode, PixelFormat, StreamKind};

/// One image stream produced by the mock device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStreamConfig {
    pub kind: StreamKind,
    /// Physical stream index
    pub index: u8,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl ImageStreamConfig {
    pub fn new(kind: StreamKind, index: u8) -> Self {
        let format = match kind {
            StreamKind::Color => PixelFormat::Rgb8,
            StreamKind::Depth => PixelFormat::Z16,
            _ => PixelFormat::Y8,
        };
        Self {
            kind,
            index,
            width: 64,
            height: 48,
            format,
        }
    }

    /// Size in bytes of one frame
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Mock device configuration
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    /// Device name (used for logging)
    pub name: String,
    /// Image streams, all triggered together at `frame_rate_hz`
    pub image_streams: Vec<ImageStreamConfig>,
    /// Frameset frequency (Hz)
    pub frame_rate_hz: f64,
    /// Gyro frequency (Hz), 0 disables the stream
    pub gyro_hz: f64,
    /// Accel frequency (Hz), 0 disables the stream
    pub accel_hz: f64,
    /// Pose frequency (Hz), 0 disables the stream
    pub pose_hz: f64,
    /// Device timestamp units per second
    pub units_per_second: f64,
    /// Offset added to every device timestamp (device units)
    pub clock_offset: f64,
    /// Streams that are configured but never deliver
    pub silent_streams: Vec<StreamKind>,
    /// Make `stop` report a teardown failure
    pub fail_on_stop: bool,
}

impl MockDeviceConfig {
    /// Image streams matching a capture mode
    pub fn for_mode(mode: CaptureMode) -> Self {
        let image_streams = match mode {
            CaptureMode::RgbDepth => vec![
                ImageStreamConfig::new(StreamKind::Color, 0),
                ImageStreamConfig::new(StreamKind::Depth, 0),
            ],
            CaptureMode::IrDepth => vec![
                ImageStreamConfig::new(StreamKind::Infrared, 1),
                ImageStreamConfig::new(StreamKind::Depth, 0),
            ],
            CaptureMode::StereoIr => vec![
                ImageStreamConfig::new(StreamKind::Infrared, 1),
                ImageStreamConfig::new(StreamKind::Infrared, 2),
            ],
            CaptureMode::Fisheye => vec![
                ImageStreamConfig::new(StreamKind::Fisheye, 1),
                ImageStreamConfig::new(StreamKind::Fisheye, 2),
            ],
            CaptureMode::RgbDepthIr => vec![
                ImageStreamConfig::new(StreamKind::Color, 0),
                ImageStreamConfig::new(StreamKind::Depth, 0),
                ImageStreamConfig::new(StreamKind::Infrared, 1),
            ],
        };
        Self {
            image_streams,
            ..Self::default()
        }
    }

    /// Device stays quiet on `kind`
    pub fn with_silent(mut self, kind: StreamKind) -> Self {
        self.silent_streams.push(kind);
        self
    }

    pub fn is_silent(&self, kind: StreamKind) -> bool {
        self.silent_streams.contains(&kind)
    }
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            name: "mock_device".to_string(),
            image_streams: Vec::new(),
            frame_rate_hz: 30.0,
            gyro_hz: 200.0,
            accel_hz: 100.0,
            pose_hz: 0.0,
            units_per_second: 1000.0,
            clock_offset: 0.0,
            silent_streams: Vec::new(),
            fail_on_stop: false,
        }
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total packets delivered to the callback
    pub packets_sent: AtomicU64,

    /// Packets withheld because the stream is silent
    pub packets_suppressed: AtomicU64,

    /// Decode failures
    pub decode_errors: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record packet delivered
    pub fn record_sent(&self, kind: StreamKind) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ingestion_packets_total", "stream" => kind.as_str()).increment(1);
    }

    /// Record packet withheld
    pub fn record_suppressed(&self) {
        self.packets_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record decode error
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_suppressed: self.packets_suppressed.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Total packets delivered
    pub packets_sent: u64,

    /// Total packets withheld
    pub packets_suppressed: u64,

    /// Decode error count
    pub decode_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_mode_streams_match_required() {
        for mode in [
            CaptureMode::RgbDepth,
            CaptureMode::IrDepth,
            CaptureMode::StereoIr,
            CaptureMode::Fisheye,
            CaptureMode::RgbDepthIr,
        ] {
            let config = MockDeviceConfig::for_mode(mode);
            let mut kinds: Vec<_> = config.image_streams.iter().map(|s| s.kind).collect();
            let mut required = mode.required_streams();
            kinds.sort();
            required.sort();
            assert_eq!(kinds, required, "{mode:?}");
        }
    }

    #[test]
    fn test_frame_len() {
        let depth = ImageStreamConfig::new(StreamKind::Depth, 0);
        assert_eq!(depth.format, PixelFormat::Z16);
        assert_eq!(depth.frame_len(), 64 * 48 * 2);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = IngestionMetrics::new();
        metrics.record_sent(StreamKind::Gyro);
        metrics.record_sent(StreamKind::Color);
        metrics.record_suppressed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.packets_sent, 2);
        assert_eq!(snapshot.packets_suppressed, 1);
        assert_eq!(snapshot.decode_errors, 0);
    }
}
