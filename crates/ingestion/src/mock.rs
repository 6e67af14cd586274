//! Mock 设备实现
//!
//! 实现 `SensorSource` trait，在后台线程中按配置频率生成图像、IMU 与位姿数据。
//! 数据通过回调函数推送，与真实设备的回调线程行为一致。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use contracts::{
    Clock, ContractError, ImageFrame, MotionKind, PixelFormat, PoseSample, SensorDataCallback,
    SensorPacket, SensorSource, SourceEvent, StreamKind, SystemClock,
};
use nalgebra::{Translation3, UnitQuaternion, Vector3};
use tracing::{debug, trace, warn};

use crate::config::{ImageStreamConfig, IngestionMetrics, MockDeviceConfig};
use crate::decode::{decode_motion, depth_to_bytes, encode_motion};
use crate::error::IngestionError;

/// 设备时钟：监听开始时的主机时间 + 单调流逝时间
#[derive(Debug, Clone, Copy)]
struct DeviceClock {
    base_s: f64,
    started: Instant,
    units_per_second: f64,
    offset: f64,
}

impl DeviceClock {
    fn now_s(&self) -> f64 {
        self.base_s + self.started.elapsed().as_secs_f64()
    }

    fn now(&self) -> f64 {
        self.now_s() * self.units_per_second + self.offset
    }
}

/// Mock 设备
///
/// 所有图像流在同一帧触发时刻共享时间戳（模拟硬件同步），
/// 运动流与位姿流各自运行在独立线程中。
pub struct MockDevice {
    config: MockDeviceConfig,
    clock: Arc<dyn Clock>,
    listening: Arc<AtomicBool>,
    callback: Mutex<Option<SensorDataCallback>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<IngestionMetrics>,
}

impl MockDevice {
    /// 创建新的 Mock 设备，使用系统时钟
    pub fn new(config: MockDeviceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// 使用指定主机时钟创建
    pub fn with_clock(config: MockDeviceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            listening: Arc::new(AtomicBool::new(false)),
            callback: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    pub fn config(&self) -> &MockDeviceConfig {
        &self.config
    }

    /// 共享的计数器
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// 模拟设备断开：停止所有线程并通知回调
    pub fn disconnect(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.listening.store(false, Ordering::SeqCst);
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        warn!(device = %self.config.name, %reason, "mock device disconnected");
        if let Some(callback) = callback {
            callback(SourceEvent::Disconnected { reason });
        }
    }

    fn spawn_stream<F>(&self, stream: &'static str, hz: f64, mut tick: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        let interval = match Duration::try_from_secs_f64(1.0 / hz) {
            Ok(interval) if hz > 0.0 => interval,
            _ => {
                trace!(device = %self.config.name, stream, "stream disabled");
                return;
            }
        };

        let listening = self.listening.clone();
        let name = self.config.name.clone();
        let handle = thread::spawn(move || {
            debug!(device = %name, stream, hz, "mock stream started");
            let mut seq: u64 = 0;
            while listening.load(Ordering::Relaxed) {
                seq += 1;
                tick(seq);
                thread::sleep(interval);
            }
            debug!(device = %name, stream, sent = seq, "mock stream stopped");
        });

        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn image_frame(stream: &ImageStreamConfig, timestamp: f64, seq: u64) -> ImageFrame {
        let pixels = stream.width as usize * stream.height as usize;
        let data = match stream.format {
            PixelFormat::Z16 => depth_to_bytes(&vec![1000u16 + (seq % 100) as u16; pixels]),
            _ => Bytes::from(vec![(seq % 256) as u8; stream.frame_len()]),
        };
        ImageFrame {
            stream_kind: stream.kind,
            stream_index: stream.index,
            timestamp,
            width: stream.width,
            height: stream.height,
            format: stream.format,
            data,
        }
    }

    fn motion_value(kind: MotionKind, t_s: f64) -> Vector3<f64> {
        match kind {
            MotionKind::Gyro => Vector3::new(0.0, 0.0, 0.1 * t_s.sin()),
            MotionKind::Accel => Vector3::new(0.0, 0.0, 9.81),
        }
    }

    fn pose_value(t_s: f64) -> PoseSample {
        PoseSample {
            transform: contracts::Pose3D::from_parts(
                Translation3::new(0.1 * t_s, 0.0, 0.0),
                UnitQuaternion::from_euler_angles(0.0, 0.0, 0.05 * t_s),
            ),
            confidence: 3,
        }
    }

    fn start_images(&self, clock: DeviceClock, callback: SensorDataCallback) {
        if self.config.image_streams.is_empty() {
            return;
        }
        let streams = self.config.image_streams.clone();
        let config = self.config.clone();
        let metrics = self.metrics.clone();
        self.spawn_stream("images", self.config.frame_rate_hz, move |seq| {
            let timestamp = clock.now();
            for stream in &streams {
                if config.is_silent(stream.kind) {
                    metrics.record_suppressed();
                    continue;
                }
                let frame = Self::image_frame(stream, timestamp, seq);
                callback(SourceEvent::Packet(SensorPacket::image(frame)));
                metrics.record_sent(stream.kind);
            }
            trace!(device = %config.name, seq, timestamp, "mock frameset sent");
        });
    }

    fn start_motion(
        &self,
        kind: MotionKind,
        hz: f64,
        clock: DeviceClock,
        callback: SensorDataCallback,
    ) {
        let silent = self.config.is_silent(kind.stream_kind());
        let metrics = self.metrics.clone();
        let stream = kind.stream_kind().as_str();
        self.spawn_stream(stream, hz, move |_| {
            if silent {
                metrics.record_suppressed();
                return;
            }
            let t_s = clock.now_s();
            let raw = encode_motion(Self::motion_value(kind, t_s));
            match decode_motion(kind, clock.now(), &raw) {
                Ok(packet) => {
                    callback(SourceEvent::Packet(packet));
                    metrics.record_sent(kind.stream_kind());
                }
                Err(e) => {
                    metrics.record_decode_error();
                    trace!(error = %e, "failed to decode motion sample");
                }
            }
        });
    }

    fn start_pose(&self, clock: DeviceClock, callback: SensorDataCallback) {
        let silent = self.config.is_silent(StreamKind::Pose);
        let metrics = self.metrics.clone();
        self.spawn_stream("pose", self.config.pose_hz, move |_| {
            if silent {
                metrics.record_suppressed();
                return;
            }
            let pose = Self::pose_value(clock.now_s());
            callback(SourceEvent::Packet(SensorPacket::pose(clock.now(), pose)));
            metrics.record_sent(StreamKind::Pose);
        });
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("config", &self.config)
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

impl SensorSource for MockDevice {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn listen(&self, callback: SensorDataCallback) {
        // 幂等：已在监听则不重复启动
        if self.listening.swap(true, Ordering::SeqCst) {
            trace!(device = %self.config.name, "mock device already listening");
            return;
        }
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback.clone());

        let clock = DeviceClock {
            base_s: self.clock.now(),
            started: Instant::now(),
            units_per_second: self.config.units_per_second,
            offset: self.config.clock_offset,
        };

        debug!(
            device = %self.config.name,
            image_streams = self.config.image_streams.len(),
            frame_rate_hz = self.config.frame_rate_hz,
            clock_offset = self.config.clock_offset,
            "mock device started"
        );

        self.start_images(clock, callback.clone());
        self.start_motion(MotionKind::Gyro, self.config.gyro_hz, clock, callback.clone());
        self.start_motion(MotionKind::Accel, self.config.accel_hz, clock, callback.clone());
        self.start_pose(clock, callback);
    }

    fn stop(&self) -> Result<(), ContractError> {
        self.listening.store(false, Ordering::SeqCst);
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!(device = %self.config.name, "mock stream thread panicked");
            }
        }
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(device = %self.config.name, "mock device stopped");

        if self.config.fail_on_stop {
            return Err(IngestionError::StopFailed {
                name: self.config.name.clone(),
                reason: "device did not acknowledge stop".into(),
            }
            .into());
        }
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}
