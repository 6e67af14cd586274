//! # Sync Engine
//!
//! 多路 RGB-D / IMU / 位姿流的采集同步核心。
//!
//! 负责：
//! - 有界、按时间戳排序的每流缓冲 (`TimeSeriesBuffer`)
//! - 任意时间戳上的位姿/IMU 插值，带有界等待 (`TemporalInterpolator`)
//! - 设备时钟偏差检测与主机时间替换 (`ClockSkewGuard`)
//! - 有界重试的帧组装与角色路由 (`FrameSetAssembler`)
//! - 输出 `CompositeObservation` 与帧间 IMU 回放事件 (`CaptureOrchestrator`)
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::CaptureOrchestrator;
//!
//! let mut orchestrator = CaptureOrchestrator::new(config, source, clock, sink);
//! orchestrator.start();
//!
//! loop {
//!     match orchestrator.capture() {
//!         Ok(observation) => { /* hand to the pipeline */ }
//!         Err(CaptureError::Timeout { .. }) => continue,
//!         Err(err) => break,
//!     }
//! }
//! orchestrator.shutdown()?;
//! ```

mod assembler;
mod buffer;
mod clock_skew;
mod error;
mod frame_syncer;
mod interpolator;
mod orchestrator;

pub use assembler::{route, route_frames, FrameSetAssembler, FrameSource};
pub use buffer::{BracketResult, SharedSeries, TimeSeriesBuffer};
pub use clock_skew::{ClockCorrection, ClockSkewGuard};
pub use error::{AssemblyError, CaptureError, InterpolationError, ShutdownError};
pub use frame_syncer::{FrameSender, FrameSyncer};
pub use interpolator::{interpolate_between, Interpolate, TemporalInterpolator};
pub use orchestrator::{odometry_estimate, CaptureOrchestrator, SensorInputs};

// Re-export contracts types
pub use contracts::{CaptureConfig, CompositeObservation, FrameSet, MotionEvent, Sample};
