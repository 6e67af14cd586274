//! # Dispatcher
//!
//! 数据分发模块。
//!
//! 负责：
//! - 作为 `EventSink` 接收采集结果与帧间 IMU 事件
//! - Fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞采集线程

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{CaptureEvent, DataSink, EventSink};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, Outcome, SinkMetrics};
pub use sinks::{ChannelSink, LogSink};
