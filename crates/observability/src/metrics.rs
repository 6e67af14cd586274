//! 采集指标收集模块
//!
//! 基于 CompositeObservation 收集和统计采集核心的运行指标。

use std::collections::BTreeMap;

use contracts::CompositeObservation;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// 注册采集指标的说明文本（Prometheus HELP）
pub fn describe_capture_metrics() {
    describe_counter!("capture_frames_total", "Capture attempts by status");
    describe_counter!(
        "capture_assembly_failures_total",
        "Frameset assembly failures by reason"
    );
    describe_counter!(
        "capture_interpolation_failures_total",
        "Pose/IMU lookups that could not be resolved"
    );
    describe_counter!(
        "capture_clock_skew_corrections_total",
        "Framesets whose device timestamp was replaced by host time"
    );
    describe_counter!(
        "capture_inter_frame_events_total",
        "Motion events replayed between captures"
    );
    describe_counter!(
        "capture_frames_dropped_total",
        "Image frames dropped because the assembly queue was full"
    );
    describe_counter!(
        "capture_events_dispatched_total",
        "Events handed to sinks by sink and status"
    );
    describe_counter!(
        "capture_frames_clock_corrected_total",
        "Observations carrying a host-corrected timestamp"
    );
    describe_counter!(
        "capture_frames_without_pose_total",
        "Observations emitted with no pose"
    );
    describe_counter!(
        "capture_frames_without_motion_total",
        "Observations emitted with no gyro or accel sample"
    );
    describe_counter!("capture_sink_errors_total", "Sink write failures by sink");
    describe_gauge!("capture_buffer_depth", "Samples buffered per stream");
    describe_gauge!("capture_last_sequence", "Sequence number of the last observation");
    describe_histogram!(
        "capture_latency_ms",
        Unit::Milliseconds,
        "Wall time of one capture call"
    );
    describe_histogram!(
        "capture_frameset_spread",
        "Timestamp spread inside one frameset (device units)"
    );
}

/// 从一次成功采集记录指标
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_capture_metrics;
///
/// let observation = orchestrator.capture()?;
/// record_capture_metrics(&observation, started.elapsed().as_secs_f64());
/// ```
pub fn record_capture_metrics(observation: &CompositeObservation, latency_s: f64) {
    counter!("capture_frames_total", "status" => "ok").increment(1);
    gauge!("capture_last_sequence").set(observation.sequence as f64);

    // 采集耗时 (秒 -> 毫秒)
    histogram!("capture_latency_ms").record(latency_s * 1000.0);

    // 帧组内时间戳离散度
    histogram!("capture_frameset_spread").record(frameset_spread(observation));

    if observation.clock_corrected {
        counter!("capture_frames_clock_corrected_total").increment(1);
    }
    if observation.interpolated_pose.is_none() {
        counter!("capture_frames_without_pose_total").increment(1);
    }
    if observation.interpolated_motion.is_none() {
        counter!("capture_frames_without_motion_total").increment(1);
    }
}

/// 记录采集失败
pub fn record_capture_failure(reason: &str) {
    counter!("capture_frames_total", "status" => "error").increment(1);
    counter!(
        "capture_assembly_failures_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录帧间 IMU 回放事件数
pub fn record_motion_events(count: usize) {
    counter!("capture_inter_frame_events_total").increment(count as u64);
}

/// 记录事件分发
pub fn record_event_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "capture_events_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录缓冲区深度
pub fn record_buffer_depth(stream: &str, depth: usize) {
    gauge!(
        "capture_buffer_depth",
        "stream" => stream.to_string()
    )
    .set(depth as f64);
}

/// 帧组成员时间戳的最大差值 (设备单位)
fn frameset_spread(observation: &CompositeObservation) -> f64 {
    let timestamps = observation.frameset.frames.values().map(|f| f.timestamp);
    let (min, max) = timestamps.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
        (lo.min(t), hi.max(t))
    });
    if min.is_finite() {
        max - min
    } else {
        0.0
    }
}

/// 采集指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct CaptureMetricsAggregator {
    /// 成功采集数
    pub total_captures: u64,

    /// 时钟被替换的采集数
    pub clock_corrected: u64,

    /// 缺少位姿的采集数
    pub without_pose: u64,

    /// 缺少 IMU 的采集数
    pub without_motion: u64,

    /// 帧间回放事件数
    pub motion_events: u64,

    /// 失败原因计数
    pub failures: BTreeMap<String, u64>,

    /// 采集耗时统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 相邻采集间隔统计 (设备单位)
    pub interval_stats: RunningStats,

    /// 帧组离散度统计 (设备单位)
    pub spread_stats: RunningStats,

    last_timestamp: Option<f64>,
}

impl CaptureMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, observation: &CompositeObservation, latency_ms: f64) {
        self.total_captures += 1;
        if observation.clock_corrected {
            self.clock_corrected += 1;
        }
        if observation.interpolated_pose.is_none() {
            self.without_pose += 1;
        }
        if observation.interpolated_motion.is_none() {
            self.without_motion += 1;
        }

        self.latency_stats.push(latency_ms);
        self.spread_stats.push(frameset_spread(observation));
        if let Some(last) = self.last_timestamp {
            self.interval_stats.push(observation.timestamp - last);
        }
        self.last_timestamp = Some(observation.timestamp);
    }

    /// 记录一次失败
    pub fn record_failure(&mut self, reason: &str) {
        *self.failures.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn record_motion_events(&mut self, count: usize) {
        self.motion_events += count as u64;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let failures: u64 = self.failures.values().sum();
        let attempts = self.total_captures + failures;
        MetricsSummary {
            total_captures: self.total_captures,
            total_failures: failures,
            failure_rate: percent(failures, attempts),
            clock_corrected: self.clock_corrected,
            pose_missing_rate: percent(self.without_pose, self.total_captures),
            motion_missing_rate: percent(self.without_motion, self.total_captures),
            motion_events: self.motion_events,
            latency_ms: StatsSummary::from(&self.latency_stats),
            interval: StatsSummary::from(&self.interval_stats),
            frameset_spread: StatsSummary::from(&self.spread_stats),
            failure_counts: self.failures.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_captures: u64,
    pub total_failures: u64,
    pub failure_rate: f64,
    pub clock_corrected: u64,
    pub pose_missing_rate: f64,
    pub motion_missing_rate: f64,
    pub motion_events: u64,
    pub latency_ms: StatsSummary,
    pub interval: StatsSummary,
    pub frameset_spread: StatsSummary,
    pub failure_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Capture Metrics Summary ===")?;
        writeln!(f, "Captures: {}", self.total_captures)?;
        writeln!(
            f,
            "Failures: {} ({:.2}%)",
            self.total_failures, self.failure_rate
        )?;
        writeln!(f, "Clock corrected: {}", self.clock_corrected)?;
        writeln!(
            f,
            "Missing pose: {:.2}%, missing motion: {:.2}%",
            self.pose_missing_rate, self.motion_missing_rate
        )?;
        writeln!(f, "Inter-frame motion events: {}", self.motion_events)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;
        writeln!(f, "Capture interval: {}", self.interval)?;
        writeln!(f, "Frameset spread: {}", self.frameset_spread)?;

        if !self.failure_counts.is_empty() {
            writeln!(f, "Failure reasons:")?;
            for (reason, count) in &self.failure_counts {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
            self.min, self.max, self.mean, self.std_dev, self.count
        )
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
