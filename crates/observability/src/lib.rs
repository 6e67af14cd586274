//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出
//! - CompositeObservation 指标收集与统计
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init, metrics};
//!
//! // 初始化
//! observability::init()?;
//!
//! // 记录采集指标
//! let observation = orchestrator.capture()?;
//! metrics::record_capture_metrics(&observation, latency_s);
//! ```

pub mod metrics;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-exports
pub use crate::metrics::{
    describe_capture_metrics, record_buffer_depth, record_capture_failure, record_capture_metrics,
    record_event_dispatched, record_motion_events, CaptureMetricsAggregator, MetricsSummary,
    RunningStats, StatsSummary,
};

/// 初始化可观测性（Tracing + Prometheus）
///
/// - Tracing: JSON 格式，支持 RUST_LOG 环境变量
/// - Prometheus: 监听 0.0.0.0:9100
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 监听地址 (None = 禁用)
    pub metrics_addr: Option<SocketAddr>,
    /// 默认日志级别
    pub default_log_level: String,
    /// 按 crate 覆盖的日志级别，例如 ("sync_engine", "debug")
    pub crate_levels: Vec<(String, String)>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_addr: Some(SocketAddr::from(([0, 0, 0, 0], DEFAULT_METRICS_PORT))),
            default_log_level: "info".to_string(),
            crate_levels: Vec::new(),
        }
    }
}

impl ObservabilityConfig {
    /// RUST_LOG 未设置时使用的过滤指令
    pub fn filter_directive(&self) -> String {
        std::iter::once(self.default_log_level.clone())
            .chain(
                self.crate_levels
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// 默认 Prometheus 端口
pub const DEFAULT_METRICS_PORT: u16 = 9100;

/// 采集耗时直方图分桶 (毫秒)
const LATENCY_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 20.0, 35.0, 50.0, 100.0, 250.0, 500.0, 1000.0,
];

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => anyhow::bail!("unknown log format '{other}'"),
        }
    }
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    // 未选中的格式层为 None，不产生输出
    let json = (config.log_format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
    });
    let pretty = (config.log_format == LogFormat::Pretty).then(|| fmt::layer().pretty());
    let compact = (config.log_format == LogFormat::Compact).then(|| fmt::layer().compact());

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(compact)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(addr) = config.metrics_addr {
        install_prometheus(addr)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_addr = ?config.metrics_addr,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_prometheus(SocketAddr::from(([0, 0, 0, 0], port)))
}

fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("capture_latency_ms".to_string()),
            LATENCY_BUCKETS_MS,
        )
        .context("Invalid histogram buckets")?
        .install()
        .context("Failed to install Prometheus recorder")?;

    crate::metrics::describe_capture_metrics();
    tracing::info!(%addr, "Prometheus metrics endpoint initialized");
    Ok(())
}
