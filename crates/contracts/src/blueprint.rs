//! CaptureBlueprint - Config Loader 输出
//!
//! 描述完整的采集配置：同步策略、输出路由。

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::CaptureConfig;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的采集配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CaptureBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 同步与插值配置
    #[serde(default)]
    #[validate(nested)]
    pub capture: CaptureConfig,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 是否转发惯性回放事件
    #[serde(default = "default_forward_motion")]
    pub forward_motion: bool,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_forward_motion() -> bool {
    true
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
}
