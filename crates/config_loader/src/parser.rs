//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{CaptureBlueprint, ContractError};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<CaptureBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<CaptureBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<CaptureBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CaptureMode, OutOfOrderPolicy, StreamKind};

    #[test]
    fn test_parse_toml_full() {
        let content = r#"
[capture]
mode = "stereo_ir"

[capture.assembly]
initial_timeout_ms = 3000
retry_timeout_ms = 50

[capture.interpolation]
max_wait_ms = 10
global_time_sync = false

[capture.replay]
inter_frame = true
out_of_order = "resync"

[capture.odometry]
provided = true
local_transform = { x = 0.1, yaw = 1.57 }

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;
        let bp = parse_toml(content).unwrap();
        let capture = &bp.capture;
        assert_eq!(capture.mode, CaptureMode::StereoIr);
        assert_eq!(capture.assembly.initial_timeout_ms, 3000);
        // Unspecified keys keep their defaults
        assert_eq!(capture.assembly.deadline_s, 2.0);
        assert_eq!(capture.interpolation.poll_interval_ms, 1);
        assert!(!capture.interpolation.global_time_sync);
        assert_eq!(capture.replay.out_of_order, OutOfOrderPolicy::Resync);
        assert_eq!(capture.odometry.local_transform.unwrap().x, 0.1);
        assert_eq!(bp.sinks.len(), 1);
    }

    #[test]
    fn test_parse_empty_toml_uses_defaults() {
        let bp = parse_toml("").unwrap();
        assert_eq!(bp.capture.mode, CaptureMode::RgbDepth);
        assert_eq!(bp.capture.buffer.capacity, 1000);
        assert!(bp.sinks.is_empty());
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "capture": {
                "mode": "rgb_depth",
                "required_streams": ["color", "depth"],
                "clock": { "skew_threshold_s": 60.0 }
            },
            "sinks": [{ "name": "log", "sink_type": "log" }]
        }"#;
        let bp = parse_json(content).unwrap();
        assert_eq!(
            bp.capture.required_streams,
            Some(vec![StreamKind::Color, StreamKind::Depth])
        );
        assert_eq!(bp.capture.clock.skew_threshold_s, 60.0);
        assert_eq!(bp.capture.clock.device_units_per_second, 1000.0);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(result.unwrap_err(), ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let result = parse_toml("[capture]\nmode = \"lidar\"\n");
        assert!(matches!(result.unwrap_err(), ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
