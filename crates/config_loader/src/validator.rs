//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (validator derive)
//! - required_streams 仅含图像流，且为 mode 所需流的子集
//! - retry_timeout_ms 不超过 deadline_s
//! - poll_interval_ms 不超过 max_wait_ms
//! - sink 名称非空且唯一，队列容量 > 0

use std::collections::{BTreeMap, HashSet};

use contracts::{CaptureBlueprint, CaptureConfig, ContractError, StreamKind};
use validator::Validate;

/// 校验 CaptureBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &CaptureBlueprint) -> Result<(), ContractError> {
    validate_ranges(blueprint)?;
    validate_required_streams(&blueprint.capture)?;
    validate_assembly(&blueprint.capture)?;
    validate_interpolation(&blueprint.capture)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 字段级范围校验
fn validate_ranges(blueprint: &CaptureBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "capture".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

fn count_kinds(kinds: &[StreamKind]) -> BTreeMap<StreamKind, usize> {
    let mut counts = BTreeMap::new();
    for kind in kinds {
        *counts.entry(*kind).or_insert(0) += 1;
    }
    counts
}

/// 校验 required_streams 与 mode 一致
fn validate_required_streams(capture: &CaptureConfig) -> Result<(), ContractError> {
    let Some(required) = &capture.required_streams else {
        return Ok(());
    };

    if let Some(kind) = required.iter().find(|k| !k.is_image()) {
        return Err(ContractError::config_validation(
            "capture.required_streams",
            format!("'{kind}' is not an image stream"),
        ));
    }

    let available = count_kinds(&capture.mode.required_streams());
    for (kind, count) in count_kinds(required) {
        let limit = available.get(&kind).copied().unwrap_or(0);
        if count > limit {
            return Err(ContractError::config_validation(
                "capture.required_streams",
                format!(
                    "{count} x '{kind}' cannot be routed in {:?} mode (at most {limit})",
                    capture.mode
                ),
            ));
        }
    }
    Ok(())
}

/// 校验帧组装超时
fn validate_assembly(capture: &CaptureConfig) -> Result<(), ContractError> {
    let assembly = &capture.assembly;
    if !assembly.deadline_s.is_finite() {
        return Err(ContractError::config_validation(
            "capture.assembly.deadline_s",
            "deadline_s must be finite",
        ));
    }
    if assembly.deadline_s > 0.0 && assembly.retry_timeout_ms as f64 > assembly.deadline_s * 1000.0
    {
        return Err(ContractError::config_validation(
            "capture.assembly.retry_timeout_ms",
            format!(
                "retry_timeout_ms ({}) must be <= deadline_s ({} s)",
                assembly.retry_timeout_ms, assembly.deadline_s
            ),
        ));
    }
    Ok(())
}

/// 校验插值轮询参数
fn validate_interpolation(capture: &CaptureConfig) -> Result<(), ContractError> {
    let interpolation = &capture.interpolation;
    if interpolation.max_wait_ms > 0 && interpolation.poll_interval_ms > interpolation.max_wait_ms
    {
        return Err(ContractError::config_validation(
            "capture.interpolation.poll_interval_ms",
            format!(
                "poll_interval_ms ({}) must be <= max_wait_ms ({})",
                interpolation.poll_interval_ms, interpolation.max_wait_ms
            ),
        ));
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &CaptureBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(&sink.name) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
