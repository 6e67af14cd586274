//! Ingestion 错误类型

use contracts::{ContractError, StreamKind};
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 传感器数据解析失败
    #[error("failed to decode {kind} sample: {message}")]
    DecodeFailed {
        /// 流类型
        kind: StreamKind,
        /// 错误消息
        message: String,
    },

    /// 设备释放失败
    #[error("device {name} failed to stop: {reason}")]
    StopFailed { name: String, reason: String },
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::StopFailed { name, reason } => ContractError::source(name, reason),
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
