// ==========================================
// 排班引擎 - 配置层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 配置层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 规则值越界或格式错误, 在任何排班运行前拒绝
    #[error("配置校验失败 (field={field}): {message}")]
    Validation { field: String, message: String },

    #[error("权限不足: actor={actor} 无权修改租户 {tenant_id} 的排班规则")]
    Forbidden { actor: String, tenant_id: String },

    #[error("配置存储错误: {0}")]
    Storage(String),

    #[error("配置序列化错误: {0}")]
    Serialization(String),
}

impl ConfigError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for ConfigError {
    fn from(err: rusqlite::Error) -> Self {
        ConfigError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serialization(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
