// ==========================================
// 排班引擎 - 引擎层错误类型
// ==========================================
// 说明:
// - CoverageGap 不是错误, 作为结果数据记录 (domain::coverage::CoverageGap)
// - 其余类型均中止当前运行, 并携带足够的结构化诊断信息
//   (哪个槽位、哪条约束、考虑过哪些员工) 以支持 UI 展示与放宽重试
// ==========================================

use crate::config::ConfigError;
use crate::domain::types::ShiftType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    #[error("规则配置校验失败 (field={field}): {message}")]
    ConfigValidation { field: String, message: String },

    #[error("日期范围无效: {start} ~ {end}: {reason}")]
    InvalidRange {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error("无可排班员工: tenant={tenant_id}, 名册人数={roster_size}")]
    NoEligibleEmployees { tenant_id: String, roster_size: usize },

    #[error("硬约束矛盾: {date} {shift_type} 需要 {required_count} 人, 仅能安排 {actual_filled} 人")]
    ConstraintContradiction {
        date: NaiveDate,
        shift_type: ShiftType,
        required_count: u32,
        actual_filled: u32,
        considered_employees: Vec<String>,
        violated_constraints: Vec<String>,
    },

    #[error("排班生成超时: 预算 {budget_ms}ms, 已用 {elapsed_ms}ms, 已完成槽位 {slots_resolved}/{slots_total}")]
    GenerationTimeout {
        budget_ms: u64,
        elapsed_ms: u64,
        slots_resolved: usize,
        slots_total: usize,
    },

    #[error("排班生成已取消: 已完成槽位 {slots_resolved}/{slots_total}")]
    Cancelled {
        slots_resolved: usize,
        slots_total: usize,
    },

    #[error("排班生成失败 (stage={stage}): {cause}")]
    GenerationError { stage: String, cause: String },
}

impl EngineError {
    pub fn generation(stage: &str, cause: impl std::fmt::Display) -> Self {
        EngineError::GenerationError {
            stage: stage.to_string(),
            cause: cause.to_string(),
        }
    }

    /// 错误类型标识 (用于日志与持久化)
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::ConfigValidation { .. } => "config_validation",
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::NoEligibleEmployees { .. } => "no_eligible_employees",
            EngineError::ConstraintContradiction { .. } => "constraint_contradiction",
            EngineError::GenerationTimeout { .. } => "generation_timeout",
            EngineError::Cancelled { .. } => "cancelled",
            EngineError::GenerationError { .. } => "generation_error",
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, message } => {
                EngineError::ConfigValidation { field, message }
            }
            other => EngineError::generation("config", other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
