// ==========================================
// 排班引擎 - 排班分配领域模型
// ==========================================
// ScheduleAssignment: 求解器输出单元, 确认后不可变
// AssignmentReason: 分配原因 (审计追踪), 创建时一次写入
// 红线: 同一员工同一日期最多一个非休息分配
// ==========================================

use crate::domain::types::{ReasonCategory, ShiftType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ScheduleAssignment - 排班分配
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAssignment {
    pub schedule_id: String,
    pub employee_id: String,
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub reason: String,          // 主导原因摘要
    pub confidence_score: f64,   // [0, 1]
    #[serde(default)]
    pub emergency_override: bool, // 紧急放宽约束产生的分配
}

// ==========================================
// AssignmentReason - 分配原因
// ==========================================
// priority 从 1 开始, 数值越小越主导
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReason {
    pub category: ReasonCategory,
    pub priority: u32,
    pub score: f64,
    pub explanation: String,
    #[serde(default)]
    pub details: JsonValue,
}

impl AssignmentReason {
    pub fn new(
        category: ReasonCategory,
        priority: u32,
        score: f64,
        explanation: impl Into<String>,
        details: JsonValue,
    ) -> Self {
        Self {
            category,
            priority,
            score,
            explanation: explanation.into(),
            details,
        }
    }
}
