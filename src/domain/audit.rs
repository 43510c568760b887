// ==========================================
// 排班引擎 - 分配审计领域模型
// ==========================================
// 红线: 每条已提交分配必须至少有一条原因
// 红线: 对外读取路径不得暴露算法内部可调参数
// ==========================================

use crate::domain::assignment::AssignmentReason;
use crate::domain::types::ShiftType;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// 原因 details 中视为内部参数的键, 对外读取时剔除
/// ratio 与对外保留的 score 一起可反推出权重
pub const INTERNAL_DETAIL_KEYS: [&str; 5] = ["weight", "base_weight", "multiplier", "threshold", "ratio"];

// ==========================================
// ScoringInternals - 评分内部参数 (仅内部存档)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringInternals {
    pub factor_weights: BTreeMap<String, f64>,
    pub factor_scores: BTreeMap<String, f64>,
    pub candidate_count: u32,
    pub runner_up_score: Option<f64>,
    pub tie_break: Option<String>,
}

// ==========================================
// AuditRecord - 审计记录 (完整内部形态)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: String,
    pub schedule_id: String,
    pub tenant_id: String,
    pub employee_id: String,
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub reasons: Vec<AssignmentReason>,
    pub fairness_context: JsonValue,
    pub pattern_context: JsonValue,
    pub confidence_score: f64,
    pub internals: Option<ScoringInternals>,
    pub recorded_at: NaiveDateTime,
}

impl AuditRecord {
    /// 生成对外视图: 去掉内部参数与 details 中的内部键
    pub fn sanitized(&self) -> AuditRecordView {
        AuditRecordView {
            audit_id: self.audit_id.clone(),
            schedule_id: self.schedule_id.clone(),
            employee_id: self.employee_id.clone(),
            date: self.date,
            shift_type: self.shift_type,
            reasons: self
                .reasons
                .iter()
                .map(|r| AssignmentReason {
                    details: strip_internal_keys(&r.details),
                    ..r.clone()
                })
                .collect(),
            fairness_context: strip_internal_keys(&self.fairness_context),
            pattern_context: strip_internal_keys(&self.pattern_context),
            confidence_score: self.confidence_score,
            recorded_at: self.recorded_at,
        }
    }
}

fn strip_internal_keys(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .filter(|(k, _)| !INTERNAL_DETAIL_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), strip_internal_keys(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(strip_internal_keys).collect()),
        other => other.clone(),
    }
}

// ==========================================
// AuditRecordView - 审计记录 (对外视图)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecordView {
    pub audit_id: String,
    pub schedule_id: String,
    pub employee_id: String,
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub reasons: Vec<AssignmentReason>,
    pub fairness_context: JsonValue,
    pub pattern_context: JsonValue,
    pub confidence_score: f64,
    pub recorded_at: NaiveDateTime,
}

// ==========================================
// AuditQuery - 审计查询条件
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub employee_id: String,
    pub schedule_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl AuditQuery {
    pub fn for_employee(employee_id: impl Into<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        record.employee_id == self.employee_id
            && self
                .schedule_id
                .as_ref()
                .map(|s| &record.schedule_id == s)
                .unwrap_or(true)
            && self.start_date.map(|d| record.date >= d).unwrap_or(true)
            && self.end_date.map(|d| record.date <= d).unwrap_or(true)
    }
}
