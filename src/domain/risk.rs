// ==========================================
// 排班引擎 - 模式风险领域模型
// ==========================================
// 每次生成重新计算, 不持久化中间状态
// ==========================================

use crate::domain::types::{RiskSeverity, RiskType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// PatternRisk - 单条模式风险
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRisk {
    pub employee_id: String,
    pub risk_type: RiskType,
    pub severity: RiskSeverity,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pattern_name: Option<String>,
}

// ==========================================
// EmployeeRiskProfile - 员工风险画像
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRiskProfile {
    pub employee_id: String,
    pub risk_score: u32, // [0, 100]
    pub findings: Vec<PatternRisk>,
}

impl EmployeeRiskProfile {
    pub fn from_findings(employee_id: &str, findings: Vec<PatternRisk>) -> Self {
        let risk_score = findings
            .iter()
            .map(|f| f.severity.risk_points())
            .sum::<u32>()
            .min(100);
        Self {
            employee_id: employee_id.to_string(),
            risk_score,
            findings,
        }
    }

    pub fn highest_severity(&self) -> Option<RiskSeverity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

// ==========================================
// PatternAnalysis - 全体模式分析汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub profiles: BTreeMap<String, EmployeeRiskProfile>,
    pub employees_at_risk: u32,
    pub info_count: u32,
    pub warning_count: u32,
    pub critical_count: u32,
}

impl PatternAnalysis {
    pub fn findings_for(&self, employee_id: &str) -> &[PatternRisk] {
        self.profiles
            .get(employee_id)
            .map(|p| p.findings.as_slice())
            .unwrap_or(&[])
    }
}
