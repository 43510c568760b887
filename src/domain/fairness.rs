// ==========================================
// 排班引擎 - 公平性指标领域模型
// ==========================================
// 每次生成重新计算; 输出使用 BTreeMap 保证序列化稳定
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// EmployeeWorkload - 员工工作量汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeWorkload {
    pub employee_id: String,
    pub team_id: Option<String>,
    pub total_shifts: u32,
    pub day_shifts: u32,
    pub evening_shifts: u32,
    pub night_shifts: u32,
    pub weekend_shifts: u32,
    pub total_hours: f64,
    pub overtime_hours: f64,
}

// ==========================================
// EmployeeFairness - 员工公平性
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeFairness {
    pub workload: EmployeeWorkload,
    pub equity_delta_hours: f64, // 相对全体均值的工时偏差 (正值=负担更重)
    pub fairness_score: u32,     // [0, 100]
}

// ==========================================
// TeamFairness - 团队公平性汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamFairness {
    pub team_id: String,
    pub member_count: u32,
    pub average_hours: f64,
    pub average_night_shifts: f64,
    pub average_weekend_shifts: f64,
    pub gini_coefficient: f64,
    pub delta_from_overall_hours: f64,
}

// ==========================================
// FairnessMetrics - 公平性指标
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessMetrics {
    pub gini_coefficient: f64,         // 工时分布 [0, 1]
    pub night_gini_coefficient: f64,   // 夜班分布 [0, 1]
    pub weekend_gini_coefficient: f64, // 周末班分布 [0, 1]
    pub fairness_score: u32,           // round((1 - gini) * 100)
    pub target_gini: f64,
    pub meets_target: bool,
    pub average_hours: f64,
    pub employees: BTreeMap<String, EmployeeFairness>,
    pub teams: BTreeMap<String, TeamFairness>,
}

impl FairnessMetrics {
    /// 无员工/无工时时的中性结果
    pub fn neutral(target_gini: f64) -> Self {
        Self {
            gini_coefficient: 0.0,
            night_gini_coefficient: 0.0,
            weekend_gini_coefficient: 0.0,
            fairness_score: 100,
            target_gini,
            meets_target: true,
            average_hours: 0.0,
            employees: BTreeMap::new(),
            teams: BTreeMap::new(),
        }
    }
}
