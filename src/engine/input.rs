// ==========================================
// 排班引擎 - 生成输入
// ==========================================
// 职责:
// - GenerationRequest: 单次生成的完整输入快照 (同时作为持久化快照)
// - InputSource: 外部名册/覆盖需求来源接口
// ==========================================

use crate::config::{GenerationOptions, RuleSet};
use crate::domain::assignment::ScheduleAssignment;
use crate::domain::coverage::CoverageRequirement;
use crate::domain::employee::Employee;
use crate::engine::error::EngineError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 最长排班范围 (天)
pub const MAX_RANGE_DAYS: i64 = 90;

fn new_schedule_id() -> String {
    Uuid::new_v4().to_string()
}

// ==========================================
// GenerationRequest - 生成请求
// ==========================================
// 日期范围为半开区间 [start_date, end_date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default = "new_schedule_id")]
    pub schedule_id: String,
    pub tenant_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub employees: Vec<Employee>,
    pub coverage_requirements: Vec<CoverageRequirement>,
    /// 范围内已存在的分配 (计入覆盖与约束, 不重新生成)
    #[serde(default)]
    pub existing_assignments: Vec<ScheduleAssignment>,
    #[serde(default)]
    pub rules: RuleSet,
    /// None 时按规则推导 (GenerationOptions::from_rules)
    #[serde(default)]
    pub options: Option<GenerationOptions>,
}

impl GenerationRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        employees: Vec<Employee>,
        coverage_requirements: Vec<CoverageRequirement>,
        rules: RuleSet,
    ) -> Self {
        Self {
            schedule_id: new_schedule_id(),
            tenant_id: tenant_id.into(),
            start_date,
            end_date,
            employees,
            coverage_requirements,
            existing_assignments: Vec::new(),
            rules,
            options: None,
        }
    }

    /// 本次生效的生成选项
    pub fn effective_options(&self) -> GenerationOptions {
        self.options
            .clone()
            .unwrap_or_else(|| GenerationOptions::from_rules(&self.rules))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date < self.end_date
    }

    /// 校验日期范围与覆盖需求位置
    pub fn validate_range(&self) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::InvalidRange {
            start: self.start_date,
            end: self.end_date,
            reason,
        };

        if self.start_date >= self.end_date {
            return Err(invalid("start_date must be before end_date".to_string()));
        }
        let span = (self.end_date - self.start_date).num_days();
        if span > MAX_RANGE_DAYS {
            return Err(invalid(format!(
                "range spans {} days, maximum is {}",
                span, MAX_RANGE_DAYS
            )));
        }
        if let Some(outside) = self.coverage_requirements.iter().find(|r| !self.contains(r.date)) {
            return Err(invalid(format!(
                "coverage requirement on {} lies outside the range",
                outside.date
            )));
        }
        Ok(())
    }

    /// 在职且在团队范围内的员工 (按 ID 排序)
    pub fn scoped_roster(&self, options: &GenerationOptions) -> Vec<Employee> {
        let scope = options.team_scope.as_deref();
        let mut roster: Vec<Employee> = self
            .employees
            .iter()
            .filter(|e| e.is_active && e.in_team_scope(scope))
            .cloned()
            .collect();
        roster.sort_by(|a, b| a.id.cmp(&b.id));
        roster
    }
}

// ==========================================
// InputSource - 外部输入来源
// ==========================================
// 名册与覆盖需求由外部系统提供; 抓取失败在生成结果中
// 以 GenerationError { stage, cause } 体现
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn fetch_employees(&self, tenant_id: &str) -> anyhow::Result<Vec<Employee>>;

    async fn fetch_coverage(
        &self,
        tenant_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> anyhow::Result<Vec<CoverageRequirement>>;

    /// 范围内已存在的分配 (默认无)
    async fn fetch_existing_assignments(
        &self,
        _tenant_id: &str,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> anyhow::Result<Vec<ScheduleAssignment>> {
        Ok(Vec::new())
    }
}
