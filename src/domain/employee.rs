// ==========================================
// 排班引擎 - 员工领域模型
// ==========================================
// 来源: 外部员工名册快照（只读输入）
// 红线: 离职员工只停用不删除, 停用员工不得参与排班
// ==========================================

use crate::domain::types::{ExperienceLevel, ShiftType};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

// ==========================================
// HistoricalShift - 历史班次记录
// ==========================================
// 用途: 推导疲劳度、近期工作量、跨区间的休息/连班约束
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalShift {
    pub date: NaiveDate,
    pub shift_type: ShiftType,
}

// ==========================================
// Employee - 员工
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    pub hierarchy_level: u8,      // 职级 (1=最低)
    pub experience_years: f64,    // 从业年限
    #[serde(default)]
    pub team_id: Option<String>,  // 团队/站点
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub preferences: Vec<ShiftType>, // 循环偏好模式, 按 weekday mod len 取值
    #[serde(default)]
    pub recent_history: Vec<HistoricalShift>,
}

fn default_active() -> bool {
    true
}

impl Employee {
    pub fn experience_level(&self) -> ExperienceLevel {
        ExperienceLevel::from_years(self.experience_years)
    }

    /// 取某日期的偏好班次
    ///
    /// 模式为空时返回 None（无偏好）
    pub fn preferred_shift_on(&self, date: NaiveDate) -> Option<ShiftType> {
        if self.preferences.is_empty() {
            return None;
        }
        let weekday = date.weekday().num_days_from_monday() as usize;
        Some(self.preferences[weekday % self.preferences.len()])
    }

    /// 是否属于给定的团队范围（None 表示不限）
    pub fn in_team_scope(&self, scope: Option<&[String]>) -> bool {
        match scope {
            None => true,
            Some(teams) => self
                .team_id
                .as_ref()
                .map(|team| teams.iter().any(|t| t == team))
                .unwrap_or(false),
        }
    }
}
