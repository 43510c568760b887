// ==========================================
// 排班引擎 - 领域类型定义
// ==========================================
// 职责: 班次、经验等级、原因类别、风险等级、排班状态
// 序列化格式: snake_case (与存储及外部接口一致)
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 班次类型 (Shift Type)
// ==========================================
// 固定时段:
// - Day:     07:00 - 15:00
// - Evening: 15:00 - 23:00
// - Night:   23:00 - 07:00(+1)
// - Off:     休息，无工时
// 排序即槽位枚举顺序: Day < Evening < Night < Off
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    Day,
    Evening,
    Night,
    Off,
}

impl ShiftType {
    /// 参与排班的班次（不含 Off），按槽位顺序
    pub const WORKING: [ShiftType; 3] = [ShiftType::Day, ShiftType::Evening, ShiftType::Night];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftType::Day => "day",
            ShiftType::Evening => "evening",
            ShiftType::Night => "night",
            ShiftType::Off => "off",
        }
    }

    pub fn is_working(&self) -> bool {
        !matches!(self, ShiftType::Off)
    }

    /// 槽位枚举顺序（同一天内）
    pub fn slot_order(&self) -> u8 {
        match self {
            ShiftType::Day => 0,
            ShiftType::Evening => 1,
            ShiftType::Night => 2,
            ShiftType::Off => 3,
        }
    }

    /// 班次开始小时
    pub fn start_hour(&self) -> Option<u32> {
        match self {
            ShiftType::Day => Some(7),
            ShiftType::Evening => Some(15),
            ShiftType::Night => Some(23),
            ShiftType::Off => None,
        }
    }

    /// 班次工时（小时）
    pub fn duration_hours(&self) -> f64 {
        match self {
            ShiftType::Off => 0.0,
            _ => 8.0,
        }
    }

    /// 班次在给定日期上的 [开始, 结束) 时刻
    pub fn window_on(&self, date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let hour = self.start_hour()?;
        let start = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0)?);
        let end = start + Duration::hours(self.duration_hours() as i64);
        Some((start, end))
    }
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ShiftType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "d" => Ok(ShiftType::Day),
            "evening" | "e" => Ok(ShiftType::Evening),
            "night" | "n" => Ok(ShiftType::Night),
            "off" | "o" => Ok(ShiftType::Off),
            other => Err(format!("未知班次类型: {}", other)),
        }
    }
}

// ==========================================
// 经验等级 (Experience Level)
// ==========================================
// 由从业年限推导，护理岗位常用五级划分
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Novice,           // < 1 年
    AdvancedBeginner, // < 2 年
    Competent,        // < 5 年
    Proficient,       // < 10 年
    Expert,           // >= 10 年
}

impl ExperienceLevel {
    pub fn from_years(years: f64) -> Self {
        if years < 1.0 {
            ExperienceLevel::Novice
        } else if years < 2.0 {
            ExperienceLevel::AdvancedBeginner
        } else if years < 5.0 {
            ExperienceLevel::Competent
        } else if years < 10.0 {
            ExperienceLevel::Proficient
        } else {
            ExperienceLevel::Expert
        }
    }

    /// 该等级的最低年限（用作经验匹配的参考值）
    pub fn min_years(&self) -> f64 {
        match self {
            ExperienceLevel::Novice => 0.0,
            ExperienceLevel::AdvancedBeginner => 1.0,
            ExperienceLevel::Competent => 2.0,
            ExperienceLevel::Proficient => 5.0,
            ExperienceLevel::Expert => 10.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Novice => "novice",
            ExperienceLevel::AdvancedBeginner => "advanced_beginner",
            ExperienceLevel::Competent => "competent",
            ExperienceLevel::Proficient => "proficient",
            ExperienceLevel::Expert => "expert",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 分配原因类别 (Reason Category)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    Preference,
    Fairness,
    Constraint,
    PatternSafety,
    Coverage,
    Optimization,
}

impl ReasonCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCategory::Preference => "preference",
            ReasonCategory::Fairness => "fairness",
            ReasonCategory::Constraint => "constraint",
            ReasonCategory::PatternSafety => "pattern_safety",
            ReasonCategory::Coverage => "coverage",
            ReasonCategory::Optimization => "optimization",
        }
    }
}

impl fmt::Display for ReasonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReasonCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "preference" => Ok(ReasonCategory::Preference),
            "fairness" => Ok(ReasonCategory::Fairness),
            "constraint" => Ok(ReasonCategory::Constraint),
            "pattern_safety" => Ok(ReasonCategory::PatternSafety),
            "coverage" => Ok(ReasonCategory::Coverage),
            "optimization" => Ok(ReasonCategory::Optimization),
            other => Err(format!("未知原因类别: {}", other)),
        }
    }
}

// ==========================================
// 风险等级 (Risk Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Info,
    Warning,
    Critical,
}

impl RiskSeverity {
    /// 计入员工风险分的权重
    pub fn risk_points(&self) -> u32 {
        match self {
            RiskSeverity::Info => 5,
            RiskSeverity::Warning => 15,
            RiskSeverity::Critical => 35,
        }
    }
}

impl fmt::Display for RiskSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskSeverity::Info => write!(f, "info"),
            RiskSeverity::Warning => write!(f, "warning"),
            RiskSeverity::Critical => write!(f, "critical"),
        }
    }
}

// ==========================================
// 风险类型 (Risk Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    DangerousSequence,
    ConsecutiveShifts,
    ConsecutiveWorkDays,
    InsufficientRest,
    WeeklyHoursExceeded,
}

impl fmt::Display for RiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskType::DangerousSequence => "dangerous_sequence",
            RiskType::ConsecutiveShifts => "consecutive_shifts",
            RiskType::ConsecutiveWorkDays => "consecutive_work_days",
            RiskType::InsufficientRest => "insufficient_rest",
            RiskType::WeeklyHoursExceeded => "weekly_hours_exceeded",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// 排班生成状态 (Schedule Status)
// ==========================================
// 状态机: pending → generating → {draft, failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Generating,
    Draft,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Generating => "generating",
            ScheduleStatus::Draft => "draft",
            ScheduleStatus::Failed => "failed",
        }
    }

    /// 是否允许从当前状态迁移到 `next`
    pub fn can_transition_to(&self, next: ScheduleStatus) -> bool {
        matches!(
            (self, next),
            (ScheduleStatus::Pending, ScheduleStatus::Generating)
                | (ScheduleStatus::Generating, ScheduleStatus::Draft)
                | (ScheduleStatus::Generating, ScheduleStatus::Failed)
        )
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(ScheduleStatus::Pending),
            "generating" => Ok(ScheduleStatus::Generating),
            "draft" => Ok(ScheduleStatus::Draft),
            "failed" => Ok(ScheduleStatus::Failed),
            other => Err(format!("未知排班状态: {}", other)),
        }
    }
}
