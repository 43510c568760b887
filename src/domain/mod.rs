// ==========================================
// 排班引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod assignment;
pub mod audit;
pub mod coverage;
pub mod employee;
pub mod fairness;
pub mod risk;
pub mod types;

// 重导出核心类型
pub use assignment::{AssignmentReason, ScheduleAssignment};
pub use audit::{AuditQuery, AuditRecord, AuditRecordView, ScoringInternals};
pub use coverage::{CoverageGap, CoverageRequirement, CoverageSlot};
pub use employee::{Employee, HistoricalShift};
pub use fairness::{EmployeeFairness, EmployeeWorkload, FairnessMetrics, TeamFairness};
pub use risk::{EmployeeRiskProfile, PatternAnalysis, PatternRisk};
pub use types::{
    ExperienceLevel, ReasonCategory, RiskSeverity, RiskType, ScheduleStatus, ShiftType,
};
