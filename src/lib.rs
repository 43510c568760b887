// ==========================================
// 排班引擎 - 核心库
// ==========================================
// 定位: 多租户排班系统的自动分配引擎
// 输入快照 → 槽位求解 → 模式安全/公平性评估 → 原因与审计
// 技术栈: Rust + SQLite (引擎输出落点)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 配置层 - 租户排班规则
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 引擎层 - 排班算法
pub mod engine;

// 数据仓储层 - 数据访问
pub mod repository;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ExperienceLevel, ReasonCategory, RiskSeverity, RiskType, ScheduleStatus, ShiftType,
};

// 领域实体
pub use domain::{
    AssignmentReason, AuditRecord, AuditRecordView, CoverageGap, CoverageRequirement, Employee,
    FairnessMetrics, HistoricalShift, PatternAnalysis, PatternRisk, ScheduleAssignment,
};

// 配置
pub use config::{ConfigManager, GenerationOptions, IndustryProfile, RuleSet};

// 引擎
pub use engine::{
    CancellationFlag, CandidateRecommender, EngineError, FairnessEngine, GenerationRequest,
    PatternSafetyAnalyzer, RankedCandidate, ScheduleGenerationResult, ScheduleGenerator,
};

// API
pub use api::{ApiError, ApiResult, ScheduleApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "排班引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
