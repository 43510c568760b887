// ==========================================
// 排班引擎 - 引擎层
// ==========================================
// 职责: 排班核心算法
// 红线: 引擎不直接访问数据库 (审计写入经 AuditSink)
// ==========================================
// 组成:
// - run_state:      单次运行的排班累加器
// - constraints:    硬约束检查
// - scorer:         多因子评分
// - solver:         槽位求解
// - pattern_safety: 班次模式安全分析
// - fairness:       公平性评估
// - audit:          原因/置信度/审计记录
// - generator:      生成编排
// - recommend:      替补候选人推荐
// ==========================================

pub mod audit;
pub mod constraints;
pub mod error;
pub mod fairness;
pub mod generator;
pub mod input;
pub mod pattern_safety;
pub mod recommend;
pub mod run_state;
pub mod scorer;
pub mod solver;

// 重导出核心引擎
pub use audit::{AuditSink, AuditTracker};
pub use constraints::{ConstraintChecker, ConstraintPolicy, ConstraintViolation};
pub use error::{EngineError, EngineResult};
pub use fairness::FairnessEngine;
pub use generator::{GenerationStatistics, ScheduleGenerationResult, ScheduleGenerator};
pub use input::{GenerationRequest, InputSource};
pub use pattern_safety::PatternSafetyAnalyzer;
pub use recommend::{CandidateKind, CandidateRecommender, RankedCandidate};
pub use run_state::RunState;
pub use scorer::{CandidateScorer, ScoreBreakdown, ScoringFactor, RECOMMENDATION_THRESHOLD};
pub use solver::{AssignmentSolver, CancellationFlag, RunControl, SolverOutcome};
