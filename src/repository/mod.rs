// ==========================================
// 排班引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口, 屏蔽数据库细节
// 约束: 所有查询使用参数化
// ==========================================

pub mod assignment_repo;
pub mod audit_repo;
pub mod error;
pub mod schedule_repo;

// 重导出核心仓储
pub use assignment_repo::AssignmentRepository;
pub use audit_repo::AuditRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use schedule_repo::{ScheduleEntity, ScheduleRepository};
