// ==========================================
// 排班引擎 - API 层
// ==========================================
// 职责: 面向宿主应用的排班接口, 组合引擎与仓储
// ==========================================

pub mod error;
pub mod schedule_api;

pub use error::{ApiError, ApiResult};
pub use schedule_api::{ScheduleApi, DEFAULT_RECOMMENDATION_LIMIT};
