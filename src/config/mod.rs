// ==========================================
// 排班引擎 - 配置层
// ==========================================
// 职责: 租户排班规则模型、校验、版本化存储
// 存储: tenant_rule_set / tenant_config 表
// ==========================================

pub mod config_manager;
pub mod error;
pub mod rule_config_trait;
pub mod rule_set;

// 重导出核心配置类型
pub use config_manager::{config_keys, ConfigManager, RuleActor, RuleSetVersion};
pub use error::{ConfigError, ConfigResult};
pub use rule_config_trait::RuleConfigReader;
pub use rule_set::{DangerousPattern, GenerationOptions, IndustryProfile, RuleSet};
