// ==========================================
// 排班引擎 - 排班规则读取 Trait
// ==========================================
// 职责: 定义 API 层所需的规则读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::error::ConfigResult;
use crate::config::rule_set::{IndustryProfile, RuleSet};
use async_trait::async_trait;

// ==========================================
// RuleConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 tenant_rule_set 表读取）
#[async_trait]
pub trait RuleConfigReader: Send + Sync {
    /// 获取租户当前生效的排班规则
    ///
    /// # 返回
    /// - 租户存在显式覆写: 当前激活版本
    /// - 否则: 租户行业模板默认值
    ///
    /// 返回前必须通过 `RuleSet::validate`
    async fn get_active_rule_set(&self, tenant_id: &str) -> ConfigResult<RuleSet>;

    /// 获取租户行业模板
    ///
    /// # 默认值
    /// - IndustryProfile::General
    async fn get_industry_profile(&self, tenant_id: &str) -> ConfigResult<IndustryProfile>;
}
