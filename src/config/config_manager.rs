// ==========================================
// 排班引擎 - 规则配置管理器
// ==========================================
// 职责: 租户规则的加载、版本化保存、激活与回滚
// 存储: tenant_rule_set 表 (版本化) + tenant_config 表 (key-value)
// 红线: 只有管理员可以修改规则; 同一租户同时只有一个激活版本
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::rule_config_trait::RuleConfigReader;
use crate::config::rule_set::{IndustryProfile, RuleSet};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument};

/// 配置键常量
pub mod config_keys {
    /// 租户行业模板
    pub const INDUSTRY_PROFILE: &str = "industry_profile";
}

// ==========================================
// RuleActor - 规则修改人
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleActor {
    pub actor_id: String,
    pub is_admin: bool,
}

impl RuleActor {
    pub fn admin(actor_id: &str) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            is_admin: true,
        }
    }
}

// ==========================================
// RuleSetVersion - 规则版本记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetVersion {
    pub tenant_id: String,
    pub version: i64,
    pub profile: IndustryProfile,
    pub rules: RuleSet,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

// ==========================================
// ConfigManager - 规则配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> ConfigResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::Storage(format!("锁获取失败: {}", e)))
    }

    fn ensure_admin(tenant_id: &str, actor: &RuleActor) -> ConfigResult<()> {
        if !actor.is_admin {
            return Err(ConfigError::Forbidden {
                actor: actor.actor_id.clone(),
                tenant_id: tenant_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 行业模板
    // ==========================================

    /// 读取租户行业模板（未设置时为 General）
    pub fn get_profile(&self, tenant_id: &str) -> ConfigResult<IndustryProfile> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM tenant_config WHERE tenant_id = ?1 AND key = ?2",
                params![tenant_id, config_keys::INDUSTRY_PROFILE],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(v) => v
                .parse::<IndustryProfile>()
                .map_err(|e| ConfigError::validation(config_keys::INDUSTRY_PROFILE, e)),
            None => Ok(IndustryProfile::default()),
        }
    }

    /// 设置租户行业模板
    pub fn set_profile(
        &self,
        tenant_id: &str,
        profile: IndustryProfile,
        actor: &RuleActor,
    ) -> ConfigResult<()> {
        Self::ensure_admin(tenant_id, actor)?;
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO tenant_config (tenant_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id, key) DO UPDATE SET value = ?3",
            params![tenant_id, config_keys::INDUSTRY_PROFILE, profile.as_str()],
        )?;
        info!(tenant_id, profile = %profile, actor = %actor.actor_id, "租户行业模板已更新");
        Ok(())
    }

    // ==========================================
    // 规则读取
    // ==========================================

    /// 读取租户当前生效规则
    ///
    /// # 返回
    /// - (版本号, 规则); 版本号 0 表示行业模板默认值
    pub fn load_active(&self, tenant_id: &str) -> ConfigResult<(i64, RuleSet)> {
        let row: Option<(i64, String)> = {
            let conn = self.get_conn()?;
            conn.query_row(
                "SELECT version, rules_json FROM tenant_rule_set
                 WHERE tenant_id = ?1 AND is_active = 1",
                params![tenant_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        let (version, rules) = match row {
            Some((version, json)) => (version, serde_json::from_str::<RuleSet>(&json)?),
            None => (0, RuleSet::for_profile(self.get_profile(tenant_id)?)),
        };

        rules.validate()?;
        Ok((version, rules))
    }

    /// 列出租户所有规则版本（版本号降序）
    pub fn list_versions(&self, tenant_id: &str) -> ConfigResult<Vec<RuleSetVersion>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT tenant_id, version, profile, rules_json, is_active, created_by, created_at
             FROM tenant_rule_set WHERE tenant_id = ?1 ORDER BY version DESC",
        )?;

        let rows = stmt
            .query_map(params![tenant_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, NaiveDateTime>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(tenant_id, version, profile, rules_json, is_active, created_by, created_at)| {
                    Ok(RuleSetVersion {
                        tenant_id,
                        version,
                        profile: profile
                            .parse()
                            .map_err(|e: String| ConfigError::validation("profile", e))?,
                        rules: serde_json::from_str(&rules_json)?,
                        is_active,
                        created_by,
                        created_at,
                    })
                },
            )
            .collect()
    }

    // ==========================================
    // 规则写入
    // ==========================================

    /// 保存新规则版本并激活
    ///
    /// 校验 → 版本号 +1 → 停用旧版本 → 写入新版本 (单事务)
    #[instrument(skip(self, rules, actor), fields(actor = %actor.actor_id))]
    pub fn save_rule_set(
        &self,
        tenant_id: &str,
        rules: &RuleSet,
        actor: &RuleActor,
    ) -> ConfigResult<i64> {
        Self::ensure_admin(tenant_id, actor)?;
        rules.validate()?;

        let profile = self.get_profile(tenant_id)?;
        let rules_json = serde_json::to_string(rules)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let next_version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM tenant_rule_set WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "UPDATE tenant_rule_set SET is_active = 0 WHERE tenant_id = ?1 AND is_active = 1",
            params![tenant_id],
        )?;

        tx.execute(
            "INSERT INTO tenant_rule_set
                (tenant_id, version, profile, rules_json, is_active, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![
                tenant_id,
                next_version,
                profile.as_str(),
                rules_json,
                actor.actor_id,
                Utc::now().naive_utc(),
            ],
        )?;

        tx.commit()?;

        info!(version = next_version, "排班规则新版本已激活");
        Ok(next_version)
    }

    /// 激活历史版本（回滚）
    pub fn activate_version(
        &self,
        tenant_id: &str,
        version: i64,
        actor: &RuleActor,
    ) -> ConfigResult<()> {
        Self::ensure_admin(tenant_id, actor)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT version FROM tenant_rule_set WHERE tenant_id = ?1 AND version = ?2",
                params![tenant_id, version],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(ConfigError::validation(
                "version",
                format!("租户 {} 不存在规则版本 {}", tenant_id, version),
            ));
        }

        tx.execute(
            "UPDATE tenant_rule_set SET is_active = (version = ?2) WHERE tenant_id = ?1",
            params![tenant_id, version],
        )?;
        tx.commit()?;

        info!(tenant_id, version, actor = %actor.actor_id, "排班规则版本已回滚激活");
        Ok(())
    }
}

#[async_trait]
impl RuleConfigReader for ConfigManager {
    async fn get_active_rule_set(&self, tenant_id: &str) -> ConfigResult<RuleSet> {
        self.load_active(tenant_id).map(|(_, rules)| rules)
    }

    async fn get_industry_profile(&self, tenant_id: &str) -> ConfigResult<IndustryProfile> {
        self.get_profile(tenant_id)
    }
}
