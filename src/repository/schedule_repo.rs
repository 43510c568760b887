// ==========================================
// 排班引擎 - 排班头数据仓储
// ==========================================
// 表: schedule
// 红线: 状态只能按 pending → generating → {draft, failed} 迁移
// ==========================================

use crate::domain::types::ScheduleStatus;
use crate::repository::error::{transaction_error, RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

// ==========================================
// ScheduleEntity - 排班头
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntity {
    pub schedule_id: String,
    pub tenant_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ScheduleStatus,
    pub snapshot_json: Option<String>,
    pub statistics_json: Option<String>,
    pub error_json: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// ScheduleRepository - 排班头仓储
// ==========================================
pub struct ScheduleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建排班头 (状态 pending), 同时保存输入快照
    ///
    /// # 参数
    /// - snapshot: 生成输入 (用于后续推荐与复现)
    pub fn create<S: Serialize>(
        &self,
        schedule_id: &str,
        tenant_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        snapshot: &S,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let now = Utc::now().naive_utc().format(DATETIME_FORMAT).to_string();
        conn.execute(
            r#"
            INSERT INTO schedule (
                schedule_id, tenant_id, start_date, end_date, status,
                snapshot_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
            params![
                schedule_id,
                tenant_id,
                start_date.format(DATE_FORMAT).to_string(),
                end_date.format(DATE_FORMAT).to_string(),
                ScheduleStatus::Pending.as_str(),
                serde_json::to_string(snapshot)?,
                now,
            ],
        )?;
        Ok(())
    }

    /// 状态迁移 (校验迁移合法性)
    pub fn transition(&self, schedule_id: &str, next: ScheduleStatus) -> RepositoryResult<()> {
        self.finish_with(schedule_id, next, None, None)
    }

    /// 结束生成: 迁移到 draft/failed 并写入统计或错误
    pub fn finish<T: Serialize, E: Serialize>(
        &self,
        schedule_id: &str,
        status: ScheduleStatus,
        statistics: Option<&T>,
        error: Option<&E>,
    ) -> RepositoryResult<()> {
        let statistics_json = statistics.map(serde_json::to_string).transpose()?;
        let error_json = error.map(serde_json::to_string).transpose()?;
        self.finish_with(schedule_id, status, statistics_json, error_json)
    }

    fn finish_with(
        &self,
        schedule_id: &str,
        next: ScheduleStatus,
        statistics_json: Option<String>,
        error_json: Option<String>,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(transaction_error)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM schedule WHERE schedule_id = ?1",
                params![schedule_id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.ok_or_else(|| RepositoryError::NotFound {
            entity: "schedule".to_string(),
            id: schedule_id.to_string(),
        })?;
        let current = ScheduleStatus::from_str(&current).map_err(|message| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message,
        })?;

        if !current.can_transition_to(next) {
            return Err(RepositoryError::InvalidStateTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        tx.execute(
            r#"
            UPDATE schedule
            SET status = ?2,
                statistics_json = COALESCE(?3, statistics_json),
                error_json = COALESCE(?4, error_json),
                updated_at = ?5
            WHERE schedule_id = ?1
            "#,
            params![
                schedule_id,
                next.as_str(),
                statistics_json,
                error_json,
                Utc::now().naive_utc().format(DATETIME_FORMAT).to_string(),
            ],
        )?;
        tx.commit().map_err(transaction_error)?;
        Ok(())
    }

    pub fn find_by_id(&self, schedule_id: &str) -> RepositoryResult<Option<ScheduleEntity>> {
        let conn = self.get_conn()?;
        let entity = conn
            .query_row(
                r#"
                SELECT schedule_id, tenant_id, start_date, end_date, status,
                       snapshot_json, statistics_json, error_json, created_at, updated_at
                FROM schedule WHERE schedule_id = ?1
                "#,
                params![schedule_id],
                map_schedule_row,
            )
            .optional()?;
        Ok(entity)
    }

    pub fn list_by_tenant(&self, tenant_id: &str) -> RepositoryResult<Vec<ScheduleEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT schedule_id, tenant_id, start_date, end_date, status,
                   snapshot_json, statistics_json, error_json, created_at, updated_at
            FROM schedule WHERE tenant_id = ?1
            ORDER BY start_date, schedule_id
            "#,
        )?;
        let rows = stmt.query_map(params![tenant_id], map_schedule_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// 读取输入快照
    pub fn load_snapshot<S: DeserializeOwned>(&self, schedule_id: &str) -> RepositoryResult<S> {
        let entity = self.find_by_id(schedule_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "schedule".to_string(),
            id: schedule_id.to_string(),
        })?;
        let text = entity.snapshot_json.ok_or_else(|| RepositoryError::NotFound {
            entity: "schedule_snapshot".to_string(),
            id: schedule_id.to_string(),
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn map_schedule_row(row: &Row<'_>) -> rusqlite::Result<ScheduleEntity> {
    let status: String = row.get(4)?;
    Ok(ScheduleEntity {
        schedule_id: row.get(0)?,
        tenant_id: row.get(1)?,
        start_date: parse_date(row, 2)?,
        end_date: parse_date(row, 3)?,
        status: ScheduleStatus::from_str(&status).map_err(|e| conversion_error(4, e))?,
        snapshot_json: row.get(5)?,
        statistics_json: row.get(6)?,
        error_json: row.get(7)?,
        created_at: parse_datetime(row, 8)?,
        updated_at: parse_datetime(row, 9)?,
    })
}

pub(crate) fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| conversion_error(idx, e.to_string()))
}

pub(crate) fn parse_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e.to_string()))
}

pub(crate) fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}
