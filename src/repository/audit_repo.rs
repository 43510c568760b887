// ==========================================
// 排班引擎 - 分配审计数据仓储
// ==========================================
// 表: assignment_audit
// 红线: 只追加 (Append-only), 不提供更新/删除
// ==========================================

use crate::domain::audit::{AuditQuery, AuditRecord};
use crate::domain::types::ShiftType;
use crate::engine::audit::AuditSink;
use crate::repository::error::{transaction_error, RepositoryError, RepositoryResult};
use crate::repository::schedule_repo::{conversion_error, parse_date, parse_datetime};
use rusqlite::{params, Connection, Row, Transaction};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT audit_id, schedule_id, tenant_id, employee_id, date, shift_type,
           reasons_json, fairness_context_json, pattern_context_json,
           confidence_score, internals_json, recorded_at
    FROM assignment_audit
"#;

pub struct AuditRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量追加审计记录 (单事务)
    pub fn batch_insert(&self, records: &[AuditRecord]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(transaction_error)?;
        let count = insert_records(&tx, records)?;
        tx.commit().map_err(transaction_error)?;
        Ok(count)
    }

    /// 按员工 (可选排班/日期范围) 查询
    pub fn find(&self, query: &AuditQuery) -> RepositoryResult<Vec<AuditRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"{}
            WHERE employee_id = ?1
              AND (?2 IS NULL OR schedule_id = ?2)
              AND (?3 IS NULL OR date >= ?3)
              AND (?4 IS NULL OR date <= ?4)
            ORDER BY date, schedule_id, recorded_at
            "#,
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                query.employee_id,
                query.schedule_id,
                query.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
                query.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
            ],
            map_audit_row,
        )?;
        collect(rows)
    }

    pub fn find_by_schedule(&self, schedule_id: &str) -> RepositoryResult<Vec<AuditRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE schedule_id = ?1 ORDER BY date, employee_id", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![schedule_id], map_audit_row)?;
        collect(rows)
    }
}

impl AuditSink for AuditRepository {
    fn append(&self, records: &[AuditRecord]) -> RepositoryResult<usize> {
        self.batch_insert(records)
    }

    fn query(&self, query: &AuditQuery) -> RepositoryResult<Vec<AuditRecord>> {
        self.find(query)
    }
}

/// 在调用方事务内追加审计记录 (不提交)
pub(crate) fn insert_records(tx: &Transaction<'_>, records: &[AuditRecord]) -> RepositoryResult<usize> {
    let mut count = 0;
    for r in records {
        let internals_json = r.internals.as_ref().map(serde_json::to_string).transpose()?;
        tx.execute(
            r#"
            INSERT INTO assignment_audit (
                audit_id, schedule_id, tenant_id, employee_id, date, shift_type,
                reasons_json, fairness_context_json, pattern_context_json,
                confidence_score, internals_json, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                r.audit_id,
                r.schedule_id,
                r.tenant_id,
                r.employee_id,
                r.date.format("%Y-%m-%d").to_string(),
                r.shift_type.as_str(),
                serde_json::to_string(&r.reasons)?,
                serde_json::to_string(&r.fairness_context)?,
                serde_json::to_string(&r.pattern_context)?,
                r.confidence_score,
                internals_json,
                r.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;
        count += 1;
    }
    Ok(count)
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<AuditRecord>>,
) -> RepositoryResult<Vec<AuditRecord>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn map_audit_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let shift: String = row.get(5)?;
    let internals: Option<String> = row.get(10)?;
    Ok(AuditRecord {
        audit_id: row.get(0)?,
        schedule_id: row.get(1)?,
        tenant_id: row.get(2)?,
        employee_id: row.get(3)?,
        date: parse_date(row, 4)?,
        shift_type: ShiftType::from_str(&shift).map_err(|e| conversion_error(5, e))?,
        reasons: json_column(row, 6)?,
        fairness_context: optional_json_column(row, 7)?,
        pattern_context: optional_json_column(row, 8)?,
        confidence_score: row.get(9)?,
        internals: internals
            .map(|text| serde_json::from_str(&text).map_err(|e| conversion_error(10, e.to_string())))
            .transpose()?,
        recorded_at: parse_datetime(row, 11)?,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e.to_string()))
}

fn optional_json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let text: Option<String> = row.get(idx)?;
    match text {
        Some(text) => serde_json::from_str(&text).map_err(|e| conversion_error(idx, e.to_string())),
        None => Ok(serde_json::Value::Null),
    }
}
