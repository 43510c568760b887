// ==========================================
// 排班引擎 - 排班分配数据仓储
// ==========================================
// 表: schedule_assignment
// 红线: 同一排班内员工每日唯一 (主键保证); 批量写入单事务, 审计记录随分配同事务提交
// ==========================================

use crate::domain::assignment::ScheduleAssignment;
use crate::domain::audit::AuditRecord;
use crate::domain::types::ShiftType;
use crate::repository::audit_repo::insert_records;
use crate::repository::error::{transaction_error, RepositoryError, RepositoryResult};
use crate::repository::schedule_repo::{conversion_error, parse_date};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub struct AssignmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssignmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量插入分配 (单事务, 任一失败整体回滚)
    pub fn batch_insert(&self, assignments: &[ScheduleAssignment]) -> RepositoryResult<usize> {
        self.insert_with_audit(assignments, &[])
    }

    /// 审计记录与分配在同一事务内提交
    ///
    /// # 参数
    /// - assignments: 新分配
    /// - audit_records: 与新分配对应的审计记录 (先写入)
    ///
    /// # 返回
    /// 写入的分配条数; 任一写入失败时两者均不落库
    pub fn insert_with_audit(
        &self,
        assignments: &[ScheduleAssignment],
        audit_records: &[AuditRecord],
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(transaction_error)?;

        insert_records(&tx, audit_records)?;

        let mut count = 0;
        for a in assignments {
            tx.execute(
                r#"
                INSERT INTO schedule_assignment (
                    schedule_id, employee_id, date, shift_type,
                    reason, confidence_score, emergency_override
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    a.schedule_id,
                    a.employee_id,
                    a.date.format("%Y-%m-%d").to_string(),
                    a.shift_type.as_str(),
                    a.reason,
                    a.confidence_score,
                    a.emergency_override as i32,
                ],
            )?;
            count += 1;
        }

        tx.commit().map_err(transaction_error)?;
        Ok(count)
    }

    pub fn find_by_schedule(&self, schedule_id: &str) -> RepositoryResult<Vec<ScheduleAssignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT schedule_id, employee_id, date, shift_type, reason, confidence_score, emergency_override
            FROM schedule_assignment
            WHERE schedule_id = ?1
            ORDER BY date, employee_id
            "#,
        )?;
        let rows = stmt.query_map(params![schedule_id], map_assignment_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.shift_type.slot_order().cmp(&b.shift_type.slot_order()))
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });
        Ok(out)
    }

    /// 查询员工在 [start, end] 内的分配 (跨排班)
    pub fn find_by_employee(
        &self,
        employee_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepositoryResult<Vec<ScheduleAssignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT schedule_id, employee_id, date, shift_type, reason, confidence_score, emergency_override
            FROM schedule_assignment
            WHERE employee_id = ?1 AND date >= ?2 AND date <= ?3
            ORDER BY date, schedule_id
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                employee_id,
                start.format("%Y-%m-%d").to_string(),
                end.format("%Y-%m-%d").to_string()
            ],
            map_assignment_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count_by_schedule(&self, schedule_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM schedule_assignment WHERE schedule_id = ?1",
            params![schedule_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn map_assignment_row(row: &Row<'_>) -> rusqlite::Result<ScheduleAssignment> {
    let shift: String = row.get(3)?;
    let emergency: i32 = row.get(6)?;
    Ok(ScheduleAssignment {
        schedule_id: row.get(0)?,
        employee_id: row.get(1)?,
        date: parse_date(row, 2)?,
        shift_type: ShiftType::from_str(&shift).map_err(|e| conversion_error(3, e))?,
        reason: row.get(4)?,
        confidence_score: row.get(5)?,
        emergency_override: emergency != 0,
    })
}
