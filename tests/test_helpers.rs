// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、员工/覆盖需求/请求构造
// ==========================================
#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use shift_engine::config::RuleSet;
use shift_engine::db::{init_schema, open_sqlite_connection};
use shift_engine::domain::{CoverageRequirement, Employee, HistoricalShift, ScheduleAssignment};
use shift_engine::domain::types::{ExperienceLevel, ShiftType};
use shift_engine::engine::GenerationRequest;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const TENANT: &str = "tenant-test";

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - Arc<Mutex<Connection>>: 已配置 PRAGMA 的共享连接
pub fn create_test_db() -> Result<(NamedTempFile, Arc<Mutex<Connection>>), Box<dyn Error>> {
    shift_engine::logging::init_test();
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是合法 UTF-8")?
        .to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, Arc::new(Mutex::new(conn))))
}

/// 2026-03-02 (周一) 起第 offset 天
pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap() + Duration::days(offset)
}

/// 创建测试员工 (在职, 3 年经验, 无偏好无历史)
pub fn employee(id: &str) -> Employee {
    Employee {
        id: id.to_string(),
        name: format!("员工{}", id),
        role: "nurse".to_string(),
        hierarchy_level: 2,
        experience_years: 3.0,
        team_id: Some("ward-a".to_string()),
        is_active: true,
        skills: vec![],
        preferences: vec![],
        recent_history: vec![],
    }
}

pub fn employee_with_years(id: &str, years: f64) -> Employee {
    Employee {
        experience_years: years,
        ..employee(id)
    }
}

pub fn employee_in_team(id: &str, team: &str) -> Employee {
    Employee {
        team_id: Some(team.to_string()),
        ..employee(id)
    }
}

pub fn employee_with_history(id: &str, history: &[(i64, ShiftType)]) -> Employee {
    Employee {
        recent_history: history
            .iter()
            .map(|(offset, shift)| HistoricalShift {
                date: day(*offset),
                shift_type: *shift,
            })
            .collect(),
        ..employee(id)
    }
}

pub fn roster(n: usize) -> Vec<Employee> {
    (1..=n).map(|i| employee(&format!("E{:02}", i))).collect()
}

pub fn requirement(offset: i64, shift: ShiftType, count: u32) -> CoverageRequirement {
    CoverageRequirement {
        date: day(offset),
        shift_type: shift,
        required_count: count,
        minimum_experience_level: None,
    }
}

pub fn requirement_with_level(
    offset: i64,
    shift: ShiftType,
    count: u32,
    level: ExperienceLevel,
) -> CoverageRequirement {
    CoverageRequirement {
        minimum_experience_level: Some(level),
        ..requirement(offset, shift, count)
    }
}

/// 每天 day/evening/night 各 per_shift 人, 共 days 天
pub fn full_week_coverage(days: i64, per_shift: u32) -> Vec<CoverageRequirement> {
    (0..days)
        .flat_map(|offset| {
            [ShiftType::Day, ShiftType::Evening, ShiftType::Night]
                .into_iter()
                .map(move |shift| requirement(offset, shift, per_shift))
        })
        .collect()
}

/// 范围 [day(0), day(days))
pub fn request(
    employees: Vec<Employee>,
    coverage: Vec<CoverageRequirement>,
    days: i64,
) -> GenerationRequest {
    GenerationRequest::new(TENANT, day(0), day(days), employees, coverage, RuleSet::default())
}

pub fn existing(employee_id: &str, offset: i64, shift: ShiftType) -> ScheduleAssignment {
    ScheduleAssignment {
        schedule_id: "confirmed".to_string(),
        employee_id: employee_id.to_string(),
        date: day(offset),
        shift_type: shift,
        reason: "confirmed by manager".to_string(),
        confidence_score: 1.0,
        emergency_override: false,
    }
}
