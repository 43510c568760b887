// ==========================================
// 排班引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 幂等建表（引擎输出的持久化落点）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 幂等创建全部表
///
/// - schedule: 排班生成头 (状态机 + 统计 + 输入快照)
/// - schedule_assignment: 引擎输出 (只插入); 主键保证同员工同日唯一
/// - assignment_audit: 审计记录 (只追加)
/// - tenant_rule_set / tenant_config: 租户规则
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS tenant_config (
            tenant_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (tenant_id, key)
        );

        CREATE TABLE IF NOT EXISTS tenant_rule_set (
            tenant_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            profile TEXT NOT NULL,
            rules_json TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (tenant_id, version)
        );

        CREATE TABLE IF NOT EXISTS schedule (
            schedule_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            status TEXT NOT NULL,
            snapshot_json TEXT,
            statistics_json TEXT,
            error_json TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schedule_assignment (
            schedule_id TEXT NOT NULL REFERENCES schedule(schedule_id) ON DELETE CASCADE,
            employee_id TEXT NOT NULL,
            date TEXT NOT NULL,
            shift_type TEXT NOT NULL,
            reason TEXT NOT NULL,
            confidence_score REAL NOT NULL,
            emergency_override INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (schedule_id, employee_id, date)
        );

        CREATE TABLE IF NOT EXISTS assignment_audit (
            audit_id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            employee_id TEXT NOT NULL,
            date TEXT NOT NULL,
            shift_type TEXT NOT NULL,
            reasons_json TEXT NOT NULL,
            fairness_context_json TEXT,
            pattern_context_json TEXT,
            confidence_score REAL NOT NULL,
            internals_json TEXT,
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_assignment_audit_employee_date
            ON assignment_audit (employee_id, date);
        CREATE INDEX IF NOT EXISTS idx_assignment_audit_schedule
            ON assignment_audit (schedule_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
