// ==========================================
// 排班引擎 - 命令行入口
// ==========================================
// 用法:
//   shift-engine <request.json> [db_path]
//
// request.json 为 GenerationRequest; 携带 rules 时按请求规则生成,
// 否则读取租户在数据库中生效的规则。结果 JSON 输出到标准输出。
// Ctrl-C 在槽位之间协作式取消。
// ==========================================

use anyhow::{bail, Context};
use shift_engine::db::{init_schema, open_sqlite_connection};
use shift_engine::{logging, CancellationFlag, GenerationRequest, ScheduleApi};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let Some(request_path) = args.next() else {
        bail!("用法: shift-engine <request.json> [db_path]");
    };
    let db_path = args.next().unwrap_or_else(get_default_db_path);

    tracing::info!("==================================================");
    tracing::info!("{} v{}", shift_engine::APP_NAME, shift_engine::VERSION);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    let raw = std::fs::read_to_string(&request_path)
        .with_context(|| format!("无法读取请求文件: {}", request_path))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("请求文件不是合法 JSON: {}", request_path))?;
    let carries_rules = value.get("rules").is_some();
    let request: GenerationRequest =
        serde_json::from_value(value).context("请求内容无法解析为 GenerationRequest")?;

    let conn = open_sqlite_connection(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;
    init_schema(&conn).context("数据库建表失败")?;
    let api = ScheduleApi::from_connection(Arc::new(Mutex::new(conn)));

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("收到中断信号, 在下一个槽位前取消生成");
                cancel.cancel();
            }
        });
    }

    let result = if carries_rules {
        api.generate_with_rules(request, cancel).await?
    } else {
        api.generate_schedule(request, cancel).await?
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        std::process::exit(2);
    }
    Ok(())
}

/// 默认数据库路径
///
/// 优先使用 SHIFT_ENGINE_DB_PATH, 其次用户数据目录, 最后当前目录
fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("SHIFT_ENGINE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./shift_engine.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("shift-engine");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("shift_engine.db");
        }
    }
    path.to_string_lossy().to_string()
}
