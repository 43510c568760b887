// ==========================================
// 排班引擎 - 排班 API
// ==========================================
// 职责:
// 1. GenerateSchedule: 生成排班并持久化 (仅 draft 结果提交分配)
// 2. GetEmployeeAssignmentReasons: 查询员工分配原因 (脱敏视图)
// 3. RecommendCandidates: 基于生成快照推荐替补候选人
// 红线: 失败运行不提交任何分配; 审计记录只追加
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, GenerationOptions, RuleConfigReader};
use crate::domain::assignment::ScheduleAssignment;
use crate::domain::audit::{AuditQuery, AuditRecordView};
use crate::domain::types::{ScheduleStatus, ShiftType};
use crate::engine::audit::AuditTracker;
use crate::engine::error::EngineError;
use crate::engine::generator::{GenerationStatistics, ScheduleGenerationResult, ScheduleGenerator};
use crate::engine::input::{GenerationRequest, InputSource};
use crate::engine::recommend::{CandidateRecommender, RankedCandidate};
use crate::engine::solver::CancellationFlag;
use crate::repository::{AssignmentRepository, AuditRepository, ScheduleEntity, ScheduleRepository};

/// 推荐候选人默认返回数量
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;

// ==========================================
// ScheduleApi - 排班 API
// ==========================================
pub struct ScheduleApi {
    schedule_repo: Arc<ScheduleRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    rule_reader: Arc<dyn RuleConfigReader>,
    generator: ScheduleGenerator,
    recommender: CandidateRecommender,
    audit_tracker: AuditTracker,
}

impl ScheduleApi {
    /// 创建新的 ScheduleApi 实例
    pub fn new(
        schedule_repo: Arc<ScheduleRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        audit_repo: Arc<AuditRepository>,
        rule_reader: Arc<dyn RuleConfigReader>,
    ) -> Self {
        Self {
            schedule_repo,
            assignment_repo,
            rule_reader,
            generator: ScheduleGenerator::new(),
            recommender: CandidateRecommender::new(),
            audit_tracker: AuditTracker::new(audit_repo),
        }
    }

    /// 在同一连接上组装全部仓储, 规则从 ConfigManager 读取
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self::new(
            Arc::new(ScheduleRepository::new(conn.clone())),
            Arc::new(AssignmentRepository::new(conn.clone())),
            Arc::new(AuditRepository::new(conn.clone())),
            Arc::new(ConfigManager::from_connection(conn)),
        )
    }

    // ==========================================
    // 排班生成
    // ==========================================

    /// 生成排班 (使用租户当前生效的规则)
    ///
    /// # 参数
    /// - request: 输入快照; 其中 rules 会被租户生效规则覆盖
    /// - cancel: 协作式取消标志
    ///
    /// # 返回
    /// - Ok(result): 生成结果 (成功或结构化失败均在 result 中)
    /// - Err(ApiError): 输入无效、规则加载失败或持久化失败
    #[instrument(skip_all, fields(tenant_id = %request.tenant_id, schedule_id = %request.schedule_id))]
    pub async fn generate_schedule(
        &self,
        mut request: GenerationRequest,
        cancel: CancellationFlag,
    ) -> ApiResult<ScheduleGenerationResult> {
        validate_ids(&request)?;
        request.rules = self.rule_reader.get_active_rule_set(&request.tenant_id).await?;
        self.run_and_persist(request, cancel).await
    }

    /// 生成排班 (使用请求中携带的规则)
    #[instrument(skip_all, fields(tenant_id = %request.tenant_id, schedule_id = %request.schedule_id))]
    pub async fn generate_with_rules(
        &self,
        request: GenerationRequest,
        cancel: CancellationFlag,
    ) -> ApiResult<ScheduleGenerationResult> {
        validate_ids(&request)?;
        request.rules.validate()?;
        self.run_and_persist(request, cancel).await
    }

    /// 从外部来源抓取名册与覆盖需求后生成
    ///
    /// 抓取失败时排班头记为 failed, 返回带 GenerationError 的结果
    #[instrument(skip(self, source, options, cancel))]
    pub async fn generate_schedule_from_source<S>(
        &self,
        source: &S,
        tenant_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        options: Option<GenerationOptions>,
        cancel: CancellationFlag,
    ) -> ApiResult<ScheduleGenerationResult>
    where
        S: InputSource + ?Sized,
    {
        let rules = self.rule_reader.get_active_rule_set(tenant_id).await?;
        let mut request = GenerationRequest::new(tenant_id, start_date, end_date, vec![], vec![], rules);
        request.options = options;
        validate_ids(&request)?;

        if let Err(error) = self.generator.populate_from_source(&mut request, source).await {
            self.open_schedule(&request)?;
            self.schedule_repo.finish(
                &request.schedule_id,
                ScheduleStatus::Failed,
                None::<&GenerationStatistics>,
                Some(&error),
            )?;
            return Ok(ScheduleGenerationResult::from_error(
                &request.schedule_id,
                tenant_id,
                error,
            ));
        }

        self.run_and_persist(request, cancel).await
    }

    async fn run_and_persist(
        &self,
        request: GenerationRequest,
        cancel: CancellationFlag,
    ) -> ApiResult<ScheduleGenerationResult> {
        self.open_schedule(&request)?;
        let result = self.generator.generate(request, cancel).await;
        self.persist_result(&result)?;
        Ok(result)
    }

    /// 创建排班头并进入 generating
    fn open_schedule(&self, request: &GenerationRequest) -> ApiResult<()> {
        self.schedule_repo.create(
            &request.schedule_id,
            &request.tenant_id,
            request.start_date,
            request.end_date,
            request,
        )?;
        self.schedule_repo
            .transition(&request.schedule_id, ScheduleStatus::Generating)?;
        Ok(())
    }

    /// 提交生成结果
    ///
    /// - draft: 审计记录与分配同一事务写入, 成功后记录统计
    /// - failed: 只记录错误, 不写分配
    fn persist_result(&self, result: &ScheduleGenerationResult) -> ApiResult<()> {
        let schedule_id = &result.schedule_id;

        if result.status != ScheduleStatus::Draft {
            self.schedule_repo.finish(
                schedule_id,
                ScheduleStatus::Failed,
                None::<&GenerationStatistics>,
                result.error.as_ref(),
            )?;
            return Ok(());
        }

        let committed = AuditTracker::validate(&result.audit_records).and_then(|_| {
            self.assignment_repo
                .insert_with_audit(&result.assignments, &result.audit_records)
        });

        match committed {
            Ok(count) => {
                self.schedule_repo.finish(
                    schedule_id,
                    ScheduleStatus::Draft,
                    result.statistics.as_ref(),
                    None::<&EngineError>,
                )?;
                info!(schedule_id = %schedule_id, assignments = count, "排班结果已提交");
                Ok(())
            }
            Err(e) => {
                warn!(schedule_id = %schedule_id, error = %e, "排班结果提交失败");
                let error = EngineError::generation("persist", &e);
                self.schedule_repo.finish(
                    schedule_id,
                    ScheduleStatus::Failed,
                    None::<&GenerationStatistics>,
                    Some(&error),
                )?;
                Err(e.into())
            }
        }
    }

    // ==========================================
    // 查询接口
    // ==========================================

    pub fn get_schedule(&self, schedule_id: &str) -> ApiResult<ScheduleEntity> {
        self.schedule_repo
            .find_by_id(schedule_id)?
            .ok_or_else(|| ApiError::NotFound(format!("排班(id={})不存在", schedule_id)))
    }

    /// 已提交的分配 (日期 → 班次 → 员工)
    pub fn get_schedule_assignments(&self, schedule_id: &str) -> ApiResult<Vec<ScheduleAssignment>> {
        self.get_schedule(schedule_id)?;
        Ok(self.assignment_repo.find_by_schedule(schedule_id)?)
    }

    /// 查询员工的分配原因
    ///
    /// # 参数
    /// - employee_id: 员工ID
    /// - schedule_id: 限定排班 (可选)
    /// - start_date / end_date: 日期范围, 闭区间 (可选)
    ///
    /// # 返回
    /// 脱敏后的审计视图, 不含评分内部参数
    pub fn get_employee_assignment_reasons(
        &self,
        employee_id: &str,
        schedule_id: Option<&str>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> ApiResult<Vec<AuditRecordView>> {
        if employee_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("员工ID不能为空".to_string()));
        }
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(ApiError::InvalidInput(format!(
                    "开始日期{}晚于结束日期{}",
                    start, end
                )));
            }
        }

        let query = AuditQuery {
            employee_id: employee_id.to_string(),
            schedule_id: schedule_id.map(str::to_string),
            start_date,
            end_date,
        };
        Ok(self.audit_tracker.query(&query)?)
    }

    /// 推荐替补候选人
    ///
    /// # 参数
    /// - schedule_id: 已生成 (draft) 的排班
    /// - date / shift_type: 需要替补的槽位
    /// - limit: 返回数量上限, 默认 DEFAULT_RECOMMENDATION_LIMIT
    #[instrument(skip(self))]
    pub fn recommend_candidates(
        &self,
        schedule_id: &str,
        date: NaiveDate,
        shift_type: ShiftType,
        limit: Option<usize>,
    ) -> ApiResult<Vec<RankedCandidate>> {
        if !shift_type.is_working() {
            return Err(ApiError::InvalidInput("休息班次不需要推荐候选人".to_string()));
        }

        let schedule = self.get_schedule(schedule_id)?;
        if schedule.status != ScheduleStatus::Draft {
            return Err(ApiError::BusinessRuleViolation(format!(
                "排班(id={})状态为{}, 只有 draft 排班可以推荐候选人",
                schedule_id, schedule.status
            )));
        }

        let request: GenerationRequest = self.schedule_repo.load_snapshot(schedule_id)?;
        if !request.contains(date) {
            return Err(ApiError::InvalidInput(format!(
                "日期{}不在排班范围 [{}, {}) 内",
                date, request.start_date, request.end_date
            )));
        }

        let assignments = self.assignment_repo.find_by_schedule(schedule_id)?;
        let ranked = self.recommender.recommend(
            &request,
            &assignments,
            date,
            shift_type,
            limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT),
        );
        info!(candidates = ranked.len(), "候选人推荐完成");
        Ok(ranked)
    }
}

fn validate_ids(request: &GenerationRequest) -> ApiResult<()> {
    if request.tenant_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("租户ID不能为空".to_string()));
    }
    if request.schedule_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("排班ID不能为空".to_string()));
    }
    Ok(())
}
