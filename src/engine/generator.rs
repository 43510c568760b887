// ==========================================
// 排班引擎 - 排班生成编排器
// ==========================================
// 主流程:
// 1) 校验 (规则 / 日期范围 / 可排班员工)
// 2) 展开覆盖需求为确定性槽位
// 3) 槽位求解 (阻塞线程)
// 4) 模式安全分析 + 公平性评估 (并行)
// 5) 生成审计记录与统计
// 状态: pending → generating → {draft, failed}
// 红线: 失败结果不携带正式分配 (部分结果放在 partial_assignments)
// ==========================================

use crate::config::GenerationOptions;
use crate::domain::assignment::ScheduleAssignment;
use crate::domain::audit::AuditRecord;
use crate::domain::coverage::{build_slots, CoverageGap};
use crate::domain::fairness::FairnessMetrics;
use crate::domain::risk::PatternAnalysis;
use crate::domain::types::{ScheduleStatus, ShiftType};
use crate::engine::audit::build_audit_record;
use crate::engine::constraints::ConstraintPolicy;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::fairness::FairnessEngine;
use crate::engine::input::{GenerationRequest, InputSource};
use crate::engine::pattern_safety::PatternSafetyAnalyzer;
use crate::engine::solver::{AssignmentSolver, CancellationFlag, RunControl, SolverOutcome};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ==========================================
// GenerationStatistics - 生成统计
// ==========================================
// 不含耗时, 相同输入得到相同统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftCoverageStats {
    pub required: u32,
    pub filled: u32,
    pub gaps: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStatistics {
    pub total_slots: u32,
    pub total_required: u32,
    pub total_filled: u32,
    pub total_gap: u32,
    pub coverage_rate: f64,
    pub new_assignments: u32,
    pub preexisting_counted: u32,
    pub employees_in_scope: u32,
    pub employees_assigned: u32,
    pub emergency_overrides: u32,
    pub average_confidence: f64,
    pub by_shift: BTreeMap<ShiftType, ShiftCoverageStats>,
}

impl GenerationStatistics {
    pub fn from_outcome(outcome: &SolverOutcome, employees_in_scope: usize) -> Self {
        let mut stats = GenerationStatistics {
            total_slots: outcome.coverage.len() as u32,
            employees_in_scope: employees_in_scope as u32,
            ..Default::default()
        };

        for c in &outcome.coverage {
            stats.total_required = stats.total_required.saturating_add(c.required_count);
            stats.total_filled = stats.total_filled.saturating_add(c.filled);
            stats.preexisting_counted = stats.preexisting_counted.saturating_add(c.preexisting);
            let entry = stats.by_shift.entry(c.shift_type).or_default();
            entry.required = entry.required.saturating_add(c.required_count);
            entry.filled = entry.filled.saturating_add(c.filled);
            entry.gaps = entry.gaps.saturating_add(c.required_count.saturating_sub(c.filled));
        }
        stats.total_gap = saturating_total(outcome.gaps.iter().map(|g| g.gap_count));
        stats.coverage_rate = coverage_rate(stats.total_filled, stats.total_required);

        stats.new_assignments = outcome.decisions.len() as u32;
        stats.emergency_overrides = outcome
            .decisions
            .iter()
            .filter(|d| d.assignment.emergency_override)
            .count() as u32;
        stats.employees_assigned = outcome
            .decisions
            .iter()
            .map(|d| d.assignment.employee_id.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u32;
        if !outcome.decisions.is_empty() {
            let sum: f64 = outcome.decisions.iter().map(|d| d.assignment.confidence_score).sum();
            stats.average_confidence = (sum / outcome.decisions.len() as f64 * 1000.0).round() / 1000.0;
        }
        stats
    }
}

/// 计数求和, 溢出时封顶于 u32::MAX
fn saturating_total(values: impl Iterator<Item = u32>) -> u32 {
    values.fold(0, u32::saturating_add)
}

/// 覆盖率; 无需求时为 1.0
fn coverage_rate(filled: u32, required: u32) -> f64 {
    if required == 0 {
        1.0
    } else {
        filled as f64 / required as f64
    }
}

// ==========================================
// ScheduleGenerationResult - 生成结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleGenerationResult {
    pub schedule_id: String,
    pub tenant_id: String,
    pub status: ScheduleStatus,
    pub success: bool,
    /// 成功时的全部新分配
    pub assignments: Vec<ScheduleAssignment>,
    /// 失败 (超时/取消/矛盾) 时已完成的部分分配, 不提交
    pub partial_assignments: Vec<ScheduleAssignment>,
    pub coverage_rate: f64,
    pub coverage_gaps: Vec<CoverageGap>,
    pub fairness_metrics: Option<FairnessMetrics>,
    pub pattern_analysis: Option<PatternAnalysis>,
    pub statistics: Option<GenerationStatistics>,
    pub audit_records: Vec<AuditRecord>,
    pub generation_time_ms: u64,
    pub error: Option<EngineError>,
}

impl ScheduleGenerationResult {
    /// 未进入求解即失败的结果 (如输入抓取失败)
    pub fn from_error(schedule_id: &str, tenant_id: &str, error: EngineError) -> Self {
        Self::failed(schedule_id, tenant_id, error, None, 0)
    }

    fn failed(
        schedule_id: &str,
        tenant_id: &str,
        error: EngineError,
        partial: Option<SolverOutcome>,
        generation_time_ms: u64,
    ) -> Self {
        let (partial_assignments, coverage_gaps, coverage_rate) = match partial {
            Some(outcome) => {
                let required = saturating_total(outcome.coverage.iter().map(|c| c.required_count));
                let filled = saturating_total(outcome.coverage.iter().map(|c| c.filled));
                (outcome.assignments(), outcome.gaps, self::coverage_rate(filled, required))
            }
            None => (Vec::new(), Vec::new(), 0.0),
        };
        Self {
            schedule_id: schedule_id.to_string(),
            tenant_id: tenant_id.to_string(),
            status: ScheduleStatus::Failed,
            success: false,
            assignments: Vec::new(),
            partial_assignments,
            coverage_rate,
            coverage_gaps,
            fairness_metrics: None,
            pattern_analysis: None,
            statistics: None,
            audit_records: Vec::new(),
            generation_time_ms,
            error: Some(error),
        }
    }
}

/// 运行失败: 错误 + 可能的部分求解结果
struct RunFailure {
    error: EngineError,
    partial: Option<SolverOutcome>,
}

impl From<EngineError> for RunFailure {
    fn from(error: EngineError) -> Self {
        Self { error, partial: None }
    }
}

// ==========================================
// ScheduleGenerator - 排班生成编排器
// ==========================================
pub struct ScheduleGenerator {
    // 无状态编排器, 每次运行的状态保存在 RunState 中
}

impl ScheduleGenerator {
    pub fn new() -> Self {
        Self {}
    }

    /// 生成排班
    ///
    /// # 参数
    /// - request: 完整输入快照
    /// - cancel: 协作式取消标志 (在槽位之间检查)
    ///
    /// # 返回
    /// 生成结果; 失败时 status = Failed, error 携带结构化原因
    #[instrument(skip_all, fields(schedule_id = %request.schedule_id, tenant_id = %request.tenant_id))]
    pub async fn generate(&self, request: GenerationRequest, cancel: CancellationFlag) -> ScheduleGenerationResult {
        let options = request.effective_options();
        let control = RunControl::new(cancel, options.deadline_ms);
        let schedule_id = request.schedule_id.clone();
        let tenant_id = request.tenant_id.clone();

        info!(
            start_date = %request.start_date,
            end_date = %request.end_date,
            employees = request.employees.len(),
            requirements = request.coverage_requirements.len(),
            existing = request.existing_assignments.len(),
            "开始生成排班"
        );
        let mut status = ScheduleStatus::Pending;
        advance(&mut status, ScheduleStatus::Generating);

        match self.run(Arc::new(request), options, &control).await {
            Ok(mut result) => {
                advance(&mut status, ScheduleStatus::Draft);
                result.status = status;
                result.generation_time_ms = control.elapsed_ms();
                info!(
                    assignments = result.assignments.len(),
                    gaps = result.coverage_gaps.len(),
                    coverage_rate = result.coverage_rate,
                    elapsed_ms = result.generation_time_ms,
                    "排班生成完成"
                );
                result
            }
            Err(failure) => {
                advance(&mut status, ScheduleStatus::Failed);
                warn!(
                    error_kind = failure.error.kind(),
                    error = %failure.error,
                    "排班生成失败"
                );
                ScheduleGenerationResult::failed(
                    &schedule_id,
                    &tenant_id,
                    failure.error,
                    failure.partial,
                    control.elapsed_ms(),
                )
            }
        }
    }

    /// 并发生成多个独立排班 (各自拥有独立的运行状态)
    pub async fn generate_batch(
        &self,
        requests: Vec<GenerationRequest>,
        cancel: CancellationFlag,
    ) -> Vec<ScheduleGenerationResult> {
        info!(batch_size = requests.len(), "开始批量生成排班");
        join_all(
            requests
                .into_iter()
                .map(|request| self.generate(request, cancel.clone())),
        )
        .await
    }

    /// 从外部来源抓取名册与需求后生成
    ///
    /// 抓取失败不抛出, 以 GenerationError { stage, cause } 的失败结果返回
    #[allow(clippy::too_many_arguments)]
    pub async fn generate_from_source<S>(
        &self,
        source: &S,
        tenant_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        rules: crate::config::RuleSet,
        options: Option<GenerationOptions>,
        cancel: CancellationFlag,
    ) -> ScheduleGenerationResult
    where
        S: InputSource + ?Sized,
    {
        let mut request = GenerationRequest::new(tenant_id, start_date, end_date, vec![], vec![], rules);
        request.options = options;

        match self.populate_from_source(&mut request, source).await {
            Ok(()) => self.generate(request, cancel).await,
            Err(error) => ScheduleGenerationResult::failed(&request.schedule_id, tenant_id, error, None, 0),
        }
    }

    /// 抓取名册、覆盖需求与已有分配, 填入请求快照
    ///
    /// # 返回
    /// 任一阶段失败: GenerationError { stage, cause }, 请求保持抓取前状态
    pub async fn populate_from_source<S>(&self, request: &mut GenerationRequest, source: &S) -> EngineResult<()>
    where
        S: InputSource + ?Sized,
    {
        let tenant_id = request.tenant_id.clone();
        let (start_date, end_date) = (request.start_date, request.end_date);

        let fetched = async {
            let employees = source
                .fetch_employees(&tenant_id)
                .await
                .map_err(|e| EngineError::generation("fetch_employees", format!("{:#}", e)))?;
            let coverage = source
                .fetch_coverage(&tenant_id, start_date, end_date)
                .await
                .map_err(|e| EngineError::generation("fetch_coverage", format!("{:#}", e)))?;
            let existing = source
                .fetch_existing_assignments(&tenant_id, start_date, end_date)
                .await
                .map_err(|e| EngineError::generation("fetch_existing_assignments", format!("{:#}", e)))?;
            Ok::<_, EngineError>((employees, coverage, existing))
        }
        .await;

        match fetched {
            Ok((employees, coverage, existing)) => {
                debug!(
                    employees = employees.len(),
                    requirements = coverage.len(),
                    existing = existing.len(),
                    "输入抓取完成"
                );
                request.employees = employees;
                request.coverage_requirements = coverage;
                request.existing_assignments = existing;
                Ok(())
            }
            Err(error) => {
                warn!(tenant_id = %tenant_id, error = %error, "输入抓取失败");
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        request: Arc<GenerationRequest>,
        options: GenerationOptions,
        control: &RunControl,
    ) -> Result<ScheduleGenerationResult, RunFailure> {
        // ==========================================
        // 步骤1: 输入校验
        // ==========================================
        debug!("步骤1: 校验规则与输入");
        request.rules.validate().map_err(EngineError::from)?;
        request.validate_range()?;

        let roster = request.scoped_roster(&options);
        if roster.is_empty() {
            return Err(EngineError::NoEligibleEmployees {
                tenant_id: request.tenant_id.clone(),
                roster_size: request.employees.len(),
            }
            .into());
        }

        // ==========================================
        // 步骤2: 展开槽位
        // ==========================================
        let slots = build_slots(&request.coverage_requirements);
        info!(slots = slots.len(), roster = roster.len(), "槽位展开完成");

        // ==========================================
        // 步骤3: 槽位求解
        // ==========================================
        debug!("步骤3: 执行槽位求解");
        let solved = {
            let request = Arc::clone(&request);
            let options = options.clone();
            let control = control.clone();
            tokio::task::spawn_blocking(move || {
                AssignmentSolver::new(&request.rules, &options)
                    .with_horizon(request.end_date)
                    .solve(
                        &request.schedule_id,
                        &request.employees,
                        &slots,
                        &request.existing_assignments,
                        &control,
                    )
            })
            .await
            .map_err(|e| EngineError::generation("solve", e))?
        };
        let outcome = solved.map_err(|abort| RunFailure {
            error: abort.error,
            partial: Some(abort.partial),
        })?;

        info!(
            decisions = outcome.decisions.len(),
            gaps = outcome.gaps.len(),
            "槽位求解完成"
        );

        // ==========================================
        // 步骤4: 模式安全分析 + 公平性评估 (并行)
        // ==========================================
        debug!("步骤4: 执行模式安全分析与公平性评估");
        let mut in_range: Vec<ScheduleAssignment> = request
            .existing_assignments
            .iter()
            .filter(|a| request.contains(a.date) && a.shift_type.is_working())
            .cloned()
            .collect();
        in_range.extend(outcome.assignments());
        let in_range = Arc::new(in_range);
        let roster = Arc::new(roster);

        let pattern_task = {
            let assignments = Arc::clone(&in_range);
            let rules = request.rules.clone();
            let range = (request.start_date, request.end_date);
            tokio::task::spawn_blocking(move || PatternSafetyAnalyzer::new(rules).analyze_all(&assignments, Some(range)))
        };
        let fairness_task = {
            let assignments = Arc::clone(&in_range);
            let roster = Arc::clone(&roster);
            let engine = FairnessEngine::new(request.rules.target_gini, request.rules.standard_weekly_hours);
            tokio::task::spawn_blocking(move || {
                let scoped: BTreeSet<&str> = roster.iter().map(|e| e.id.as_str()).collect();
                let counted: Vec<ScheduleAssignment> = assignments
                    .iter()
                    .filter(|a| scoped.contains(a.employee_id.as_str()))
                    .cloned()
                    .collect();
                engine.evaluate(&counted, &roster)
            })
        };
        let (patterns, fairness) = tokio::join!(pattern_task, fairness_task);
        let patterns = patterns.map_err(|e| EngineError::generation("pattern_analysis", e))?;
        let fairness = fairness.map_err(|e| EngineError::generation("fairness", e))?;

        info!(
            gini = fairness.gini_coefficient,
            fairness_score = fairness.fairness_score,
            employees_at_risk = patterns.employees_at_risk,
            critical = patterns.critical_count,
            "后处理分析完成"
        );

        // ==========================================
        // 步骤5: 审计记录与统计
        // ==========================================
        let policy = ConstraintPolicy::from_options(&options);
        let audit_records: Vec<AuditRecord> = outcome
            .decisions
            .iter()
            .map(|d| build_audit_record(&request.tenant_id, d, policy, Some(&fairness), Some(&patterns)))
            .collect();

        let statistics = GenerationStatistics::from_outcome(&outcome, roster.len());

        Ok(ScheduleGenerationResult {
            schedule_id: request.schedule_id.clone(),
            tenant_id: request.tenant_id.clone(),
            status: ScheduleStatus::Generating,
            success: true,
            assignments: outcome.assignments(),
            partial_assignments: Vec::new(),
            coverage_rate: statistics.coverage_rate,
            coverage_gaps: outcome.gaps,
            fairness_metrics: Some(fairness),
            pattern_analysis: Some(patterns),
            statistics: Some(statistics),
            audit_records,
            generation_time_ms: 0,
            error: None,
        })
    }
}

impl Default for ScheduleGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn advance(status: &mut ScheduleStatus, next: ScheduleStatus) {
    if status.can_transition_to(next) {
        debug!(from = %status, to = %next, "状态迁移");
        *status = next;
    } else {
        warn!(from = %status, to = %next, "忽略非法状态迁移");
    }
}
