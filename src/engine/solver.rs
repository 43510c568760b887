// ==========================================
// 排班引擎 - 槽位求解
// ==========================================
// 职责: 按确定性槽位顺序, 逐个岗位选出得分最高的合格员工
// 输入: 员工名册 + 排好序的槽位 + 既有分配 + 规则/选项
// 输出: SolverOutcome (分配决策 + 覆盖缺口)
// ==========================================
// 红线:
// - 选择顺序与平局裁决完全确定: 量化总分 → 近期工时少者 → 员工 ID 字典序
// - 同一员工同一日最多一个工作班次
// - 无合格人选: 允许部分解则记缺口, 否则整体失败
// - 取消/超时只在槽位之间检查, 返回部分结果
// ==========================================

use crate::config::{GenerationOptions, RuleSet};
use crate::domain::assignment::ScheduleAssignment;
use crate::domain::coverage::{CoverageGap, CoverageSlot};
use crate::domain::employee::Employee;
use crate::domain::types::ShiftType;
use crate::engine::audit::{confidence_score, summarize_reason};
use crate::engine::constraints::{ConstraintChecker, ConstraintPolicy, ConstraintViolation};
use crate::engine::error::EngineError;
use crate::engine::run_state::RunState;
use crate::engine::scorer::{CandidateScorer, ScoreBreakdown, ScoringContext};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// ==========================================
// CancellationFlag - 协作式取消标志
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// RunControl - 运行控制 (取消 + 预算)
// ==========================================
#[derive(Debug, Clone)]
pub struct RunControl {
    pub cancel: CancellationFlag,
    pub started: Instant,
    pub budget_ms: Option<u64>,
}

impl RunControl {
    pub fn new(cancel: CancellationFlag, budget_ms: Option<u64>) -> Self {
        Self {
            cancel,
            started: Instant::now(),
            budget_ms,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// 预算耗尽时返回 (已用, 预算)
    fn exceeded(&self) -> Option<(u64, u64)> {
        let budget = self.budget_ms?;
        let elapsed = self.elapsed_ms();
        (elapsed >= budget).then_some((elapsed, budget))
    }
}

// ==========================================
// 求解输出
// ==========================================

/// 单个岗位的选择结果
#[derive(Debug, Clone)]
pub struct SlotDecision {
    pub assignment: ScheduleAssignment,
    pub breakdown: ScoreBreakdown,
    pub candidate_count: u32,
    pub runner_up_score: Option<f64>,
    pub tie_break: Option<String>,
    /// 该岗位在槽位中的序号 (1 起, 含既有分配占位)
    pub position: u32,
    pub required_count: u32,
    /// 紧急放宽时被忽略的约束
    pub relaxed_constraints: Vec<String>,
}

/// 单个槽位的覆盖结果
#[derive(Debug, Clone, PartialEq)]
pub struct SlotCoverage {
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub required_count: u32,
    pub preexisting: u32,
    pub filled: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SolverOutcome {
    pub decisions: Vec<SlotDecision>,
    pub gaps: Vec<CoverageGap>,
    pub coverage: Vec<SlotCoverage>,
    pub slots_total: usize,
}

impl SolverOutcome {
    pub fn assignments(&self) -> Vec<ScheduleAssignment> {
        self.decisions.iter().map(|d| d.assignment.clone()).collect()
    }
}

/// 中止: 错误 + 已完成部分
#[derive(Debug, Clone)]
pub struct SolverAbort {
    pub error: EngineError,
    pub partial: SolverOutcome,
}

/// 排序键 + 评分结果
struct Ranked<'e> {
    employee: &'e Employee,
    breakdown: ScoreBreakdown,
    quantized: i64,
    recent_minutes: i64,
}

// ==========================================
// AssignmentSolver - 槽位求解器
// ==========================================
pub struct AssignmentSolver<'a> {
    rules: &'a RuleSet,
    options: &'a GenerationOptions,
    scorer: CandidateScorer,
    horizon_end: Option<NaiveDate>,
}

impl<'a> AssignmentSolver<'a> {
    pub fn new(rules: &'a RuleSet, options: &'a GenerationOptions) -> Self {
        Self {
            rules,
            options,
            scorer: CandidateScorer::new(),
            horizon_end: None,
        }
    }

    /// 排班区间终点 (不含), 供危险序列检查判定未排班日
    pub fn with_horizon(mut self, end: NaiveDate) -> Self {
        self.horizon_end = Some(end);
        self
    }

    /// 求解全部槽位
    ///
    /// # 参数
    /// - schedule_id: 新分配所属排班
    /// - employees: 员工名册 (不在职/不在范围内者由约束检查排除)
    /// - slots: 已按 CoverageSlot::solve_order 排序
    /// - existing: 既有分配 (计入覆盖与约束)
    /// - control: 取消与预算
    ///
    /// # 返回
    /// - Ok(outcome): 全部槽位已处理 (可能含缺口)
    /// - Err(abort): 取消 / 超时 / 不允许部分解时的约束矛盾
    pub fn solve(
        &self,
        schedule_id: &str,
        employees: &[Employee],
        slots: &[CoverageSlot],
        existing: &[ScheduleAssignment],
        control: &RunControl,
    ) -> Result<SolverOutcome, SolverAbort> {
        let mut roster: Vec<&Employee> = employees.iter().collect();
        roster.sort_by(|a, b| a.id.cmp(&b.id));
        let by_id: BTreeMap<&str, &Employee> = roster.iter().map(|e| (e.id.as_str(), *e)).collect();

        let scope = self.options.team_scope.as_deref();
        let considered: Vec<String> = roster
            .iter()
            .filter(|e| e.is_active && e.in_team_scope(scope))
            .map(|e| e.id.clone())
            .collect();

        let mut strict = ConstraintChecker::new(self.rules, ConstraintPolicy::from_options(self.options), scope);
        if let Some(end) = self.horizon_end {
            strict = strict.with_horizon(end);
        }
        let relaxed = strict.with_policy(ConstraintPolicy::relaxed());

        let mut state = RunState::from_snapshot(employees, existing);

        // 既有分配按 (日期, 班次) 归池, 依员工 ID 顺序占用槽位
        let mut preexisting: BTreeMap<(NaiveDate, ShiftType), Vec<String>> = BTreeMap::new();
        for a in existing.iter().filter(|a| a.shift_type.is_working()) {
            preexisting
                .entry((a.date, a.shift_type))
                .or_default()
                .push(a.employee_id.clone());
        }
        for ids in preexisting.values_mut() {
            ids.sort();
            ids.dedup();
        }

        let mut outcome = SolverOutcome {
            slots_total: slots.len(),
            ..Default::default()
        };

        for (resolved, slot) in slots.iter().enumerate() {
            if control.cancel.is_cancelled() {
                warn!(slots_resolved = resolved, slots_total = slots.len(), "排班生成被取消");
                return Err(SolverAbort {
                    error: EngineError::Cancelled {
                        slots_resolved: resolved,
                        slots_total: slots.len(),
                    },
                    partial: outcome,
                });
            }
            if let Some((elapsed_ms, budget_ms)) = control.exceeded() {
                warn!(elapsed_ms, budget_ms, slots_resolved = resolved, "排班生成超出时间预算");
                return Err(SolverAbort {
                    error: EngineError::GenerationTimeout {
                        budget_ms,
                        elapsed_ms,
                        slots_resolved: resolved,
                        slots_total: slots.len(),
                    },
                    partial: outcome,
                });
            }

            // === 步骤 1: 既有分配占位 ===
            let pool = preexisting.entry((slot.date, slot.shift_type)).or_default();
            let take = pool.len().min(slot.required_count as usize);
            let claimed: Vec<String> = pool.drain(..take).collect();
            let mut assignees: Vec<&Employee> = claimed.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect();
            let mut filled = claimed.len() as u32;
            let mut violated: BTreeSet<String> = BTreeSet::new();

            // === 步骤 2: 逐岗位选人 ===
            while filled < slot.required_count {
                let reference = assignees.first().copied();
                let (ranked, violations) = self.rank(&strict, &roster, slot, &state, reference);
                for (employee_id, v) in &violations {
                    violated.insert(format!("{}: {}", employee_id, v.code()));
                }

                let (ranked, relaxed_map) = if ranked.is_empty() && self.rules.emergency_override_enabled {
                    let (relaxed_ranked, _) = self.rank(&relaxed, &roster, slot, &state, reference);
                    let relaxed_map: BTreeMap<String, ConstraintViolation> = violations.into_iter().collect();
                    (relaxed_ranked, Some(relaxed_map))
                } else {
                    (ranked, None)
                };

                let Some(best) = ranked.first() else {
                    break;
                };

                let runner_up = ranked.get(1);
                let tie_break = runner_up.and_then(|r| {
                    if r.quantized != best.quantized {
                        None
                    } else if r.recent_minutes != best.recent_minutes {
                        Some("lower_recent_workload".to_string())
                    } else {
                        Some("employee_id".to_string())
                    }
                });

                let emergency = relaxed_map.is_some();
                let relaxed_constraints: Vec<String> = relaxed_map
                    .as_ref()
                    .and_then(|m| m.get(&best.employee.id))
                    .map(|v| vec![v.code().to_string()])
                    .unwrap_or_default();

                let runner_up_score = runner_up.map(|r| r.breakdown.total);
                let confidence = confidence_score(best.breakdown.total, runner_up_score, emergency);
                let assignment = ScheduleAssignment {
                    schedule_id: schedule_id.to_string(),
                    employee_id: best.employee.id.clone(),
                    date: slot.date,
                    shift_type: slot.shift_type,
                    reason: summarize_reason(&best.breakdown, emergency),
                    confidence_score: confidence,
                    emergency_override: emergency,
                };

                state.commit(&assignment.employee_id, slot.date, slot.shift_type);
                filled += 1;
                assignees.push(best.employee);

                debug!(
                    date = %slot.date,
                    shift = %slot.shift_type,
                    employee_id = %assignment.employee_id,
                    score = best.breakdown.total,
                    candidates = ranked.len(),
                    emergency,
                    "岗位已分配"
                );

                outcome.decisions.push(SlotDecision {
                    assignment,
                    breakdown: best.breakdown.clone(),
                    candidate_count: ranked.len() as u32,
                    runner_up_score,
                    tie_break,
                    position: filled,
                    required_count: slot.required_count,
                    relaxed_constraints,
                });
            }

            outcome.coverage.push(SlotCoverage {
                date: slot.date,
                shift_type: slot.shift_type,
                required_count: slot.required_count,
                preexisting: claimed.len() as u32,
                filled,
            });

            // === 步骤 3: 缺口处理 ===
            if filled < slot.required_count {
                let gap = CoverageGap {
                    date: slot.date,
                    shift_type: slot.shift_type,
                    required_count: slot.required_count,
                    actual_filled: filled,
                    gap_count: slot.required_count.saturating_sub(filled),
                    considered_employees: considered.clone(),
                    violated_constraints: violated.into_iter().collect(),
                };

                if !self.rules.allow_partial_solutions {
                    warn!(date = %slot.date, shift = %slot.shift_type, "槽位无法满足且不允许部分解");
                    let error = EngineError::ConstraintContradiction {
                        date: gap.date,
                        shift_type: gap.shift_type,
                        required_count: gap.required_count,
                        actual_filled: gap.actual_filled,
                        considered_employees: gap.considered_employees.clone(),
                        violated_constraints: gap.violated_constraints.clone(),
                    };
                    outcome.gaps.push(gap);
                    return Err(SolverAbort {
                        error,
                        partial: outcome,
                    });
                }

                debug!(date = %slot.date, shift = %slot.shift_type, gap = gap.gap_count, "记录覆盖缺口");
                outcome.gaps.push(gap);
            }
        }

        Ok(outcome)
    }

    /// 对合格候选人评分并排序
    ///
    /// # 返回
    /// (排好序的候选人, 被排除员工的违反约束)
    fn rank<'e>(
        &self,
        checker: &ConstraintChecker<'_>,
        roster: &[&'e Employee],
        slot: &CoverageSlot,
        state: &RunState,
        reference: Option<&Employee>,
    ) -> (Vec<Ranked<'e>>, Vec<(String, ConstraintViolation)>) {
        let ctx = ScoringContext {
            state,
            rules: self.rules,
            options: self.options,
            reference,
            minimum_experience: slot.minimum_experience_level,
        };

        let mut ranked = Vec::new();
        let mut violations = Vec::new();
        for employee in roster.iter().copied() {
            match checker.check(employee, slot.date, slot.shift_type, slot.minimum_experience_level, state) {
                Ok(()) => {
                    let breakdown = self.scorer.score(employee, slot.date, slot.shift_type, &ctx);
                    ranked.push(Ranked {
                        employee,
                        quantized: breakdown.quantized(),
                        recent_minutes: (state.recent_hours(&employee.id, slot.date) * 60.0).round() as i64,
                        breakdown,
                    });
                }
                Err(v) => {
                    // 非在职/范围外员工不计入诊断
                    if !matches!(v, ConstraintViolation::Inactive | ConstraintViolation::OutOfTeamScope) {
                        violations.push((employee.id.clone(), v));
                    }
                }
            }
        }

        ranked.sort_by(|a, b| {
            b.quantized
                .cmp(&a.quantized)
                .then(a.recent_minutes.cmp(&b.recent_minutes))
                .then_with(|| a.employee.id.cmp(&b.employee.id))
        });
        (ranked, violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coverage::{build_slots, CoverageRequirement};

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn employee(id: &str) -> Employee {
        Employee {
            id: id.to_string(),
            name: id.to_string(),
            role: "nurse".to_string(),
            hierarchy_level: 2,
            experience_years: 3.0,
            team_id: None,
            is_active: true,
            skills: vec![],
            preferences: vec![],
            recent_history: vec![],
        }
    }

    fn requirement(day: u32, shift: ShiftType, count: u32) -> CoverageRequirement {
        CoverageRequirement {
            date: d(day),
            shift_type: shift,
            required_count: count,
            minimum_experience_level: None,
        }
    }

    fn control() -> RunControl {
        RunControl::new(CancellationFlag::new(), None)
    }

    #[test]
    fn test_identical_candidates_tie_break_on_id() {
        let rules = RuleSet::default();
        let options = GenerationOptions::default();
        let solver = AssignmentSolver::new(&rules, &options);
        let employees = vec![employee("E3"), employee("E1"), employee("E2")];
        let slots = build_slots(&[requirement(2, ShiftType::Day, 1)]);

        let outcome = solver.solve("s1", &employees, &slots, &[], &control()).unwrap();
        assert_eq!(outcome.decisions.len(), 1);
        assert_eq!(outcome.decisions[0].assignment.employee_id, "E1");
        assert_eq!(outcome.decisions[0].tie_break.as_deref(), Some("employee_id"));
        assert!(outcome.gaps.is_empty());
    }

    #[test]
    fn test_no_double_booking_within_a_day() {
        let rules = RuleSet::default();
        let options = GenerationOptions::default();
        let solver = AssignmentSolver::new(&rules, &options);
        let employees = vec![employee("E1"), employee("E2")];
        let slots = build_slots(&[
            requirement(2, ShiftType::Day, 1),
            requirement(2, ShiftType::Evening, 1),
            requirement(2, ShiftType::Night, 1),
        ]);

        let outcome = solver.solve("s1", &employees, &slots, &[], &control()).unwrap();
        let ids: BTreeSet<&str> = outcome
            .decisions
            .iter()
            .map(|d| d.assignment.employee_id.as_str())
            .collect();
        assert_eq!(outcome.decisions.len(), 2);
        assert_eq!(ids.len(), 2);
        assert_eq!(outcome.gaps.len(), 1);
        assert_eq!(outcome.gaps[0].shift_type, ShiftType::Night);
        assert!(outcome.gaps[0]
            .violated_constraints
            .iter()
            .all(|v| v.ends_with("already_assigned")));
    }

    #[test]
    fn test_contradiction_when_partial_not_allowed() {
        let mut rules = RuleSet::default();
        rules.allow_partial_solutions = false;
        let options = GenerationOptions::default();
        let solver = AssignmentSolver::new(&rules, &options);
        let slots = build_slots(&[requirement(2, ShiftType::Day, 2)]);

        let abort = solver
            .solve("s1", &[employee("E1")], &slots, &[], &control())
            .unwrap_err();
        assert!(matches!(
            abort.error,
            EngineError::ConstraintContradiction { required_count: 2, actual_filled: 1, .. }
        ));
        assert_eq!(abort.partial.decisions.len(), 1);
    }

    #[test]
    fn test_emergency_override_relaxes_rest() {
        let mut rules = RuleSet::default();
        rules.emergency_override_enabled = true;
        let options = GenerationOptions::default();
        let solver = AssignmentSolver::new(&rules, &options);
        let existing = vec![ScheduleAssignment {
            schedule_id: "s1".to_string(),
            employee_id: "E1".to_string(),
            date: d(1),
            shift_type: ShiftType::Night,
            reason: "existing".to_string(),
            confidence_score: 1.0,
            emergency_override: false,
        }];
        let slots = build_slots(&[requirement(2, ShiftType::Day, 1)]);

        let outcome = solver
            .solve("s1", &[employee("E1")], &slots, &existing, &control())
            .unwrap();
        let decision = &outcome.decisions[0];
        assert!(decision.assignment.emergency_override);
        assert_eq!(decision.relaxed_constraints, vec!["insufficient_rest".to_string()]);
        assert!(decision.assignment.confidence_score <= 0.5);
    }

    #[test]
    fn test_preexisting_assignments_count_toward_coverage() {
        let rules = RuleSet::default();
        let options = GenerationOptions::default();
        let solver = AssignmentSolver::new(&rules, &options);
        let existing = vec![ScheduleAssignment {
            schedule_id: "s0".to_string(),
            employee_id: "E2".to_string(),
            date: d(2),
            shift_type: ShiftType::Day,
            reason: "manual".to_string(),
            confidence_score: 1.0,
            emergency_override: false,
        }];
        let slots = build_slots(&[requirement(2, ShiftType::Day, 2)]);

        let outcome = solver
            .solve("s1", &[employee("E1"), employee("E2")], &slots, &existing, &control())
            .unwrap();
        assert_eq!(outcome.decisions.len(), 1);
        assert_eq!(outcome.decisions[0].assignment.employee_id, "E1");
        assert_eq!(outcome.decisions[0].position, 2);
        assert_eq!(outcome.coverage[0].preexisting, 1);
        assert_eq!(outcome.coverage[0].filled, 2);
    }

    #[test]
    fn test_cancel_returns_partial() {
        let rules = RuleSet::default();
        let options = GenerationOptions::default();
        let solver = AssignmentSolver::new(&rules, &options);
        let flag = CancellationFlag::new();
        flag.cancel();
        let slots = build_slots(&[requirement(2, ShiftType::Day, 1)]);

        let abort = solver
            .solve("s1", &[employee("E1")], &slots, &[], &RunControl::new(flag, None))
            .unwrap_err();
        assert!(matches!(abort.error, EngineError::Cancelled { slots_resolved: 0, slots_total: 1 }));
        assert!(abort.partial.decisions.is_empty());
    }

    #[test]
    fn test_zero_budget_times_out() {
        let rules = RuleSet::default();
        let options = GenerationOptions::default();
        let solver = AssignmentSolver::new(&rules, &options);
        let slots = build_slots(&[requirement(2, ShiftType::Day, 1)]);

        let abort = solver
            .solve("s1", &[employee("E1")], &slots, &[], &RunControl::new(CancellationFlag::new(), Some(0)))
            .unwrap_err();
        assert!(matches!(abort.error, EngineError::GenerationTimeout { budget_ms: 0, .. }));
    }
}
