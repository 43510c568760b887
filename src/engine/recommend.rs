// ==========================================
// 排班引擎 - 候选人推荐
// ==========================================
// 职责: 为某日某班次给出排好序的替补候选人
// - Direct: 直接顶班 (通过全部硬约束)
// - Swap: 与当前在岗者换班 (同职级; 双方移动均通过硬约束)
// 红线: 只读, 不修改任何分配; 综合分低于推荐阈值的候选人不返回
// ==========================================

use crate::domain::assignment::ScheduleAssignment;
use crate::domain::employee::Employee;
use crate::domain::types::{ExperienceLevel, ShiftType};
use crate::engine::constraints::{ConstraintChecker, ConstraintPolicy};
use crate::engine::input::GenerationRequest;
use crate::engine::run_state::RunState;
use crate::engine::scorer::{CandidateScorer, ScoreBreakdown, ScoringContext, RECOMMENDATION_THRESHOLD};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 换班搜索窗口 (天)
pub const SWAP_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateKind {
    Direct,
    Swap {
        /// 当前在岗者, 改上 give_back 班次
        swap_with: String,
        give_back_date: NaiveDate,
        give_back_shift: ShiftType,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub employee_id: String,
    pub employee_name: String,
    pub score: f64,
    pub kind: CandidateKind,
    pub highlights: Vec<String>,
}

pub struct CandidateRecommender {
    scorer: CandidateScorer,
}

impl CandidateRecommender {
    pub fn new() -> Self {
        Self {
            scorer: CandidateScorer::new(),
        }
    }

    /// 推荐候选人
    ///
    /// # 参数
    /// - request: 生成时的输入快照 (名册、规则、选项)
    /// - assignments: 该排班当前的分配
    /// - date / shift: 需要替补的槽位
    /// - limit: 返回数量上限
    pub fn recommend(
        &self,
        request: &GenerationRequest,
        assignments: &[ScheduleAssignment],
        date: NaiveDate,
        shift: ShiftType,
        limit: usize,
    ) -> Vec<RankedCandidate> {
        let options = request.effective_options();
        let checker = ConstraintChecker::new(
            &request.rules,
            ConstraintPolicy::from_options(&options),
            options.team_scope.as_deref(),
        )
        .with_horizon(request.end_date);

        let mut known: Vec<ScheduleAssignment> = request.existing_assignments.clone();
        known.extend_from_slice(assignments);
        let state = RunState::from_snapshot(&request.employees, &known);

        let roster = request.scoped_roster(&options);
        let mut current: Vec<&Employee> = roster
            .iter()
            .filter(|e| state.shift_on(&e.id, date) == Some(shift))
            .collect();
        current.sort_by(|a, b| a.id.cmp(&b.id));
        let reference = current.first().copied();
        let minimum = minimum_experience(request, date, shift);

        let mut ranked = Vec::new();

        // === Direct ===
        for employee in roster.iter().filter(|e| !current.iter().any(|c| c.id == e.id)) {
            if checker.check(employee, date, shift, minimum, &state).is_err() {
                continue;
            }
            let ctx = ScoringContext {
                state: &state,
                rules: &request.rules,
                options: &options,
                reference,
                minimum_experience: minimum,
            };
            let breakdown = self.scorer.score(employee, date, shift, &ctx);
            if breakdown.total >= RECOMMENDATION_THRESHOLD {
                ranked.push(candidate(employee, &breakdown, CandidateKind::Direct));
            }
        }

        // === Swap ===
        if let Some(holder) = reference {
            for employee in roster.iter().filter(|e| e.id != holder.id && e.hierarchy_level == holder.hierarchy_level) {
                if state.is_committed(&employee.id, date) {
                    continue;
                }
                if let Some(swap) = self.find_swap(request, &checker, &options, &state, holder, employee, date, shift, minimum) {
                    ranked.push(swap);
                }
            }
        }

        ranked.sort_by(|a, b| {
            let qa = (a.score * 1_000_000.0).round() as i64;
            let qb = (b.score * 1_000_000.0).round() as i64;
            qb.cmp(&qa)
                .then_with(|| matches!(a.kind, CandidateKind::Swap { .. }).cmp(&matches!(b.kind, CandidateKind::Swap { .. })))
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });
        ranked.truncate(limit);

        debug!(date = %date, shift = %shift, candidates = ranked.len(), "候选人推荐完成");
        ranked
    }

    /// 在 ±7 天内寻找第一个可行的换班日 (近者优先, 同距离先早后晚)
    #[allow(clippy::too_many_arguments)]
    fn find_swap(
        &self,
        request: &GenerationRequest,
        checker: &ConstraintChecker<'_>,
        options: &crate::config::GenerationOptions,
        state: &RunState,
        holder: &Employee,
        candidate_employee: &Employee,
        date: NaiveDate,
        shift: ShiftType,
        minimum: Option<ExperienceLevel>,
    ) -> Option<RankedCandidate> {
        for distance in 1..=SWAP_WINDOW_DAYS {
            for other_date in [date - Duration::days(distance), date + Duration::days(distance)] {
                let Some(other_shift) = state
                    .shift_on(&candidate_employee.id, other_date)
                    .filter(|s| s.is_working())
                else {
                    continue;
                };
                if state.is_committed(&holder.id, other_date) {
                    continue;
                }

                let mut trial = state.clone();
                trial.release(&holder.id, date);
                trial.release(&candidate_employee.id, other_date);

                if checker.check(candidate_employee, date, shift, minimum, &trial).is_err() {
                    continue;
                }
                let ctx = ScoringContext {
                    state: &trial,
                    rules: &request.rules,
                    options,
                    reference: Some(holder),
                    minimum_experience: minimum,
                };
                let breakdown = self.scorer.score(candidate_employee, date, shift, &ctx);

                trial.commit(&candidate_employee.id, date, shift);
                let other_minimum = minimum_experience(request, other_date, other_shift);
                if checker
                    .check(holder, other_date, other_shift, other_minimum, &trial)
                    .is_err()
                {
                    continue;
                }
                if breakdown.total < RECOMMENDATION_THRESHOLD {
                    return None;
                }

                return Some(candidate(
                    candidate_employee,
                    &breakdown,
                    CandidateKind::Swap {
                        swap_with: holder.id.clone(),
                        give_back_date: other_date,
                        give_back_shift: other_shift,
                    },
                ));
            }
        }
        None
    }
}

impl Default for CandidateRecommender {
    fn default() -> Self {
        Self::new()
    }
}

fn candidate(employee: &Employee, breakdown: &ScoreBreakdown, kind: CandidateKind) -> RankedCandidate {
    RankedCandidate {
        employee_id: employee.id.clone(),
        employee_name: employee.name.clone(),
        score: (breakdown.total * 1000.0).round() / 1000.0,
        kind,
        highlights: breakdown.dominant().iter().take(2).map(|f| f.note.clone()).collect(),
    }
}

/// 槽位最严格的经验要求
fn minimum_experience(request: &GenerationRequest, date: NaiveDate, shift: ShiftType) -> Option<ExperienceLevel> {
    request
        .coverage_requirements
        .iter()
        .filter(|r| r.date == date && r.shift_type == shift)
        .filter_map(|r| r.minimum_experience_level)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSet;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn employee(id: &str, level: u8) -> Employee {
        Employee {
            id: id.to_string(),
            name: format!("Name {}", id),
            role: "nurse".to_string(),
            hierarchy_level: level,
            experience_years: 3.0,
            team_id: None,
            is_active: true,
            skills: vec![],
            preferences: vec![],
            recent_history: vec![],
        }
    }

    fn assigned(id: &str, day: u32, shift: ShiftType) -> ScheduleAssignment {
        ScheduleAssignment {
            schedule_id: "s1".to_string(),
            employee_id: id.to_string(),
            date: d(day),
            shift_type: shift,
            reason: String::new(),
            confidence_score: 0.9,
            emergency_override: false,
        }
    }

    fn request(employees: Vec<Employee>) -> GenerationRequest {
        GenerationRequest::new("tenant-a", d(2), d(16), employees, vec![], RuleSet::default())
    }

    #[test]
    fn test_direct_candidates_exclude_current_and_booked() {
        let req = request(vec![employee("A", 2), employee("B", 2), employee("C", 2)]);
        let assignments = vec![assigned("A", 5, ShiftType::Day), assigned("C", 5, ShiftType::Evening)];

        let ranked = CandidateRecommender::new().recommend(&req, &assignments, d(5), ShiftType::Day, 10);
        let direct: Vec<&str> = ranked
            .iter()
            .filter(|c| c.kind == CandidateKind::Direct)
            .map(|c| c.employee_id.as_str())
            .collect();
        assert_eq!(direct, vec!["B"]);
        assert!(ranked.iter().all(|c| c.score >= RECOMMENDATION_THRESHOLD));
    }

    #[test]
    fn test_swap_with_same_level_employee() {
        let req = request(vec![employee("A", 2), employee("B", 2), employee("Z", 4)]);
        // B 在 6 日上白班, A 当天休息; 两人可互换
        let assignments = vec![assigned("A", 5, ShiftType::Day), assigned("B", 6, ShiftType::Day), assigned("Z", 6, ShiftType::Day)];

        let ranked = CandidateRecommender::new().recommend(&req, &assignments, d(5), ShiftType::Day, 10);
        let swap = ranked
            .iter()
            .find(|c| matches!(c.kind, CandidateKind::Swap { .. }))
            .expect("swap candidate");
        assert_eq!(swap.employee_id, "B");
        assert_eq!(
            swap.kind,
            CandidateKind::Swap {
                swap_with: "A".to_string(),
                give_back_date: d(6),
                give_back_shift: ShiftType::Day,
            }
        );
        // 不同职级不参与换班
        assert!(!ranked
            .iter()
            .any(|c| c.employee_id == "Z" && matches!(c.kind, CandidateKind::Swap { .. })));
    }

    #[test]
    fn test_limit_applied() {
        let req = request(vec![employee("A", 2), employee("B", 2), employee("C", 2), employee("D", 2)]);
        let ranked = CandidateRecommender::new().recommend(&req, &[], d(5), ShiftType::Night, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].employee_id, "A");
    }
}
