// ==========================================
// 排班引擎 - 分配审计
// ==========================================
// 职责:
// - 由求解决策生成带类别/优先级的原因列表与置信度
// - 组装审计记录 (含公平性与模式上下文)
// - 通过 AuditSink 追加写入与查询
// 红线:
// - 每条分配至少一条原因
// - 对外查询只返回脱敏视图 (AuditRecordView)
// ==========================================

use crate::domain::assignment::AssignmentReason;
use crate::domain::audit::{AuditQuery, AuditRecord, AuditRecordView, ScoringInternals};
use crate::domain::fairness::FairnessMetrics;
use crate::domain::risk::PatternAnalysis;
use crate::domain::types::ReasonCategory;
use crate::engine::constraints::ConstraintPolicy;
use crate::engine::scorer::{ScoreBreakdown, ScoringFactor};
use crate::engine::solver::SlotDecision;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// 置信度中 "领先幅度" 满分所需的分差
const CONFIDENCE_MARGIN_SCALE: f64 = 0.2;

/// 置信度 = 0.6 × 最优分 + 0.4 × min(1, 领先幅度 / 0.2), 保留 3 位小数
///
/// 无次优候选时领先幅度视为满分; 紧急放宽产生的分配置信度减半
pub fn confidence_score(best: f64, runner_up: Option<f64>, emergency: bool) -> f64 {
    let best = best.clamp(0.0, 1.0);
    let margin_ratio = match runner_up {
        Some(r) => ((best - r.clamp(0.0, 1.0)).max(0.0) / CONFIDENCE_MARGIN_SCALE).min(1.0),
        None => 1.0,
    };
    let mut confidence = 0.6 * best + 0.4 * margin_ratio;
    if emergency {
        confidence *= 0.5;
    }
    (confidence.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
}

/// 分配的主导原因摘要 (写入 ScheduleAssignment.reason)
pub fn summarize_reason(breakdown: &ScoreBreakdown, emergency: bool) -> String {
    if emergency {
        return "Emergency override: filled with relaxed safety limits".to_string();
    }
    match breakdown.dominant().first() {
        Some(top) => format!("{}: {}", top.factor.key(), top.note),
        None => "Only eligible candidate".to_string(),
    }
}

/// 由求解决策生成原因列表
///
/// 优先级: 覆盖 → 按得分降序的评分因子 → 综合比较 → 约束 → 模式安全
pub fn build_reasons(decision: &SlotDecision, policy: ConstraintPolicy) -> Vec<AssignmentReason> {
    let mut reasons = Vec::new();
    let assignment = &decision.assignment;

    reasons.push(AssignmentReason::new(
        ReasonCategory::Coverage,
        0,
        decision.position as f64 / decision.required_count.max(1) as f64,
        format!(
            "Fills position {} of {} required for the {} shift on {}",
            decision.position, decision.required_count, assignment.shift_type, assignment.date
        ),
        json!({
            "position": decision.position,
            "required_count": decision.required_count,
        }),
    ));

    for factor in decision.breakdown.dominant() {
        reasons.push(AssignmentReason::new(
            factor.factor.category(),
            0,
            round3(factor.score),
            factor.note.clone(),
            factor.details.clone(),
        ));
    }

    let margin = decision
        .runner_up_score
        .map(|r| round3(decision.breakdown.total - r));
    let comparison = match (decision.candidate_count, margin, decision.tie_break.as_deref()) {
        (1, _, _) => "Only eligible candidate for this position".to_string(),
        (n, _, Some(rule)) => format!("Tied for the highest score among {} eligible candidates; resolved by {}", n, rule),
        (n, Some(m), None) => format!("Highest composite score among {} eligible candidates (lead {:.3})", n, m),
        (n, None, None) => format!("Highest composite score among {} eligible candidates", n),
    };
    reasons.push(AssignmentReason::new(
        ReasonCategory::Optimization,
        0,
        round3(decision.breakdown.total),
        comparison,
        json!({
            "candidate_count": decision.candidate_count,
            "margin": margin,
        }),
    ));

    if assignment.emergency_override {
        reasons.push(AssignmentReason::new(
            ReasonCategory::Constraint,
            0,
            0.0,
            format!(
                "Emergency override: no candidate met all safety limits; relaxed {}",
                decision.relaxed_constraints.join(", ")
            ),
            json!({ "relaxed_constraints": decision.relaxed_constraints }),
        ));
    } else {
        let mut checked = vec!["no_double_booking", "experience_minimum"];
        if policy.enforce_rest {
            checked.push("min_rest_hours");
        }
        if policy.enforce_consecutive_nights {
            checked.push("max_consecutive_nights");
        }
        if policy.enforce_consecutive_days {
            checked.push("max_consecutive_days");
        }
        if policy.enforce_weekly_hours {
            checked.push("max_weekly_hours");
        }
        reasons.push(AssignmentReason::new(
            ReasonCategory::Constraint,
            0,
            1.0,
            "Satisfies all hard scheduling limits",
            json!({ "checked": checked }),
        ));
        if policy.enforce_dangerous_patterns {
            reasons.push(AssignmentReason::new(
                ReasonCategory::PatternSafety,
                0,
                1.0,
                "Does not complete any configured dangerous shift pattern",
                json!({}),
            ));
        }
    }

    for (i, reason) in reasons.iter_mut().enumerate() {
        reason.priority = i as u32 + 1;
    }
    reasons
}

/// 组装单条审计记录
pub fn build_audit_record(
    tenant_id: &str,
    decision: &SlotDecision,
    policy: ConstraintPolicy,
    fairness: Option<&FairnessMetrics>,
    patterns: Option<&PatternAnalysis>,
) -> AuditRecord {
    let assignment = &decision.assignment;

    let fairness_context = match fairness {
        Some(m) => json!({
            "gini_coefficient": m.gini_coefficient,
            "fairness_score": m.fairness_score,
            "meets_target": m.meets_target,
            "employee": m.employees.get(&assignment.employee_id),
        }),
        None => json!({}),
    };
    let pattern_context = match patterns {
        Some(p) => json!({
            "risk_score": p.profiles.get(&assignment.employee_id).map(|r| r.risk_score).unwrap_or(0),
            "findings": p.findings_for(&assignment.employee_id),
        }),
        None => json!({}),
    };

    let internals = ScoringInternals {
        factor_weights: ScoringFactor::ALL
            .iter()
            .filter_map(|f| decision.breakdown.get(*f).map(|s| (f.key().to_string(), s.weight)))
            .collect(),
        factor_scores: ScoringFactor::ALL
            .iter()
            .filter_map(|f| decision.breakdown.get(*f).map(|s| (f.key().to_string(), s.score)))
            .collect(),
        candidate_count: decision.candidate_count,
        runner_up_score: decision.runner_up_score,
        tie_break: decision.tie_break.clone(),
    };

    AuditRecord {
        audit_id: Uuid::new_v4().to_string(),
        schedule_id: assignment.schedule_id.clone(),
        tenant_id: tenant_id.to_string(),
        employee_id: assignment.employee_id.clone(),
        date: assignment.date,
        shift_type: assignment.shift_type,
        reasons: build_reasons(decision, policy),
        fairness_context,
        pattern_context,
        confidence_score: assignment.confidence_score,
        internals: Some(internals),
        recorded_at: Utc::now().naive_utc(),
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

// ==========================================
// AuditSink - 审计存储接口
// ==========================================
// 红线: 只追加, 不更新不删除
pub trait AuditSink: Send + Sync {
    fn append(&self, records: &[AuditRecord]) -> RepositoryResult<usize>;

    fn query(&self, query: &AuditQuery) -> RepositoryResult<Vec<AuditRecord>>;
}

// ==========================================
// AuditTracker - 审计追踪器
// ==========================================
pub struct AuditTracker {
    sink: Arc<dyn AuditSink>,
}

impl AuditTracker {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// 追加审计记录
    ///
    /// # 返回
    /// 写入条数; 任何一条没有原因时整体拒绝
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub fn record(&self, records: &[AuditRecord]) -> RepositoryResult<usize> {
        Self::validate(records)?;
        let written = self.sink.append(records)?;
        info!(written, "审计记录已写入");
        Ok(written)
    }

    /// 每条审计记录至少带一条原因
    pub fn validate(records: &[AuditRecord]) -> RepositoryResult<()> {
        match records.iter().find(|r| r.reasons.is_empty()) {
            Some(empty) => Err(RepositoryError::ValidationError(format!(
                "审计记录缺少原因: employee_id={}, date={}",
                empty.employee_id, empty.date
            ))),
            None => Ok(()),
        }
    }

    /// 查询员工的分配原因 (脱敏视图)
    pub fn query(&self, query: &AuditQuery) -> RepositoryResult<Vec<AuditRecordView>> {
        let records = self.sink.query(query)?;
        Ok(records.iter().map(AuditRecord::sanitized).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationOptions, RuleSet};
    use crate::domain::assignment::ScheduleAssignment;
    use crate::domain::employee::Employee;
    use crate::domain::types::ShiftType;
    use crate::engine::run_state::RunState;
    use crate::engine::scorer::{CandidateScorer, ScoringContext};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<AuditRecord>>,
    }

    impl AuditSink for MemorySink {
        fn append(&self, records: &[AuditRecord]) -> RepositoryResult<usize> {
            let mut guard = self
                .records
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            guard.extend_from_slice(records);
            Ok(records.len())
        }

        fn query(&self, query: &AuditQuery) -> RepositoryResult<Vec<AuditRecord>> {
            let guard = self
                .records
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            Ok(guard.iter().filter(|r| query.matches(r)).cloned().collect())
        }
    }

    fn decision(emergency: bool) -> SlotDecision {
        let rules = RuleSet::default();
        let options = GenerationOptions::default();
        let state = RunState::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let employee = Employee {
            id: "E1".to_string(),
            name: "Ana".to_string(),
            role: "nurse".to_string(),
            hierarchy_level: 2,
            experience_years: 4.0,
            team_id: None,
            is_active: true,
            skills: vec![],
            preferences: vec![ShiftType::Day],
            recent_history: vec![],
        };
        let ctx = ScoringContext {
            state: &state,
            rules: &rules,
            options: &options,
            reference: None,
            minimum_experience: None,
        };
        let breakdown = CandidateScorer::new().score(&employee, date, ShiftType::Day, &ctx);
        SlotDecision {
            assignment: ScheduleAssignment {
                schedule_id: "s1".to_string(),
                employee_id: "E1".to_string(),
                date,
                shift_type: ShiftType::Day,
                reason: summarize_reason(&breakdown, emergency),
                confidence_score: confidence_score(breakdown.total, Some(0.5), emergency),
                emergency_override: emergency,
            },
            breakdown,
            candidate_count: 3,
            runner_up_score: Some(0.5),
            tie_break: None,
            position: 1,
            required_count: 2,
            relaxed_constraints: if emergency {
                vec!["insufficient_rest".to_string()]
            } else {
                vec![]
            },
        }
    }

    #[test]
    fn test_confidence_formula() {
        assert_eq!(confidence_score(1.0, None, false), 1.0);
        assert_eq!(confidence_score(0.5, Some(0.5), false), 0.3);
        assert_eq!(confidence_score(0.8, Some(0.7), false), 0.68);
        assert_eq!(confidence_score(1.0, None, true), 0.5);
    }

    #[test]
    fn test_reasons_are_prioritized_and_categorized() {
        let reasons = build_reasons(&decision(false), ConstraintPolicy::from_options(&GenerationOptions::default()));
        assert!(!reasons.is_empty());
        assert_eq!(reasons[0].category, ReasonCategory::Coverage);
        assert_eq!(reasons[0].priority, 1);
        assert_eq!(reasons[1].category, ReasonCategory::Preference);
        let priorities: Vec<u32> = reasons.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, (1..=reasons.len() as u32).collect::<Vec<_>>());
        assert!(reasons.iter().any(|r| r.category == ReasonCategory::PatternSafety));
    }

    #[test]
    fn test_emergency_reason_recorded() {
        let d = decision(true);
        let reasons = build_reasons(&d, ConstraintPolicy::relaxed());
        assert!(reasons
            .iter()
            .any(|r| r.category == ReasonCategory::Constraint && r.explanation.contains("insufficient_rest")));
        assert!(d.assignment.reason.starts_with("Emergency override"));
    }

    #[test]
    fn test_tracker_round_trip_is_sanitized() {
        let sink = Arc::new(MemorySink::default());
        let tracker = AuditTracker::new(sink);
        let record = build_audit_record(
            "tenant-a",
            &decision(false),
            ConstraintPolicy::from_options(&GenerationOptions::default()),
            None,
            None,
        );
        assert_eq!(tracker.record(&[record]).unwrap(), 1);

        let views = tracker.query(&AuditQuery::for_employee("E1")).unwrap();
        assert_eq!(views.len(), 1);
        let text = serde_json::to_string(&views[0]).unwrap();
        assert!(!text.contains("\"weight\""));
        assert!(!text.contains("\"multiplier\""));
        assert!(!text.contains("factor_weights"));
        assert!(tracker.query(&AuditQuery::for_employee("E2")).unwrap().is_empty());
    }

    #[test]
    fn test_tracker_rejects_record_without_reasons() {
        let tracker = AuditTracker::new(Arc::new(MemorySink::default()));
        let mut record = build_audit_record(
            "tenant-a",
            &decision(false),
            ConstraintPolicy::relaxed(),
            None,
            None,
        );
        record.reasons.clear();
        assert!(matches!(tracker.record(&[record]), Err(RepositoryError::ValidationError(_))));
    }
}
