// ==========================================
// 排班生成场景测试
// ==========================================
// 职责: 验证典型覆盖场景下的端到端生成结果
// 场景: 单槽多人 / 休息不足仅一人可排 / 连续夜班上限 / 危险序列 / 空名册
// ==========================================

mod test_helpers;

use shift_engine::config::{GenerationOptions, IndustryProfile, RuleSet};
use shift_engine::domain::types::{RiskSeverity, RiskType, ScheduleStatus, ShiftType};
use shift_engine::engine::{CancellationFlag, EngineError, ScheduleGenerator};
use test_helpers::*;

// ==========================================
// 场景1: 3 名员工, 1 天, 白班需 1 人
// ==========================================

#[tokio::test]
async fn test_three_employees_single_day_shift() {
    let req = request(roster(3), vec![requirement(0, ShiftType::Day, 1)], 1);
    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(result.success);
    assert_eq!(result.status, ScheduleStatus::Draft);
    assert_eq!(result.assignments.len(), 1);
    assert_eq!(result.coverage_rate, 1.0);
    assert!(result.coverage_gaps.is_empty());

    // 同分时按员工 ID 决定
    let chosen = &result.assignments[0];
    assert_eq!(chosen.employee_id, "E01");
    assert_eq!(chosen.shift_type, ShiftType::Day);

    let stats = result.statistics.as_ref().unwrap();
    assert_eq!(stats.employees_in_scope, 3);
    assert_eq!(stats.employees_assigned, 1);

    let internals = result.audit_records[0].internals.as_ref().unwrap();
    assert_eq!(internals.candidate_count, 3);
    assert_eq!(internals.tie_break.as_deref(), Some("employee_id"));

    // 另外两人空闲
    let fairness = result.fairness_metrics.as_ref().unwrap();
    let idle = fairness
        .employees
        .values()
        .filter(|e| e.workload.total_shifts == 0)
        .count();
    assert_eq!(idle, 2);
}

// ==========================================
// 场景2: 夜班需 2 人, 其余员工因休息不足被排除
// ==========================================

#[tokio::test]
async fn test_night_two_with_one_eligible_records_gap() {
    let mut req = request(
        vec![employee("E1"), employee("E2"), employee("E3")],
        vec![requirement(0, ShiftType::Night, 2)],
        2,
    );
    // E2/E3 次日已确认白班: 夜班 07:00 下班后立即上白班
    req.existing_assignments = vec![existing("E2", 1, ShiftType::Day), existing("E3", 1, ShiftType::Day)];

    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(result.success);
    assert_eq!(result.status, ScheduleStatus::Draft);
    assert_eq!(result.assignments.len(), 1);
    assert_eq!(result.assignments[0].employee_id, "E1");
    assert_eq!(result.coverage_rate, 0.5);

    assert_eq!(result.coverage_gaps.len(), 1);
    let gap = &result.coverage_gaps[0];
    assert_eq!(gap.shift_type, ShiftType::Night);
    assert_eq!(gap.required_count, 2);
    assert_eq!(gap.actual_filled, 1);
    assert_eq!(gap.gap_count, 1);
    assert_eq!(gap.considered_employees, vec!["E1", "E2", "E3"]);
    assert!(gap.violated_constraints.contains(&"E2: insufficient_rest".to_string()));
    assert!(gap.violated_constraints.contains(&"E3: insufficient_rest".to_string()));
}

#[tokio::test]
async fn test_gap_becomes_contradiction_when_partial_disallowed() {
    let mut req = request(
        vec![employee("E1"), employee("E2")],
        vec![requirement(0, ShiftType::Night, 2)],
        2,
    );
    req.existing_assignments = vec![existing("E2", 1, ShiftType::Day)];
    req.rules.allow_partial_solutions = false;

    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(!result.success);
    assert_eq!(result.status, ScheduleStatus::Failed);
    assert!(result.assignments.is_empty());
    assert_eq!(result.partial_assignments.len(), 1);
    match result.error {
        Some(EngineError::ConstraintContradiction {
            required_count,
            actual_filled,
            ref violated_constraints,
            ..
        }) => {
            assert_eq!(required_count, 2);
            assert_eq!(actual_filled, 1);
            assert!(violated_constraints.contains(&"E2: insufficient_rest".to_string()));
        }
        ref other => panic!("expected ConstraintContradiction, got {:?}", other),
    }
}

#[tokio::test]
async fn test_emergency_override_fills_with_explicit_reason() {
    let mut req = request(
        vec![employee("E1"), employee("E2")],
        vec![requirement(0, ShiftType::Night, 2)],
        2,
    );
    req.existing_assignments = vec![existing("E2", 1, ShiftType::Day)];
    req.rules.emergency_override_enabled = true;

    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(result.success);
    assert_eq!(result.assignments.len(), 2);
    assert!(result.coverage_gaps.is_empty());

    let overridden = result
        .assignments
        .iter()
        .find(|a| a.employee_id == "E2")
        .expect("E2 filled by emergency override");
    assert!(overridden.emergency_override);

    let record = result
        .audit_records
        .iter()
        .find(|r| r.employee_id == "E2")
        .unwrap();
    assert!(record
        .reasons
        .iter()
        .any(|r| r.explanation.starts_with("Emergency override") && r.explanation.contains("insufficient_rest")));
    assert_eq!(result.statistics.as_ref().unwrap().emergency_overrides, 1);
}

// ==========================================
// 场景3: [night, night, night] 且连续夜班上限 2
// ==========================================

#[tokio::test]
async fn test_third_consecutive_night_excludes_employee() {
    let mut req = request(
        vec![
            employee_with_history("E1", &[(-2, ShiftType::Night), (-1, ShiftType::Night)]),
            employee("E2"),
        ],
        vec![requirement(0, ShiftType::Night, 1)],
        1,
    );
    req.rules.max_consecutive_nights = 2;

    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(result.success);
    assert_eq!(result.assignments.len(), 1);
    assert_eq!(result.assignments[0].employee_id, "E2");
    assert_eq!(result.audit_records[0].internals.as_ref().unwrap().candidate_count, 1);
}

#[tokio::test]
async fn test_single_employee_night_run_stops_at_cap() {
    let mut req = request(
        vec![employee("E1")],
        (0..3).map(|d| requirement(d, ShiftType::Night, 1)).collect(),
        3,
    );
    req.rules.max_consecutive_nights = 2;

    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(result.success);
    let dates: Vec<_> = result.assignments.iter().map(|a| a.date).collect();
    assert_eq!(dates, vec![day(0), day(1)]);
    assert_eq!(result.coverage_gaps.len(), 1);
    assert_eq!(result.coverage_gaps[0].date, day(2));
    assert_eq!(
        result.coverage_gaps[0].violated_constraints,
        vec!["E1: max_consecutive_nights".to_string()]
    );
}

#[tokio::test]
async fn test_unenforced_night_cap_is_flagged_after_the_fact() {
    let mut req = request(
        vec![employee("E1")],
        (0..3).map(|d| requirement(d, ShiftType::Night, 1)).collect(),
        3,
    );
    req.rules.max_consecutive_nights = 2;
    req.options = Some(GenerationOptions {
        avoid_dangerous_patterns: false,
        minimize_consecutive_nights: false,
        ..GenerationOptions::default()
    });

    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(result.success);
    assert_eq!(result.assignments.len(), 3);

    let analysis = result.pattern_analysis.as_ref().unwrap();
    let nights = analysis
        .findings_for("E1")
        .iter()
        .find(|f| f.risk_type == RiskType::ConsecutiveShifts)
        .cloned()
        .expect("consecutive night finding");
    assert_eq!(nights.severity, RiskSeverity::Critical);
    assert_eq!(analysis.employees_at_risk, 1);
    assert!(analysis.critical_count >= 1);
}

// ==========================================
// 场景3b: 护理模板 day_night_off 以 Off 结尾
// ==========================================

#[tokio::test]
async fn test_day_night_off_avoided_when_alternative_exists() {
    let mut e1 = employee("E1");
    e1.preferences = vec![ShiftType::Night];
    let mut e2 = employee("E2");
    e2.preferences = vec![ShiftType::Off];

    let mut req = request(
        vec![e1, e2],
        vec![requirement(0, ShiftType::Day, 1), requirement(1, ShiftType::Night, 1)],
        3,
    );
    req.rules = RuleSet::for_profile(IndustryProfile::NursingShift);

    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(result.success);
    assert_eq!(result.assignments.len(), 2);
    assert!(result.coverage_gaps.is_empty());

    let day_holder = result
        .assignments
        .iter()
        .find(|a| a.date == day(0) && a.shift_type == ShiftType::Day)
        .map(|a| a.employee_id.clone())
        .unwrap();
    let night_holder = result
        .assignments
        .iter()
        .find(|a| a.date == day(1) && a.shift_type == ShiftType::Night)
        .map(|a| a.employee_id.clone())
        .unwrap();
    assert_ne!(day_holder, night_holder, "{} 连续白班-夜班-休息", day_holder);

    let analysis = result.pattern_analysis.as_ref().unwrap();
    assert!(analysis
        .profiles
        .values()
        .flat_map(|p| p.findings.iter())
        .all(|f| f.risk_type != RiskType::DangerousSequence));
}

// ==========================================
// 场景4: 空名册
// ==========================================

#[tokio::test]
async fn test_empty_roster_fails_without_assignments() {
    let req = request(vec![], vec![requirement(0, ShiftType::Day, 1)], 1);
    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;

    assert!(!result.success);
    assert_eq!(result.status, ScheduleStatus::Failed);
    assert!(result.assignments.is_empty());
    assert!(result.partial_assignments.is_empty());
    assert!(result.audit_records.is_empty());
    assert!(matches!(
        result.error,
        Some(EngineError::NoEligibleEmployees { roster_size: 0, .. })
    ));
}

#[tokio::test]
async fn test_roster_outside_team_scope_is_empty() {
    let mut req = request(
        vec![employee_in_team("E1", "ward-b"), employee_in_team("E2", "ward-b")],
        vec![requirement(0, ShiftType::Day, 1)],
        1,
    );
    req.options = Some(GenerationOptions {
        team_scope: Some(vec!["ward-a".to_string()]),
        ..GenerationOptions::default()
    });

    let result = ScheduleGenerator::new().generate(req, CancellationFlag::new()).await;
    assert!(matches!(
        result.error,
        Some(EngineError::NoEligibleEmployees { roster_size: 2, .. })
    ));
}

#[tokio::test]
async fn test_range_validation() {
    let backwards = shift_engine::engine::GenerationRequest::new(
        TENANT,
        day(3),
        day(1),
        roster(2),
        vec![],
        Default::default(),
    );
    let result = ScheduleGenerator::new().generate(backwards, CancellationFlag::new()).await;
    assert!(matches!(result.error, Some(EngineError::InvalidRange { .. })));

    let outside = request(roster(2), vec![requirement(5, ShiftType::Day, 1)], 2);
    let result = ScheduleGenerator::new().generate(outside, CancellationFlag::new()).await;
    assert!(matches!(result.error, Some(EngineError::InvalidRange { .. })));

    let too_long = request(roster(2), vec![], 91);
    let result = ScheduleGenerator::new().generate(too_long, CancellationFlag::new()).await;
    assert!(matches!(result.error, Some(EngineError::InvalidRange { .. })));
}
