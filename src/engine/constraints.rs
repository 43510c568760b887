// ==========================================
// 排班引擎 - 硬约束检查
// ==========================================
// 职责: 判定某员工能否承担某日某班次
// 输入: 员工 + 槽位 + 运行累加器 (RunState)
// 输出: Ok(()) 或首个违反的约束
// ==========================================
// 红线:
// - 重复排班 / 非在职 / 超出团队范围 / 经验不足 永不放宽
// - 休息时长、连续班次、周工时、危险序列 仅在紧急放宽时放宽
// ==========================================

use crate::config::{DangerousPattern, GenerationOptions, RuleSet};
use crate::domain::employee::Employee;
use crate::domain::types::{ExperienceLevel, ShiftType};
use crate::engine::run_state::RunState;
use chrono::{Duration, NaiveDate};
use std::fmt;

// ==========================================
// ConstraintViolation - 约束违反
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintViolation {
    Inactive,
    OutOfTeamScope,
    AlreadyAssigned {
        existing: ShiftType,
    },
    InsufficientExperience {
        required: ExperienceLevel,
        actual: ExperienceLevel,
    },
    InsufficientRest {
        rest_hours: f64,
        required_hours: u32,
        adjacent_date: NaiveDate,
    },
    ConsecutiveNights {
        run_length: u32,
        max: u32,
    },
    ConsecutiveWorkDays {
        run_length: u32,
        max: u32,
    },
    WeeklyHoursExceeded {
        window_start: NaiveDate,
        hours: f64,
        max: u32,
    },
    DangerousSequence {
        pattern_name: String,
    },
}

impl ConstraintViolation {
    /// 约束代码 (用于缺口诊断与审计)
    pub fn code(&self) -> &'static str {
        match self {
            ConstraintViolation::Inactive => "inactive",
            ConstraintViolation::OutOfTeamScope => "out_of_team_scope",
            ConstraintViolation::AlreadyAssigned { .. } => "already_assigned",
            ConstraintViolation::InsufficientExperience { .. } => "insufficient_experience",
            ConstraintViolation::InsufficientRest { .. } => "insufficient_rest",
            ConstraintViolation::ConsecutiveNights { .. } => "max_consecutive_nights",
            ConstraintViolation::ConsecutiveWorkDays { .. } => "max_consecutive_days",
            ConstraintViolation::WeeklyHoursExceeded { .. } => "max_weekly_hours",
            ConstraintViolation::DangerousSequence { .. } => "dangerous_pattern",
        }
    }

    /// 紧急放宽时是否可忽略
    pub fn is_relaxable(&self) -> bool {
        matches!(
            self,
            ConstraintViolation::InsufficientRest { .. }
                | ConstraintViolation::ConsecutiveNights { .. }
                | ConstraintViolation::ConsecutiveWorkDays { .. }
                | ConstraintViolation::WeeklyHoursExceeded { .. }
                | ConstraintViolation::DangerousSequence { .. }
        )
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintViolation::Inactive => write!(f, "employee is inactive"),
            ConstraintViolation::OutOfTeamScope => write!(f, "employee is outside the team scope"),
            ConstraintViolation::AlreadyAssigned { existing } => {
                write!(f, "already assigned a {} shift that day", existing)
            }
            ConstraintViolation::InsufficientExperience { required, actual } => {
                write!(f, "experience {} below required {}", actual, required)
            }
            ConstraintViolation::InsufficientRest {
                rest_hours,
                required_hours,
                adjacent_date,
            } => write!(
                f,
                "only {:.1}h rest next to the shift on {} (minimum {}h)",
                rest_hours, adjacent_date, required_hours
            ),
            ConstraintViolation::ConsecutiveNights { run_length, max } => {
                write!(f, "{} consecutive nights exceeds limit of {}", run_length, max)
            }
            ConstraintViolation::ConsecutiveWorkDays { run_length, max } => {
                write!(f, "{} consecutive work days exceeds limit of {}", run_length, max)
            }
            ConstraintViolation::WeeklyHoursExceeded {
                window_start,
                hours,
                max,
            } => write!(
                f,
                "{:.0}h in the 7 days from {} exceeds limit of {}h",
                hours, window_start, max
            ),
            ConstraintViolation::DangerousSequence { pattern_name } => {
                write!(f, "completes dangerous pattern '{}'", pattern_name)
            }
        }
    }
}

// ==========================================
// ConstraintPolicy - 本次运行启用的可放宽约束
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintPolicy {
    pub enforce_rest: bool,
    pub enforce_consecutive_nights: bool,
    pub enforce_consecutive_days: bool,
    pub enforce_weekly_hours: bool,
    pub enforce_dangerous_patterns: bool,
}

impl ConstraintPolicy {
    /// 由规则与生成选项决定的正常策略
    ///
    /// 周工时上限始终生效; 夜班上限在 avoid_dangerous_patterns
    /// 或 minimize_consecutive_nights 任一开启时生效
    pub fn from_options(options: &GenerationOptions) -> Self {
        let safety = options.avoid_dangerous_patterns;
        Self {
            enforce_rest: safety,
            enforce_consecutive_nights: safety || options.minimize_consecutive_nights,
            enforce_consecutive_days: safety,
            enforce_weekly_hours: true,
            enforce_dangerous_patterns: safety,
        }
    }

    /// 紧急放宽: 仅保留不可放宽的约束
    pub fn relaxed() -> Self {
        Self {
            enforce_rest: false,
            enforce_consecutive_nights: false,
            enforce_consecutive_days: false,
            enforce_weekly_hours: false,
            enforce_dangerous_patterns: false,
        }
    }
}

// ==========================================
// ConstraintChecker - 硬约束检查器
// ==========================================
pub struct ConstraintChecker<'a> {
    rules: &'a RuleSet,
    policy: ConstraintPolicy,
    team_scope: Option<&'a [String]>,
    horizon_end: Option<NaiveDate>,
}

impl<'a> ConstraintChecker<'a> {
    pub fn new(rules: &'a RuleSet, policy: ConstraintPolicy, team_scope: Option<&'a [String]>) -> Self {
        Self {
            rules,
            policy,
            team_scope,
            horizon_end: None,
        }
    }

    /// 设置排班区间终点 (不含)
    ///
    /// 终点之前尚未排班的日期在序列检查中按 Off 计;
    /// 未设置时只有 date 之前的空白日按 Off 计
    pub fn with_horizon(mut self, end: NaiveDate) -> Self {
        self.horizon_end = Some(end);
        self
    }

    pub fn policy(&self) -> ConstraintPolicy {
        self.policy
    }

    /// 以另一策略复用同一检查器配置
    pub fn with_policy(&self, policy: ConstraintPolicy) -> ConstraintChecker<'a> {
        ConstraintChecker {
            rules: self.rules,
            policy,
            team_scope: self.team_scope,
            horizon_end: self.horizon_end,
        }
    }

    /// 检查员工能否承担 (date, shift)
    ///
    /// # 参数
    /// - employee: 候选员工
    /// - date / shift: 目标槽位
    /// - minimum_experience: 槽位的最低经验等级
    /// - state: 运行累加器 (含历史、既有分配、本次已做分配)
    ///
    /// # 返回
    /// - Ok(()): 满足全部启用约束
    /// - Err(violation): 首个违反的约束 (按检查顺序)
    pub fn check(
        &self,
        employee: &Employee,
        date: NaiveDate,
        shift: ShiftType,
        minimum_experience: Option<ExperienceLevel>,
        state: &RunState,
    ) -> Result<(), ConstraintViolation> {
        // === 不可放宽 ===
        if !employee.is_active {
            return Err(ConstraintViolation::Inactive);
        }
        if !employee.in_team_scope(self.team_scope) {
            return Err(ConstraintViolation::OutOfTeamScope);
        }
        if let Some(existing) = state.shift_on(&employee.id, date).filter(|s| s.is_working()) {
            return Err(ConstraintViolation::AlreadyAssigned { existing });
        }
        if let Some(required) = minimum_experience {
            let actual = employee.experience_level();
            if actual < required {
                return Err(ConstraintViolation::InsufficientExperience { required, actual });
            }
        }

        if !shift.is_working() {
            return Ok(());
        }

        // === 可放宽 ===
        if self.policy.enforce_rest {
            self.check_rest(&employee.id, date, shift, state)?;
        }
        if self.policy.enforce_consecutive_nights && shift == ShiftType::Night {
            let run = state.run_before(&employee.id, date, |s| s == ShiftType::Night)
                + 1
                + state.run_after(&employee.id, date, |s| s == ShiftType::Night);
            if run > self.rules.max_consecutive_nights {
                return Err(ConstraintViolation::ConsecutiveNights {
                    run_length: run,
                    max: self.rules.max_consecutive_nights,
                });
            }
        }
        if self.policy.enforce_consecutive_days {
            let run = state.run_before(&employee.id, date, |s| s.is_working())
                + 1
                + state.run_after(&employee.id, date, |s| s.is_working());
            if run > self.rules.max_consecutive_days {
                return Err(ConstraintViolation::ConsecutiveWorkDays {
                    run_length: run,
                    max: self.rules.max_consecutive_days,
                });
            }
        }
        if self.policy.enforce_weekly_hours {
            self.check_weekly_hours(&employee.id, date, shift, state)?;
        }
        if self.policy.enforce_dangerous_patterns {
            self.check_sequences(&employee.id, date, shift, state)?;
        }

        Ok(())
    }

    /// 与前后最近工作班次之间的休息时长
    fn check_rest(
        &self,
        employee_id: &str,
        date: NaiveDate,
        shift: ShiftType,
        state: &RunState,
    ) -> Result<(), ConstraintViolation> {
        let Some((start, end)) = shift.window_on(date) else {
            return Ok(());
        };
        let required = self.rules.min_rest_hours;

        if let Some((prev_date, prev_shift)) = state.previous_working(employee_id, date) {
            if let Some((_, prev_end)) = prev_shift.window_on(prev_date) {
                let rest = (start - prev_end).num_minutes() as f64 / 60.0;
                if rest < required as f64 {
                    return Err(ConstraintViolation::InsufficientRest {
                        rest_hours: rest.max(0.0),
                        required_hours: required,
                        adjacent_date: prev_date,
                    });
                }
            }
        }

        if let Some((next_date, next_shift)) = state.next_working(employee_id, date) {
            if let Some((next_start, _)) = next_shift.window_on(next_date) {
                let rest = (next_start - end).num_minutes() as f64 / 60.0;
                if rest < required as f64 {
                    return Err(ConstraintViolation::InsufficientRest {
                        rest_hours: rest.max(0.0),
                        required_hours: required,
                        adjacent_date: next_date,
                    });
                }
            }
        }

        Ok(())
    }

    /// 包含 date 的全部 7 日滚动窗口
    fn check_weekly_hours(
        &self,
        employee_id: &str,
        date: NaiveDate,
        shift: ShiftType,
        state: &RunState,
    ) -> Result<(), ConstraintViolation> {
        let max = self.rules.max_weekly_hours;
        let existing_on_date = state
            .shift_on(employee_id, date)
            .map(|s| s.duration_hours())
            .unwrap_or(0.0);

        for offset in 0..7 {
            let window_start = date - Duration::days(6 - offset);
            let window_end = window_start + Duration::days(6);
            let hours = state.hours_between(employee_id, window_start, window_end) - existing_on_date
                + shift.duration_hours();
            if hours > max as f64 {
                return Err(ConstraintViolation::WeeklyHoursExceeded {
                    window_start,
                    hours,
                    max,
                });
            }
        }
        Ok(())
    }

    /// 任一包含 date 的窗口构成危险序列即拒绝
    ///
    /// 空白日: date 之前按 Off 计; date 之后仅在区间终点之前按 Off 计,
    /// 区间之外的空白日无法判定, 该窗口不匹配
    fn check_sequences(
        &self,
        employee_id: &str,
        date: NaiveDate,
        shift: ShiftType,
        state: &RunState,
    ) -> Result<(), ConstraintViolation> {
        for pattern in &self.rules.dangerous_patterns {
            let DangerousPattern::Sequence { name, shifts, .. } = pattern else {
                continue;
            };

            let positions = shifts.iter().enumerate().filter(|(_, s)| **s == shift).map(|(i, _)| i);
            for position in positions {
                let window_start = date - Duration::days(position as i64);
                let matched = shifts.iter().enumerate().all(|(i, expected)| {
                    if i == position {
                        return true;
                    }
                    let day = window_start + Duration::days(i as i64);
                    match state.shift_on(employee_id, day) {
                        Some(actual) => actual == *expected,
                        None => *expected == ShiftType::Off && (day < date || self.before_horizon(day)),
                    }
                });

                if matched {
                    return Err(ConstraintViolation::DangerousSequence {
                        pattern_name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn before_horizon(&self, day: NaiveDate) -> bool {
        self.horizon_end.map_or(false, |end| day < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assignment::ScheduleAssignment;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn employee(id: &str, years: f64) -> Employee {
        Employee {
            id: id.to_string(),
            name: id.to_string(),
            role: "nurse".to_string(),
            hierarchy_level: 2,
            experience_years: years,
            team_id: Some("ward-a".to_string()),
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
            confidence_score: 1.0,
            emergency_override: false,
        }
    }

    fn strict_checker(rules: &RuleSet) -> ConstraintChecker<'_> {
        ConstraintChecker::new(rules, ConstraintPolicy::from_options(&GenerationOptions::default()), None)
    }

    #[test]
    fn test_night_then_day_violates_rest() {
        let rules = RuleSet::default();
        let e = employee("E1", 3.0);
        let state = RunState::from_snapshot(&[e.clone()], &[assigned("E1", 1, ShiftType::Night)]);

        let err = strict_checker(&rules)
            .check(&e, d(2), ShiftType::Day, None, &state)
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_rest");
        assert!(err.is_relaxable());
    }

    #[test]
    fn test_rest_checked_against_next_assignment() {
        let rules = RuleSet::default();
        let e = employee("E1", 3.0);
        // 次日 07:00 白班; 当日夜班 23:00 - 07:00 → 0h 休息
        let state = RunState::from_snapshot(&[e.clone()], &[assigned("E1", 2, ShiftType::Day)]);

        let err = strict_checker(&rules)
            .check(&e, d(1), ShiftType::Night, None, &state)
            .unwrap_err();
        assert!(matches!(err, ConstraintViolation::InsufficientRest { adjacent_date, .. } if adjacent_date == d(2)));

        // 16h 休息 (15:00 → 07:00) 满足默认 11h
        assert!(strict_checker(&rules)
            .check(&e, d(1), ShiftType::Day, None, &RunState::from_snapshot(&[e.clone()], &[assigned("E1", 2, ShiftType::Day)]))
            .is_ok());
    }

    #[test]
    fn test_double_booking_never_relaxed() {
        let rules = RuleSet::default();
        let e = employee("E1", 3.0);
        let state = RunState::from_snapshot(&[e.clone()], &[assigned("E1", 1, ShiftType::Day)]);
        let relaxed = ConstraintChecker::new(&rules, ConstraintPolicy::relaxed(), None);

        let err = relaxed.check(&e, d(1), ShiftType::Evening, None, &state).unwrap_err();
        assert_eq!(err.code(), "already_assigned");
        assert!(!err.is_relaxable());
    }

    #[test]
    fn test_experience_and_scope() {
        let rules = RuleSet::default();
        let e = employee("E1", 0.5);
        let state = RunState::new();
        let err = strict_checker(&rules)
            .check(&e, d(1), ShiftType::Day, Some(ExperienceLevel::Competent), &state)
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_experience");

        let scope = vec!["ward-b".to_string()];
        let scoped = ConstraintChecker::new(&rules, ConstraintPolicy::relaxed(), Some(&scope));
        assert_eq!(
            scoped.check(&e, d(1), ShiftType::Day, None, &state).unwrap_err(),
            ConstraintViolation::OutOfTeamScope
        );
    }

    #[test]
    fn test_consecutive_nights_cap_counts_both_directions() {
        let mut rules = RuleSet::default();
        rules.max_consecutive_nights = 2;
        rules.dangerous_patterns.clear();
        let e = employee("E1", 3.0);
        let state = RunState::from_snapshot(
            &[e.clone()],
            &[assigned("E1", 1, ShiftType::Night), assigned("E1", 3, ShiftType::Night)],
        );

        let err = strict_checker(&rules)
            .check(&e, d(2), ShiftType::Night, None, &state)
            .unwrap_err();
        assert_eq!(err, ConstraintViolation::ConsecutiveNights { run_length: 3, max: 2 });
    }

    #[test]
    fn test_weekly_hours_rolling_window() {
        let mut rules = RuleSet::default();
        rules.max_weekly_hours = 40;
        rules.max_consecutive_days = 7;
        let e = employee("E1", 3.0);
        let existing: Vec<_> = (1..=5).map(|day| assigned("E1", day, ShiftType::Day)).collect();
        let state = RunState::from_snapshot(&[e.clone()], &existing);

        let err = strict_checker(&rules)
            .check(&e, d(6), ShiftType::Day, None, &state)
            .unwrap_err();
        assert_eq!(err.code(), "max_weekly_hours");
    }

    #[test]
    fn test_sequence_treats_unassigned_day_as_off() {
        let mut rules = RuleSet::default();
        rules.dangerous_patterns = vec![DangerousPattern::sequence(
            "night_off_day",
            &[ShiftType::Night, ShiftType::Off, ShiftType::Day],
            crate::domain::types::RiskSeverity::Warning,
        )];
        let e = employee("E1", 3.0);
        let state = RunState::from_snapshot(&[e.clone()], &[assigned("E1", 1, ShiftType::Night)]);

        let err = strict_checker(&rules)
            .check(&e, d(3), ShiftType::Day, None, &state)
            .unwrap_err();
        assert_eq!(
            err,
            ConstraintViolation::DangerousSequence {
                pattern_name: "night_off_day".to_string()
            }
        );
    }

    #[test]
    fn test_sequence_ending_in_off_uses_horizon() {
        let mut rules = RuleSet::default();
        rules.dangerous_patterns = vec![DangerousPattern::sequence(
            "day_night_off",
            &[ShiftType::Day, ShiftType::Night, ShiftType::Off],
            crate::domain::types::RiskSeverity::Warning,
        )];
        let e = employee("E1", 3.0);
        let state = RunState::from_snapshot(&[e.clone()], &[assigned("E1", 1, ShiftType::Day)]);

        // 区间外的次日无法判定
        assert!(strict_checker(&rules)
            .check(&e, d(2), ShiftType::Night, None, &state)
            .is_ok());

        // 区间内的空白日按 Off 计
        let err = strict_checker(&rules)
            .with_horizon(d(4))
            .check(&e, d(2), ShiftType::Night, None, &state)
            .unwrap_err();
        assert_eq!(err.code(), "dangerous_pattern");

        // 次日已排工作班次则序列被打断
        let busy = RunState::from_snapshot(
            &[e.clone()],
            &[assigned("E1", 1, ShiftType::Day), assigned("E1", 3, ShiftType::Night)],
        );
        assert!(strict_checker(&rules)
            .with_horizon(d(4))
            .check(&e, d(2), ShiftType::Night, None, &busy)
            .is_ok());
    }

    #[test]
    fn test_sequence_checked_when_placing_leading_shift() {
        let mut rules = RuleSet::default();
        rules.dangerous_patterns = vec![DangerousPattern::sequence(
            "day_night_off",
            &[ShiftType::Day, ShiftType::Night, ShiftType::Off],
            crate::domain::types::RiskSeverity::Warning,
        )];
        let e = employee("E1", 3.0);
        let state = RunState::from_snapshot(&[e.clone()], &[assigned("E1", 2, ShiftType::Night)]);

        let err = strict_checker(&rules)
            .with_horizon(d(4))
            .check(&e, d(1), ShiftType::Day, None, &state)
            .unwrap_err();
        assert_eq!(
            err,
            ConstraintViolation::DangerousSequence {
                pattern_name: "day_night_off".to_string()
            }
        );

        // 宽松策略下不检查
        assert!(strict_checker(&rules)
            .with_horizon(d(4))
            .with_policy(ConstraintPolicy::relaxed())
            .check(&e, d(1), ShiftType::Day, None, &state)
            .is_ok());
    }

    #[test]
    fn test_policy_from_options() {
        let mut options = GenerationOptions::default();
        options.avoid_dangerous_patterns = false;
        let policy = ConstraintPolicy::from_options(&options);
        assert!(!policy.enforce_rest);
        assert!(policy.enforce_consecutive_nights);
        assert!(policy.enforce_weekly_hours);

        options.minimize_consecutive_nights = false;
        assert!(!ConstraintPolicy::from_options(&options).enforce_consecutive_nights);
    }
}
