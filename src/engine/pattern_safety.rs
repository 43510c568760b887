// ==========================================
// 排班引擎 - 班次模式安全分析
// ==========================================
// 职责: 对员工的班次序列做事后安全扫描, 生成风险发现
// 输入: (日期, 班次) 序列 + 规则 (危险模式、上限)
// 输出: Vec<PatternRisk> / PatternAnalysis
// ==========================================
// 严重度:
// - 危险序列: 模式自身配置的严重度
// - 连续计数: 超过上限 Critical / 等于上限 Warning / 其余 Info
// - 休息不足、周工时超限: Critical
// 红线: 只读分析, 不修改排班
// ==========================================

use crate::config::{DangerousPattern, RuleSet};
use crate::domain::assignment::ScheduleAssignment;
use crate::domain::risk::{EmployeeRiskProfile, PatternAnalysis, PatternRisk};
use crate::domain::types::{RiskSeverity, RiskType, ShiftType};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

// ==========================================
// PatternSafetyAnalyzer - 模式安全分析器
// ==========================================
pub struct PatternSafetyAnalyzer {
    rules: RuleSet,
}

impl PatternSafetyAnalyzer {
    /// # 参数
    /// - rules: 当前租户规则 (危险模式与上限)
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// 分析单个员工的班次序列
    ///
    /// 扫描范围为序列首日到末日; 范围内未出现的日期按 Off 计
    pub fn analyze(&self, employee_id: &str, sequence: &[(NaiveDate, ShiftType)]) -> Vec<PatternRisk> {
        self.analyze_in_range(employee_id, sequence, None)
    }

    /// 在给定 [start, end) 范围内分析
    ///
    /// # 参数
    /// - range: 扫描范围; None 表示取序列首末日
    pub fn analyze_in_range(
        &self,
        employee_id: &str,
        sequence: &[(NaiveDate, ShiftType)],
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Vec<PatternRisk> {
        let mut by_date: BTreeMap<NaiveDate, ShiftType> = BTreeMap::new();
        for (date, shift) in sequence {
            match by_date.get(date) {
                Some(existing) if existing.is_working() => {}
                _ => {
                    by_date.insert(*date, *shift);
                }
            }
        }

        let (first, last) = match range {
            Some((start, end)) => match end.pred_opt() {
                Some(last) if start <= last => (start, last),
                _ => return Vec::new(),
            },
            None => match (by_date.keys().next(), by_date.keys().next_back()) {
                (Some(f), Some(l)) => (*f, *l),
                _ => return Vec::new(),
            },
        };

        let days: Vec<(NaiveDate, ShiftType)> = first
            .iter_days()
            .take_while(|d| *d <= last)
            .map(|d| (d, by_date.get(&d).copied().unwrap_or(ShiftType::Off)))
            .collect();

        let mut findings = Vec::new();
        for pattern in &self.rules.dangerous_patterns {
            match pattern {
                DangerousPattern::Sequence { name, shifts, severity } => {
                    self.scan_sequence(employee_id, &days, name, shifts, *severity, &mut findings);
                }
                DangerousPattern::ConsecutiveShifts {
                    name,
                    shift_type,
                    min_count,
                } => {
                    let cap = if *shift_type == ShiftType::Night {
                        self.rules.max_consecutive_nights
                    } else {
                        self.rules.max_consecutive_days
                    };
                    let target = *shift_type;
                    self.scan_runs(
                        employee_id,
                        &days,
                        |s| s == target,
                        *min_count,
                        cap,
                        RiskType::ConsecutiveShifts,
                        name,
                        &format!("consecutive {} shifts", target),
                        &mut findings,
                    );
                }
                DangerousPattern::ConsecutiveWorkDays { name, min_count } => {
                    self.scan_runs(
                        employee_id,
                        &days,
                        |s| s.is_working(),
                        *min_count,
                        self.rules.max_consecutive_days,
                        RiskType::ConsecutiveWorkDays,
                        name,
                        "consecutive work days",
                        &mut findings,
                    );
                }
            }
        }

        self.scan_rest(employee_id, &days, &mut findings);
        self.scan_weekly_hours(employee_id, &days, &mut findings);

        findings.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then(a.risk_type.cmp(&b.risk_type))
                .then(a.pattern_name.cmp(&b.pattern_name))
        });

        debug!(
            employee_id = %employee_id,
            days = days.len(),
            findings = findings.len(),
            "模式安全分析完成"
        );
        findings
    }

    /// 汇总全部员工的模式分析
    ///
    /// # 参数
    /// - assignments: 本次排班范围内的全部分配 (含既有分配)
    /// - range: 排班范围 [start, end)
    pub fn analyze_all(
        &self,
        assignments: &[ScheduleAssignment],
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> PatternAnalysis {
        let mut by_employee: BTreeMap<&str, Vec<(NaiveDate, ShiftType)>> = BTreeMap::new();
        for a in assignments {
            by_employee
                .entry(a.employee_id.as_str())
                .or_default()
                .push((a.date, a.shift_type));
        }

        let mut analysis = PatternAnalysis::default();
        for (employee_id, sequence) in by_employee {
            let findings = self.analyze_in_range(employee_id, &sequence, range);
            for f in &findings {
                match f.severity {
                    RiskSeverity::Info => analysis.info_count += 1,
                    RiskSeverity::Warning => analysis.warning_count += 1,
                    RiskSeverity::Critical => analysis.critical_count += 1,
                }
            }
            if !findings.is_empty() {
                analysis.employees_at_risk += 1;
            }
            analysis.profiles.insert(
                employee_id.to_string(),
                EmployeeRiskProfile::from_findings(employee_id, findings),
            );
        }
        analysis
    }

    // ==========================================
    // 扫描实现
    // ==========================================

    fn scan_sequence(
        &self,
        employee_id: &str,
        days: &[(NaiveDate, ShiftType)],
        name: &str,
        shifts: &[ShiftType],
        severity: RiskSeverity,
        findings: &mut Vec<PatternRisk>,
    ) {
        if shifts.is_empty() || days.len() < shifts.len() || !shifts.iter().any(|s| s.is_working()) {
            return;
        }
        for window in days.windows(shifts.len()) {
            let matched = window.iter().zip(shifts).all(|((_, actual), expected)| actual == expected);
            if !matched {
                continue;
            }
            let sequence_text: Vec<&str> = shifts.iter().map(|s| s.as_str()).collect();
            findings.push(PatternRisk {
                employee_id: employee_id.to_string(),
                risk_type: RiskType::DangerousSequence,
                severity,
                description: format!("Dangerous sequence {} ({})", name, sequence_text.join(" -> ")),
                start_date: window[0].0,
                end_date: window[window.len() - 1].0,
                pattern_name: Some(name.to_string()),
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_runs<F>(
        &self,
        employee_id: &str,
        days: &[(NaiveDate, ShiftType)],
        pred: F,
        min_count: u32,
        cap: u32,
        risk_type: RiskType,
        name: &str,
        label: &str,
        findings: &mut Vec<PatternRisk>,
    ) where
        F: Fn(ShiftType) -> bool,
    {
        let mut i = 0;
        while i < days.len() {
            if !pred(days[i].1) {
                i += 1;
                continue;
            }
            let start = i;
            while i < days.len() && pred(days[i].1) {
                i += 1;
            }
            let run = (i - start) as u32;
            // 达到上限的连续段即使短于模式阈值也要报告
            if run < min_count.min(cap).max(1) {
                continue;
            }
            let severity = if run > cap {
                RiskSeverity::Critical
            } else if run == cap {
                RiskSeverity::Warning
            } else {
                RiskSeverity::Info
            };
            findings.push(PatternRisk {
                employee_id: employee_id.to_string(),
                risk_type,
                severity,
                description: format!("{} {} (limit {})", run, label, cap),
                start_date: days[start].0,
                end_date: days[i - 1].0,
                pattern_name: Some(name.to_string()),
            });
        }
    }

    fn scan_rest(&self, employee_id: &str, days: &[(NaiveDate, ShiftType)], findings: &mut Vec<PatternRisk>) {
        let working: Vec<&(NaiveDate, ShiftType)> = days.iter().filter(|(_, s)| s.is_working()).collect();
        for pair in working.windows(2) {
            let (prev_date, prev_shift) = *pair[0];
            let (next_date, next_shift) = *pair[1];
            let (Some((_, prev_end)), Some((next_start, _))) =
                (prev_shift.window_on(prev_date), next_shift.window_on(next_date))
            else {
                continue;
            };
            let rest = (next_start - prev_end).num_minutes() as f64 / 60.0;
            if rest < self.rules.min_rest_hours as f64 {
                findings.push(PatternRisk {
                    employee_id: employee_id.to_string(),
                    risk_type: RiskType::InsufficientRest,
                    severity: RiskSeverity::Critical,
                    description: format!(
                        "Only {:.1}h rest between {} and {} (minimum {}h)",
                        rest.max(0.0),
                        prev_shift,
                        next_shift,
                        self.rules.min_rest_hours
                    ),
                    start_date: prev_date,
                    end_date: next_date,
                    pattern_name: None,
                });
            }
        }
    }

    /// 7 日滚动窗口工时; 相邻超限窗口合并为一条发现
    fn scan_weekly_hours(&self, employee_id: &str, days: &[(NaiveDate, ShiftType)], findings: &mut Vec<PatternRisk>) {
        let max = self.rules.max_weekly_hours as f64;
        let window_len = days.len().min(7);
        if window_len == 0 {
            return;
        }

        let mut current: Option<(NaiveDate, NaiveDate, f64)> = None;
        for window in days.windows(window_len) {
            let hours: f64 = window.iter().map(|(_, s)| s.duration_hours()).sum();
            let start = window[0].0;
            let end = window[window.len() - 1].0;
            if hours > max {
                current = match current {
                    Some((s, _, peak)) => Some((s, end, peak.max(hours))),
                    None => Some((start, end, hours)),
                };
            } else if let Some((s, e, peak)) = current.take() {
                findings.push(self.weekly_finding(employee_id, s, e, peak));
            }
        }
        if let Some((s, e, peak)) = current {
            findings.push(self.weekly_finding(employee_id, s, e, peak));
        }
    }

    fn weekly_finding(&self, employee_id: &str, start: NaiveDate, end: NaiveDate, peak: f64) -> PatternRisk {
        PatternRisk {
            employee_id: employee_id.to_string(),
            risk_type: RiskType::WeeklyHoursExceeded,
            severity: RiskSeverity::Critical,
            description: format!(
                "{:.0}h within a 7-day window (limit {}h)",
                peak, self.rules.max_weekly_hours
            ),
            start_date: start,
            end_date: end,
            pattern_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn seq(shifts: &[(u32, ShiftType)]) -> Vec<(NaiveDate, ShiftType)> {
        shifts.iter().map(|(day, s)| (d(*day), *s)).collect()
    }

    #[test]
    fn test_night_to_day_is_critical_sequence_and_rest() {
        let analyzer = PatternSafetyAnalyzer::new(RuleSet::default());
        let findings = analyzer.analyze("E1", &seq(&[(1, ShiftType::Night), (2, ShiftType::Day)]));

        assert!(findings.iter().any(|f| f.risk_type == RiskType::DangerousSequence
            && f.pattern_name.as_deref() == Some("night_to_day")
            && f.severity == RiskSeverity::Critical));
        assert!(findings
            .iter()
            .any(|f| f.risk_type == RiskType::InsufficientRest && f.severity == RiskSeverity::Critical));
    }

    #[test]
    fn test_consecutive_nights_severity_tiers() {
        let mut rules = RuleSet::default();
        rules.max_consecutive_nights = 3;
        rules.dangerous_patterns = vec![DangerousPattern::ConsecutiveShifts {
            name: "nights".to_string(),
            shift_type: ShiftType::Night,
            min_count: 2,
        }];
        let analyzer = PatternSafetyAnalyzer::new(rules);

        let two = analyzer.analyze("E1", &seq(&[(1, ShiftType::Night), (2, ShiftType::Night)]));
        let three = analyzer.analyze(
            "E1",
            &seq(&[(1, ShiftType::Night), (2, ShiftType::Night), (3, ShiftType::Night)]),
        );
        let four = analyzer.analyze(
            "E1",
            &seq(&[
                (1, ShiftType::Night),
                (2, ShiftType::Night),
                (3, ShiftType::Night),
                (4, ShiftType::Night),
            ]),
        );

        let severity = |f: &[PatternRisk]| {
            f.iter()
                .find(|r| r.risk_type == RiskType::ConsecutiveShifts)
                .map(|r| r.severity)
        };
        assert_eq!(severity(&two), Some(RiskSeverity::Info));
        assert_eq!(severity(&three), Some(RiskSeverity::Warning));
        assert_eq!(severity(&four), Some(RiskSeverity::Critical));
    }

    #[test]
    fn test_run_over_cap_reported_below_pattern_threshold() {
        let mut rules = RuleSet::default();
        rules.max_consecutive_nights = 2;
        let analyzer = PatternSafetyAnalyzer::new(rules);

        let findings = analyzer.analyze(
            "E1",
            &seq(&[(1, ShiftType::Night), (2, ShiftType::Night), (3, ShiftType::Night)]),
        );
        let nights = findings
            .iter()
            .find(|r| r.risk_type == RiskType::ConsecutiveShifts)
            .expect("consecutive nights finding");
        assert_eq!(nights.severity, RiskSeverity::Critical);
        assert_eq!((nights.start_date, nights.end_date), (d(1), d(3)));
    }

    #[test]
    fn test_sequence_with_trailing_off_inside_range() {
        let mut rules = RuleSet::default();
        rules.dangerous_patterns = vec![DangerousPattern::sequence(
            "day_night_off",
            &[ShiftType::Day, ShiftType::Night, ShiftType::Off],
            RiskSeverity::Warning,
        )];
        let analyzer = PatternSafetyAnalyzer::new(rules);
        let sequence = seq(&[(1, ShiftType::Day), (2, ShiftType::Night)]);

        // 序列末日即范围末日, 不推测后续
        assert!(analyzer
            .analyze("E1", &sequence)
            .iter()
            .all(|f| f.risk_type != RiskType::DangerousSequence));

        let in_range = analyzer.analyze_in_range("E1", &sequence, Some((d(1), d(4))));
        assert!(in_range
            .iter()
            .any(|f| f.pattern_name.as_deref() == Some("day_night_off")));
    }

    #[test]
    fn test_analyze_all_counts_and_profiles() {
        let analyzer = PatternSafetyAnalyzer::new(RuleSet::default());
        let mk = |id: &str, day: u32, shift: ShiftType| ScheduleAssignment {
            schedule_id: "s1".to_string(),
            employee_id: id.to_string(),
            date: d(day),
            shift_type: shift,
            reason: String::new(),
            confidence_score: 1.0,
            emergency_override: false,
        };
        let assignments = vec![
            mk("E1", 1, ShiftType::Day),
            mk("E2", 1, ShiftType::Night),
            mk("E2", 2, ShiftType::Day),
        ];

        let analysis = analyzer.analyze_all(&assignments, Some((d(1), d(3))));
        assert_eq!(analysis.profiles.len(), 2);
        assert_eq!(analysis.employees_at_risk, 1);
        assert!(analysis.findings_for("E1").is_empty());
        assert!(analysis.profiles["E2"].risk_score > 0);
        assert!(analysis.critical_count >= 2);
    }
}
