// ==========================================
// 排班引擎 - 公平性评估
// ==========================================
// 职责: 统计员工/团队工作量, 计算基尼系数与公平分
// 输入: 分配列表 + 员工名册 (在职且在范围内)
// 输出: FairnessMetrics
// ==========================================
// 公式:
// - Gini (升序 x_i, i 从 1 开始) = 2·Σ(i·x_i) / (n·Σx) − (n+1)/n, 截断到 [0, 1]
// - 公平分 = round((1 − gini) × 100)
// - 无员工或总工时为 0: 中性结果 (gini 0, 公平分 100)
// ==========================================

use crate::domain::assignment::ScheduleAssignment;
use crate::domain::employee::Employee;
use crate::domain::fairness::{EmployeeFairness, EmployeeWorkload, FairnessMetrics, TeamFairness};
use crate::domain::types::ShiftType;
use chrono::{Datelike, Weekday};
use std::collections::BTreeMap;

/// 未归属团队的员工汇总键
pub const UNASSIGNED_TEAM: &str = "unassigned";

// ==========================================
// FairnessEngine - 公平性评估引擎
// ==========================================
pub struct FairnessEngine {
    target_gini: f64,
    standard_weekly_hours: u32,
}

impl FairnessEngine {
    /// # 参数
    /// - target_gini: 租户目标基尼系数
    /// - standard_weekly_hours: 每 ISO 周超出此工时计为加班
    pub fn new(target_gini: f64, standard_weekly_hours: u32) -> Self {
        Self {
            target_gini,
            standard_weekly_hours,
        }
    }

    /// 评估工作量分布
    ///
    /// 名册中的员工即使没有任何分配也参与计算 (工时 0);
    /// 分配中出现但不在名册中的员工同样计入, 团队记为 unassigned
    pub fn evaluate(&self, assignments: &[ScheduleAssignment], employees: &[Employee]) -> FairnessMetrics {
        let mut workloads: BTreeMap<String, EmployeeWorkload> = BTreeMap::new();
        for e in employees {
            workloads.insert(e.id.clone(), Self::empty_workload(&e.id, e.team_id.clone()));
        }

        // 员工 → ISO 周 → 工时
        let mut weekly: BTreeMap<String, BTreeMap<(i32, u32), f64>> = BTreeMap::new();

        for a in assignments.iter().filter(|a| a.shift_type.is_working()) {
            let w = workloads
                .entry(a.employee_id.clone())
                .or_insert_with(|| Self::empty_workload(&a.employee_id, None));
            w.total_shifts += 1;
            w.total_hours += a.shift_type.duration_hours();
            match a.shift_type {
                ShiftType::Day => w.day_shifts += 1,
                ShiftType::Evening => w.evening_shifts += 1,
                ShiftType::Night => w.night_shifts += 1,
                ShiftType::Off => {}
            }
            if matches!(a.date.weekday(), Weekday::Sat | Weekday::Sun) {
                w.weekend_shifts += 1;
            }

            let week = a.date.iso_week();
            *weekly
                .entry(a.employee_id.clone())
                .or_default()
                .entry((week.year(), week.week()))
                .or_insert(0.0) += a.shift_type.duration_hours();
        }

        for (employee_id, weeks) in &weekly {
            if let Some(w) = workloads.get_mut(employee_id) {
                w.overtime_hours = weeks
                    .values()
                    .map(|h| (h - self.standard_weekly_hours as f64).max(0.0))
                    .sum();
            }
        }

        let total_hours: f64 = workloads.values().map(|w| w.total_hours).sum();
        if workloads.is_empty() || total_hours <= 0.0 {
            let mut neutral = FairnessMetrics::neutral(self.target_gini);
            neutral.employees = workloads
                .into_iter()
                .map(|(id, workload)| {
                    (
                        id,
                        EmployeeFairness {
                            workload,
                            equity_delta_hours: 0.0,
                            fairness_score: 100,
                        },
                    )
                })
                .collect();
            neutral.teams = Self::team_rollups(&neutral.employees, 0.0);
            return neutral;
        }

        let hours: Vec<f64> = workloads.values().map(|w| w.total_hours).collect();
        let nights: Vec<f64> = workloads.values().map(|w| w.night_shifts as f64).collect();
        let weekends: Vec<f64> = workloads.values().map(|w| w.weekend_shifts as f64).collect();

        let gini = round4(gini(&hours));
        let average_hours = total_hours / workloads.len() as f64;

        let employees: BTreeMap<String, EmployeeFairness> = workloads
            .into_iter()
            .map(|(id, workload)| {
                let delta = workload.total_hours - average_hours;
                let score = if average_hours > 0.0 {
                    (100.0 - (delta.abs() / average_hours * 100.0).min(100.0)).round() as u32
                } else {
                    100
                };
                (
                    id,
                    EmployeeFairness {
                        workload,
                        equity_delta_hours: round2(delta),
                        fairness_score: score,
                    },
                )
            })
            .collect();

        let teams = Self::team_rollups(&employees, average_hours);

        FairnessMetrics {
            gini_coefficient: gini,
            night_gini_coefficient: round4(self::gini(&nights)),
            weekend_gini_coefficient: round4(self::gini(&weekends)),
            fairness_score: score_from_gini(gini),
            target_gini: self.target_gini,
            meets_target: gini <= self.target_gini,
            average_hours: round2(average_hours),
            employees,
            teams,
        }
    }

    fn empty_workload(employee_id: &str, team_id: Option<String>) -> EmployeeWorkload {
        EmployeeWorkload {
            employee_id: employee_id.to_string(),
            team_id,
            total_shifts: 0,
            day_shifts: 0,
            evening_shifts: 0,
            night_shifts: 0,
            weekend_shifts: 0,
            total_hours: 0.0,
            overtime_hours: 0.0,
        }
    }

    fn team_rollups(
        employees: &BTreeMap<String, EmployeeFairness>,
        overall_average_hours: f64,
    ) -> BTreeMap<String, TeamFairness> {
        let mut members: BTreeMap<String, Vec<&EmployeeWorkload>> = BTreeMap::new();
        for f in employees.values() {
            let team = f
                .workload
                .team_id
                .clone()
                .unwrap_or_else(|| UNASSIGNED_TEAM.to_string());
            members.entry(team).or_default().push(&f.workload);
        }

        members
            .into_iter()
            .map(|(team_id, list)| {
                let n = list.len() as f64;
                let hours: Vec<f64> = list.iter().map(|w| w.total_hours).collect();
                let average_hours = hours.iter().sum::<f64>() / n;
                let team = TeamFairness {
                    team_id: team_id.clone(),
                    member_count: list.len() as u32,
                    average_hours: round2(average_hours),
                    average_night_shifts: round2(list.iter().map(|w| w.night_shifts as f64).sum::<f64>() / n),
                    average_weekend_shifts: round2(
                        list.iter().map(|w| w.weekend_shifts as f64).sum::<f64>() / n,
                    ),
                    gini_coefficient: round4(gini(&hours)),
                    delta_from_overall_hours: round2(average_hours - overall_average_hours),
                };
                (team_id, team)
            })
            .collect()
    }
}

/// 基尼系数 [0, 1]; 空集或总和为 0 时返回 0
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    let sum: f64 = values.iter().sum();
    if n == 0 || sum <= 0.0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| (i + 1) as f64 * x)
        .sum();
    let n = n as f64;
    let g = 2.0 * weighted / (n * sum) - (n + 1.0) / n;
    g.clamp(0.0, 1.0)
}

/// 公平分 = round((1 − gini) × 100)
pub fn score_from_gini(gini: f64) -> u32 {
    ((1.0 - gini.clamp(0.0, 1.0)) * 100.0).round() as u32
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
