// ==========================================
// 排班引擎 - 单次运行的排班累加器
// ==========================================
// 职责: 记录 历史班次 + 既有分配 + 本次运行已做出的分配
// 红线: 只属于单次运行, 不跨运行共享; 资格判断必须基于本累加器
//       (而不是只看已持久化的分配)
// ==========================================

use crate::domain::assignment::ScheduleAssignment;
use crate::domain::employee::Employee;
use crate::domain::types::ShiftType;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// 近期工作量回看天数
pub const RECENT_WORKLOAD_LOOKBACK_DAYS: i64 = 14;

/// 疲劳度回看天数
pub const FATIGUE_LOOKBACK_DAYS: i64 = 7;

/// 疲劳度连续工作天数惩罚 (每天)
const FATIGUE_STREAK_PENALTY: f64 = 5.0;

#[derive(Debug, Clone, Default)]
pub struct RunState {
    calendar: BTreeMap<String, BTreeMap<NaiveDate, ShiftType>>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以员工历史 + 既有分配初始化
    ///
    /// 同一员工同一日期若既有 Off 又有工作班次, 以工作班次为准
    pub fn from_snapshot(employees: &[Employee], existing: &[ScheduleAssignment]) -> Self {
        let mut state = Self::new();
        for employee in employees {
            for h in &employee.recent_history {
                state.merge(&employee.id, h.date, h.shift_type);
            }
        }
        for a in existing {
            state.merge(&a.employee_id, a.date, a.shift_type);
        }
        state
    }

    fn merge(&mut self, employee_id: &str, date: NaiveDate, shift: ShiftType) {
        let days = self.calendar.entry(employee_id.to_string()).or_default();
        match days.get(&date) {
            Some(existing) if existing.is_working() => {}
            _ => {
                days.insert(date, shift);
            }
        }
    }

    /// 记录一次分配 (本次运行)
    pub fn commit(&mut self, employee_id: &str, date: NaiveDate, shift: ShiftType) {
        self.calendar
            .entry(employee_id.to_string())
            .or_default()
            .insert(date, shift);
    }

    /// 移除某员工某日的分配 (换班试算用)
    pub fn release(&mut self, employee_id: &str, date: NaiveDate) -> Option<ShiftType> {
        self.calendar.get_mut(employee_id)?.remove(&date)
    }

    pub fn shift_on(&self, employee_id: &str, date: NaiveDate) -> Option<ShiftType> {
        self.calendar.get(employee_id)?.get(&date).copied()
    }

    /// 某日是否已有非休息分配
    pub fn is_committed(&self, employee_id: &str, date: NaiveDate) -> bool {
        self.shift_on(employee_id, date)
            .map(|s| s.is_working())
            .unwrap_or(false)
    }

    /// 严格早于 date 的最近一个工作班次
    pub fn previous_working(&self, employee_id: &str, date: NaiveDate) -> Option<(NaiveDate, ShiftType)> {
        self.calendar
            .get(employee_id)?
            .range(..date)
            .rev()
            .find(|(_, s)| s.is_working())
            .map(|(d, s)| (*d, *s))
    }

    /// 严格晚于 date 的最近一个工作班次
    pub fn next_working(&self, employee_id: &str, date: NaiveDate) -> Option<(NaiveDate, ShiftType)> {
        let next_day = date.succ_opt()?;
        self.calendar
            .get(employee_id)?
            .range(next_day..)
            .find(|(_, s)| s.is_working())
            .map(|(d, s)| (*d, *s))
    }

    /// date 之前 (不含) 连续满足条件的天数
    pub fn run_before<F>(&self, employee_id: &str, date: NaiveDate, pred: F) -> u32
    where
        F: Fn(ShiftType) -> bool,
    {
        let mut count = 0;
        let mut day = date;
        while let Some(prev) = day.pred_opt() {
            match self.shift_on(employee_id, prev) {
                Some(s) if pred(s) => {
                    count += 1;
                    day = prev;
                }
                _ => break,
            }
        }
        count
    }

    /// date 之后 (不含) 连续满足条件的天数
    pub fn run_after<F>(&self, employee_id: &str, date: NaiveDate, pred: F) -> u32
    where
        F: Fn(ShiftType) -> bool,
    {
        let mut count = 0;
        let mut day = date;
        while let Some(next) = day.succ_opt() {
            match self.shift_on(employee_id, next) {
                Some(s) if pred(s) => {
                    count += 1;
                    day = next;
                }
                _ => break,
            }
        }
        count
    }

    /// [from, to] 闭区间内的工时
    pub fn hours_between(&self, employee_id: &str, from: NaiveDate, to: NaiveDate) -> f64 {
        self.calendar
            .get(employee_id)
            .map(|days| {
                days.range(from..=to)
                    .map(|(_, s)| s.duration_hours())
                    .sum()
            })
            .unwrap_or(0.0)
    }

    /// [from, to] 闭区间内的工作班次数
    pub fn shifts_between(&self, employee_id: &str, from: NaiveDate, to: NaiveDate) -> u32 {
        self.calendar
            .get(employee_id)
            .map(|days| days.range(from..=to).filter(|(_, s)| s.is_working()).count() as u32)
            .unwrap_or(0)
    }

    /// date 之前 14 天的工作班次数
    pub fn recent_shift_count(&self, employee_id: &str, date: NaiveDate) -> u32 {
        let from = date - Duration::days(RECENT_WORKLOAD_LOOKBACK_DAYS);
        match date.pred_opt() {
            Some(to) => self.shifts_between(employee_id, from, to),
            None => 0,
        }
    }

    /// date 之前 14 天的累计工时 (平局裁决用)
    pub fn recent_hours(&self, employee_id: &str, date: NaiveDate) -> f64 {
        let from = date - Duration::days(RECENT_WORKLOAD_LOOKBACK_DAYS);
        match date.pred_opt() {
            Some(to) => self.hours_between(employee_id, from, to),
            None => 0.0,
        }
    }

    /// 疲劳度 [0, 100]
    ///
    /// 过去 7 天加权工时 (夜班 1.5, 小夜 1.1, 白班 1.0) 占每周上限的百分比,
    /// 加上截至 date 的连续工作天数 × 5。无历史记录按 0 负荷计。
    pub fn fatigue_score(&self, employee_id: &str, date: NaiveDate, max_weekly_hours: u32) -> f64 {
        let Some(days) = self.calendar.get(employee_id) else {
            return 0.0;
        };
        let Some(to) = date.pred_opt() else {
            return 0.0;
        };
        let from = date - Duration::days(FATIGUE_LOOKBACK_DAYS);

        let weighted: f64 = days
            .range(from..=to)
            .map(|(_, s)| {
                let factor = match s {
                    ShiftType::Night => 1.5,
                    ShiftType::Evening => 1.1,
                    ShiftType::Day => 1.0,
                    ShiftType::Off => 0.0,
                };
                s.duration_hours() * factor
            })
            .sum();

        let streak = self.run_before(employee_id, date, |s| s.is_working()) as f64;
        let base = if max_weekly_hours == 0 {
            0.0
        } else {
            weighted / max_weekly_hours as f64 * 100.0
        };
        (base + streak * FATIGUE_STREAK_PENALTY).clamp(0.0, 100.0)
    }

    /// 某员工全部工作班次 (按日期)
    pub fn working_days(&self, employee_id: &str) -> Vec<(NaiveDate, ShiftType)> {
        self.calendar
            .get(employee_id)
            .map(|days| {
                days.iter()
                    .filter(|(_, s)| s.is_working())
                    .map(|(d, s)| (*d, *s))
                    .collect()
            })
            .unwrap_or_default()
    }
}
