// ==========================================
// 排班引擎 - 覆盖需求模型
// ==========================================
// 输入: 每日每班次的人数需求 (可选最低经验等级)
// 红线: 每个需求槽位必须被满足/记录缺口/标记不可行, 不得静默丢弃
// ==========================================

use crate::domain::types::{ExperienceLevel, ShiftType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ==========================================
// CoverageRequirement - 覆盖需求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRequirement {
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub required_count: u32,
    #[serde(default)]
    pub minimum_experience_level: Option<ExperienceLevel>,
}

// ==========================================
// CoverageSlot - 求解槽位
// ==========================================
// 由 CoverageRequirement 展开, 携带输入序号以保证排序稳定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSlot {
    pub slot_index: usize,
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub required_count: u32,
    pub minimum_experience_level: Option<ExperienceLevel>,
}

impl CoverageSlot {
    /// 确定性槽位顺序:
    /// 1) 日期升序
    /// 2) 班次固定顺序 day < evening < night
    /// 3) 经验要求更严格者优先
    /// 4) 输入序号
    pub fn solve_order(a: &CoverageSlot, b: &CoverageSlot) -> Ordering {
        a.date
            .cmp(&b.date)
            .then_with(|| a.shift_type.slot_order().cmp(&b.shift_type.slot_order()))
            .then_with(|| b.minimum_experience_level.cmp(&a.minimum_experience_level))
            .then_with(|| a.slot_index.cmp(&b.slot_index))
    }
}

/// 展开覆盖需求为排好序的槽位列表（跳过 required_count = 0 与 Off 需求）
pub fn build_slots(requirements: &[CoverageRequirement]) -> Vec<CoverageSlot> {
    let mut slots: Vec<CoverageSlot> = requirements
        .iter()
        .enumerate()
        .filter(|(_, r)| r.required_count > 0 && r.shift_type.is_working())
        .map(|(idx, r)| CoverageSlot {
            slot_index: idx,
            date: r.date,
            shift_type: r.shift_type,
            required_count: r.required_count,
            minimum_experience_level: r.minimum_experience_level,
        })
        .collect();
    slots.sort_by(CoverageSlot::solve_order);
    slots
}

// ==========================================
// CoverageGap - 覆盖缺口 (非致命, 记录不抛出)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub required_count: u32,
    pub actual_filled: u32,
    pub gap_count: u32,
    pub considered_employees: Vec<String>,
    pub violated_constraints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(day: u32, shift: ShiftType, count: u32, min: Option<ExperienceLevel>) -> CoverageRequirement {
        CoverageRequirement {
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            shift_type: shift,
            required_count: count,
            minimum_experience_level: min,
        }
    }

    #[test]
    fn test_slots_sorted_by_date_then_shift() {
        let reqs = vec![
            req(3, ShiftType::Day, 1, None),
            req(2, ShiftType::Night, 1, None),
            req(2, ShiftType::Day, 2, None),
            req(2, ShiftType::Evening, 1, None),
        ];
        let slots = build_slots(&reqs);
        let order: Vec<(u32, ShiftType)> = slots
            .iter()
            .map(|s| (chrono::Datelike::day(&s.date), s.shift_type))
            .collect();
        assert_eq!(
            order,
            vec![
                (2, ShiftType::Day),
                (2, ShiftType::Evening),
                (2, ShiftType::Night),
                (3, ShiftType::Day)
            ]
        );
    }

    #[test]
    fn test_stricter_experience_slot_first() {
        let reqs = vec![
            req(2, ShiftType::Day, 2, None),
            req(2, ShiftType::Day, 1, Some(ExperienceLevel::Expert)),
        ];
        let slots = build_slots(&reqs);
        assert_eq!(slots[0].minimum_experience_level, Some(ExperienceLevel::Expert));
        assert_eq!(slots[1].slot_index, 0);
    }

    #[test]
    fn test_zero_and_off_requirements_skipped() {
        let reqs = vec![req(2, ShiftType::Day, 0, None), req(2, ShiftType::Off, 3, None)];
        assert!(build_slots(&reqs).is_empty());
    }
}
