// ==========================================
// 排班引擎 - 候选人多因子评分
// ==========================================
// 职责: 为通过硬约束的候选人计算加权综合分
// 输入: 员工 + 槽位 + 运行累加器 + 规则/选项
// 输出: ScoreBreakdown (每因子得分与总分)
// ==========================================
// 因子基础权重 (基点, 合计 10000):
// - 职级匹配 2000   × seniority_weight
// - 偏好一致 2500   × preference_weight  (respect_preferences 关闭时为 0)
// - 疲劳均衡 2000   × workload_weight    (balance_workload 关闭时为 0)
// - 经验匹配 1500   × seniority_weight
// - 可用性   1000
// - 近期负荷 1000   × fairness_weight    (balance_workload 关闭时为 0)
// ==========================================

use crate::config::{GenerationOptions, RuleSet};
use crate::domain::employee::Employee;
use crate::domain::types::{ExperienceLevel, ReasonCategory, ShiftType};
use crate::engine::run_state::RunState;
use chrono::NaiveDate;
use serde_json::json;

/// 推荐阈值: 低于此综合分的候选人不出现在推荐列表中
pub const RECOMMENDATION_THRESHOLD: f64 = 0.2;

/// 疲劳度分段
const FATIGUE_LOW: f64 = 40.0;
const FATIGUE_HIGH: f64 = 70.0;

// ==========================================
// ScoringFactor - 评分因子
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScoringFactor {
    HierarchyMatch,
    PreferenceAlignment,
    FatigueBalance,
    ExperienceMatch,
    Availability,
    RecentWorkload,
}

impl ScoringFactor {
    pub const ALL: [ScoringFactor; 6] = [
        ScoringFactor::HierarchyMatch,
        ScoringFactor::PreferenceAlignment,
        ScoringFactor::FatigueBalance,
        ScoringFactor::ExperienceMatch,
        ScoringFactor::Availability,
        ScoringFactor::RecentWorkload,
    ];

    /// 基础权重 (基点)
    pub const fn base_weight_bp(self) -> u32 {
        match self {
            ScoringFactor::HierarchyMatch => 2_000,
            ScoringFactor::PreferenceAlignment => 2_500,
            ScoringFactor::FatigueBalance => 2_000,
            ScoringFactor::ExperienceMatch => 1_500,
            ScoringFactor::Availability => 1_000,
            ScoringFactor::RecentWorkload => 1_000,
        }
    }

    pub fn base_weight(self) -> f64 {
        self.base_weight_bp() as f64 / 10_000.0
    }

    pub fn key(self) -> &'static str {
        match self {
            ScoringFactor::HierarchyMatch => "hierarchy_match",
            ScoringFactor::PreferenceAlignment => "preference_alignment",
            ScoringFactor::FatigueBalance => "fatigue_balance",
            ScoringFactor::ExperienceMatch => "experience_match",
            ScoringFactor::Availability => "availability",
            ScoringFactor::RecentWorkload => "recent_workload",
        }
    }

    /// 该因子在原因记录中的类别
    pub fn category(self) -> ReasonCategory {
        match self {
            ScoringFactor::PreferenceAlignment => ReasonCategory::Preference,
            ScoringFactor::FatigueBalance | ScoringFactor::RecentWorkload => ReasonCategory::Fairness,
            ScoringFactor::HierarchyMatch
            | ScoringFactor::ExperienceMatch
            | ScoringFactor::Availability => ReasonCategory::Optimization,
        }
    }
}

const fn total_base_weight_bp() -> u32 {
    let mut total = 0;
    let mut i = 0;
    while i < ScoringFactor::ALL.len() {
        total += ScoringFactor::ALL[i].base_weight_bp();
        i += 1;
    }
    total
}

const _: () = assert!(
    total_base_weight_bp() == 10_000,
    "scoring factor base weights must sum to 1.0"
);

// ==========================================
// FactorScore / ScoreBreakdown
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct FactorScore {
    pub factor: ScoringFactor,
    pub weight: f64, // 生效权重 = 基础权重 × 规则乘数 (或 0)
    pub ratio: f64,  // [0, 1] 该因子满足程度
    pub score: f64,  // weight × ratio
    pub note: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub factors: Vec<FactorScore>,
    pub total: f64,
}

impl ScoreBreakdown {
    pub fn get(&self, factor: ScoringFactor) -> Option<&FactorScore> {
        self.factors.iter().find(|f| f.factor == factor)
    }

    /// 按得分降序的正分因子 (同分按因子顺序)
    pub fn dominant(&self) -> Vec<&FactorScore> {
        let mut positive: Vec<&FactorScore> = self.factors.iter().filter(|f| f.score > 0.0).collect();
        positive.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.factor.cmp(&b.factor)));
        positive
    }

    /// 量化后的总分, 用于确定性比较
    pub fn quantized(&self) -> i64 {
        (self.total * 1_000_000.0).round() as i64
    }
}

// ==========================================
// ScoringContext - 评分上下文
// ==========================================
pub struct ScoringContext<'a> {
    pub state: &'a RunState,
    pub rules: &'a RuleSet,
    pub options: &'a GenerationOptions,
    /// 职级/经验参考员工 (槽位当前在岗者或已分配的同班同事)
    pub reference: Option<&'a Employee>,
    pub minimum_experience: Option<ExperienceLevel>,
}

// ==========================================
// CandidateScorer - 候选人评分器
// ==========================================
pub struct CandidateScorer {
    // 无状态引擎,不需要注入依赖
}

impl CandidateScorer {
    pub fn new() -> Self {
        Self {}
    }

    /// 计算候选人综合分
    ///
    /// # 参数
    /// - employee: 已通过硬约束的候选人
    /// - date / shift: 目标槽位
    /// - ctx: 评分上下文
    ///
    /// # 返回
    /// 每因子得分及总分; 总分 ∈ [0, Σ生效权重]
    pub fn score(
        &self,
        employee: &Employee,
        date: NaiveDate,
        shift: ShiftType,
        ctx: &ScoringContext<'_>,
    ) -> ScoreBreakdown {
        let factors: Vec<FactorScore> = ScoringFactor::ALL
            .iter()
            .map(|factor| self.score_factor(*factor, employee, date, shift, ctx))
            .collect();
        let total = factors.iter().map(|f| f.score).sum();
        ScoreBreakdown { factors, total }
    }

    fn effective_weight(&self, factor: ScoringFactor, ctx: &ScoringContext<'_>) -> (f64, f64) {
        let multiplier = match factor {
            ScoringFactor::HierarchyMatch | ScoringFactor::ExperienceMatch => ctx.rules.seniority_weight,
            ScoringFactor::PreferenceAlignment if ctx.options.respect_preferences => {
                ctx.rules.preference_weight
            }
            ScoringFactor::FatigueBalance if ctx.options.balance_workload => ctx.rules.workload_weight,
            ScoringFactor::RecentWorkload if ctx.options.balance_workload => ctx.rules.fairness_weight,
            ScoringFactor::Availability => 1.0,
            _ => 0.0,
        };
        (multiplier, factor.base_weight() * multiplier)
    }

    fn score_factor(
        &self,
        factor: ScoringFactor,
        employee: &Employee,
        date: NaiveDate,
        shift: ShiftType,
        ctx: &ScoringContext<'_>,
    ) -> FactorScore {
        let (multiplier, weight) = self.effective_weight(factor, ctx);

        let (ratio, note, extra) = match factor {
            ScoringFactor::HierarchyMatch => Self::hierarchy_ratio(employee, ctx.reference),
            ScoringFactor::PreferenceAlignment => Self::preference_ratio(employee, date, shift),
            ScoringFactor::FatigueBalance => {
                let fatigue = ctx.state.fatigue_score(&employee.id, date, ctx.rules.max_weekly_hours);
                let ratio = if fatigue < FATIGUE_LOW {
                    1.0
                } else if fatigue < FATIGUE_HIGH {
                    0.5
                } else {
                    0.0
                };
                (
                    ratio,
                    format!("Fatigue level {:.0}/100 over the previous week", fatigue),
                    json!({ "fatigue_score": round2(fatigue), "threshold": FATIGUE_LOW }),
                )
            }
            ScoringFactor::ExperienceMatch => {
                Self::experience_ratio(employee, ctx.reference, ctx.minimum_experience)
            }
            ScoringFactor::Availability => (
                1.0,
                "Available with no conflicting assignment".to_string(),
                json!({}),
            ),
            ScoringFactor::RecentWorkload => {
                let recent = ctx.state.recent_shift_count(&employee.id, date);
                (
                    1.0 / (1.0 + recent as f64),
                    format!("{} shifts worked in the previous 14 days", recent),
                    json!({ "recent_shifts": recent }),
                )
            }
        };

        let mut details = json!({
            "factor": factor.key(),
            "ratio": round2(ratio),
            "weight": weight,
            "base_weight": factor.base_weight(),
            "multiplier": multiplier,
        });
        if let (Some(map), Some(extra_map)) = (details.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_map {
                map.insert(k.clone(), v.clone());
            }
        }

        FactorScore {
            factor,
            weight,
            ratio,
            score: weight * ratio,
            note,
            details,
        }
    }

    fn hierarchy_ratio(employee: &Employee, reference: Option<&Employee>) -> (f64, String, serde_json::Value) {
        match reference {
            None => (
                0.5,
                format!("Hierarchy level {} (no reference)", employee.hierarchy_level),
                json!({ "hierarchy_level": employee.hierarchy_level }),
            ),
            Some(r) => {
                let diff = (employee.hierarchy_level as i32 - r.hierarchy_level as i32).abs();
                let ratio = match diff {
                    0 => 1.0,
                    1 => 0.5,
                    _ => 0.0,
                };
                (
                    ratio,
                    format!(
                        "Hierarchy level {} against reference level {}",
                        employee.hierarchy_level, r.hierarchy_level
                    ),
                    json!({ "hierarchy_level": employee.hierarchy_level, "reference_level": r.hierarchy_level }),
                )
            }
        }
    }

    fn preference_ratio(employee: &Employee, date: NaiveDate, shift: ShiftType) -> (f64, String, serde_json::Value) {
        match employee.preferred_shift_on(date) {
            None => (0.5, "No stated shift preference".to_string(), json!({})),
            Some(ShiftType::Off) => (
                0.0,
                "Prefers to be off on this day".to_string(),
                json!({ "preferred": ShiftType::Off.as_str() }),
            ),
            Some(p) if p == shift => (
                1.0,
                format!("Matches preferred {} shift", shift),
                json!({ "preferred": p.as_str() }),
            ),
            Some(p) => (
                0.5,
                format!("Prefers {} shift; available for {}", p, shift),
                json!({ "preferred": p.as_str() }),
            ),
        }
    }

    fn experience_ratio(
        employee: &Employee,
        reference: Option<&Employee>,
        minimum: Option<ExperienceLevel>,
    ) -> (f64, String, serde_json::Value) {
        let target = reference
            .map(|r| r.experience_years)
            .or_else(|| minimum.map(|m| m.min_years()));
        match target {
            None => (
                0.5,
                format!("{:.1} years of experience (no reference)", employee.experience_years),
                json!({ "experience_years": employee.experience_years }),
            ),
            Some(target) => {
                let diff = (employee.experience_years - target).abs();
                let ratio = if diff <= 1.0 {
                    1.0
                } else if diff <= 3.0 {
                    0.6
                } else if diff <= 5.0 {
                    0.3
                } else {
                    0.0
                };
                (
                    ratio,
                    format!(
                        "{:.1} years of experience against {:.1} expected",
                        employee.experience_years, target
                    ),
                    json!({ "experience_years": employee.experience_years, "reference_years": target }),
                )
            }
        }
    }
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn d(day: u32) -> NaiveDate {
        // 2026-03-02 为周一
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn employee(id: &str, level: u8, years: f64, preferences: Vec<ShiftType>) -> Employee {
        Employee {
            id: id.to_string(),
            name: id.to_string(),
            role: "nurse".to_string(),
            hierarchy_level: level,
            experience_years: years,
            team_id: None,
            is_active: true,
            skills: vec![],
            preferences,
            recent_history: vec![],
        }
    }

    #[test]
    fn test_base_weights_sum_to_one() {
        let total: f64 = ScoringFactor::ALL.iter().map(|f| f.base_weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_preference_match_outscores_mismatch() {
        let rules = RuleSet::default();
        let options = GenerationOptions::default();
        let state = RunState::new();
        let ctx = ScoringContext {
            state: &state,
            rules: &rules,
            options: &options,
            reference: None,
            minimum_experience: None,
        };
        let scorer = CandidateScorer::new();

        let likes_night = employee("E1", 2, 3.0, vec![ShiftType::Night]);
        let likes_day = employee("E2", 2, 3.0, vec![ShiftType::Day]);
        let a = scorer.score(&likes_night, d(2), ShiftType::Night, &ctx);
        let b = scorer.score(&likes_day, d(2), ShiftType::Night, &ctx);

        assert!(a.total > b.total);
        assert_eq!(a.get(ScoringFactor::PreferenceAlignment).unwrap().ratio, 1.0);
        assert_eq!(b.get(ScoringFactor::PreferenceAlignment).unwrap().ratio, 0.5);
        assert_eq!(a.dominant()[0].factor, ScoringFactor::PreferenceAlignment);
    }

    #[test]
    fn test_disabled_options_zero_their_factors() {
        let rules = RuleSet::default();
        let options = GenerationOptions {
            respect_preferences: false,
            balance_workload: false,
            ..GenerationOptions::default()
        };
        let state = RunState::new();
        let ctx = ScoringContext {
            state: &state,
            rules: &rules,
            options: &options,
            reference: None,
            minimum_experience: None,
        };
        let breakdown = CandidateScorer::new().score(
            &employee("E1", 1, 1.0, vec![ShiftType::Day]),
            d(2),
            ShiftType::Day,
            &ctx,
        );
        assert_eq!(breakdown.get(ScoringFactor::PreferenceAlignment).unwrap().weight, 0.0);
        assert_eq!(breakdown.get(ScoringFactor::FatigueBalance).unwrap().weight, 0.0);
        assert_eq!(breakdown.get(ScoringFactor::RecentWorkload).unwrap().weight, 0.0);
    }

    #[test]
    fn test_hierarchy_and_experience_against_reference() {
        let rules = RuleSet::default();
        let options = GenerationOptions::default();
        let state = RunState::new();
        let reference = employee("R", 3, 6.0, vec![]);
        let ctx = ScoringContext {
            state: &state,
            rules: &rules,
            options: &options,
            reference: Some(&reference),
            minimum_experience: None,
        };
        let scorer = CandidateScorer::new();

        let peer = scorer.score(&employee("E1", 3, 6.5, vec![]), d(2), ShiftType::Day, &ctx);
        let junior = scorer.score(&employee("E2", 1, 0.5, vec![]), d(2), ShiftType::Day, &ctx);

        assert_eq!(peer.get(ScoringFactor::HierarchyMatch).unwrap().ratio, 1.0);
        assert_eq!(junior.get(ScoringFactor::HierarchyMatch).unwrap().ratio, 0.0);
        assert_eq!(peer.get(ScoringFactor::ExperienceMatch).unwrap().ratio, 1.0);
        assert_eq!(junior.get(ScoringFactor::ExperienceMatch).unwrap().ratio, 0.0);
        assert!(peer.quantized() > junior.quantized());
    }
}
