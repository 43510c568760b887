// ==========================================
// 排班引擎 - 排班规则配置模型
// ==========================================
// 职责: 租户排班规则的强类型表示 + 加载时校验 + 行业默认值
// 红线: 越界配置在任何排班运行前拒绝 (ConfigValidation)
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::domain::types::{RiskSeverity, ShiftType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ===== 数值边界 =====
pub const MIN_REST_HOURS_RANGE: (u32, u32) = (8, 24);
pub const MAX_WEEKLY_HOURS_RANGE: (u32, u32) = (20, 60);
pub const MAX_CONSECUTIVE_NIGHTS_RANGE: (u32, u32) = (1, 7);
pub const MAX_CONSECUTIVE_DAYS_RANGE: (u32, u32) = (1, 14);
pub const SEQUENCE_PATTERN_LEN_RANGE: (usize, usize) = (2, 7);

// ==========================================
// IndustryProfile - 行业配置模板
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndustryProfile {
    General,
    NursingShift,
}

impl IndustryProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndustryProfile::General => "general",
            IndustryProfile::NursingShift => "nursing_shift",
        }
    }
}

impl Default for IndustryProfile {
    fn default() -> Self {
        IndustryProfile::General
    }
}

impl fmt::Display for IndustryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IndustryProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(IndustryProfile::General),
            "nursing_shift" | "nursing-shift" | "nursing" => Ok(IndustryProfile::NursingShift),
            other => Err(format!("未知行业模板: {}", other)),
        }
    }
}

// ==========================================
// DangerousPattern - 危险班次模式
// ==========================================
// - Sequence: 精确子序列匹配 (未排班日按 Off 计)
// - ConsecutiveShifts: 同一班次连续 min_count 次及以上
// - ConsecutiveWorkDays: 连续工作 min_count 天及以上
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DangerousPattern {
    Sequence {
        name: String,
        shifts: Vec<ShiftType>,
        #[serde(default = "default_sequence_severity")]
        severity: RiskSeverity,
    },
    ConsecutiveShifts {
        name: String,
        shift_type: ShiftType,
        min_count: u32,
    },
    ConsecutiveWorkDays {
        name: String,
        min_count: u32,
    },
}

fn default_sequence_severity() -> RiskSeverity {
    RiskSeverity::Warning
}

impl DangerousPattern {
    pub fn name(&self) -> &str {
        match self {
            DangerousPattern::Sequence { name, .. }
            | DangerousPattern::ConsecutiveShifts { name, .. }
            | DangerousPattern::ConsecutiveWorkDays { name, .. } => name,
        }
    }

    pub fn sequence(name: &str, shifts: &[ShiftType], severity: RiskSeverity) -> Self {
        DangerousPattern::Sequence {
            name: name.to_string(),
            shifts: shifts.to_vec(),
            severity,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        match self {
            DangerousPattern::Sequence { name, shifts, .. } => {
                let (lo, hi) = SEQUENCE_PATTERN_LEN_RANGE;
                if shifts.len() < lo || shifts.len() > hi {
                    return Err(ConfigError::validation(
                        "dangerous_patterns",
                        format!("模式 {} 长度 {} 超出范围 [{}, {}]", name, shifts.len(), lo, hi),
                    ));
                }
                if shifts.iter().all(|s| !s.is_working()) {
                    return Err(ConfigError::validation(
                        "dangerous_patterns",
                        format!("模式 {} 不含任何工作班次", name),
                    ));
                }
            }
            DangerousPattern::ConsecutiveShifts {
                name,
                shift_type,
                min_count,
            } => {
                if !shift_type.is_working() {
                    return Err(ConfigError::validation(
                        "dangerous_patterns",
                        format!("模式 {} 的班次不能为 off", name),
                    ));
                }
                if *min_count < 2 {
                    return Err(ConfigError::validation(
                        "dangerous_patterns",
                        format!("模式 {} 的 min_count 必须 >= 2", name),
                    ));
                }
            }
            DangerousPattern::ConsecutiveWorkDays { name, min_count } => {
                if *min_count < 2 {
                    return Err(ConfigError::validation(
                        "dangerous_patterns",
                        format!("模式 {} 的 min_count 必须 >= 2", name),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ==========================================
// RuleSet - 租户排班规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    // ===== 硬约束 =====
    pub min_rest_hours: u32,
    pub max_consecutive_nights: u32,
    pub max_consecutive_days: u32,
    pub max_weekly_hours: u32,
    #[serde(default = "default_standard_weekly_hours")]
    pub standard_weekly_hours: u32, // 超出计为加班 (仅统计)

    // ===== 评分权重倍率 [0, 1] =====
    pub fairness_weight: f64,
    pub preference_weight: f64,
    pub seniority_weight: f64,
    pub workload_weight: f64,

    // ===== 公平性目标 =====
    #[serde(default = "default_target_gini")]
    pub target_gini: f64,

    // ===== 模式安全 =====
    #[serde(default)]
    pub dangerous_patterns: Vec<DangerousPattern>,
    pub avoid_dangerous_patterns: bool,

    // ===== 放宽策略 (默认保守) =====
    #[serde(default = "default_true")]
    pub allow_partial_solutions: bool,
    #[serde(default)]
    pub emergency_override_enabled: bool,
}

fn default_standard_weekly_hours() -> u32 {
    40
}

fn default_target_gini() -> f64 {
    0.3
}

fn default_true() -> bool {
    true
}

impl RuleSet {
    /// 行业默认规则
    pub fn for_profile(profile: IndustryProfile) -> Self {
        match profile {
            IndustryProfile::General => Self {
                min_rest_hours: 11,
                max_consecutive_nights: 3,
                max_consecutive_days: 6,
                max_weekly_hours: 48,
                standard_weekly_hours: 40,
                fairness_weight: 1.0,
                preference_weight: 1.0,
                seniority_weight: 1.0,
                workload_weight: 1.0,
                target_gini: 0.3,
                dangerous_patterns: vec![
                    DangerousPattern::sequence(
                        "night_to_day",
                        &[ShiftType::Night, ShiftType::Day],
                        RiskSeverity::Critical,
                    ),
                    DangerousPattern::sequence(
                        "evening_to_day",
                        &[ShiftType::Evening, ShiftType::Day],
                        RiskSeverity::Warning,
                    ),
                    DangerousPattern::ConsecutiveShifts {
                        name: "consecutive_nights".to_string(),
                        shift_type: ShiftType::Night,
                        min_count: 4,
                    },
                    DangerousPattern::ConsecutiveWorkDays {
                        name: "consecutive_work_days".to_string(),
                        min_count: 6,
                    },
                ],
                avoid_dangerous_patterns: true,
                allow_partial_solutions: true,
                emergency_override_enabled: false,
            },
            IndustryProfile::NursingShift => Self {
                min_rest_hours: 16,
                max_consecutive_nights: 3,
                max_consecutive_days: 5,
                max_weekly_hours: 52,
                standard_weekly_hours: 40,
                fairness_weight: 1.0,
                preference_weight: 0.8,
                seniority_weight: 1.0,
                workload_weight: 1.0,
                target_gini: 0.2,
                dangerous_patterns: vec![
                    DangerousPattern::sequence(
                        "day_night_off",
                        &[ShiftType::Day, ShiftType::Night, ShiftType::Off],
                        RiskSeverity::Warning,
                    ),
                    DangerousPattern::sequence(
                        "night_to_day",
                        &[ShiftType::Night, ShiftType::Day],
                        RiskSeverity::Critical,
                    ),
                    DangerousPattern::sequence(
                        "night_to_evening",
                        &[ShiftType::Night, ShiftType::Evening],
                        RiskSeverity::Warning,
                    ),
                    DangerousPattern::sequence(
                        "evening_to_day",
                        &[ShiftType::Evening, ShiftType::Day],
                        RiskSeverity::Warning,
                    ),
                    DangerousPattern::ConsecutiveShifts {
                        name: "consecutive_nights".to_string(),
                        shift_type: ShiftType::Night,
                        min_count: 3,
                    },
                    DangerousPattern::ConsecutiveWorkDays {
                        name: "consecutive_work_days".to_string(),
                        min_count: 5,
                    },
                ],
                avoid_dangerous_patterns: true,
                allow_partial_solutions: true,
                emergency_override_enabled: false,
            },
        }
    }

    /// 校验规则值 (加载时调用)
    pub fn validate(&self) -> ConfigResult<()> {
        check_range("min_rest_hours", self.min_rest_hours, MIN_REST_HOURS_RANGE)?;
        check_range("max_weekly_hours", self.max_weekly_hours, MAX_WEEKLY_HOURS_RANGE)?;
        check_range(
            "max_consecutive_nights",
            self.max_consecutive_nights,
            MAX_CONSECUTIVE_NIGHTS_RANGE,
        )?;
        check_range(
            "max_consecutive_days",
            self.max_consecutive_days,
            MAX_CONSECUTIVE_DAYS_RANGE,
        )?;
        check_range(
            "standard_weekly_hours",
            self.standard_weekly_hours,
            (MAX_WEEKLY_HOURS_RANGE.0, self.max_weekly_hours),
        )?;

        for (field, value) in [
            ("fairness_weight", self.fairness_weight),
            ("preference_weight", self.preference_weight),
            ("seniority_weight", self.seniority_weight),
            ("workload_weight", self.workload_weight),
            ("target_gini", self.target_gini),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::validation(
                    field,
                    format!("取值 {} 超出范围 [0, 1]", value),
                ));
            }
        }

        for pattern in &self.dangerous_patterns {
            pattern.validate()?;
        }

        Ok(())
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::for_profile(IndustryProfile::General)
    }
}

fn check_range(field: &str, value: u32, (lo, hi): (u32, u32)) -> ConfigResult<()> {
    if value < lo || value > hi {
        return Err(ConfigError::validation(
            field,
            format!("取值 {} 超出范围 [{}, {}]", value, lo, hi),
        ));
    }
    Ok(())
}

// ==========================================
// GenerationOptions - 单次生成选项
// ==========================================
// 每个开关决定对应评分因子或硬约束是否在本次运行中生效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default = "default_true")]
    pub respect_preferences: bool,
    #[serde(default = "default_true")]
    pub minimize_consecutive_nights: bool,
    #[serde(default = "default_true")]
    pub balance_workload: bool,
    #[serde(default = "default_true")]
    pub avoid_dangerous_patterns: bool,
    /// 仅在这些团队内选人 (None 表示全部)
    #[serde(default)]
    pub team_scope: Option<Vec<String>>,
    /// 运行预算 (毫秒), 超出返回 GenerationTimeout
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl GenerationOptions {
    /// 以租户规则的安全开关为基础的默认选项
    pub fn from_rules(rules: &RuleSet) -> Self {
        Self {
            avoid_dangerous_patterns: rules.avoid_dangerous_patterns,
            ..Self::default()
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            respect_preferences: true,
            minimize_consecutive_nights: true,
            balance_workload: true,
            avoid_dangerous_patterns: true,
            team_scope: None,
            deadline_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_valid() {
        assert!(RuleSet::for_profile(IndustryProfile::General).validate().is_ok());
        assert!(RuleSet::for_profile(IndustryProfile::NursingShift).validate().is_ok());
    }

    #[test]
    fn test_min_rest_hours_out_of_range() {
        let mut rules = RuleSet::default();
        rules.min_rest_hours = 6;
        match rules.validate() {
            Err(ConfigError::Validation { field, .. }) => assert_eq!(field, "min_rest_hours"),
            other => panic!("expected validation error, got {:?}", other),
        }

        rules.min_rest_hours = 25;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_max_weekly_hours_out_of_range() {
        let mut rules = RuleSet::default();
        rules.max_weekly_hours = 61;
        assert!(matches!(
            rules.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "max_weekly_hours"
        ));
    }

    #[test]
    fn test_standard_hours_must_not_exceed_max() {
        let mut rules = RuleSet::default();
        rules.max_weekly_hours = 36;
        rules.standard_weekly_hours = 40;
        assert!(matches!(
            rules.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "standard_weekly_hours"
        ));
    }

    #[test]
    fn test_weight_bounds() {
        let mut rules = RuleSet::default();
        rules.preference_weight = 1.5;
        assert!(rules.validate().is_err());

        let mut rules = RuleSet::default();
        rules.fairness_weight = f64::NAN;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_pattern_validation() {
        let mut rules = RuleSet::default();
        rules.dangerous_patterns = vec![DangerousPattern::sequence(
            "too_short",
            &[ShiftType::Night],
            RiskSeverity::Warning,
        )];
        assert!(rules.validate().is_err());

        rules.dangerous_patterns = vec![DangerousPattern::ConsecutiveWorkDays {
            name: "one".to_string(),
            min_count: 1,
        }];
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_rule_set_json_defaults() {
        let json = r#"{
            "min_rest_hours": 12,
            "max_consecutive_nights": 2,
            "max_consecutive_days": 5,
            "max_weekly_hours": 40,
            "fairness_weight": 0.5,
            "preference_weight": 0.5,
            "seniority_weight": 0.5,
            "workload_weight": 0.5,
            "avoid_dangerous_patterns": true,
            "dangerous_patterns": [
                {"kind": "sequence", "name": "dno", "shifts": ["day", "night", "off"]},
                {"kind": "consecutive_shifts", "name": "nights", "shift_type": "night", "min_count": 3}
            ]
        }"#;
        let rules: RuleSet = serde_json::from_str(json).unwrap();
        assert_eq!(rules.standard_weekly_hours, 40);
        assert!(rules.allow_partial_solutions);
        assert!(!rules.emergency_override_enabled);
        assert_eq!(rules.dangerous_patterns.len(), 2);
        match &rules.dangerous_patterns[0] {
            DangerousPattern::Sequence { severity, .. } => {
                assert_eq!(*severity, RiskSeverity::Warning)
            }
            other => panic!("unexpected pattern {:?}", other),
        }
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!("nursing".parse::<IndustryProfile>().unwrap(), IndustryProfile::NursingShift);
        assert!("retail".parse::<IndustryProfile>().is_err());
    }
}
