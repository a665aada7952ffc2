//! Personal danger thresholds.
//!
//! "Abnormal" is relative to the wearer: an infant's resting heart rate would
//! be alarming in an adult, and an elderly patient with COPD lives with an
//! SpO2 that would worry a clinician in a healthy 30-year-old.
//!
//! # Algorithm
//!
//! 1. An age bracket sets the baseline band for every vital.
//! 2. Condition adjustments are applied on top of it in a fixed order:
//!    cardiovascular, hypertension, respiratory, diabetes, then the
//!    multi-condition tightening.
//!
//! The calculation is pure and total; the same profile always yields the
//! same thresholds.

use crate::model::{Bounds, RiskLevel, UserProfile, VitalStatus, VitalThresholds};

/// Baseline for a healthy adult, also used when no profile is configured.
pub const DEFAULT_THRESHOLDS: VitalThresholds = VitalThresholds {
    bpm: Bounds::new(60.0, 100.0),
    temp: Bounds::new(35.5, 37.5),
    spo2: Bounds::new(95.0, SPO2_CEILING),
};

/// Upper bound for SpO2; only the floor is ever compared against.
const SPO2_CEILING: f64 = 100.0;

/// Heart-rate margin beyond the bounds at which a reading becomes dangerous.
const BPM_DANGER_MARGIN: f64 = 15.0;

/// Temperature margin beyond the bounds at which a reading becomes dangerous.
const TEMP_DANGER_MARGIN: f64 = 0.5;

/// SpO2 distance below the floor at which a reading becomes dangerous.
const SPO2_DANGER_MARGIN: f64 = 3.0;

/// Which vital a value belongs to, for [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VitalSign {
    HeartRate,
    Temperature,
    Spo2,
}

/// Compute the personal thresholds for a profile.
///
/// `None` yields [`DEFAULT_THRESHOLDS`].
pub fn compute_thresholds(profile: Option<&UserProfile>) -> VitalThresholds {
    let Some(profile) = profile else {
        return DEFAULT_THRESHOLDS;
    };

    let mut t = age_baseline(profile.age);
    let conditions = &profile.conditions;

    if conditions.cardiovascular {
        // Unstable rhythm is expected; oxygenation matters more.
        t.bpm.min = (t.bpm.min - 10.0).max(45.0);
        t.bpm.max = (t.bpm.max + 15.0).min(130.0);
        t.spo2.min = (t.spo2.min - 2.0).max(90.0);
    }

    if conditions.hypertension {
        t.bpm.max = t.bpm.max.min(95.0);
        t.temp.max = t.temp.max.min(37.3);
    }

    if conditions.respiratory {
        t.spo2.min = (t.spo2.min - 4.0).max(88.0);
    }

    if conditions.diabetes {
        // Infections escalate faster.
        t.temp.max = t.temp.max.min(37.4);
    }

    let count = conditions.count();
    if count >= 2 {
        t.spo2.min = (t.spo2.min + 1.0).min(95.0);
    }
    if count >= 3 {
        t.bpm.max = (t.bpm.max - 5.0).min(100.0);
        t.temp.max = round_tenth(t.temp.max - 0.2).min(37.3);
    }

    debug_assert!(t.is_ordered(), "thresholds out of order: {t:?}");
    t
}

/// Age brackets: <6, 6-11, 12-17, 18-60, 61-75, >75.
fn age_baseline(age: u32) -> VitalThresholds {
    let (bpm, temp, spo2_min) = match age {
        0..=5 => ((80.0, 140.0), (36.0, 37.8), 94.0),
        6..=11 => ((70.0, 120.0), (35.8, 37.5), 95.0),
        12..=17 => ((60.0, 110.0), (35.5, 37.5), 95.0),
        18..=60 => ((60.0, 100.0), (35.5, 37.5), 95.0),
        61..=75 => ((55.0, 95.0), (35.3, 37.5), 93.0),
        _ => ((50.0, 90.0), (35.0, 37.5), 92.0),
    };

    VitalThresholds {
        bpm: Bounds::new(bpm.0, bpm.1),
        temp: Bounds::new(temp.0, temp.1),
        spo2: Bounds::new(spo2_min, SPO2_CEILING),
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Classify a single reading.
///
/// Values of 0 or below are "no reading" and classify as normal. SpO2 only
/// has a floor; heart rate and temperature are checked on both sides.
pub fn classify(value: f64, bounds: Bounds, sign: VitalSign) -> VitalStatus {
    if value <= 0.0 {
        return VitalStatus::Normal;
    }

    if sign == VitalSign::Spo2 {
        return if value < bounds.min - SPO2_DANGER_MARGIN {
            VitalStatus::Danger
        } else if value < bounds.min {
            VitalStatus::Warning
        } else {
            VitalStatus::Normal
        };
    }

    let margin = match sign {
        VitalSign::HeartRate => BPM_DANGER_MARGIN,
        _ => TEMP_DANGER_MARGIN,
    };

    if value < bounds.min - margin || value > bounds.max + margin {
        VitalStatus::Danger
    } else if !bounds.contains(value) {
        VitalStatus::Warning
    } else {
        VitalStatus::Normal
    }
}

/// Human-readable threshold bands.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ThresholdDescription {
    pub bpm: String,
    pub temp: String,
    pub spo2: String,
}

/// Render thresholds for display, e.g. `60 - 100 bpm`.
pub fn threshold_description(thresholds: &VitalThresholds) -> ThresholdDescription {
    ThresholdDescription {
        bpm: format!("{} - {} bpm", thresholds.bpm.min, thresholds.bpm.max),
        temp: format!(
            "{:.1} - {:.1}°C",
            thresholds.temp.min, thresholds.temp.max
        ),
        spo2: format!("≥ {}%", thresholds.spo2.min),
    }
}

/// Coarse risk label for a profile.
///
/// - `high`: older than 75, or three or more conditions
/// - `medium`: older than 60, or at least one condition
/// - `low`: everyone else, and the "no profile" case
pub fn risk_level(profile: Option<&UserProfile>) -> RiskLevel {
    let Some(profile) = profile else {
        return RiskLevel::Low;
    };

    let count = profile.conditions.count();
    if profile.age > 75 || count >= 3 {
        RiskLevel::High
    } else if profile.age > 60 || count >= 1 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, MedicalConditions};

    fn profile(age: u32, conditions: MedicalConditions) -> UserProfile {
        UserProfile {
            name: "Test".to_string(),
            age,
            gender: Gender::Other,
            email: String::new(),
            emergency_contact: None,
            conditions,
            safe_zone: None,
            last_updated: None,
        }
    }

    #[test]
    fn test_no_profile_uses_default() {
        let t = compute_thresholds(None);
        assert_eq!(t.bpm, Bounds::new(60.0, 100.0));
        assert_eq!(t.temp, Bounds::new(35.5, 37.5));
        assert_eq!(t.spo2, Bounds::new(95.0, 100.0));
    }

    #[test]
    fn test_healthy_adult_matches_default() {
        let p = profile(35, MedicalConditions::default());
        assert_eq!(compute_thresholds(Some(&p)), DEFAULT_THRESHOLDS);
    }

    #[test]
    fn test_age_brackets() {
        let none = MedicalConditions::default();

        let infant = compute_thresholds(Some(&profile(2, none)));
        assert_eq!(infant.bpm, Bounds::new(80.0, 140.0));
        assert_eq!(infant.spo2.min, 94.0);

        let child = compute_thresholds(Some(&profile(6, none)));
        assert_eq!(child.bpm, Bounds::new(70.0, 120.0));
        assert_eq!(child.temp, Bounds::new(35.8, 37.5));

        let teen = compute_thresholds(Some(&profile(17, none)));
        assert_eq!(teen.bpm.max, 110.0);

        let adult = compute_thresholds(Some(&profile(60, none)));
        assert_eq!(adult.bpm, Bounds::new(60.0, 100.0));

        let senior = compute_thresholds(Some(&profile(61, none)));
        assert_eq!(senior.bpm, Bounds::new(55.0, 95.0));
        assert_eq!(senior.spo2.min, 93.0);

        let elderly = compute_thresholds(Some(&profile(76, none)));
        assert_eq!(elderly.bpm, Bounds::new(50.0, 90.0));
        assert_eq!(elderly.temp.min, 35.0);
        assert_eq!(elderly.spo2.min, 92.0);
    }

    #[test]
    fn test_elderly_respiratory_spo2_floor() {
        let conditions = MedicalConditions {
            respiratory: true,
            ..Default::default()
        };
        let t = compute_thresholds(Some(&profile(70, conditions)));
        assert_eq!(t.spo2.min, 89.0);
    }

    #[test]
    fn test_cardiovascular_widens_heart_rate() {
        let conditions = MedicalConditions {
            cardiovascular: true,
            ..Default::default()
        };
        let t = compute_thresholds(Some(&profile(40, conditions)));
        assert_eq!(t.bpm, Bounds::new(50.0, 115.0));
        assert_eq!(t.spo2.min, 93.0);

        // Clamped at 45 for the elderly bracket.
        let old = compute_thresholds(Some(&profile(80, conditions)));
        assert_eq!(old.bpm.min, 45.0);
    }

    #[test]
    fn test_hypertension_caps_heart_rate_and_temperature() {
        let conditions = MedicalConditions {
            hypertension: true,
            ..Default::default()
        };
        let t = compute_thresholds(Some(&profile(30, conditions)));
        assert_eq!(t.bpm.max, 95.0);
        assert_eq!(t.temp.max, 37.3);
    }

    #[test]
    fn test_diabetes_caps_temperature() {
        let conditions = MedicalConditions {
            diabetes: true,
            ..Default::default()
        };
        let t = compute_thresholds(Some(&profile(30, conditions)));
        assert_eq!(t.temp.max, 37.4);
        assert_eq!(t.bpm, DEFAULT_THRESHOLDS.bpm);
    }

    #[test]
    fn test_multi_condition_tightening() {
        let two = MedicalConditions {
            diabetes: true,
            respiratory: true,
            ..Default::default()
        };
        let t = compute_thresholds(Some(&profile(30, two)));
        // 95 - 4 (respiratory) + 1 (two conditions)
        assert_eq!(t.spo2.min, 92.0);

        let three = MedicalConditions {
            cardiovascular: true,
            hypertension: true,
            diabetes: true,
            respiratory: false,
        };
        let t = compute_thresholds(Some(&profile(30, three)));
        // 100 + 15 -> capped 95 by hypertension -> -5
        assert_eq!(t.bpm.max, 90.0);
        // 37.5 -> 37.3 (hypertension) -> -0.2
        assert_eq!(t.temp.max, 37.1);
        assert_eq!(t.spo2.min, 94.0);
    }

    #[test]
    fn test_thresholds_ordered_for_all_ages_and_conditions() {
        for age in 0..=130 {
            for conditions in MedicalConditions::all_combinations() {
                let t = compute_thresholds(Some(&profile(age, conditions)));
                assert!(t.is_ordered(), "age {age} {conditions:?}: {t:?}");
                assert!(
                    (88.0..=100.0).contains(&t.spo2.min),
                    "age {age} {conditions:?}: spo2 {}",
                    t.spo2.min
                );
                assert!((40.0..=150.0).contains(&t.bpm.min));
                assert!((40.0..=150.0).contains(&t.bpm.max));
                assert!((34.0..=40.0).contains(&t.temp.min));
                assert!((34.0..=40.0).contains(&t.temp.max));
                assert_eq!(t.spo2.max, 100.0);
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let conditions = MedicalConditions {
            cardiovascular: true,
            respiratory: true,
            ..Default::default()
        };
        let p = profile(68, conditions);
        assert_eq!(compute_thresholds(Some(&p)), compute_thresholds(Some(&p)));
    }

    #[test]
    fn test_classify_heart_rate() {
        let bounds = DEFAULT_THRESHOLDS.bpm;
        assert_eq!(classify(0.0, bounds, VitalSign::HeartRate), VitalStatus::Normal);
        assert_eq!(classify(72.0, bounds, VitalSign::HeartRate), VitalStatus::Normal);
        assert_eq!(classify(105.0, bounds, VitalSign::HeartRate), VitalStatus::Warning);
        assert_eq!(classify(116.0, bounds, VitalSign::HeartRate), VitalStatus::Danger);
        assert_eq!(classify(44.0, bounds, VitalSign::HeartRate), VitalStatus::Danger);
    }

    #[test]
    fn test_classify_spo2_checks_floor_only() {
        let bounds = DEFAULT_THRESHOLDS.spo2;
        assert_eq!(classify(99.0, bounds, VitalSign::Spo2), VitalStatus::Normal);
        assert_eq!(classify(93.0, bounds, VitalSign::Spo2), VitalStatus::Warning);
        assert_eq!(classify(91.0, bounds, VitalSign::Spo2), VitalStatus::Danger);
    }

    #[test]
    fn test_classify_temperature() {
        let bounds = DEFAULT_THRESHOLDS.temp;
        assert_eq!(classify(36.6, bounds, VitalSign::Temperature), VitalStatus::Normal);
        assert_eq!(classify(37.8, bounds, VitalSign::Temperature), VitalStatus::Warning);
        assert_eq!(classify(38.5, bounds, VitalSign::Temperature), VitalStatus::Danger);
    }

    #[test]
    fn test_threshold_description() {
        let description = threshold_description(&DEFAULT_THRESHOLDS);
        assert_eq!(description.bpm, "60 - 100 bpm");
        assert_eq!(description.temp, "35.5 - 37.5°C");
        assert_eq!(description.spo2, "≥ 95%");
    }

    #[test]
    fn test_risk_level() {
        let none = MedicalConditions::default();
        let one = MedicalConditions {
            diabetes: true,
            ..Default::default()
        };
        let three = MedicalConditions {
            diabetes: true,
            hypertension: true,
            respiratory: true,
            cardiovascular: false,
        };

        assert_eq!(risk_level(None), RiskLevel::Low);
        assert_eq!(risk_level(Some(&profile(30, none))), RiskLevel::Low);
        assert_eq!(risk_level(Some(&profile(30, one))), RiskLevel::Medium);
        assert_eq!(risk_level(Some(&profile(65, none))), RiskLevel::Medium);
        assert_eq!(risk_level(Some(&profile(30, three))), RiskLevel::High);
        assert_eq!(risk_level(Some(&profile(80, none))), RiskLevel::High);
    }
}
