//! Evaluation of a single vital sample against personal thresholds.
//!
//! Produces a [`HealthReport`]: a 0-100 health score, a per-vital status and
//! the risk alerts to show the user. Evaluation is pure and stateless; two
//! identical samples yield two identical reports.
//!
//! # Scoring
//!
//! The score starts at 100 and each vital subtracts its own penalty:
//!
//! | vital       | outside thresholds | outside comfort band  |
//! |-------------|--------------------|-----------------------|
//! | heart rate  | -25                | -10 (65-90 bpm)       |
//! | temperature | -25                | -10 (36.3-37.2 °C)    |
//! | SpO2        | -30 (below floor)  | -15 (below 95%)       |
//! | fall        | -40                |                       |
//!
//! Readings of 0 mean "no data" and are skipped. The score never goes below 0.

use chrono::{DateTime, Utc};

use crate::model::{
    AlertEvent, AlertVitals, Bounds, HealthReport, ScoreLabel, Severity, UserProfile,
    VitalKind, VitalSample, VitalStatuses, VitalThresholds,
};
use crate::thresholds::{VitalSign, classify};

/// Heart-rate band below the thresholds that still costs a few points.
const BPM_COMFORT: Bounds = Bounds::new(65.0, 90.0);

/// Temperature band below the thresholds that still costs a few points.
const TEMP_COMFORT: Bounds = Bounds::new(36.3, 37.2);

/// SpO2 below this costs points even above the personal floor.
const SPO2_COMFORT_FLOOR: f64 = 95.0;

/// Age from which a fall gets the "call for help" recommendation.
const FALL_ASSISTANCE_AGE: u32 = 60;

/// Evaluate a sample.
///
/// `profile` only shapes the wording of recommendations; the thresholds
/// already carry the personalization.
pub fn evaluate(
    sample: &VitalSample,
    thresholds: &VitalThresholds,
    profile: Option<&UserProfile>,
) -> HealthReport {
    let health_score = health_score(sample, thresholds);

    HealthReport {
        health_score,
        label: ScoreLabel::from_score(health_score),
        statuses: VitalStatuses {
            bpm: classify(f64::from(sample.bpm), thresholds.bpm, VitalSign::HeartRate),
            temp: classify(sample.temperature, thresholds.temp, VitalSign::Temperature),
            spo2: classify(f64::from(sample.spo2), thresholds.spo2, VitalSign::Spo2),
        },
        alerts: risk_alerts(sample, thresholds, profile),
    }
}

fn health_score(sample: &VitalSample, thresholds: &VitalThresholds) -> u8 {
    let mut score: i32 = 100;

    if sample.has_bpm() {
        let bpm = f64::from(sample.bpm);
        if !thresholds.bpm.contains(bpm) {
            score -= 25;
        } else if !BPM_COMFORT.contains(bpm) {
            score -= 10;
        }
    }

    if sample.has_temperature() {
        let temp = sample.temperature;
        if !thresholds.temp.contains(temp) {
            score -= 25;
        } else if !TEMP_COMFORT.contains(temp) {
            score -= 10;
        }
    }

    if sample.has_spo2() {
        let spo2 = f64::from(sample.spo2);
        if spo2 < thresholds.spo2.min {
            score -= 30;
        } else if spo2 < SPO2_COMFORT_FLOOR {
            score -= 15;
        }
    }

    if sample.is_fall() {
        score -= 40;
    }

    score.clamp(0, 100) as u8
}

fn risk_alerts(
    sample: &VitalSample,
    thresholds: &VitalThresholds,
    profile: Option<&UserProfile>,
) -> Vec<AlertEvent> {
    let conditions = profile.map(|p| p.conditions).unwrap_or_default();
    let age = profile.map_or(0, |p| p.age);
    let at = sample.timestamp;
    let mut alerts = Vec::new();

    if sample.has_bpm() {
        let bpm = f64::from(sample.bpm);
        if bpm < thresholds.bpm.min {
            alerts.push(alert(
                Severity::Critical,
                VitalKind::HeartRate,
                "Heart rate too low",
                format!(
                    "Heart rate {} bpm is below the safe threshold ({} bpm)",
                    sample.bpm, thresholds.bpm.min
                ),
                "Rest and keep monitoring. If you feel dizzy, contact your doctor right away.",
                at,
            ));
        } else if bpm > thresholds.bpm.max {
            let recommendation = if conditions.cardiovascular {
                "Stop all activity, rest and take your prescribed medication. Contact your doctor if it does not come down."
            } else {
                "Breathe deeply and rest for 10-15 minutes. Drink some water and relax."
            };
            alerts.push(alert(
                Severity::Critical,
                VitalKind::HeartRate,
                "Heart rate too high",
                format!(
                    "Heart rate {} bpm is above the safe threshold ({} bpm)",
                    sample.bpm, thresholds.bpm.max
                ),
                recommendation,
                at,
            ));
        }
    }

    if sample.has_temperature() {
        if sample.temperature > thresholds.temp.max {
            alerts.push(alert(
                Severity::Warning,
                VitalKind::Temperature,
                "Body temperature high",
                format!(
                    "Temperature {}°C is above normal ({}°C)",
                    sample.temperature, thresholds.temp.max
                ),
                "Drink plenty of water and rest somewhere cool. If the fever lasts more than 2 hours, take a fever reducer.",
                at,
            ));
        } else if sample.temperature < thresholds.temp.min {
            alerts.push(alert(
                Severity::Warning,
                VitalKind::Temperature,
                "Body temperature low",
                format!(
                    "Temperature {}°C is below normal ({}°C)",
                    sample.temperature, thresholds.temp.min
                ),
                "Move somewhere warm and put on more clothing. Drink something warm and move gently.",
                at,
            ));
        }
    }

    if sample.has_spo2() && f64::from(sample.spo2) < thresholds.spo2.min {
        let recommendation = if conditions.respiratory {
            "Use your breathing support device if you have one. Contact your doctor immediately."
        } else {
            "Sit upright and breathe slowly and deeply. If it does not improve within 5 minutes, call emergency services."
        };
        alerts.push(alert(
            Severity::Critical,
            VitalKind::Spo2,
            "Blood oxygen low",
            format!(
                "SpO2 {}% is below the safe threshold ({}%)",
                sample.spo2, thresholds.spo2.min
            ),
            recommendation,
            at,
        ));
    }

    if sample.is_fall() {
        let recommendation = if age >= FALL_ASSISTANCE_AGE {
            "Check for injuries. If you are in pain or cannot get up, call a relative or emergency services now."
        } else {
            "Check yourself for injuries and get up slowly if you are not hurt."
        };
        alerts.push(alert(
            Severity::Critical,
            VitalKind::Fall,
            "Fall detected",
            "The band detected a fall".to_string(),
            recommendation,
            at,
        ));
    }

    alerts
}

fn alert(
    severity: Severity,
    vital_type: VitalKind,
    title: &str,
    description: String,
    recommendation: &str,
    timestamp: DateTime<Utc>,
) -> AlertEvent {
    AlertEvent {
        severity,
        vital_type,
        title: title.to_string(),
        description,
        recommendation: recommendation.to_string(),
        timestamp,
    }
}

/// Out-of-threshold readings, summarized for a combined vital alert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbnormalVitals {
    /// One line per abnormal vital, e.g. `Heart rate too high: 130 BPM (> 100)`.
    pub lines: Vec<String>,

    /// Only the abnormal readings.
    pub vitals: AlertVitals,
}

impl AbnormalVitals {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The lines joined into one message body.
    pub fn message(&self) -> String {
        self.lines.join(". ")
    }
}

/// Collect the readings that fall outside the thresholds.
pub fn abnormal_vitals(sample: &VitalSample, thresholds: &VitalThresholds) -> AbnormalVitals {
    let mut out = AbnormalVitals::default();

    if sample.has_bpm() {
        let bpm = f64::from(sample.bpm);
        if bpm < thresholds.bpm.min {
            out.lines.push(format!(
                "Heart rate too low: {} BPM (< {})",
                sample.bpm, thresholds.bpm.min
            ));
            out.vitals.bpm = Some(sample.bpm);
        } else if bpm > thresholds.bpm.max {
            out.lines.push(format!(
                "Heart rate too high: {} BPM (> {})",
                sample.bpm, thresholds.bpm.max
            ));
            out.vitals.bpm = Some(sample.bpm);
        }
    }

    if sample.has_temperature() {
        if sample.temperature < thresholds.temp.min {
            out.lines.push(format!(
                "Temperature too low: {}°C (< {})",
                sample.temperature, thresholds.temp.min
            ));
            out.vitals.temperature = Some(sample.temperature);
        } else if sample.temperature > thresholds.temp.max {
            out.lines.push(format!(
                "Temperature too high: {}°C (> {})",
                sample.temperature, thresholds.temp.max
            ));
            out.vitals.temperature = Some(sample.temperature);
        }
    }

    if sample.has_spo2() && f64::from(sample.spo2) < thresholds.spo2.min {
        out.lines.push(format!(
            "Blood oxygen low: {}% (< {})",
            sample.spo2, thresholds.spo2.min
        ));
        out.vitals.spo2 = Some(sample.spo2);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FallStatus, Gender, MedicalConditions, VitalStatus};
    use crate::thresholds::DEFAULT_THRESHOLDS;

    fn sample(bpm: u32, temperature: f64, spo2: u32, fall_status: FallStatus) -> VitalSample {
        VitalSample {
            bpm,
            temperature,
            spo2,
            fall_status,
            location: None,
            speed: None,
            distance: None,
            timestamp: Utc::now(),
        }
    }

    fn profile(age: u32, conditions: MedicalConditions) -> UserProfile {
        UserProfile {
            name: "Test".to_string(),
            age,
            gender: Gender::Male,
            email: String::new(),
            emergency_contact: None,
            conditions,
            safe_zone: None,
            last_updated: None,
        }
    }

    #[test]
    fn test_no_reading_sentinels_are_ignored() {
        let report = evaluate(
            &sample(0, 36.5, 0, FallStatus::Normal),
            &DEFAULT_THRESHOLDS,
            None,
        );
        assert_eq!(report.health_score, 100);
        assert!(report.alerts.is_empty());
        assert_eq!(report.statuses.bpm, VitalStatus::Normal);
        assert_eq!(report.statuses.spo2, VitalStatus::Normal);
    }

    #[test]
    fn test_zero_temperature_is_no_reading() {
        let report = evaluate(
            &sample(75, 0.0, 98, FallStatus::Normal),
            &DEFAULT_THRESHOLDS,
            None,
        );
        assert_eq!(report.health_score, 100);
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn test_low_heart_rate() {
        let report = evaluate(
            &sample(45, 36.5, 98, FallStatus::Normal),
            &DEFAULT_THRESHOLDS,
            None,
        );
        assert_eq!(report.health_score, 75);
        assert_eq!(report.label, ScoreLabel::Fair);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].severity, Severity::Critical);
        assert_eq!(report.alerts[0].vital_type, VitalKind::HeartRate);
    }

    #[test]
    fn test_mild_penalties() {
        // bpm 95 within bounds but above the comfort band, temp 37.3 likewise,
        // spo2 96 fine.
        let report = evaluate(
            &sample(95, 37.3, 96, FallStatus::Normal),
            &DEFAULT_THRESHOLDS,
            None,
        );
        assert_eq!(report.health_score, 80);
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn test_spo2_below_comfort_floor_but_above_personal_floor() {
        let conditions = MedicalConditions {
            respiratory: true,
            ..Default::default()
        };
        let p = profile(40, conditions);
        let thresholds = crate::thresholds::compute_thresholds(Some(&p));
        let report = evaluate(&sample(75, 36.5, 92, FallStatus::Normal), &thresholds, Some(&p));
        assert_eq!(report.health_score, 85);
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn test_fall_alert_depends_on_age() {
        let fall = sample(75, 36.5, 98, FallStatus::Fall);

        let young = profile(30, MedicalConditions::default());
        let old = profile(72, MedicalConditions::default());

        let young_report = evaluate(&fall, &DEFAULT_THRESHOLDS, Some(&young));
        let old_report = evaluate(&fall, &DEFAULT_THRESHOLDS, Some(&old));

        assert!(young_report.health_score <= 60);
        assert_eq!(young_report.health_score, 60);
        assert_eq!(young_report.alerts.len(), 1);
        assert_eq!(young_report.alerts[0].vital_type, VitalKind::Fall);
        assert_eq!(young_report.alerts[0].severity, Severity::Critical);
        assert_ne!(
            young_report.alerts[0].recommendation,
            old_report.alerts[0].recommendation
        );
        assert!(old_report.alerts[0].recommendation.contains("emergency"));
    }

    #[test]
    fn test_cardiovascular_recommendation_for_high_heart_rate() {
        let fast = sample(140, 36.5, 98, FallStatus::Normal);
        let cardiac = profile(
            50,
            MedicalConditions {
                cardiovascular: true,
                ..Default::default()
            },
        );
        let healthy = profile(50, MedicalConditions::default());

        let cardiac_report = evaluate(&fast, &crate::thresholds::compute_thresholds(Some(&cardiac)), Some(&cardiac));
        let healthy_report = evaluate(&fast, &DEFAULT_THRESHOLDS, Some(&healthy));

        assert_eq!(cardiac_report.alerts.len(), 1);
        assert!(cardiac_report.alerts[0].recommendation.contains("medication"));
        assert!(!healthy_report.alerts[0].recommendation.contains("medication"));
    }

    #[test]
    fn test_multiple_alerts_and_floor() {
        let report = evaluate(
            &sample(150, 39.5, 85, FallStatus::Fall),
            &DEFAULT_THRESHOLDS,
            None,
        );
        // 100 - 25 - 25 - 30 - 40 = -20, floored
        assert_eq!(report.health_score, 0);
        assert_eq!(report.label, ScoreLabel::NeedsAttention);
        assert_eq!(report.alerts.len(), 4);

        let kinds: Vec<_> = report.alerts.iter().map(|a| a.vital_type).collect();
        assert_eq!(
            kinds,
            vec![
                VitalKind::HeartRate,
                VitalKind::Temperature,
                VitalKind::Spo2,
                VitalKind::Fall
            ]
        );
        assert_eq!(report.alerts[1].severity, Severity::Warning);
        assert_eq!(report.statuses.temp, VitalStatus::Danger);
    }

    #[test]
    fn test_abnormal_vitals_summary() {
        let summary = abnormal_vitals(&sample(130, 36.5, 90, FallStatus::Normal), &DEFAULT_THRESHOLDS);
        assert_eq!(summary.lines.len(), 2);
        assert_eq!(summary.vitals.bpm, Some(130));
        assert_eq!(summary.vitals.spo2, Some(90));
        assert_eq!(summary.vitals.temperature, None);
        assert_eq!(
            summary.message(),
            "Heart rate too high: 130 BPM (> 100). Blood oxygen low: 90% (< 95)"
        );

        let normal = abnormal_vitals(&sample(72, 36.6, 98, FallStatus::Normal), &DEFAULT_THRESHOLDS);
        assert!(normal.is_empty());
    }
}
