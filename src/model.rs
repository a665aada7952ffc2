//! Data models for S-Life.
//!
//! # Overview
//!
//! The types here describe three things:
//!
//! - Who is being monitored: [`UserProfile`], its [`MedicalConditions`] and
//!   optional [`SafeZoneConfig`]
//! - What the band reported: [`VitalSample`]
//! - What the engine concluded: [`VitalThresholds`], [`HealthReport`],
//!   [`AlertEvent`] and the [`AlertRequest`] handed to the dispatcher
//!
//! Request/query types for the HTTP API live at the bottom of the module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Oldest age accepted on a profile.
pub const MAX_AGE: u32 = 130;

/// Smallest safe-zone radius accepted on a profile, in meters.
pub const MIN_ZONE_RADIUS_METERS: f64 = 10.0;

/// Largest safe-zone radius accepted on a profile, in meters.
pub const MAX_ZONE_RADIUS_METERS: f64 = 10_000.0;

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Known chronic conditions that shift the personal thresholds.
///
/// This is a closed record on purpose: the threshold calculation applies the
/// four adjustments in a fixed order, and tests can enumerate all sixteen
/// combinations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalConditions {
    #[serde(default)]
    pub cardiovascular: bool,
    #[serde(default)]
    pub diabetes: bool,
    #[serde(default)]
    pub hypertension: bool,
    #[serde(default)]
    pub respiratory: bool,
}

impl MedicalConditions {
    /// Number of conditions that are set.
    pub fn count(&self) -> usize {
        [
            self.cardiovascular,
            self.diabetes,
            self.hypertension,
            self.respiratory,
        ]
        .into_iter()
        .filter(|flag| *flag)
        .count()
    }

    /// All sixteen combinations, in bit order.
    pub fn all_combinations() -> impl Iterator<Item = MedicalConditions> {
        (0u8..16).map(|bits| MedicalConditions {
            cardiovascular: bits & 1 != 0,
            diabetes: bits & 2 != 0,
            hypertension: bits & 4 != 0,
            respiratory: bits & 8 != 0,
        })
    }
}

/// A circular geofence the wearer is expected to stay inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeZoneConfig {
    /// Center latitude in degrees.
    pub center_lat: f64,

    /// Center longitude in degrees.
    pub center_lng: f64,

    /// Radius in meters (10-10000).
    pub radius_meters: f64,
}

impl SafeZoneConfig {
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: self.center_lat,
            lng: self.center_lng,
        }
    }
}

/// The monitored person.
///
/// Read by the threshold calculator (age, conditions) and by the
/// notification channels (email, emergency phone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,

    pub age: u32,

    pub gender: Gender,

    /// Contact email used by the email channel. Empty means "not configured".
    #[serde(default)]
    pub email: String,

    /// Phone number used by the SMS channel.
    #[serde(default)]
    pub emergency_contact: Option<String>,

    #[serde(default)]
    pub conditions: MedicalConditions,

    #[serde(default)]
    pub safe_zone: Option<SafeZoneConfig>,

    /// Set by the profile store on every save.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Reasons a profile is rejected before it reaches the store.
#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("age {0} is outside 0..=130")]
    InvalidAge(u32),

    #[error("safe zone radius {0} m is outside 10..=10000 m")]
    InvalidRadius(f64),

    #[error("safe zone center ({lat}, {lng}) is not a valid coordinate")]
    InvalidCenter { lat: f64, lng: f64 },
}

impl UserProfile {
    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.age > MAX_AGE {
            return Err(ProfileError::InvalidAge(self.age));
        }

        if let Some(zone) = &self.safe_zone {
            if !(MIN_ZONE_RADIUS_METERS..=MAX_ZONE_RADIUS_METERS).contains(&zone.radius_meters) {
                return Err(ProfileError::InvalidRadius(zone.radius_meters));
            }
            if !zone.center().is_valid() {
                return Err(ProfileError::InvalidCenter {
                    lat: zone.center_lat,
                    lng: zone.center_lng,
                });
            }
        }

        Ok(())
    }

    /// The email address, if one is configured.
    pub fn contact_email(&self) -> Option<&str> {
        let email = self.email.trim();
        (!email.is_empty()).then_some(email)
    }

    /// The emergency phone number, if one is configured.
    pub fn contact_phone(&self) -> Option<&str> {
        self.emergency_contact
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
    }
}

// ============================================================================
// Samples
// ============================================================================

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Google Maps link used in SMS bodies.
    pub fn maps_url(&self) -> String {
        format!("https://maps.google.com/?q={},{}", self.lat, self.lng)
    }
}

/// Motion state reported by the band's accelerometer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallStatus {
    #[default]
    Normal,
    Moving,
    Standing,
    Fall,
}

impl FallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallStatus::Normal => "normal",
            FallStatus::Moving => "moving",
            FallStatus::Standing => "standing",
            FallStatus::Fall => "fall",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "moving" => FallStatus::Moving,
            "standing" => FallStatus::Standing,
            "fall" => FallStatus::Fall,
            _ => FallStatus::Normal,
        }
    }
}

/// One reading from the band.
///
/// A `bpm` or `spo2` of 0 means the sensor had no reading; such values are
/// excluded from scoring and alerting. The same holds for a `temperature`
/// of 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSample {
    pub bpm: u32,

    pub temperature: f64,

    pub spo2: u32,

    #[serde(default)]
    pub fall_status: FallStatus,

    #[serde(default)]
    pub location: Option<GeoPoint>,

    /// Ground speed in m/s, when the band has a GPS fix.
    #[serde(default)]
    pub speed: Option<f64>,

    /// Distance travelled in meters since the band was switched on.
    #[serde(default)]
    pub distance: Option<f64>,

    pub timestamp: DateTime<Utc>,
}

impl VitalSample {
    pub fn has_bpm(&self) -> bool {
        self.bpm > 0
    }

    pub fn has_spo2(&self) -> bool {
        self.spo2 > 0
    }

    pub fn has_temperature(&self) -> bool {
        self.temperature > 0.0
    }

    pub fn is_fall(&self) -> bool {
        self.fall_status == FallStatus::Fall
    }
}

// ============================================================================
// Thresholds and evaluation
// ============================================================================

/// An inclusive `[min, max]` band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Personal danger thresholds. `spo2.max` is always the 100% ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalThresholds {
    pub bpm: Bounds,
    pub temp: Bounds,
    pub spo2: Bounds,
}

impl VitalThresholds {
    /// `min <= max` for every vital.
    pub fn is_ordered(&self) -> bool {
        self.bpm.min <= self.bpm.max
            && self.temp.min <= self.temp.max
            && self.spo2.min <= self.spo2.max
    }
}

/// Per-vital classification against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VitalStatus {
    Normal,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitalStatuses {
    pub bpm: VitalStatus,
    pub temp: VitalStatus,
    pub spo2: VitalStatus,
}

/// Coarse risk label derived from age and condition count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Alert severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "critical" => Severity::Critical,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// What an [`AlertEvent`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalKind {
    HeartRate,
    Temperature,
    Spo2,
    Fall,
    Zone,
    /// Raised when every notification channel failed.
    Delivery,
}

impl VitalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VitalKind::HeartRate => "heart_rate",
            VitalKind::Temperature => "temperature",
            VitalKind::Spo2 => "spo2",
            VitalKind::Fall => "fall",
            VitalKind::Zone => "zone",
            VitalKind::Delivery => "delivery",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "heart_rate" => VitalKind::HeartRate,
            "temperature" => VitalKind::Temperature,
            "spo2" => VitalKind::Spo2,
            "fall" => VitalKind::Fall,
            "zone" => VitalKind::Zone,
            _ => VitalKind::Delivery,
        }
    }
}

/// A risk finding, shown to the user and kept in the notification store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub severity: Severity,
    pub vital_type: VitalKind,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub timestamp: DateTime<Utc>,
}

/// Label for a health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLabel {
    /// Score of 80 or more.
    Good,
    /// Score between 60 and 79.
    Fair,
    /// Score below 60.
    NeedsAttention,
}

impl ScoreLabel {
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            ScoreLabel::Good
        } else if score >= 60 {
            ScoreLabel::Fair
        } else {
            ScoreLabel::NeedsAttention
        }
    }
}

/// Result of evaluating one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// 0-100, higher is healthier.
    pub health_score: u8,
    pub label: ScoreLabel,
    pub statuses: VitalStatuses,
    pub alerts: Vec<AlertEvent>,
}

/// Result of a geofence containment test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneCheck {
    pub inside_zone: bool,
    pub distance_meters: f64,
    pub radius_meters: f64,
}

impl ZoneCheck {
    /// How far past the edge of the zone the position is (0 when inside).
    pub fn meters_outside(&self) -> f64 {
        (self.distance_meters - self.radius_meters).max(0.0)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// The dispatcher's cooldown buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Vital,
    Fall,
    Zone,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Vital => "vital",
            AlertType::Fall => "fall",
            AlertType::Zone => "zone",
        }
    }
}

/// Readings attached to an outbound alert. Absent values are not rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertVitals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spo2: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl AlertVitals {
    /// All readings of a sample, for fall alerts.
    pub fn from_sample(sample: &VitalSample) -> Self {
        Self {
            bpm: Some(sample.bpm),
            spo2: Some(sample.spo2),
            temperature: Some(sample.temperature),
        }
    }
}

/// A request to notify the emergency contact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRequest {
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub vitals: Option<AlertVitals>,
    pub location: Option<GeoPoint>,
}

// ============================================================================
// API request/query types
// ============================================================================

/// Request body for POST /samples.
///
/// The timestamp is optional; when absent the server assigns one.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleRequest {
    #[serde(default)]
    pub bpm: u32,

    #[serde(default)]
    pub temperature: f64,

    #[serde(default)]
    pub spo2: u32,

    #[serde(default)]
    pub fall_status: FallStatus,

    #[serde(default)]
    pub location: Option<GeoPoint>,

    #[serde(default)]
    pub speed: Option<f64>,

    #[serde(default)]
    pub distance: Option<f64>,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SampleRequest {
    pub fn into_sample(self, received_at: DateTime<Utc>) -> VitalSample {
        VitalSample {
            bpm: self.bpm,
            temperature: self.temperature,
            spo2: self.spo2,
            fall_status: self.fall_status,
            location: self.location,
            speed: self.speed,
            distance: self.distance,
            timestamp: self.timestamp.unwrap_or(received_at),
        }
    }
}

/// Request body for POST /connectivity.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

/// Query parameters for GET /notifications.
#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    /// Maximum number of entries to return (default: 50).
    #[serde(default = "default_notification_limit")]
    pub limit: u32,
}

fn default_notification_limit() -> u32 {
    50
}
