//! Safe-zone containment.
//!
//! Distances use the Haversine great-circle formula on a spherical Earth.
//! At the scale of a safe zone (tens of meters to a few kilometers) the
//! spherical error is far below GPS noise.

use chrono::{DateTime, Utc};

use crate::model::{
    AlertEvent, AlertRequest, AlertType, GeoPoint, SafeZoneConfig, Severity, VitalKind,
    ZoneCheck,
};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Test whether `position` lies inside `zone`.
///
/// The edge counts as inside: only a distance strictly greater than the
/// radius is a breach.
pub fn check_zone(position: GeoPoint, zone: &SafeZoneConfig) -> ZoneCheck {
    let distance_meters = haversine_distance(position, zone.center());

    ZoneCheck {
        inside_zone: distance_meters <= zone.radius_meters,
        distance_meters,
        radius_meters: zone.radius_meters,
    }
}

/// The alert shown to the user for a breach, or `None` when inside.
pub fn zone_alert(check: &ZoneCheck, at: DateTime<Utc>) -> Option<AlertEvent> {
    if check.inside_zone {
        return None;
    }

    Some(AlertEvent {
        severity: Severity::Warning,
        vital_type: VitalKind::Zone,
        title: "Left the safe zone".to_string(),
        description: format!(
            "Current position is {:.0} m from the safe-zone center, {:.0} m outside the {:.0} m radius",
            check.distance_meters,
            check.meters_outside(),
            check.radius_meters
        ),
        recommendation: "Contact the wearer to confirm they are safe.".to_string(),
        timestamp: at,
    })
}

/// The dispatch request for a breach at `position`.
pub fn zone_request(position: GeoPoint) -> AlertRequest {
    AlertRequest {
        alert_type: AlertType::Zone,
        title: "Left the safe zone!".to_string(),
        message: "The wearer has moved outside the configured safe zone.".to_string(),
        vitals: None,
        location: Some(position),
    }
}
