//! HTTP API handlers for S-Life.
//!
//! The band bridge posts samples and GPS fixes here; the companion app reads
//! thresholds, history and notifications and edits the profile and
//! preferences.
//!
//! # Endpoints
//!
//! - `POST /samples` - Ingest one vital sample
//! - `POST /location` - Geofence check for a phone GPS fix
//! - `GET /thresholds` - Personal thresholds and risk level
//! - `GET|PUT /profile` - Read or replace the profile
//! - `GET /history` - Recent samples, newest first, with the latest report
//! - `GET /notifications?limit=` - Stored alerts, newest first
//! - `POST /connectivity` - Report an online/offline transition
//! - `GET /offline/pending`, `POST /offline/flush`, `DELETE /offline/synced`
//! - `GET|PUT /settings/sms-mode` - SMS delivery preference
//! - `GET /health` - Health check
//!
//! Contact details are never logged; handlers log counts and outcomes only.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::channels::SmsMode;
use crate::model::{
    ConnectivityRequest, GeoPoint, HealthReport, NotificationsQuery, RiskLevel, SampleRequest,
    UserProfile, VitalSample, VitalThresholds,
};
use crate::offline::{FlushReport, SampleRecord};
use crate::session::{IngestOutcome, LocationOutcome, Session, SessionError};
use crate::storage::NotificationEntry;
use crate::thresholds::{ThresholdDescription, risk_level, threshold_description};

/// Upper bound on `GET /notifications?limit=`.
const MAX_NOTIFICATION_LIMIT: u32 = 500;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

/// Build the router with every endpoint and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/samples", post(post_sample))
        .route("/location", post(post_location))
        .route("/thresholds", get(get_thresholds))
        .route("/profile", get(get_profile).put(put_profile))
        .route("/history", get(get_history))
        .route("/notifications", get(get_notifications))
        .route("/connectivity", post(post_connectivity))
        .route("/offline/pending", get(get_pending))
        .route("/offline/flush", post(post_flush))
        .route("/offline/synced", delete(delete_synced))
        .route("/settings/sms-mode", get(get_sms_mode).put(put_sms_mode))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ThresholdsResponse {
    pub thresholds: VitalThresholds,
    pub description: ThresholdDescription,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Newest first.
    pub samples: Vec<VitalSample>,
    pub latest_report: Option<HealthReport>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<NotificationEntry>,
}

#[derive(Debug, Serialize)]
pub struct ConnectivityResponse {
    pub online: bool,
    /// Present when this report brought the session back online.
    pub flushed: Option<FlushReport>,
    pub flush_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub count: usize,
    pub records: Vec<SampleRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SmsModeBody {
    pub mode: SmsMode,
}

// ============================================================================
// Samples and location
// ============================================================================

/// POST /samples - Ingest one vital sample.
///
/// # Request Body
///
/// ```json
/// {
///     "bpm": 72,
///     "temperature": 36.6,
///     "spo2": 98,
///     "fall_status": "normal",
///     "location": { "lat": 10.7626, "lng": 106.6601 }
/// }
/// ```
///
/// Zero readings mean "no data". The timestamp is optional and defaults to
/// the server time.
#[instrument(skip(state, request))]
pub async fn post_sample(
    State(state): State<AppState>,
    Json(request): Json<SampleRequest>,
) -> Json<IngestOutcome> {
    let now = Utc::now();
    let outcome = state.session.ingest(request.into_sample(now), now).await;

    info!(
        score = outcome.report.health_score,
        alerts = outcome.report.alerts.len(),
        dispatches = outcome.dispatches.len(),
        persistence = ?outcome.persistence,
        "Sample processed"
    );
    Json(outcome)
}

/// POST /location - Geofence check for a GPS fix.
///
/// Returns `204 No Content` when no safe zone is configured.
#[instrument(skip(state))]
pub async fn post_location(
    State(state): State<AppState>,
    Json(position): Json<GeoPoint>,
) -> Result<Json<LocationOutcome>, StatusCode> {
    match state.session.update_location(position, Utc::now()).await {
        Ok(Some(outcome)) => {
            info!(
                inside_zone = outcome.zone.inside_zone,
                distance_meters = outcome.zone.distance_meters,
                "Location checked"
            );
            Ok(Json(outcome))
        }
        Ok(None) => Err(StatusCode::NO_CONTENT),
        Err(e) => Err(session_error_status(&e)),
    }
}

// ============================================================================
// Profile and thresholds
// ============================================================================

/// GET /thresholds - Personal thresholds, their display text and risk level.
#[instrument(skip(state))]
pub async fn get_thresholds(State(state): State<AppState>) -> Json<ThresholdsResponse> {
    let thresholds = state.session.thresholds();
    let profile = state.session.profile();

    Json(ThresholdsResponse {
        thresholds,
        description: threshold_description(&thresholds),
        risk_level: risk_level(profile.as_ref()),
    })
}

/// GET /profile - The stored profile, or `404` when none is configured.
#[instrument(skip(state))]
pub async fn get_profile(State(state): State<AppState>) -> Result<Json<UserProfile>, StatusCode> {
    state
        .session
        .profile()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// PUT /profile - Replace the profile and recompute thresholds.
///
/// Returns `422` when the profile fails validation.
#[instrument(skip(state, profile))]
pub async fn put_profile(
    State(state): State<AppState>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<UserProfile>, StatusCode> {
    match state.session.update_profile(profile).await {
        Ok(saved) => Ok(Json(saved)),
        Err(e) => Err(session_error_status(&e)),
    }
}

// ============================================================================
// History and notifications
// ============================================================================

/// GET /history - Recent samples, newest first.
#[instrument(skip(state))]
pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        samples: state.session.history(),
        latest_report: state.session.latest_report(),
    })
}

/// GET /notifications - Stored alerts, newest first.
///
/// # Query Parameters
///
/// - `limit` (optional): Maximum entries (default: 50, max: 500)
#[instrument(skip(state))]
pub async fn get_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<NotificationsResponse>, StatusCode> {
    let limit = query.limit.min(MAX_NOTIFICATION_LIMIT);
    let session = &state.session;

    match session
        .storage()
        .list_notifications(session.user_id(), limit)
        .await
    {
        Ok(notifications) => Ok(Json(NotificationsResponse { notifications })),
        Err(e) => {
            warn!(error = %e, "Failed to list notifications");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ============================================================================
// Connectivity and offline queue
// ============================================================================

/// POST /connectivity - Report connectivity; coming online flushes the queue.
#[instrument(skip(state))]
pub async fn post_connectivity(
    State(state): State<AppState>,
    Json(request): Json<ConnectivityRequest>,
) -> Json<ConnectivityResponse> {
    let (flushed, flush_error) = match state.session.set_online(request.online).await {
        Ok(report) => (report, None),
        Err(e) => {
            warn!(error = %e, "Flush after reconnect failed");
            (None, Some(e.to_string()))
        }
    };

    Json(ConnectivityResponse {
        online: request.online,
        flushed,
        flush_error,
    })
}

/// GET /offline/pending - Samples waiting for upload, oldest first.
#[instrument(skip(state))]
pub async fn get_pending(State(state): State<AppState>) -> Result<Json<PendingResponse>, StatusCode> {
    match state.session.pending_records().await {
        Ok(records) => Ok(Json(PendingResponse {
            count: records.len(),
            records,
        })),
        Err(e) => {
            warn!(error = %e, "Failed to read offline queue");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /offline/flush - Upload pending samples now.
///
/// Returns `502` when the remote store rejects the batch.
#[instrument(skip(state))]
pub async fn post_flush(State(state): State<AppState>) -> Result<Json<FlushReport>, StatusCode> {
    match state.session.flush().await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            warn!(error = %e, "Manual flush failed");
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

/// DELETE /offline/synced - Drop samples that were already uploaded.
#[instrument(skip(state))]
pub async fn delete_synced(
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, StatusCode> {
    match state.session.clear_synced().await {
        Ok(deleted) => {
            info!(deleted, "Synced records cleared");
            Ok(Json(DeletedResponse { deleted }))
        }
        Err(e) => {
            warn!(error = %e, "Failed to clear synced records");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// GET /settings/sms-mode - Current SMS delivery preference.
#[instrument(skip(state))]
pub async fn get_sms_mode(State(state): State<AppState>) -> Result<Json<SmsModeBody>, StatusCode> {
    match state.session.storage().get_sms_mode().await {
        Ok(mode) => Ok(Json(SmsModeBody { mode })),
        Err(e) => {
            warn!(error = %e, "Failed to read SMS mode");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /settings/sms-mode - Change the SMS delivery preference.
///
/// ```json
/// { "mode": "compose" }
/// ```
#[instrument(skip(state))]
pub async fn put_sms_mode(
    State(state): State<AppState>,
    Json(body): Json<SmsModeBody>,
) -> Result<Json<SmsModeBody>, StatusCode> {
    match state.session.storage().set_sms_mode(body.mode).await {
        Ok(()) => {
            info!(mode = body.mode.as_str(), "SMS mode updated");
            Ok(Json(body))
        }
        Err(e) => {
            warn!(error = %e, "Failed to store SMS mode");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

fn session_error_status(error: &SessionError) -> StatusCode {
    match error {
        SessionError::InvalidProfile(e) => {
            warn!(error = %e, "Rejected profile");
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SessionError::InvalidLocation { .. } => {
            warn!(error = %error, "Rejected location");
            StatusCode::BAD_REQUEST
        }
        SessionError::Storage(e) => {
            warn!(error = %e, "Storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
