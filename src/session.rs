//! The monitoring session: ties evaluation, alerting and persistence together.
//!
//! # Ingest pipeline
//!
//! For every sample, in arrival order:
//!
//! 1. Under one synchronous lock: append to the display history, evaluate
//!    against the cached thresholds, run the geofence check.
//! 2. Store the report's alerts in the notification history, at most one
//!    per kind within the notification window.
//! 3. Fire local alerts (notification and alarm).
//! 4. Concurrently: dispatch remote alerts (fall takes priority over the
//!    combined vital alert, then zone) and persist the sample, remotely
//!    when online and through the offline queue otherwise.
//!
//! The state lock is never held across an await, so a slow channel or a
//! slow store cannot reorder evaluation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::channels::local::{AlarmKind, LocalAlerts};
use crate::cooldown::CooldownTracker;
use crate::dispatcher::{AlertDispatcher, DispatchOutcome};
use crate::evaluation::{abnormal_vitals, evaluate};
use crate::geofence::{check_zone, zone_alert, zone_request};
use crate::history::{DEFAULT_HISTORY_CAPACITY, RingBuffer};
use crate::model::{
    AlertEvent, AlertRequest, AlertType, AlertVitals, GeoPoint, HealthReport, ProfileError,
    Severity, UserProfile, VitalKind, VitalSample, VitalStatus, VitalThresholds, ZoneCheck,
};
use crate::offline::{DEFAULT_OFFLINE_CAPACITY, FlushReport, OfflineQueue, RecordSink, SampleRecord};
use crate::storage::{DEFAULT_NOTIFICATION_CAPACITY, ProfileStore, Storage};
use crate::thresholds::compute_thresholds;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid profile: {0}")]
    InvalidProfile(#[from] ProfileError),

    #[error("invalid location ({lat}, {lng})")]
    InvalidLocation { lat: f64, lng: f64 },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Tunables for a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub history_capacity: usize,
    pub offline_capacity: usize,
    /// Connectivity assumed until the first report.
    pub start_online: bool,
    /// Stored notifications kept per user.
    pub notification_capacity: usize,
    /// Minimum spacing between stored notifications of the same kind.
    pub notification_window: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            offline_capacity: DEFAULT_OFFLINE_CAPACITY,
            start_online: true,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            notification_window: Duration::seconds(60),
        }
    }
}

/// Where a sample ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    Remote,
    Queued,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRecord {
    pub alert_type: AlertType,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

/// Everything that happened to one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub report: HealthReport,
    pub zone: Option<ZoneCheck>,
    pub dispatches: Vec<DispatchRecord>,
    pub persistence: Persistence,
}

/// Result of a phone GPS fix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationOutcome {
    pub zone: ZoneCheck,
    pub dispatch: Option<DispatchOutcome>,
}

struct SessionState {
    profile: Option<UserProfile>,
    thresholds: VitalThresholds,
    history: RingBuffer<VitalSample>,
    last_report: Option<HealthReport>,
    last_zone: Option<ZoneCheck>,
}

impl SessionState {
    /// Run the geofence and remember the result.
    ///
    /// Returns the check and whether this fix crossed from inside (or
    /// unknown) to outside.
    fn observe_position(&mut self, position: GeoPoint) -> Option<(ZoneCheck, bool)> {
        let zone = self.profile.as_ref()?.safe_zone?;
        if !position.is_valid() {
            return None;
        }

        let check = check_zone(position, &zone);
        let was_inside = self.last_zone.is_none_or(|z| z.inside_zone);
        self.last_zone = Some(check);
        Some((check, was_inside && !check.inside_zone))
    }
}

/// Monitoring state and collaborators for one user.
pub struct Session {
    user_id: String,
    storage: Storage,
    dispatcher: AlertDispatcher,
    local_alerts: LocalAlerts,
    queue: OfflineQueue,
    records: Arc<dyn RecordSink>,
    online: AtomicBool,
    state: Mutex<SessionState>,
    notified: CooldownTracker<VitalKind>,
    /// Alert types whose last dispatch failed; the failure notice is stored
    /// once per streak.
    failing: Mutex<HashSet<AlertType>>,
    notification_capacity: usize,
    notification_window: Duration,
}

impl Session {
    /// Build a session, loading the stored profile for `user_id`.
    pub async fn load(
        user_id: &str,
        storage: Storage,
        dispatcher: AlertDispatcher,
        local_alerts: LocalAlerts,
        records: Arc<dyn RecordSink>,
        options: SessionOptions,
    ) -> anyhow::Result<Self> {
        let profile = storage.get_profile(user_id).await?;
        let thresholds = compute_thresholds(profile.as_ref());
        info!(
            user_id,
            has_profile = profile.is_some(),
            bpm_min = thresholds.bpm.min,
            bpm_max = thresholds.bpm.max,
            spo2_min = thresholds.spo2.min,
            "Session loaded"
        );

        Ok(Self {
            user_id: user_id.to_string(),
            queue: OfflineQueue::new(storage.clone(), options.offline_capacity),
            storage,
            dispatcher,
            local_alerts,
            records,
            online: AtomicBool::new(options.start_online),
            state: Mutex::new(SessionState {
                profile,
                thresholds,
                history: RingBuffer::new(options.history_capacity),
                last_report: None,
                last_zone: None,
            }),
            notified: CooldownTracker::new(),
            failing: Mutex::new(HashSet::new()),
            notification_capacity: options.notification_capacity,
            notification_window: options.notification_window,
        })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // ========================================================================
    // Ingest
    // ========================================================================

    /// Process one sample from the band.
    pub async fn ingest(&self, sample: VitalSample, now: DateTime<Utc>) -> IngestOutcome {
        let (report, zone, thresholds) = {
            let mut state = self.state();
            state.history.push(sample.clone());
            let report = evaluate(&sample, &state.thresholds, state.profile.as_ref());
            state.last_report = Some(report.clone());
            let zone = sample
                .location
                .and_then(|position| state.observe_position(position));
            (report, zone, state.thresholds)
        };

        let mut events = report.alerts.clone();
        if let Some((check, true)) = zone {
            events.extend(zone_alert(&check, now));
        }
        self.record_events(&events, now).await;
        self.fire_local_alerts(&sample, &report, now).await;

        let requests = alert_requests(&sample, &thresholds, zone.map(|(check, _)| check));
        let (dispatches, persistence) =
            tokio::join!(self.dispatch_all(requests, now), self.persist(&sample));

        debug!(
            score = report.health_score,
            alerts = report.alerts.len(),
            dispatches = dispatches.len(),
            ?persistence,
            "Sample ingested"
        );

        IngestOutcome {
            report,
            zone: zone.map(|(check, _)| check),
            dispatches,
            persistence,
        }
    }

    /// Run the geofence for a position that did not come with a sample.
    pub async fn update_location(
        &self,
        position: GeoPoint,
        now: DateTime<Utc>,
    ) -> Result<Option<LocationOutcome>, SessionError> {
        if !position.is_valid() {
            return Err(SessionError::InvalidLocation {
                lat: position.lat,
                lng: position.lng,
            });
        }

        let Some((check, crossed)) = self.state().observe_position(position) else {
            return Ok(None);
        };

        if let Some(event) = zone_alert(&check, now).filter(|_| crossed) {
            self.record_events(std::slice::from_ref(&event), now).await;
        }

        let dispatch = if check.inside_zone {
            None
        } else {
            let mut records = self.dispatch_all(vec![zone_request(position)], now).await;
            records.pop().map(|r| r.outcome)
        };

        Ok(Some(LocationOutcome {
            zone: check,
            dispatch,
        }))
    }

    /// Store `events`, skipping kinds already stored within the window.
    async fn record_events(&self, events: &[AlertEvent], now: DateTime<Utc>) {
        for event in events {
            if !self
                .notified
                .try_fire(event.vital_type, self.notification_window, now)
            {
                debug!(vital_type = event.vital_type.as_str(), "Notification already stored recently");
                continue;
            }
            self.store_event(event).await;
        }
    }

    async fn store_event(&self, event: &AlertEvent) {
        if let Err(e) = self
            .storage
            .insert_notification(&self.user_id, event, self.notification_capacity)
            .await
        {
            warn!(error = %e, vital_type = event.vital_type.as_str(), "Failed to store notification");
        }
    }

    fn failing(&self) -> MutexGuard<'_, HashSet<AlertType>> {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fire_local_alerts(&self, sample: &VitalSample, report: &HealthReport, now: DateTime<Utc>) {
        let Some(top) = report.alerts.iter().max_by_key(|a| a.severity) else {
            return;
        };

        self.local_alerts.push(&top.title, &top.description, now).await;

        let statuses = &report.statuses;
        let danger = [statuses.bpm, statuses.temp, statuses.spo2].contains(&VitalStatus::Danger);
        if sample.is_fall() {
            self.local_alerts.alarm(AlarmKind::Fall, now).await;
        } else if danger {
            self.local_alerts.alarm(AlarmKind::Vital, now).await;
        }
    }

    async fn dispatch_all(&self, requests: Vec<AlertRequest>, now: DateTime<Utc>) -> Vec<DispatchRecord> {
        let mut records = Vec::with_capacity(requests.len());
        for request in requests {
            let alert_type = request.alert_type;
            let outcome = self.dispatcher.dispatch_detailed(request, now).await;
            if outcome.is_failed() {
                let streak_started = self.failing().insert(alert_type);
                if streak_started {
                    self.store_event(&delivery_failure_notice(alert_type, now))
                        .await;
                }
            } else if outcome.is_delivered() {
                self.failing().remove(&alert_type);
            }
            records.push(DispatchRecord {
                alert_type,
                outcome,
            });
        }
        records
    }

    async fn persist(&self, sample: &VitalSample) -> Persistence {
        let record = SampleRecord::from_sample(&self.user_id, sample);

        if self.is_online() {
            match self.records.insert_batch(std::slice::from_ref(&record)).await {
                Ok(()) => return Persistence::Remote,
                Err(e) => warn!(error = %e, "Remote insert failed, queueing sample"),
            }
        }

        match self.queue.enqueue(&record).await {
            Ok(_) => Persistence::Queued,
            Err(e) => {
                warn!(error = %e, "Failed to queue sample");
                Persistence::Failed
            }
        }
    }

    // ========================================================================
    // Connectivity and offline queue
    // ========================================================================

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Record a connectivity change. Coming back online flushes the queue.
    pub async fn set_online(&self, online: bool) -> anyhow::Result<Option<FlushReport>> {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        if was_online != online {
            info!(online, "Connectivity changed");
        }
        if online && !was_online {
            return self.flush().await.map(Some);
        }
        Ok(None)
    }

    /// Upload queued samples to the remote record store.
    pub async fn flush(&self) -> anyhow::Result<FlushReport> {
        self.queue.flush(self.records.as_ref()).await
    }

    pub async fn pending_records(&self) -> anyhow::Result<Vec<SampleRecord>> {
        self.queue.pending().await
    }

    pub async fn clear_synced(&self) -> anyhow::Result<u64> {
        self.queue.clear_synced().await
    }

    // ========================================================================
    // Profile and read access
    // ========================================================================

    /// Validate, store and apply a new profile. Thresholds are recomputed.
    pub async fn update_profile(&self, profile: UserProfile) -> Result<UserProfile, SessionError> {
        profile.validate()?;
        let saved = self.storage.save_profile(&self.user_id, &profile).await?;
        let thresholds = compute_thresholds(Some(&saved));

        {
            let mut state = self.state();
            state.profile = Some(saved.clone());
            state.thresholds = thresholds;
            state.last_zone = None;
        }

        info!(
            age = saved.age,
            conditions = saved.conditions.count(),
            bpm_min = thresholds.bpm.min,
            bpm_max = thresholds.bpm.max,
            spo2_min = thresholds.spo2.min,
            "Profile updated"
        );
        Ok(saved)
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.state().profile.clone()
    }

    pub fn thresholds(&self) -> VitalThresholds {
        self.state().thresholds
    }

    /// Recent samples, newest first.
    pub fn history(&self) -> Vec<VitalSample> {
        self.state().history.newest_first()
    }

    pub fn latest_report(&self) -> Option<HealthReport> {
        self.state().last_report.clone()
    }
}

/// Remote alerts for a sample: a fall wins over the combined vital alert,
/// and a zone breach is dispatched in its own bucket.
fn alert_requests(
    sample: &VitalSample,
    thresholds: &VitalThresholds,
    zone: Option<ZoneCheck>,
) -> Vec<AlertRequest> {
    let mut requests = Vec::new();

    if sample.is_fall() {
        requests.push(AlertRequest {
            alert_type: AlertType::Fall,
            title: "FALL DETECTED!".to_string(),
            message: "A fall was detected. Check on the wearer immediately!".to_string(),
            vitals: Some(AlertVitals::from_sample(sample)),
            location: sample.location,
        });
    } else {
        let abnormal = abnormal_vitals(sample, thresholds);
        if !abnormal.is_empty() {
            requests.push(AlertRequest {
                alert_type: AlertType::Vital,
                title: "Abnormal vital signs!".to_string(),
                message: abnormal.message(),
                vitals: Some(abnormal.vitals),
                location: sample.location,
            });
        }
    }

    if let (Some(check), Some(position)) = (zone, sample.location) {
        if !check.inside_zone {
            requests.push(zone_request(position));
        }
    }

    requests
}

fn delivery_failure_notice(alert_type: AlertType, at: DateTime<Utc>) -> AlertEvent {
    AlertEvent {
        severity: Severity::Warning,
        vital_type: VitalKind::Delivery,
        title: "Alert could not be delivered".to_string(),
        description: format!(
            "No notification channel reached the emergency contact for the {} alert",
            alert_type.as_str()
        ),
        recommendation: "Check the emergency contact details and the network connection."
            .to_string(),
        timestamp: at,
    }
}
