//! Alert dispatcher: rate-limited, network-aware delivery with fallback.
//!
//! # Overview
//!
//! A dispatch goes through these gates, in order:
//!
//! 1. **In-flight guard**: one dispatch at a time per [`AlertType`]. A
//!    dispatch that arrives while another of the same type is running is
//!    dropped, not queued. Other types proceed.
//! 2. **Cooldown**: one window per [`AlertType`]. The timestamp is recorded
//!    only when a channel succeeds, so a failed dispatch is retried by the
//!    next abnormal sample.
//! 3. **Connectivity probe**: channels that need the internet are skipped
//!    while it is unreachable.
//! 4. **Channel chain**: channels are tried in order until one succeeds.
//!
//! State lives on the dispatcher instance and every call takes `now`, so
//! tests drive time explicitly.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channels::{AlertPayload, ChannelKind, ChannelResult, NotificationChannel};
use crate::cooldown::CooldownTracker;
use crate::model::{AlertRequest, AlertType};
use crate::network::ConnectivityProbe;
use crate::storage::ProfileStore;

/// Cooldown window per alert type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownPolicy {
    pub vital: Duration,
    pub fall: Duration,
    pub zone: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            vital: Duration::seconds(60),
            fall: Duration::seconds(60),
            zone: Duration::seconds(60),
        }
    }
}

impl CooldownPolicy {
    pub fn window(&self, alert_type: AlertType) -> Duration {
        match alert_type {
            AlertType::Vital => self.vital,
            AlertType::Fall => self.fall,
            AlertType::Zone => self.zone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    Cooldown,
    InFlight,
}

/// One channel's part in a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAttempt {
    pub channel: ChannelKind,
    pub result: ChannelResult,
}

/// What happened to a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// A channel accepted the alert. `confirmed` is false when only a compose
    /// screen was opened or the send is still pending.
    Delivered {
        channel: ChannelKind,
        confirmed: bool,
        attempts: Vec<ChannelAttempt>,
    },

    /// No channel was invoked.
    Suppressed { reason: SuppressReason },

    /// Every channel was skipped or failed.
    Failed { attempts: Vec<ChannelAttempt> },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchOutcome::Failed { .. })
    }
}

/// Marks an alert type in flight; clears it when the dispatch ends, however
/// it ends.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<AlertType>>,
    alert_type: AlertType,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<AlertType>>, alert_type: AlertType) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(alert_type);
        inserted.then_some(Self { set, alert_type })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.alert_type);
    }
}

/// Delivers alerts for one user.
pub struct AlertDispatcher {
    user_id: String,
    profiles: Arc<dyn ProfileStore>,
    probe: Arc<dyn ConnectivityProbe>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    policy: CooldownPolicy,
    cooldowns: CooldownTracker<AlertType>,
    in_flight: Mutex<HashSet<AlertType>>,
}

impl AlertDispatcher {
    /// Create a dispatcher with no channels and the default cooldowns.
    pub fn new(
        user_id: &str,
        profiles: Arc<dyn ProfileStore>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            profiles,
            probe,
            channels: Vec::new(),
            policy: CooldownPolicy::default(),
            cooldowns: CooldownTracker::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Append a channel to the end of the chain.
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_policy(mut self, policy: CooldownPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Dispatch `request`, returning whether a channel accepted it.
    pub async fn dispatch(&self, request: AlertRequest, now: DateTime<Utc>) -> bool {
        self.dispatch_detailed(request, now).await.is_delivered()
    }

    /// Dispatch `request` and report every gate and channel result.
    pub async fn dispatch_detailed(
        &self,
        request: AlertRequest,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let alert_type = request.alert_type;

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, alert_type) else {
            debug!(alert_type = alert_type.as_str(), "Dispatch already in flight, dropping");
            return DispatchOutcome::Suppressed {
                reason: SuppressReason::InFlight,
            };
        };

        let window = self.policy.window(alert_type);
        if let Some(remaining) = self.cooldowns.remaining(alert_type, window, now) {
            debug!(
                alert_type = alert_type.as_str(),
                remaining_secs = remaining.num_seconds(),
                "Alert in cooldown"
            );
            return DispatchOutcome::Suppressed {
                reason: SuppressReason::Cooldown,
            };
        }

        let profile = match self.profiles.get_profile(&self.user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(user_id = %self.user_id, "No profile configured, cannot notify anyone");
                return DispatchOutcome::Failed {
                    attempts: Vec::new(),
                };
            }
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "Failed to load profile for dispatch");
                return DispatchOutcome::Failed {
                    attempts: Vec::new(),
                };
            }
        };

        let online = self.probe.is_reachable().await;
        let payload = AlertPayload::new(request, now);
        let mut attempts = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let kind = channel.kind();
            if channel.requires_network() && !online {
                debug!(channel = kind.as_str(), "Skipping channel while offline");
                attempts.push(ChannelAttempt {
                    channel: kind,
                    result: ChannelResult::Unavailable("internet unreachable".to_string()),
                });
                continue;
            }

            let result = channel.attempt(&payload, &profile).await;
            let delivered = result.is_success();
            let confirmed = result == ChannelResult::Sent;
            attempts.push(ChannelAttempt {
                channel: kind,
                result,
            });

            if delivered {
                self.cooldowns.record(alert_type, now);
                info!(
                    alert_type = alert_type.as_str(),
                    channel = kind.as_str(),
                    confirmed,
                    online,
                    "Alert delivered"
                );
                return DispatchOutcome::Delivered {
                    channel: kind,
                    confirmed,
                    attempts,
                };
            }
        }

        warn!(
            alert_type = alert_type.as_str(),
            online,
            attempts = attempts.len(),
            "All notification channels failed"
        );
        DispatchOutcome::Failed { attempts }
    }
}
