//! On-device alerts: a push notification and an audible alarm.
//!
//! These fire for every abnormal sample, independently of the remote
//! fallback chain, each behind its own short cooldown so a burst of bad
//! samples does not stack notifications or restart the alarm.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::cooldown::CooldownTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    Vital,
    Fall,
}

impl AlarmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmKind::Vital => "vital",
            AlarmKind::Fall => "fall",
        }
    }
}

/// The device's notification and sound facilities.
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    /// Show a notification. Returns whether it was shown.
    async fn notify(&self, title: &str, body: &str) -> bool;

    async fn sound_alarm(&self, kind: AlarmKind);
}

/// Notifier for headless hosts: writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl LocalNotifier for TracingNotifier {
    async fn notify(&self, title: &str, body: &str) -> bool {
        warn!(title, body, "Local notification");
        true
    }

    async fn sound_alarm(&self, kind: AlarmKind) {
        warn!(kind = kind.as_str(), "Alarm");
    }
}

/// Cooldowns for local alerts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalAlertPolicy {
    pub push: Duration,
    pub vital_alarm: Duration,
    pub fall_alarm: Duration,
}

impl Default for LocalAlertPolicy {
    fn default() -> Self {
        Self {
            push: Duration::seconds(30),
            vital_alarm: Duration::seconds(5),
            fall_alarm: Duration::seconds(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Cue {
    Push,
    Alarm(AlarmKind),
}

/// Rate-limited front for a [`LocalNotifier`].
pub struct LocalAlerts {
    notifier: Arc<dyn LocalNotifier>,
    policy: LocalAlertPolicy,
    cooldowns: CooldownTracker<Cue>,
}

impl LocalAlerts {
    pub fn new(notifier: Arc<dyn LocalNotifier>) -> Self {
        Self {
            notifier,
            policy: LocalAlertPolicy::default(),
            cooldowns: CooldownTracker::new(),
        }
    }

    pub fn with_policy(mut self, policy: LocalAlertPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sound the alarm unless it sounded for `kind` within its cooldown.
    pub async fn alarm(&self, kind: AlarmKind, now: DateTime<Utc>) -> bool {
        let window = match kind {
            AlarmKind::Vital => self.policy.vital_alarm,
            AlarmKind::Fall => self.policy.fall_alarm,
        };
        if !self.cooldowns.try_fire(Cue::Alarm(kind), window, now) {
            return false;
        }
        self.notifier.sound_alarm(kind).await;
        true
    }

    /// Show a notification unless one was shown within the push cooldown.
    pub async fn push(&self, title: &str, body: &str, now: DateTime<Utc>) -> bool {
        if self.cooldowns.is_cooling(Cue::Push, self.policy.push, now) {
            return false;
        }
        if !self.notifier.notify(title, body).await {
            info!(title, "Local notification not shown");
            return false;
        }
        self.cooldowns.record(Cue::Push, now);
        true
    }
}
