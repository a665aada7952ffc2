//! Notification channels used by the alert dispatcher.
//!
//! Each channel wraps one way of reaching the emergency contact and reports
//! a uniform [`ChannelResult`]. The dispatcher walks its channels in order
//! until one succeeds, so adding a channel never touches dispatch logic.
//!
//! # Channels
//!
//! - [`email`]: structured alert posted to the email function
//! - [`sms`]: direct SMS through the platform, with compose fallback
//! - [`local`]: on-device notification and alarm (fired by the session,
//!   outside the fallback chain)

pub mod email;
pub mod local;
pub mod sms;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{AlertRequest, UserProfile};

pub use email::{EmailChannel, EmailTransport, HttpEmailTransport};
pub use local::{AlarmKind, LocalAlertPolicy, LocalAlerts, LocalNotifier, TracingNotifier};
pub use sms::{SmsChannel, SmsGateway, SmsMode, SmsModeSource, UnsupportedSmsGateway};

/// Identifies a channel in logs and dispatch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
        }
    }
}

/// Outcome of one channel attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum ChannelResult {
    /// The delivery system reported the message sent or delivered.
    Sent,

    /// The platform accepted the message but has not reported it sent yet.
    Pending,

    /// A pre-filled compose screen was opened; the user still has to send it.
    ComposeOpened,

    /// The profile has no contact for this channel.
    Unreachable(String),

    /// The platform cannot use this channel (permission, runtime).
    Unavailable(String),

    /// The attempt failed in transit; a later alert may succeed.
    Failed(String),
}

impl ChannelResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ChannelResult::Sent | ChannelResult::Pending | ChannelResult::ComposeOpened
        )
    }
}

/// Errors raised by channel transports before they are folded into a
/// [`ChannelResult`].
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("rejected by remote: {0}")]
    Rejected(String),
}

/// An alert ready for delivery, stamped with the dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPayload {
    pub request: AlertRequest,
    pub timestamp: DateTime<Utc>,
}

impl AlertPayload {
    pub fn new(request: AlertRequest, timestamp: DateTime<Utc>) -> Self {
        Self { request, timestamp }
    }
}

/// One way of reaching the emergency contact.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Channels that need the internet are skipped while it is unreachable.
    fn requires_network(&self) -> bool;

    /// Try to deliver `payload` to the contact configured on `profile`.
    ///
    /// Implementations never panic or return errors; every failure is folded
    /// into the returned [`ChannelResult`].
    async fn attempt(&self, payload: &AlertPayload, profile: &UserProfile) -> ChannelResult;
}
