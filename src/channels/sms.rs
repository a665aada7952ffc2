//! SMS alert channel.
//!
//! # Delivery paths
//!
//! 1. Direct send through the platform's SMS capability, trying the primary
//!    SIM slot and then the secondary one. Android asks for the SEND_SMS and
//!    READ_PHONE_STATE permissions first.
//! 2. Compose fallback: a pre-filled message screen the user has to confirm.
//!    Used when permission is refused, the capability is missing, or the
//!    user chose "always compose".
//!
//! SMS does not need the internet, so the dispatcher keeps trying it while
//! offline.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{AlertPayload, ChannelKind, ChannelResult, NotificationChannel};
use crate::model::UserProfile;
use crate::platform::Platform;

/// First line of every SMS alert.
pub const SMS_HEADER: &str = "⚠️ S-LIFE ALERT";

// ============================================================================
// Preference
// ============================================================================

/// How the user wants SMS alerts sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsMode {
    /// Send directly when possible, compose otherwise.
    #[default]
    Auto,
    /// Always open the compose screen.
    Compose,
}

impl SmsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsMode::Auto => "auto",
            SmsMode::Compose => "compose",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(SmsMode::Auto),
            "compose" => Some(SmsMode::Compose),
            _ => None,
        }
    }
}

/// Where the SMS channel reads the current [`SmsMode`] from.
///
/// Read on every attempt so a changed preference applies to the next alert.
#[async_trait]
pub trait SmsModeSource: Send + Sync {
    async fn sms_mode(&self) -> SmsMode;
}

#[async_trait]
impl SmsModeSource for SmsMode {
    async fn sms_mode(&self) -> SmsMode {
        *self
    }
}

// ============================================================================
// Platform capability
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsPermission {
    SendSms,
    ReadPhoneState,
}

impl SmsPermission {
    /// Android permission name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsPermission::SendSms => "android.permission.SEND_SMS",
            SmsPermission::ReadPhoneState => "android.permission.READ_PHONE_STATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimSlot {
    Primary,
    Secondary,
}

impl SimSlot {
    pub fn index(&self) -> u8 {
        match self {
            SimSlot::Primary => 0,
            SimSlot::Secondary => 1,
        }
    }
}

/// Status reported by the platform after a direct send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

#[derive(Debug, Error, PartialEq)]
pub enum SmsError {
    /// The host cannot send SMS at all.
    #[error("SMS capability unavailable: {0}")]
    Unsupported(String),

    #[error("SMS send failed: {0}")]
    Platform(String),
}

/// A pre-filled compose screen request.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeIntent {
    pub number: String,
    pub body: String,
}

impl ComposeIntent {
    pub fn new(number: &str, body: &str) -> Self {
        Self {
            number: number.to_string(),
            body: body.to_string(),
        }
    }

    /// `sms:` URI understood by mobile browsers and OS handlers.
    pub fn uri(&self) -> String {
        format!("sms:{}?body={}", self.number, urlencoding::encode(&self.body))
    }
}

/// The host's SMS capability.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn has_permission(&self, permission: SmsPermission) -> bool;

    /// Ask the user for `permission`. Returns whether it was granted.
    async fn request_permission(&self, permission: SmsPermission) -> bool;

    async fn send(&self, slot: SimSlot, number: &str, text: &str)
    -> Result<DeliveryStatus, SmsError>;

    /// Open the compose screen. Returns whether it was shown.
    async fn open_compose(&self, intent: &ComposeIntent) -> Result<bool, SmsError>;
}

/// Gateway for hosts without any SMS capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedSmsGateway;

#[async_trait]
impl SmsGateway for UnsupportedSmsGateway {
    async fn has_permission(&self, _permission: SmsPermission) -> bool {
        false
    }

    async fn request_permission(&self, _permission: SmsPermission) -> bool {
        false
    }

    async fn send(
        &self,
        _slot: SimSlot,
        _number: &str,
        _text: &str,
    ) -> Result<DeliveryStatus, SmsError> {
        Err(SmsError::Unsupported("no SMS gateway on this host".to_string()))
    }

    async fn open_compose(&self, _intent: &ComposeIntent) -> Result<bool, SmsError> {
        Err(SmsError::Unsupported("no SMS gateway on this host".to_string()))
    }
}

// ============================================================================
// Message text
// ============================================================================

/// Render an alert as SMS text.
///
/// Vital lines are only included for non-zero readings. The time is shown in
/// `offset`, formatted `HH:MM:SS DD/MM/YYYY`.
pub fn format_sms_message(payload: &AlertPayload, offset: FixedOffset) -> String {
    let request = &payload.request;
    let mut message = format!("{SMS_HEADER}\n{}\n", request.title);

    if let Some(vitals) = &request.vitals {
        if let Some(bpm) = vitals.bpm.filter(|v| *v > 0) {
            message.push_str(&format!("Heart rate: {bpm} BPM\n"));
        }
        if let Some(spo2) = vitals.spo2.filter(|v| *v > 0) {
            message.push_str(&format!("SpO2: {spo2}%\n"));
        }
        if let Some(temperature) = vitals.temperature.filter(|v| *v != 0.0) {
            message.push_str(&format!("Temperature: {temperature}°C\n"));
        }
    }

    if !request.message.is_empty() {
        message.push_str(&request.message);
        message.push('\n');
    }

    if let Some(location) = &request.location {
        message.push_str(&format!("📍 Location: {}", location.maps_url()));
    }

    message.push_str(&format!("\nTime: {}", local_time(payload.timestamp, offset)));
    message
}

fn local_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .format("%H:%M:%S %d/%m/%Y")
        .to_string()
}

/// Keep the last three digits so logs can tell contacts apart.
fn masked(number: &str) -> String {
    let tail: String = number
        .chars()
        .rev()
        .take(3)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{tail}")
}

// ============================================================================
// Channel
// ============================================================================

/// Texts the profile's emergency contact.
pub struct SmsChannel {
    platform: Platform,
    gateway: Arc<dyn SmsGateway>,
    mode: Arc<dyn SmsModeSource>,
    utc_offset: FixedOffset,
}

impl SmsChannel {
    pub fn new(
        platform: Platform,
        gateway: Arc<dyn SmsGateway>,
        mode: Arc<dyn SmsModeSource>,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            platform,
            gateway,
            mode,
            utc_offset,
        }
    }

    async fn ensure_permissions(&self) -> bool {
        for permission in [SmsPermission::SendSms, SmsPermission::ReadPhoneState] {
            if self.gateway.has_permission(permission).await {
                continue;
            }
            if !self.gateway.request_permission(permission).await {
                warn!(permission = permission.as_str(), "SMS permission refused");
                return false;
            }
        }
        true
    }

    async fn compose(&self, number: &str, text: &str, reason: &str) -> ChannelResult {
        let intent = ComposeIntent::new(number, text);
        match self.gateway.open_compose(&intent).await {
            Ok(true) => {
                info!(to = %masked(number), reason, "SMS compose screen opened");
                ChannelResult::ComposeOpened
            }
            Ok(false) => ChannelResult::Unavailable("compose screen could not be opened".to_string()),
            Err(e) => {
                warn!(error = %e, "SMS compose failed");
                ChannelResult::Unavailable(e.to_string())
            }
        }
    }

    async fn send_direct(&self, number: &str, text: &str) -> ChannelResult {
        for slot in [SimSlot::Primary, SimSlot::Secondary] {
            match self.gateway.send(slot, number, text).await {
                Ok(DeliveryStatus::Failed) => {
                    warn!(slot = slot.index(), "SMS send reported failure");
                }
                Ok(DeliveryStatus::Pending) => {
                    info!(to = %masked(number), slot = slot.index(), "SMS alert queued by platform");
                    return ChannelResult::Pending;
                }
                Ok(status) => {
                    info!(to = %masked(number), slot = slot.index(), ?status, "SMS alert sent");
                    return ChannelResult::Sent;
                }
                Err(SmsError::Unsupported(reason)) => {
                    return self.compose(number, text, &reason).await;
                }
                Err(e) => {
                    warn!(slot = slot.index(), error = %e, "SMS send failed");
                }
            }
        }
        ChannelResult::Failed("SMS send failed on both SIM slots".to_string())
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn requires_network(&self) -> bool {
        false
    }

    async fn attempt(&self, payload: &AlertPayload, profile: &UserProfile) -> ChannelResult {
        let Some(number) = profile.contact_phone() else {
            return ChannelResult::Unreachable("no emergency contact configured".to_string());
        };
        if !self.platform.is_native {
            return ChannelResult::Unavailable("SMS requires the native app".to_string());
        }

        let text = format_sms_message(payload, self.utc_offset);

        if self.mode.sms_mode().await == SmsMode::Compose {
            return self.compose(number, &text, "compose mode selected").await;
        }
        if !self.platform.has_sms_support {
            return self.compose(number, &text, "direct send unsupported").await;
        }
        if self.platform.requires_sms_permission() && !self.ensure_permissions().await {
            return self.compose(number, &text, "permission refused").await;
        }

        self.send_direct(number, &text).await
    }
}
