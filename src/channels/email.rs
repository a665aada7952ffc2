//! Email alert channel.
//!
//! Alerts are posted as JSON to a hosted email function, which renders and
//! sends the message. The function answers `{"success": bool, "error": ..}`;
//! an explicit `success: false` is treated as a failure even on HTTP 200.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{AlertPayload, ChannelError, ChannelKind, ChannelResult, NotificationChannel};
use crate::model::{AlertType, AlertVitals, UserProfile};

/// Default endpoint of the email function.
pub const DEFAULT_EMAIL_FUNCTION_URL: &str = "http://127.0.0.1:54321/functions/v1/send-alert-email";

/// Upper bound on one email call.
const EMAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Used when the profile has no name.
const FALLBACK_RECIPIENT_NAME: &str = "User";

// ============================================================================
// Wire format
// ============================================================================

/// Body posted to the email function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAlert {
    pub recipient_email: String,
    pub recipient_name: String,
    pub alert_type: AlertType,
    pub alert_details: EmailAlertDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailAlertDetails {
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vitals: Option<AlertVitals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<EmailLocation>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmailLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Reply from the email function.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EmailResponse {
    /// Only an explicit `success: false` counts as a rejection.
    pub fn is_rejected(&self) -> bool {
        self.success == Some(false)
    }
}

impl EmailAlert {
    pub fn new(payload: &AlertPayload, email: &str, profile: &UserProfile) -> Self {
        let name = profile.name.trim();
        let request = &payload.request;
        Self {
            recipient_email: email.to_string(),
            recipient_name: if name.is_empty() {
                FALLBACK_RECIPIENT_NAME.to_string()
            } else {
                name.to_string()
            },
            alert_type: request.alert_type,
            alert_details: EmailAlertDetails {
                title: request.title.clone(),
                message: request.message.clone(),
                vitals: request.vitals,
                location: request.location.map(|point| EmailLocation {
                    latitude: point.lat,
                    longitude: point.lng,
                }),
                timestamp: payload.timestamp,
            },
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Sends a rendered [`EmailAlert`] somewhere.
///
/// An explicit rejection from the remote end is an error, so callers only
/// see `Ok` when the email was accepted.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, alert: &EmailAlert) -> Result<(), ChannelError>;
}

/// Client for the hosted email function.
#[derive(Clone)]
pub struct HttpEmailTransport {
    client: reqwest::Client,
    function_url: String,
    api_key: Option<String>,
}

impl Default for HttpEmailTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HttpEmailTransport {
    /// Create a transport against [`DEFAULT_EMAIL_FUNCTION_URL`].
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_EMAIL_FUNCTION_URL, api_key)
    }

    /// Create a transport with a custom function URL (for testing).
    pub fn with_base_url(function_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            function_url: function_url.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, alert: &EmailAlert) -> Result<(), ChannelError> {
        let mut request = self
            .client
            .post(&self.function_url)
            .timeout(EMAIL_TIMEOUT)
            .json(alert);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(());
        }

        let reply: EmailResponse = serde_json::from_str(&body)?;
        if reply.is_rejected() {
            return Err(ChannelError::Rejected(
                reply
                    .error
                    .unwrap_or_else(|| "email function reported failure".to_string()),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Emails the profile's contact address. Needs the internet.
pub struct EmailChannel {
    transport: Arc<dyn EmailTransport>,
}

impl EmailChannel {
    pub fn new(transport: Arc<dyn EmailTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn requires_network(&self) -> bool {
        true
    }

    async fn attempt(&self, payload: &AlertPayload, profile: &UserProfile) -> ChannelResult {
        let Some(email) = profile.contact_email() else {
            return ChannelResult::Unreachable("no contact email configured".to_string());
        };

        let alert = EmailAlert::new(payload, email, profile);
        match self.transport.send(&alert).await {
            Ok(()) => {
                info!(alert_type = payload.request.alert_type.as_str(), "Email alert sent");
                ChannelResult::Sent
            }
            Err(e) => {
                warn!(alert_type = payload.request.alert_type.as_str(), error = %e, "Email alert failed");
                ChannelResult::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertRequest, Gender, GeoPoint, MedicalConditions};
    use std::sync::Mutex;

    /// Records sent alerts and answers with a canned response.
    struct FakeTransport {
        response: Mutex<Option<Result<(), ChannelError>>>,
        sent: Mutex<Vec<EmailAlert>>,
    }

    impl FakeTransport {
        fn answering(response: Result<(), ChannelError>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EmailTransport for FakeTransport {
        async fn send(&self, alert: &EmailAlert) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(alert.clone());
            self.response.lock().unwrap().take().unwrap_or(Ok(()))
        }
    }

    fn profile(email: &str) -> UserProfile {
        UserProfile {
            name: "Minh".to_string(),
            age: 68,
            gender: Gender::Male,
            email: email.to_string(),
            emergency_contact: None,
            conditions: MedicalConditions::default(),
            safe_zone: None,
            last_updated: None,
        }
    }

    fn payload() -> AlertPayload {
        AlertPayload::new(
            AlertRequest {
                alert_type: AlertType::Vital,
                title: "Abnormal vital signs!".to_string(),
                message: "Heart rate too high: 130 BPM (> 100)".to_string(),
                vitals: Some(AlertVitals {
                    bpm: Some(130),
                    spo2: None,
                    temperature: None,
                }),
                location: Some(GeoPoint {
                    lat: 10.762622,
                    lng: 106.660172,
                }),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_payload_is_camel_case() {
        let alert = EmailAlert::new(&payload(), "family@example.com", &profile("family@example.com"));
        let json = serde_json::to_value(&alert).unwrap();

        assert_eq!(json["recipientEmail"], "family@example.com");
        assert_eq!(json["recipientName"], "Minh");
        assert_eq!(json["alertType"], "vital");
        assert_eq!(json["alertDetails"]["vitals"]["bpm"], 130);
        assert!(json["alertDetails"]["vitals"].get("spo2").is_none());
        assert_eq!(json["alertDetails"]["location"]["latitude"], 10.762622);
    }

    #[test]
    fn test_blank_name_uses_fallback() {
        let mut p = profile("a@example.com");
        p.name = "  ".to_string();
        let alert = EmailAlert::new(&payload(), "a@example.com", &p);
        assert_eq!(alert.recipient_name, "User");
    }

    #[tokio::test]
    async fn test_missing_email_is_unreachable() {
        let transport = FakeTransport::answering(Ok(()));
        let channel = EmailChannel::new(transport.clone());

        let result = channel.attempt(&payload(), &profile("")).await;
        assert!(matches!(result, ChannelResult::Unreachable(_)));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_only_explicit_false_is_rejected() {
        let parse = |body: &str| serde_json::from_str::<EmailResponse>(body).unwrap();
        assert!(parse(r#"{"success":false,"error":"quota"}"#).is_rejected());
        assert!(!parse(r#"{"success":true}"#).is_rejected());
        assert!(!parse(r#"{"id":"abc"}"#).is_rejected());
    }

    #[tokio::test]
    async fn test_rejection_is_failure() {
        let transport =
            FakeTransport::answering(Err(ChannelError::Rejected("quota exceeded".to_string())));
        let channel = EmailChannel::new(transport);

        let result = channel.attempt(&payload(), &profile("a@example.com")).await;
        assert!(matches!(result, ChannelResult::Failed(ref e) if e.contains("quota exceeded")));
    }

    #[tokio::test]
    async fn test_sent() {
        let transport = FakeTransport::answering(Ok(()));
        let channel = EmailChannel::new(transport.clone());

        let result = channel.attempt(&payload(), &profile("a@example.com")).await;
        assert_eq!(result, ChannelResult::Sent);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert!(channel.requires_network());
    }
}
