//! Internet reachability probe.
//!
//! The dispatcher picks its channels based on whether the internet is
//! reachable right now. The OS "online" flag is not good enough for that
//! (captive portals, dead Wi-Fi), so the probe issues a real request.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Default host probed for reachability.
pub const DEFAULT_PROBE_URL: &str = "https://www.google.com/favicon.ico";

/// Upper bound on a probe; a slower answer counts as unreachable.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Answers "can we reach the internet right now?".
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probe that sends a HEAD request to a well-known URL.
///
/// Any HTTP response, whatever its status, proves reachability. Transport
/// errors and timeouts mean unreachable.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    /// Create a probe against [`DEFAULT_PROBE_URL`].
    pub fn new() -> Self {
        Self::with_url(DEFAULT_PROBE_URL)
    }

    /// Create a probe against a custom URL (for testing or private networks).
    pub fn with_url(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self
            .client
            .head(&self.url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => {
                debug!(status = %response.status(), "Connectivity probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}

/// Probe with a fixed answer, for hosts that know their connectivity.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_reachable(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_probe() {
        assert!(StaticProbe(true).is_reachable().await);
        assert!(!StaticProbe(false).is_reachable().await);
    }

    #[tokio::test]
    async fn test_unroutable_host_is_unreachable() {
        // Port 9 on localhost is almost never listening; connection refused
        // resolves well within the timeout.
        let probe = HttpProbe::with_url("http://127.0.0.1:9/");
        assert!(!probe.is_reachable().await);
    }
}
