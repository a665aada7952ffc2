//! Runtime configuration from environment variables.
//!
//! | variable                    | default                                   |
//! |-----------------------------|-------------------------------------------|
//! | `SLIFE_PORT`                | 3000                                      |
//! | `SLIFE_DATABASE_URL`        | `sqlite:slife.db?mode=rwc`                |
//! | `SLIFE_USER_ID`             | `local`                                   |
//! | `SLIFE_EMAIL_FUNCTION_URL`  | local email function                      |
//! | `SLIFE_RECORDS_URL`         | local record table                        |
//! | `SLIFE_API_KEY`             | none                                      |
//! | `SLIFE_PROBE_URL`           | [`DEFAULT_PROBE_URL`]                     |
//! | `SLIFE_PLATFORM`            | `web` (`android`, `ios`)                  |
//! | `SLIFE_UTC_OFFSET_HOURS`    | 7                                         |
//! | `SLIFE_FLUSH_INTERVAL_SECS` | 60                                        |
//! | `SLIFE_OFFLINE_CAPACITY`    | 1000                                      |
//! | `SLIFE_COOLDOWN_SECS`       | 60 (applies to vital, fall and zone)      |
//!
//! Unparseable, non-positive or out-of-range values fall back to the default.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::channels::email::DEFAULT_EMAIL_FUNCTION_URL;
use crate::dispatcher::CooldownPolicy;
use crate::network::DEFAULT_PROBE_URL;
use crate::offline::{DEFAULT_OFFLINE_CAPACITY, DEFAULT_RECORDS_URL};
use crate::platform::Platform;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_PATH: &str = "sqlite:slife.db?mode=rwc";
const DEFAULT_USER_ID: &str = "local";
const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub user_id: String,
    pub email_function_url: String,
    pub records_url: String,
    pub api_key: Option<String>,
    pub probe_url: String,
    pub platform: Platform,
    /// Offset used to render times in SMS text.
    pub utc_offset: FixedOffset,
    pub flush_interval: Duration,
    pub offline_capacity: usize,
    pub cooldowns: CooldownPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_PATH.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            email_function_url: DEFAULT_EMAIL_FUNCTION_URL.to_string(),
            records_url: DEFAULT_RECORDS_URL.to_string(),
            api_key: None,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            platform: Platform::default(),
            utc_offset: utc_offset(DEFAULT_UTC_OFFSET_HOURS),
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            offline_capacity: DEFAULT_OFFLINE_CAPACITY,
            cooldowns: CooldownPolicy::default(),
        }
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup` (for testing).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cooldowns = match parsed(&lookup, "SLIFE_COOLDOWN_SECS")
            .filter(|secs: &i64| *secs > 0)
            .and_then(chrono::Duration::try_seconds)
        {
            Some(window) => CooldownPolicy {
                vital: window,
                fall: window,
                zone: window,
            },
            None => defaults.cooldowns,
        };

        Self {
            port: parsed(&lookup, "SLIFE_PORT").unwrap_or(defaults.port),
            database_url: text("SLIFE_DATABASE_URL").unwrap_or(defaults.database_url),
            user_id: text("SLIFE_USER_ID").unwrap_or(defaults.user_id),
            email_function_url: text("SLIFE_EMAIL_FUNCTION_URL")
                .unwrap_or(defaults.email_function_url),
            records_url: text("SLIFE_RECORDS_URL").unwrap_or(defaults.records_url),
            api_key: text("SLIFE_API_KEY"),
            probe_url: text("SLIFE_PROBE_URL").unwrap_or(defaults.probe_url),
            platform: text("SLIFE_PLATFORM")
                .map(|name| Platform::from_name(&name))
                .unwrap_or(defaults.platform),
            utc_offset: parsed(&lookup, "SLIFE_UTC_OFFSET_HOURS")
                .map(utc_offset)
                .unwrap_or(defaults.utc_offset),
            flush_interval: parsed(&lookup, "SLIFE_FLUSH_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.flush_interval),
            offline_capacity: parsed(&lookup, "SLIFE_OFFLINE_CAPACITY")
                .filter(|cap: &usize| *cap > 0)
                .unwrap_or(defaults.offline_capacity),
            cooldowns,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Offsets outside ±14 h are clamped.
fn utc_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.clamp(-14, 14) * 3600).unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c, Config::default());
        assert_eq!(c.utc_offset.local_minus_utc(), 7 * 3600);
        assert_eq!(c.offline_capacity, 1000);
        assert_eq!(c.platform, Platform::web());
        assert!(c.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("SLIFE_PORT", "8080"),
            ("SLIFE_PLATFORM", "android"),
            ("SLIFE_UTC_OFFSET_HOURS", "-5"),
            ("SLIFE_OFFLINE_CAPACITY", "50"),
            ("SLIFE_COOLDOWN_SECS", "120"),
            ("SLIFE_API_KEY", "secret"),
        ]);
        assert_eq!(c.port, 8080);
        assert_eq!(c.platform, Platform::android());
        assert_eq!(c.utc_offset.local_minus_utc(), -5 * 3600);
        assert_eq!(c.offline_capacity, 50);
        assert_eq!(c.cooldowns.zone, chrono::Duration::seconds(120));
        assert_eq!(c.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let c = config(&[
            ("SLIFE_PORT", "not-a-port"),
            ("SLIFE_OFFLINE_CAPACITY", "0"),
            ("SLIFE_FLUSH_INTERVAL_SECS", "0"),
            ("SLIFE_API_KEY", "  "),
        ]);
        assert_eq!(c.port, 3000);
        assert_eq!(c.offline_capacity, 1000);
        assert_eq!(c.flush_interval, Duration::from_secs(60));
        assert!(c.api_key.is_none());
    }

    #[test]
    fn test_cooldown_out_of_range_falls_back() {
        for secs in ["0", "-60", "9223372036854775807"] {
            let c = config(&[("SLIFE_COOLDOWN_SECS", secs)]);
            assert_eq!(c.cooldowns, CooldownPolicy::default(), "SLIFE_COOLDOWN_SECS={secs}");
        }
    }

    #[test]
    fn test_offset_is_clamped() {
        assert_eq!(utc_offset(20).local_minus_utc(), 14 * 3600);
    }
}
