//! Description of the runtime the engine is embedded in.
//!
//! Channels ask the platform descriptor instead of sniffing the OS
//! themselves, so every platform path can be exercised from any test host.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsKind {
    Android,
    Ios,
    Web,
}

/// Capabilities of the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Running inside the native mobile shell rather than a browser.
    pub is_native: bool,

    pub os: OsKind,

    /// The host can send SMS without user interaction.
    pub has_sms_support: bool,
}

impl Platform {
    pub const fn android() -> Self {
        Self {
            is_native: true,
            os: OsKind::Android,
            has_sms_support: true,
        }
    }

    /// iOS only allows composing a message for the user to send.
    pub const fn ios() -> Self {
        Self {
            is_native: true,
            os: OsKind::Ios,
            has_sms_support: false,
        }
    }

    pub const fn web() -> Self {
        Self {
            is_native: false,
            os: OsKind::Web,
            has_sms_support: false,
        }
    }

    /// Parse a platform name as used in configuration. Unknown names map to web.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "android" => Self::android(),
            "ios" => Self::ios(),
            _ => Self::web(),
        }
    }

    /// Android requires runtime SMS permissions before a direct send.
    pub fn requires_sms_permission(&self) -> bool {
        self.is_native && self.os == OsKind::Android
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::web()
    }
}
