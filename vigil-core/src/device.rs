//! Client signature classification and trusted devices
//!
//! A raw client signature (usually a `User-Agent` header) is classified into a
//! [`DeviceInfo`] by matching known tokens, and condensed into a stable *device
//! signature* that keys the trusted-device registry.
//!
//! | Field          | Type         | Description                                        |
//! | -------------- | ------------ | -------------------------------------------------- |
//! | `device_type`  | `DeviceType` | Desktop, mobile, tablet or unknown                 |
//! | `os`           | `String`     | Operating system family, `"Unknown"` if unmatched  |
//! | `browser`      | `String`     | Browser family, `"Unknown"` if unmatched           |
//! | `display_name` | `String`     | Human readable summary, e.g. `Chrome on Windows`   |
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{UserId, error::ValidationError};

/// Label used for every classification field that no rule matched
pub const UNKNOWN: &str = "Unknown";

static TABLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ipad|tablet|kindle|silk/").expect("Invalid tablet regex"));

static MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)mobile|iphone|ipod|windows phone|blackberry|opera mini")
        .expect("Invalid mobile regex")
});

static DESKTOP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)windows nt|macintosh|x11|linux|\bcros\b").expect("Invalid desktop regex")
});

/// Operating system rules, first match wins
static OS_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)windows phone", "Windows Phone"),
        (r"(?i)windows", "Windows"),
        (r"(?i)iphone|ipad|ipod", "iOS"),
        (r"(?i)android", "Android"),
        (r"(?i)\bcros\b", "ChromeOS"),
        (r"(?i)mac os x|macintosh", "macOS"),
        (r"(?i)linux|x11", "Linux"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).expect("Invalid OS regex"), name))
    .collect()
});

/// Browser rules, first match wins. Chromium derivatives carry `Chrome/` too, so they go first.
static BROWSER_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)edg(e|a|ios)?/", "Edge"),
        (r"(?i)opr/|opera", "Opera"),
        (r"(?i)samsungbrowser/", "Samsung Internet"),
        (r"(?i)firefox/|fxios/", "Firefox"),
        (r"(?i)chrome/|crios/|chromium/", "Chrome"),
        (r"(?i)safari/", "Safari"),
        (r"(?i)msie |trident/", "Internet Explorer"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).expect("Invalid browser regex"), name))
    .collect()
});

/// Broad form factor of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "Desktop",
            Self::Mobile => "Mobile",
            Self::Tablet => "Tablet",
            Self::Unknown => UNKNOWN,
        }
    }
}

impl FromStr for DeviceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Desktop" => Ok(Self::Desktop),
            "Mobile" => Ok(Self::Mobile),
            "Tablet" => Ok(Self::Tablet),
            UNKNOWN => Ok(Self::Unknown),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown device type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a raw client signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub os: String,
    pub browser: String,
    pub display_name: String,
}

impl DeviceInfo {
    /// Classify a raw client signature. Never fails; unmatched fields are `"Unknown"`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use vigil_core::device::{DeviceInfo, DeviceType};
    ///
    /// let info = DeviceInfo::classify(
    ///     "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    /// );
    /// assert_eq!(info.device_type, DeviceType::Desktop);
    /// assert_eq!(info.os, "Windows");
    /// assert_eq!(info.browser, "Chrome");
    /// ```
    pub fn classify(user_agent: &str) -> Self {
        let device_type = classify_device_type(user_agent);
        let os = first_match(&OS_RULES, user_agent);
        let browser = first_match(&BROWSER_RULES, user_agent);

        let display_name = if os == UNKNOWN && browser == UNKNOWN {
            UNKNOWN.to_string()
        } else {
            format!("{browser} on {os}")
        };

        Self {
            device_type,
            os: os.to_string(),
            browser: browser.to_string(),
            display_name,
        }
    }

    /// Stable signature for this classification and the raw client signature it came from
    ///
    /// The raw signature is part of the digest, so two different raw strings never share
    /// a signature even when both classify as entirely unknown.
    pub fn signature(&self, user_agent: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.device_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.os.as_bytes());
        hasher.update(b"|");
        hasher.update(self.browser.as_bytes());
        hasher.update(b"|");
        hasher.update(user_agent.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_unknown(&self) -> bool {
        self.device_type == DeviceType::Unknown && self.os == UNKNOWN && self.browser == UNKNOWN
    }
}

fn classify_device_type(user_agent: &str) -> DeviceType {
    if TABLET_RE.is_match(user_agent) {
        return DeviceType::Tablet;
    }
    if MOBILE_RE.is_match(user_agent) {
        return DeviceType::Mobile;
    }
    // Android without the "Mobile" token is a tablet by convention
    if user_agent.to_ascii_lowercase().contains("android") {
        return DeviceType::Tablet;
    }
    if DESKTOP_RE.is_match(user_agent) {
        return DeviceType::Desktop;
    }
    DeviceType::Unknown
}

fn first_match(rules: &[(Regex, &'static str)], user_agent: &str) -> &'static str {
    rules
        .iter()
        .find(|(re, _)| re.is_match(user_agent))
        .map_or(UNKNOWN, |(_, name)| *name)
}

/// How much a device has earned trust through repeated successful logins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustLevel {
    Low,
    Medium,
    High,
}

impl TrustLevel {
    /// 1 login is Low, 2 to 9 Medium, 10 or more High
    pub fn from_login_count(login_count: u32) -> Self {
        match login_count {
            0..=1 => Self::Low,
            2..=9 => Self::Medium,
            _ => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl FromStr for TrustLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown trust level: {other}"
            ))),
        }
    }
}

/// A device a user has successfully logged in from, unique per `(user_id, device_signature)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedDevice {
    pub id: i64,
    pub user_id: UserId,
    pub device_signature: String,
    pub device: DeviceInfo,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub login_count: u32,
    /// `false` once blocked; a blocked device is never trusted again until unblocked
    pub is_active: bool,
    pub blocked_reason: Option<String>,
    pub trust_level: TrustLevel,
    /// Risk score of the most recent successful login from this device
    pub risk_score: u8,
}

impl TrustedDevice {
    pub fn is_blocked(&self) -> bool {
        !self.is_active
    }
}

/// Input for registering a device on its first successful login
#[derive(Debug, Clone)]
pub struct NewTrustedDevice {
    pub user_id: UserId,
    pub device_signature: String,
    pub device: DeviceInfo,
    pub seen_at: DateTime<Utc>,
    pub risk_score: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const SAFARI_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const CHROME_ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const CHROME_ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    const SAFARI_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";

    #[test]
    fn test_classify_desktop_chrome_windows() {
        let info = DeviceInfo::classify(CHROME_WINDOWS);
        assert_eq!(info.device_type, DeviceType::Desktop);
        assert_eq!(info.os, "Windows");
        assert_eq!(info.browser, "Chrome");
        assert_eq!(info.display_name, "Chrome on Windows");
    }

    #[test]
    fn test_classify_iphone_is_ios_not_macos() {
        let info = DeviceInfo::classify(SAFARI_IPHONE);
        assert_eq!(info.device_type, DeviceType::Mobile);
        assert_eq!(info.os, "iOS");
        assert_eq!(info.browser, "Safari");
    }

    #[test]
    fn test_classify_ipad_is_tablet() {
        let info = DeviceInfo::classify(SAFARI_IPAD);
        assert_eq!(info.device_type, DeviceType::Tablet);
        assert_eq!(info.os, "iOS");
    }

    #[test]
    fn test_classify_android_phone_and_tablet() {
        let phone = DeviceInfo::classify(CHROME_ANDROID_PHONE);
        assert_eq!(phone.device_type, DeviceType::Mobile);
        assert_eq!(phone.os, "Android");
        assert_eq!(phone.browser, "Chrome");

        let tablet = DeviceInfo::classify(CHROME_ANDROID_TABLET);
        assert_eq!(tablet.device_type, DeviceType::Tablet);
        assert_eq!(tablet.os, "Android");
    }

    #[test]
    fn test_classify_browser_precedence() {
        assert_eq!(DeviceInfo::classify(EDGE_WINDOWS).browser, "Edge");
        assert_eq!(DeviceInfo::classify(FIREFOX_LINUX).browser, "Firefox");
        assert_eq!(DeviceInfo::classify(FIREFOX_LINUX).os, "Linux");
        assert_eq!(DeviceInfo::classify(SAFARI_MAC).browser, "Safari");
        assert_eq!(DeviceInfo::classify(SAFARI_MAC).os, "macOS");
    }

    #[test]
    fn test_classify_unknown() {
        for raw in ["", "A", "curl/8.4.0", "\u{0}\u{1}"] {
            let info = DeviceInfo::classify(raw);
            assert!(info.is_unknown(), "{raw:?} should be unknown");
            assert_eq!(info.display_name, UNKNOWN);
        }
    }

    #[test]
    fn test_signature_identical_input_collides() {
        let a = DeviceInfo::classify(CHROME_WINDOWS).signature(CHROME_WINDOWS);
        let b = DeviceInfo::classify(CHROME_WINDOWS).signature(CHROME_WINDOWS);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let unknown_a = DeviceInfo::classify("A").signature("A");
        let unknown_b = DeviceInfo::classify("A").signature("A");
        assert_eq!(unknown_a, unknown_b);
    }

    #[test]
    fn test_signature_distinct_unknown_inputs_differ() {
        let first = DeviceInfo::classify("agent-one").signature("agent-one");
        let second = DeviceInfo::classify("agent-two").signature("agent-two");
        assert!(DeviceInfo::classify("agent-one").is_unknown());
        assert_ne!(first, second);
    }

    #[test]
    fn test_trust_level_from_login_count() {
        assert_eq!(TrustLevel::from_login_count(1), TrustLevel::Low);
        assert_eq!(TrustLevel::from_login_count(2), TrustLevel::Medium);
        assert_eq!(TrustLevel::from_login_count(9), TrustLevel::Medium);
        assert_eq!(TrustLevel::from_login_count(10), TrustLevel::High);
    }

    #[test]
    fn test_enum_round_trip_through_storage_strings() {
        for device_type in [
            DeviceType::Desktop,
            DeviceType::Mobile,
            DeviceType::Tablet,
            DeviceType::Unknown,
        ] {
            assert_eq!(device_type.as_str().parse::<DeviceType>().unwrap(), device_type);
        }
        assert!("Phablet".parse::<DeviceType>().is_err());
        assert_eq!("High".parse::<TrustLevel>().unwrap(), TrustLevel::High);
    }
}
