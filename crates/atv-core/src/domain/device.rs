//! Discovered devices, quality scoring and per-session deduplication.
//!
//! A BLE scan reports many devices: phones, headphones, watches and
//! occasionally the TV the user actually wants.  Each observation becomes a
//! [`DiscoveredDevice`] with a heuristic *quality score* so the likeliest
//! TV candidates sort to the top of the list.
//!
//! # Scoring
//!
//! ```text
//! signal tier     RSSI > -50 → +50   > -70 → +30   > -85 → +10   else +0
//! named device    +20   (non-empty and not "unknown")
//! TV keyword      +100  ("android tv", "chromecast", "fire tv", ...)
//! brand token     +25   ("google", "nvidia", "sony", ...)
//! negative word   -50   ("phone", "headphone", "watch", ...)
//! ```
//!
//! The total is not clamped; negative scores are legal.  A device that
//! reports no RSSI is scored and filtered as if it had reported
//! [`WORST_CASE_RSSI`].
//!
//! # Deduplication
//!
//! The same address is usually seen in several scan attempts.
//! [`DeviceTable`] keeps one entry per address and replaces it only when a
//! later observation scores *strictly* higher, so ties keep the first-seen
//! observation.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RSSI assumed for devices that do not report signal strength.
pub const WORST_CASE_RSSI: i16 = -100;

/// Devices weaker than this are dropped unless they look like a TV.
pub const MIN_RSSI: i16 = -90;

/// Upper bound on the ranked result list.
pub const MAX_RESULTS: usize = 50;

/// Name fragments of Android TV and streaming devices.
const TV_KEYWORDS: &[&str] = &[
    "android tv",
    "google tv",
    "chromecast",
    "nvidia shield",
    "mi box",
    "fire tv",
    "roku",
    "smart tv",
    "tv box",
    "kodi",
    "media player",
    "streaming",
];

/// Manufacturers known to ship Android TV hardware.
const BRAND_TOKENS: &[&str] = &[
    "google",
    "android",
    "chromecast",
    "nvidia",
    "xiaomi",
    "samsung",
    "lg",
    "sony",
    "tcl",
];

/// Device classes that are never the intended target.
const NEGATIVE_KEYWORDS: &[&str] = &[
    "phone",
    "headphone",
    "earbud",
    "watch",
    "fitness",
    "mouse",
    "keyboard",
    "tablet",
];

const SIGNAL_TIERS: &[(i16, i32)] = &[(-50, 50), (-70, 30), (-85, 10)];

const NAME_BONUS: i32 = 20;
const TV_BONUS: i32 = 100;
const BRAND_BONUS: i32 = 25;
const NEGATIVE_PENALTY: i32 = -50;

/// Transport-specific advertisement data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// Advertised GATT service UUIDs.
    pub service_uuids: Vec<Uuid>,
    /// Manufacturer-specific data keyed by company identifier.
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

/// One device observation from a discovery session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// IPv4 address or Bluetooth MAC, depending on the transport.
    pub address: String,
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Zero-based scan attempt that produced this observation.
    pub attempt: u32,
    pub quality_score: i32,
    pub metadata: DeviceMetadata,
}

impl DiscoveredDevice {
    /// Creates an observation and computes its quality score.
    pub fn new(
        address: impl Into<String>,
        name: Option<String>,
        rssi: Option<i16>,
        attempt: u32,
    ) -> Self {
        let name = name.filter(|n| !n.trim().is_empty());
        let quality_score = quality_score(name.as_deref(), rssi);
        Self {
            address: address.into(),
            name,
            rssi,
            attempt,
            quality_score,
            metadata: DeviceMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: DeviceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Display name, or `"Unknown Device"` when the device advertised none.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Device")
    }

    /// RSSI used for scoring and filtering.
    pub fn effective_rssi(&self) -> i16 {
        self.rssi.unwrap_or(WORST_CASE_RSSI)
    }

    pub fn is_android_tv(&self) -> bool {
        self.name.as_deref().is_some_and(is_android_tv_name)
    }
}

/// Points awarded for signal strength alone.
pub fn signal_points(rssi: Option<i16>) -> i32 {
    let rssi = rssi.unwrap_or(WORST_CASE_RSSI);
    SIGNAL_TIERS
        .iter()
        .find(|(threshold, _)| rssi > *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(0)
}

/// Computes the quality score for a device name and signal strength.
pub fn quality_score(name: Option<&str>, rssi: Option<i16>) -> i32 {
    let mut score = signal_points(rssi);

    let Some(name) = name else {
        return score;
    };
    let lower = name.trim().to_lowercase();
    if has_real_name(&lower) {
        score += NAME_BONUS;
        if contains_any(&lower, TV_KEYWORDS) {
            score += TV_BONUS;
        }
        if contains_any(&lower, BRAND_TOKENS) {
            score += BRAND_BONUS;
        }
    }
    if contains_any(&lower, NEGATIVE_KEYWORDS) {
        score += NEGATIVE_PENALTY;
    }
    score
}

/// Returns `true` if `name` contains an Android TV or media-device keyword.
pub fn is_android_tv_name(name: &str) -> bool {
    contains_any(&name.to_lowercase(), TV_KEYWORDS)
}

/// Returns `true` if `name` contains a known TV manufacturer token.
pub fn has_brand_token(name: &str) -> bool {
    contains_any(&name.to_lowercase(), BRAND_TOKENS)
}

/// Returns `true` if `name` identifies a device class that is never a TV.
pub fn is_excluded_name(name: &str) -> bool {
    contains_any(&name.to_lowercase(), NEGATIVE_KEYWORDS)
}

/// Decides whether a device survives result filtering.
pub fn should_keep(device: &DiscoveredDevice) -> bool {
    if device.name.as_deref().is_some_and(is_excluded_name) {
        return false;
    }
    device.effective_rssi() >= MIN_RSSI || device.is_android_tv()
}

/// Filters, sorts by descending score and truncates to `cap`.
///
/// The sort is stable: equal scores keep their input order.
pub fn rank_devices(
    devices: impl IntoIterator<Item = DiscoveredDevice>,
    cap: usize,
) -> Vec<DiscoveredDevice> {
    let mut ranked: Vec<DiscoveredDevice> = devices.into_iter().filter(should_keep).collect();
    ranked.sort_by(|a, b| b.quality_score.cmp(&a.quality_score));
    ranked.truncate(cap);
    ranked
}

fn has_real_name(lower: &str) -> bool {
    !lower.is_empty() && lower != "unknown" && lower != "unknown device"
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

// ── Deduplication ─────────────────────────────────────────────────────────────

/// Deduplication map for one discovery session, keyed by address.
#[derive(Debug, Default)]
pub struct DeviceTable {
    entries: HashMap<String, DiscoveredDevice>,
    /// Addresses in first-seen order, for stable ranking.
    order: Vec<String>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an observation.
    ///
    /// Returns `true` if the observation was inserted or replaced the stored
    /// one, which happens only when its score is strictly greater.
    pub fn merge(&mut self, device: DiscoveredDevice) -> bool {
        match self.entries.get_mut(&device.address) {
            Some(existing) => {
                if device.quality_score > existing.quality_score {
                    *existing = device;
                    true
                } else {
                    false
                }
            }
            None => {
                self.order.push(device.address.clone());
                self.entries.insert(device.address.clone(), device);
                true
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&DiscoveredDevice> {
        self.entries.get(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the table and returns the ranked, filtered result list.
    pub fn into_ranked(mut self, cap: usize) -> Vec<DiscoveredDevice> {
        let devices: Vec<DiscoveredDevice> = self
            .order
            .iter()
            .filter_map(|addr| self.entries.remove(addr))
            .collect();
        rank_devices(devices, cap)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
