//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::MAX_INTENSITY_LEVEL;

static MAC_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok());

/// Opaque identifier of a peripheral, the join key between discovery and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralAddress(String);

impl PeripheralAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Builds an address from a platform device id.
    ///
    /// Linux and Windows ids embed the MAC address, which is extracted and
    /// upper-cased. macOS only exposes an opaque UUID, which is kept verbatim.
    pub fn from_device_id(device_id: &str) -> Self {
        let mac = MAC_ADDRESS.as_ref().and_then(|re| {
            re.find_iter(device_id)
                .last()
                .map(|m| m.as_str().replace('-', ":").to_uppercase())
        });
        Self(mac.unwrap_or_else(|| device_id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A single advertisement sighting reported by the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advertisement {
    pub address: PeripheralAddress,
    /// The advertised local name, if any
    pub name: Option<String>,
    /// The signal strength (RSSI) of the sighting
    pub rssi: Option<i16>,
}

/// A peripheral emitted on the discovery stream (first sighting per cache cycle)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredPeripheral {
    pub address: PeripheralAddress,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub seen_at: DateTime<Utc>,
}

impl From<Advertisement> for DiscoveredPeripheral {
    fn from(adv: Advertisement) -> Self {
        Self {
            address: adv.address,
            name: adv.name,
            rssi: adv.rssi,
            seen_at: Utc::now(),
        }
    }
}

/// Status of the discovery engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Unknown,
    Scanning,
    Stopped,
    Error(i32),
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("UNKNOWN"),
            Self::Scanning => f.write_str("SCANNING"),
            Self::Stopped => f.write_str("STOPPED"),
            Self::Error(code) => write!(f, "ERROR {}", code),
        }
    }
}

/// Connection state of the session client.
///
/// `Connected` is the transient milestone between the link coming up and
/// service discovery finishing. Only `Ready` accepts reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Unknown,
    Connecting,
    Connected,
    Ready,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// LED color, one byte per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Human-facing label for an intensity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Intensity {
    Off,
    Low,
    Medium,
    High,
}

impl Intensity {
    /// Maps a raw level to its label. Levels outside 0..=3 fall back to `Low`.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Off,
            1 => Self::Low,
            2 => Self::Medium,
            MAX_INTENSITY_LEVEL => Self::High,
            _ => Self::Low,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => MAX_INTENSITY_LEVEL,
        }
    }
}

/// A value paired with the wall-clock instant it was produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timed<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> Timed<T> {
    pub fn now(value: T) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Latest known attributes of the connected light
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub color: Timed<Rgb>,
    pub intensity: Timed<u8>,
    pub active: Timed<bool>,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self {
            color: Timed::now(Rgb::BLACK),
            intensity: Timed::now(0),
            active: Timed::now(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mac_from_linux_style_id() {
        let address = PeripheralAddress::from_device_id("hci0/dev_aa-bb-cc-dd-ee-ff");
        assert_eq!(address.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn keeps_opaque_ids_verbatim() {
        let id = "6F1C2A3B-0000-4000-8000-00805F9B34FB";
        assert_eq!(PeripheralAddress::from_device_id(id).as_str(), id);
    }

    #[test]
    fn intensity_labels_follow_levels() {
        assert_eq!(Intensity::from_level(0), Intensity::Off);
        assert_eq!(Intensity::from_level(2), Intensity::Medium);
        assert_eq!(Intensity::from_level(MAX_INTENSITY_LEVEL), Intensity::High);
        assert_eq!(Intensity::from_level(9), Intensity::Low);
        assert_eq!(Intensity::High.level(), 3);
    }

    #[test]
    fn default_snapshot_is_black_and_off() {
        let snapshot = DeviceSnapshot::default();
        assert_eq!(snapshot.color.value, Rgb::BLACK);
        assert_eq!(snapshot.intensity.value, 0);
        assert!(!snapshot.active.value);
    }

    #[test]
    fn scan_status_display() {
        assert_eq!(ScanStatus::Error(7).to_string(), "ERROR 7");
        assert_eq!(ScanStatus::Scanning.to_string(), "SCANNING");
    }
}
