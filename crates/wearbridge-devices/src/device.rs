/*!
 * Device model: handles, connection states and capability descriptors.
 *
 * A [`DeviceHandle`] is the registry's view of one peripheral. Its mutable
 * parts (state, battery, firmware) are only written by the connection
 * registry, so everything outside this crate sees read-only accessors.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use wearbridge_core::types::Address;

use crate::error::DeviceError;

/// Connection state of a device.
///
/// Variants are ordered from "furthest away" to "ready for commands".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link and no attempt in progress
    NotConnected,
    /// Link lost, the driver will retry on its own
    WaitingForReconnect,
    /// Waiting for a passive advertisement
    WaitingForScan,
    /// Recently sighted by a passive scan
    Scanned,
    /// Connect in progress
    Connecting,
    /// Link up, device not yet ready
    Connected,
    /// Ready for ordinary commands
    Initialized,
}

impl ConnectionState {
    /// Link is up (connected or initialized)
    pub fn is_connected(self) -> bool {
        self >= ConnectionState::Connected
    }

    /// A connect is in progress
    pub fn is_connecting(self) -> bool {
        self == ConnectionState::Connecting
    }

    /// Whether moving to `next` follows the documented lifecycle.
    ///
    /// Drivers are authoritative about their link, so the registry applies
    /// unexpected transitions anyway and only reports them.
    pub fn is_expected_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        if self == next || next == NotConnected {
            return true;
        }
        match self {
            NotConnected => matches!(next, WaitingForScan | WaitingForReconnect | Connecting),
            WaitingForScan => matches!(next, Scanned | Connecting),
            Scanned => matches!(next, WaitingForScan | Connecting),
            Connecting => matches!(next, Connected | Initialized | WaitingForReconnect),
            Connected => matches!(next, Initialized | WaitingForReconnect),
            Initialized => matches!(next, Connected | WaitingForReconnect | WaitingForScan),
            WaitingForReconnect => matches!(next, Connecting | Connected | WaitingForScan),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::NotConnected => "NOT_CONNECTED",
            ConnectionState::WaitingForReconnect => "WAITING_FOR_RECONNECT",
            ConnectionState::WaitingForScan => "WAITING_FOR_SCAN",
            ConnectionState::Scanned => "SCANNED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Initialized => "INITIALIZED",
        };
        f.write_str(name)
    }
}

/// Battery charge state reported by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    /// Running on battery
    Discharging,
    /// Charging
    Charging,
    /// Charge is low
    Low,
    /// Fully charged
    Full,
}

/// Device families known to the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    /// Pebble smartwatch
    Pebble,
    /// Xiaomi Mi Band
    MiBand,
    /// Amazfit Bip
    AmazfitBip,
    /// Fossil hybrid watch
    FossilHybrid,
    /// Casio G-Shock with radio link
    CasioWatch,
    /// Garmin watch
    Garmin,
    /// Wireless earbuds
    Earbuds,
    /// Advertising-only thermometer
    Thermometer,
    /// Companion app reachable over a network socket
    NetworkCompanion,
    /// In-process simulated device
    Test,
}

impl DeviceFamily {
    /// All families, in catalog order
    pub const ALL: [DeviceFamily; 10] = [
        DeviceFamily::Pebble,
        DeviceFamily::MiBand,
        DeviceFamily::AmazfitBip,
        DeviceFamily::FossilHybrid,
        DeviceFamily::CasioWatch,
        DeviceFamily::Garmin,
        DeviceFamily::Earbuds,
        DeviceFamily::Thermometer,
        DeviceFamily::NetworkCompanion,
        DeviceFamily::Test,
    ];

    /// The configuration name of the family
    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::Pebble => "pebble",
            DeviceFamily::MiBand => "mi_band",
            DeviceFamily::AmazfitBip => "amazfit_bip",
            DeviceFamily::FossilHybrid => "fossil_hybrid",
            DeviceFamily::CasioWatch => "casio_watch",
            DeviceFamily::Garmin => "garmin",
            DeviceFamily::Earbuds => "earbuds",
            DeviceFamily::Thermometer => "thermometer",
            DeviceFamily::NetworkCompanion => "network_companion",
            DeviceFamily::Test => "test",
        }
    }

    /// Capability descriptor for a fresh connection epoch of this family
    pub fn capabilities(self) -> CapabilityDescriptor {
        let base = CapabilityDescriptor::new(self, self.name());
        match self {
            DeviceFamily::Pebble => CapabilityDescriptor {
                weather: true,
                calendar: true,
                music: true,
                navigation: true,
                sleep_tracking: true,
                activity_fetch: true,
                ..base
            },
            DeviceFamily::MiBand => CapabilityDescriptor {
                weather: true,
                music: true,
                sleep_tracking: true,
                activity_fetch: true,
                ..base
            },
            DeviceFamily::AmazfitBip => CapabilityDescriptor {
                weather: true,
                calendar: true,
                music: true,
                navigation: true,
                activity_fetch: true,
                unicode_emoji: true,
                ..base
            },
            DeviceFamily::FossilHybrid => CapabilityDescriptor {
                weather: true,
                calendar: true,
                music: true,
                activity_fetch: true,
                ..base
            },
            DeviceFamily::CasioWatch => base,
            DeviceFamily::Garmin => CapabilityDescriptor {
                weather: true,
                calendar: true,
                music: true,
                navigation: true,
                sleep_tracking: true,
                activity_fetch: true,
                unicode_emoji: true,
                ..base
            },
            DeviceFamily::Earbuds => CapabilityDescriptor { music: true, ..base },
            DeviceFamily::Thermometer => CapabilityDescriptor {
                connectable: false,
                ..base
            },
            DeviceFamily::NetworkCompanion => CapabilityDescriptor {
                weather: true,
                music: true,
                unicode_emoji: true,
                radio: false,
                ..base
            },
            DeviceFamily::Test => CapabilityDescriptor {
                weather: true,
                calendar: true,
                music: true,
                navigation: true,
                sleep_tracking: true,
                activity_fetch: true,
                unicode_emoji: true,
                radio: false,
                ..base
            },
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceFamily {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DeviceFamily::ALL
            .iter()
            .copied()
            .find(|family| family.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DeviceError::unsupported(format!("unknown device family {}", wanted)))
    }
}

/// What a device family can do during one connection epoch.
///
/// Descriptors are replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Family this descriptor was derived from
    pub family: DeviceFamily,
    /// Driver tag used to pick a radio driver constructor
    pub driver: String,
    /// Accepts direct connections (false for advertising-only devices)
    pub connectable: bool,
    /// Uses the platform radio
    pub radio: bool,
    /// Shows weather
    pub weather: bool,
    /// Syncs calendar events
    pub calendar: bool,
    /// Controls or shows music playback
    pub music: bool,
    /// Shows turn-by-turn navigation
    pub navigation: bool,
    /// Bridges sleep tracking
    pub sleep_tracking: bool,
    /// Recorded activity can be fetched periodically
    pub activity_fetch: bool,
    /// Renders unicode emoji
    pub unicode_emoji: bool,
}

impl CapabilityDescriptor {
    /// A connectable radio device with no optional capabilities
    pub fn new(family: DeviceFamily, driver: &str) -> Self {
        Self {
            family,
            driver: driver.to_string(),
            connectable: true,
            radio: true,
            weather: false,
            calendar: false,
            music: false,
            navigation: false,
            sleep_tracking: false,
            activity_fetch: false,
            unicode_emoji: false,
        }
    }
}

/// One known device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHandle {
    address: Address,
    family: DeviceFamily,
    alias: Option<String>,
    state: ConnectionState,
    initialized: bool,
    battery_level: Option<u8>,
    battery_state: Option<BatteryState>,
    firmware: Option<String>,
    model: Option<String>,
}

impl DeviceHandle {
    /// Create a handle in `NOT_CONNECTED`
    pub fn new(address: impl Into<Address>, family: DeviceFamily) -> Self {
        Self {
            address: address.into(),
            family,
            alias: None,
            state: ConnectionState::NotConnected,
            initialized: false,
            battery_level: None,
            battery_state: None,
            firmware: None,
            model: None,
        }
    }

    /// Start in a given state, e.g. one restored from storage
    pub fn with_state(mut self, state: ConnectionState) -> Self {
        self.set_state(state);
        self
    }

    /// Set the user-visible alias
    pub fn with_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Device address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Device family
    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    /// User-visible alias
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Alias if set, otherwise the family name
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.family.name())
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the device finished initialisation in the current epoch
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Link is up
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// A connect is in progress
    pub fn is_connecting(&self) -> bool {
        self.state.is_connecting()
    }

    /// Last reported battery level in percent
    pub fn battery_level(&self) -> Option<u8> {
        self.battery_level
    }

    /// Last reported battery state
    pub fn battery_state(&self) -> Option<BatteryState> {
        self.battery_state
    }

    /// Firmware version
    pub fn firmware(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    /// Hardware model
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) -> ConnectionState {
        let previous = self.state;
        self.state = state;
        self.initialized = state == ConnectionState::Initialized;
        previous
    }

    pub(crate) fn set_battery(&mut self, level: Option<u8>, state: Option<BatteryState>) {
        if level.is_some() {
            self.battery_level = level;
        }
        if state.is_some() {
            self.battery_state = state;
        }
    }

    pub(crate) fn set_info(&mut self, firmware: Option<String>, model: Option<String>) {
        if firmware.is_some() {
            self.firmware = firmware;
        }
        if model.is_some() {
            self.model = model;
        }
    }

    pub(crate) fn set_family(&mut self, family: DeviceFamily) {
        self.family = family;
    }

    pub(crate) fn set_alias(&mut self, alias: Option<String>) {
        self.alias = alias;
    }
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for DeviceHandle {}
