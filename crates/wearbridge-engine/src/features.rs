/*!
 * Capability aggregation.
 *
 * [`aggregate`] is a pure function of the registry. The dispatcher calls it
 * after every registry mutation and diffs the result against what is
 * currently subscribed.
 */
use std::collections::BTreeSet;

use wearbridge_core::types::Address;
use wearbridge_devices::device::CapabilityDescriptor;
use wearbridge_devices::registry::{ConnectionRegistry, RegistryEntry};

/// Union of optional capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSet {
    /// Weather
    pub weather: bool,
    /// Calendar sync
    pub calendar: bool,
    /// Music session
    pub music: bool,
    /// Navigation
    pub navigation: bool,
    /// Sleep tracking bridge
    pub sleep_tracking: bool,
    /// Activity auto-fetch
    pub activity_fetch: bool,
}

impl FeatureSet {
    /// OR a descriptor into the set
    pub fn include(&mut self, capabilities: &CapabilityDescriptor) {
        self.weather |= capabilities.weather;
        self.calendar |= capabilities.calendar;
        self.music |= capabilities.music;
        self.navigation |= capabilities.navigation;
        self.sleep_tracking |= capabilities.sleep_tracking;
        self.activity_fetch |= capabilities.activity_fetch;
    }
}

/// Result of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedFeatures {
    /// Capabilities needed by reachable devices
    pub features: FeatureSet,
    /// Some device is initialized or its driver will reconnect on its own
    pub any_work: bool,
    /// Some device is initialized
    pub any_initialized: bool,
    /// Reachable devices that sync calendars
    pub calendar_devices: BTreeSet<Address>,
}

/// A device counts towards the feature set while it is initialized or has a
/// driver that reconnects by itself
pub fn is_reachable(entry: &RegistryEntry) -> bool {
    entry.device().is_initialized()
        || entry.driver().map(|d| d.auto_reconnect()).unwrap_or(false)
}

/// Recompute the feature set from the registry
pub fn aggregate(registry: &ConnectionRegistry) -> AggregatedFeatures {
    let mut result = AggregatedFeatures::default();
    for entry in registry.entries().filter(|e| is_reachable(e)) {
        result.any_work = true;
        if entry.device().is_initialized() {
            result.any_initialized = true;
        }
        let capabilities = entry.capabilities();
        result.features.include(capabilities);
        if capabilities.calendar {
            result.calendar_devices.insert(entry.address().clone());
        }
    }
    result
}
