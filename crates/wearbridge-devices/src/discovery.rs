/*!
 * Reconnection by advertisement.
 *
 * The [`ScanCoordinator`] decides what a radio sighting means for a device
 * waiting to be seen. It is pure policy: it never touches the registry or a
 * driver, it only returns what the owner should do and remembers the
 * timestamps it needs to validate deferred reverts.
 */
use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use wearbridge_core::config::ScanningConfig;
use wearbridge_core::types::Address;

use crate::device::{CapabilityDescriptor, ConnectionState, DeviceHandle};
use crate::prefs::{keys, Preferences};

/// Per-device scan tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// How long a sighted device stays SCANNED
    pub debounce: Duration,
    /// Minimum quiet time before a sighting is acted on again
    pub unseen: Duration,
    /// Weaker sightings are ignored
    pub rssi_threshold: i32,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::from_config(&ScanningConfig::default())
    }
}

impl ScanPolicy {
    /// Defaults from the scanning config section
    pub fn from_config(config: &ScanningConfig) -> Self {
        Self {
            debounce: Duration::from_secs(config.debounce_seconds),
            unseen: Duration::from_secs(config.unseen_seconds),
            rssi_threshold: config.rssi_threshold,
        }
    }

    /// Apply a device's preference overrides to these defaults
    pub fn for_device(&self, prefs: &dyn Preferences, address: &Address) -> Self {
        let seconds = |key: &str, default: Duration| {
            let value = prefs.device_int(address, key, default.as_secs() as i64);
            Duration::from_secs(value.max(0) as u64)
        };
        let rssi = prefs.device_int(address, keys::SCAN_RSSI, i64::from(self.rssi_threshold));
        Self {
            debounce: seconds(keys::SCAN_DEBOUNCE, self.debounce),
            unseen: seconds(keys::SCAN_UNSEEN, self.unseen),
            rssi_threshold: i32::try_from(rssi).unwrap_or(self.rssi_threshold),
        }
    }
}

/// Why a sighting changed nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The device is not waiting for a scan
    NotWaiting,
    /// Signal below the threshold
    WeakSignal,
    /// Seen again before the unseen interval elapsed
    RecentlySeen,
}

/// What the owner should do with a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingOutcome {
    /// Nothing
    Ignored(IgnoreReason),
    /// Move the device to SCANNED and schedule a revert at `revert_at`.
    /// The revert must carry `scanned_at` to validate itself.
    Scanned {
        /// When the revert is due
        revert_at: Instant,
        /// Snapshot identifying this SCANNED epoch
        scanned_at: Instant,
    },
    /// Start a connect right away
    ConnectDirect,
}

/// Initial state for a newly registered device
pub fn initial_state(capabilities: &CapabilityDescriptor) -> ConnectionState {
    if capabilities.connectable {
        ConnectionState::NotConnected
    } else {
        ConnectionState::WaitingForScan
    }
}

/// Debounce and unseen bookkeeping for every device
#[derive(Debug, Default)]
pub struct ScanCoordinator {
    last_seen: HashMap<Address, Instant>,
    scanned_at: HashMap<Address, Instant>,
}

impl ScanCoordinator {
    /// Create a coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a sighting of `device` at signal strength `rssi`
    pub fn on_sighting(
        &mut self,
        device: &DeviceHandle,
        capabilities: &CapabilityDescriptor,
        rssi: i32,
        policy: &ScanPolicy,
        now: Instant,
    ) -> SightingOutcome {
        let address = device.address();
        let state = device.state();
        if !matches!(state, ConnectionState::WaitingForScan | ConnectionState::Scanned) {
            trace!(address = %address, %state, "Sighting ignored, not waiting");
            return SightingOutcome::Ignored(IgnoreReason::NotWaiting);
        }

        if rssi < policy.rssi_threshold {
            trace!(address = %address, rssi, threshold = policy.rssi_threshold, "Sighting too weak");
            return SightingOutcome::Ignored(IgnoreReason::WeakSignal);
        }

        let previous = self.last_seen.insert(address.clone(), now);
        if let Some(previous) = previous {
            if now.saturating_duration_since(previous) < policy.unseen {
                trace!(address = %address, "Sighting within unseen interval");
                return SightingOutcome::Ignored(IgnoreReason::RecentlySeen);
            }
        }

        if capabilities.connectable {
            if state == ConnectionState::WaitingForScan {
                debug!(address = %address, rssi, "Sighted, connecting");
                return SightingOutcome::ConnectDirect;
            }
            return SightingOutcome::Ignored(IgnoreReason::NotWaiting);
        }

        self.scanned_at.insert(address.clone(), now);
        debug!(address = %address, rssi, debounce = ?policy.debounce, "Sighted");
        SightingOutcome::Scanned {
            revert_at: now + policy.debounce,
            scanned_at: now,
        }
    }

    /// A debounce timer fired. Returns true if the device should go back to
    /// WAITING_FOR_SCAN: it is still SCANNED and no later sighting replaced
    /// the epoch the timer was scheduled for.
    pub fn on_scan_timeout(
        &mut self,
        address: &Address,
        state: ConnectionState,
        scanned_at: Instant,
        now: Instant,
    ) -> bool {
        if state != ConnectionState::Scanned {
            return false;
        }
        if self.scanned_at.get(address) != Some(&scanned_at) {
            trace!(address = %address, "Stale scan timer");
            return false;
        }
        self.scanned_at.remove(address);
        self.last_seen.insert(address.clone(), now);
        true
    }

    /// Drop every timestamp for a device
    pub fn forget(&mut self, address: &Address) {
        self.last_seen.remove(address);
        self.scanned_at.remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceFamily;
    use crate::prefs::MemoryPreferences;

    fn beacon(state: ConnectionState) -> (DeviceHandle, CapabilityDescriptor) {
        let mut device = DeviceHandle::new("AA:BB:CC:DD:EE:10", DeviceFamily::Thermometer);
        device.set_state(state);
        (device, DeviceFamily::Thermometer.capabilities())
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(
            initial_state(&DeviceFamily::Thermometer.capabilities()),
            ConnectionState::WaitingForScan
        );
        assert_eq!(
            initial_state(&DeviceFamily::MiBand.capabilities()),
            ConnectionState::NotConnected
        );
    }

    #[test]
    fn test_weak_sighting_changes_nothing() {
        let mut scanner = ScanCoordinator::new();
        let policy = ScanPolicy::default();
        let (device, caps) = beacon(ConnectionState::WaitingForScan);
        let now = Instant::now();

        let outcome = scanner.on_sighting(&device, &caps, policy.rssi_threshold - 1, &policy, now);
        assert_eq!(outcome, SightingOutcome::Ignored(IgnoreReason::WeakSignal));
        assert!(scanner.last_seen.is_empty());
    }

    #[test]
    fn test_threshold_sighting_scans_after_unseen() {
        let mut scanner = ScanCoordinator::new();
        let policy = ScanPolicy {
            debounce: Duration::from_secs(60),
            unseen: Duration::from_secs(30),
            rssi_threshold: -80,
        };
        let (mut device, caps) = beacon(ConnectionState::WaitingForScan);
        let start = Instant::now();

        let first = scanner.on_sighting(&device, &caps, -80, &policy, start);
        assert_eq!(
            first,
            SightingOutcome::Scanned {
                revert_at: start + Duration::from_secs(60),
                scanned_at: start,
            }
        );

        device.set_state(ConnectionState::WaitingForScan);
        let soon = start + Duration::from_secs(10);
        assert_eq!(
            scanner.on_sighting(&device, &caps, -50, &policy, soon),
            SightingOutcome::Ignored(IgnoreReason::RecentlySeen)
        );

        let later = soon + Duration::from_secs(31);
        assert!(matches!(
            scanner.on_sighting(&device, &caps, -80, &policy, later),
            SightingOutcome::Scanned { .. }
        ));
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut scanner = ScanCoordinator::new();
        let policy = ScanPolicy::default();
        let (device, caps) = beacon(ConnectionState::WaitingForScan);
        let start = Instant::now();

        let first = match scanner.on_sighting(&device, &caps, -40, &policy, start) {
            SightingOutcome::Scanned { scanned_at, .. } => scanned_at,
            other => panic!("unexpected {:?}", other),
        };

        let (device, _) = beacon(ConnectionState::Scanned);
        let again = start + Duration::from_secs(5);
        let second = match scanner.on_sighting(&device, &caps, -40, &policy, again) {
            SightingOutcome::Scanned { scanned_at, .. } => scanned_at,
            other => panic!("unexpected {:?}", other),
        };

        let address = device.address().clone();
        let fire = start + Duration::from_secs(60);
        assert!(!scanner.on_scan_timeout(&address, ConnectionState::Scanned, first, fire));
        assert!(!scanner.on_scan_timeout(&address, ConnectionState::Connecting, second, fire));
        assert!(scanner.on_scan_timeout(&address, ConnectionState::Scanned, second, fire));
        assert!(!scanner.on_scan_timeout(&address, ConnectionState::Scanned, second, fire));
    }

    #[test]
    fn test_connectable_device_connects_directly() {
        let mut scanner = ScanCoordinator::new();
        let policy = ScanPolicy::default();
        let mut device = DeviceHandle::new("AA:BB:CC:DD:EE:11", DeviceFamily::MiBand);
        let caps = DeviceFamily::MiBand.capabilities();

        assert_eq!(
            scanner.on_sighting(&device, &caps, -60, &policy, Instant::now()),
            SightingOutcome::Ignored(IgnoreReason::NotWaiting)
        );

        device.set_state(ConnectionState::WaitingForScan);
        assert_eq!(
            scanner.on_sighting(&device, &caps, -60, &policy, Instant::now()),
            SightingOutcome::ConnectDirect
        );
    }

    #[test]
    fn test_policy_reads_device_overrides() {
        let address = Address::new("AA:BB:CC:DD:EE:10");
        let prefs = MemoryPreferences::new()
            .with_device(&address, keys::SCAN_RSSI, -70)
            .with_device(&address, keys::SCAN_DEBOUNCE, "15");
        let policy = ScanPolicy::default().for_device(&prefs, &address);

        assert_eq!(policy.rssi_threshold, -70);
        assert_eq!(policy.debounce, Duration::from_secs(15));
        assert_eq!(policy.unseen, Duration::ZERO);
    }
}
