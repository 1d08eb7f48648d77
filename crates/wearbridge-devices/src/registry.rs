/*!
 * Connection registry.
 *
 * The authoritative set of known devices. Each entry holds exactly one
 * device handle, one capability descriptor and at most one live driver.
 * The registry is owned by the dispatcher, which serialises every mutation,
 * so it needs no locking of its own.
 */
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use wearbridge_core::types::Address;
use wearbridge_core::utils::with_timeout;

use crate::device::{BatteryState, CapabilityDescriptor, ConnectionState, DeviceHandle};
use crate::driver::SharedDriver;
use crate::error::{DeviceError, Result};

/// One registered device
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    device: DeviceHandle,
    capabilities: Arc<CapabilityDescriptor>,
    driver: Option<SharedDriver>,
}

impl RegistryEntry {
    fn new(device: DeviceHandle) -> Self {
        let capabilities = Arc::new(device.family().capabilities());
        Self {
            device,
            capabilities,
            driver: None,
        }
    }

    /// The device handle
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// The capability descriptor of the current epoch
    pub fn capabilities(&self) -> &Arc<CapabilityDescriptor> {
        &self.capabilities
    }

    /// The live driver, if any
    pub fn driver(&self) -> Option<&SharedDriver> {
        self.driver.as_ref()
    }

    /// Device address
    pub fn address(&self) -> &Address {
        self.device.address()
    }
}

/// The connection registry
#[derive(Debug)]
pub struct ConnectionRegistry {
    entries: HashMap<Address, RegistryEntry>,
    order: Vec<Address>,
    dispose_timeout: Duration,
}

impl ConnectionRegistry {
    /// Create a registry that waits at most `dispose_timeout` per disposal
    pub fn new(dispose_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            dispose_timeout,
        }
    }

    /// Register a device. Registering a known address returns the existing
    /// entry untouched.
    pub fn register(&mut self, device: DeviceHandle) -> &RegistryEntry {
        let address = device.address().clone();
        if !self.entries.contains_key(&address) {
            debug!(address = %address, family = %device.family(), "Registered device");
            self.entries.insert(address.clone(), RegistryEntry::new(device));
            self.order.push(address.clone());
        }
        &self.entries[&address]
    }

    /// Look up a device
    pub fn lookup(&self, address: &Address) -> Option<&RegistryEntry> {
        self.entries.get(address)
    }

    /// Look up a device or fail with device-not-found
    pub fn require(&self, address: &Address) -> Result<&RegistryEntry> {
        self.lookup(address)
            .ok_or_else(|| DeviceError::DeviceNotFound(address.clone()))
    }

    /// Whether a device is registered
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no devices are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.order.iter().filter_map(|address| self.entries.get(address))
    }

    /// All addresses in registration order
    pub fn addresses(&self) -> Vec<Address> {
        self.order.clone()
    }

    /// Attach a live driver. Fails if one is already attached.
    pub fn attach_driver(&mut self, address: &Address, driver: SharedDriver) -> Result<()> {
        let entry = self
            .entries
            .get_mut(address)
            .ok_or_else(|| DeviceError::DeviceNotFound(address.clone()))?;

        if entry.driver.is_some() {
            return Err(DeviceError::DriverAlreadyAttached(address.clone()));
        }

        entry.driver = Some(driver);
        debug!(address = %address, "Attached driver");
        Ok(())
    }

    /// Detach the driver without disposing it
    pub fn take_driver(&mut self, address: &Address) -> Option<SharedDriver> {
        self.entries.get_mut(address)?.driver.take()
    }

    /// Detach the driver and dispose it.
    ///
    /// Returns whether a driver was present. Disposal failures and timeouts
    /// are logged, never returned; the slot is cleared either way.
    pub async fn detach_and_dispose(&mut self, address: &Address) -> bool {
        let Some(driver) = self.take_driver(address) else {
            return false;
        };

        match with_timeout(self.dispose_timeout, driver.dispose()).await {
            Ok(()) => debug!(address = %address, "Disposed driver"),
            Err(e) => warn!(address = %address, "Failed to dispose driver: {}", e),
        }
        true
    }

    /// Remove a device, disposing its driver first
    pub async fn remove(&mut self, address: &Address) -> Option<DeviceHandle> {
        if !self.contains(address) {
            return None;
        }

        self.detach_and_dispose(address).await;
        let entry = self.entries.remove(address)?;
        self.order.retain(|a| a != address);
        info!(address = %address, "Removed device");
        Some(entry.device)
    }

    /// Move a device to a new connection state, returning the previous one
    pub fn set_state(&mut self, address: &Address, state: ConnectionState) -> Result<ConnectionState> {
        let entry = self
            .entries
            .get_mut(address)
            .ok_or_else(|| DeviceError::DeviceNotFound(address.clone()))?;

        let previous = entry.device.set_state(state);
        if previous == state {
            return Ok(previous);
        }
        if !previous.is_expected_transition(state) {
            debug!(address = %address, %previous, %state, "Unexpected state transition");
        } else {
            debug!(address = %address, %previous, %state, "State changed");
        }
        Ok(previous)
    }

    /// Record battery information
    pub fn record_battery(
        &mut self,
        address: &Address,
        level: Option<u8>,
        state: Option<BatteryState>,
    ) -> Result<()> {
        let entry = self
            .entries
            .get_mut(address)
            .ok_or_else(|| DeviceError::DeviceNotFound(address.clone()))?;
        entry.device.set_battery(level, state);
        Ok(())
    }

    /// Record firmware and model information
    pub fn record_info(
        &mut self,
        address: &Address,
        firmware: Option<String>,
        model: Option<String>,
    ) -> Result<()> {
        let entry = self
            .entries
            .get_mut(address)
            .ok_or_else(|| DeviceError::DeviceNotFound(address.clone()))?;
        entry.device.set_info(firmware, model);
        Ok(())
    }

    /// Replace a device's family and alias, and with them its capability
    /// descriptor. Connection state and driver are kept.
    pub fn update_device(&mut self, device: DeviceHandle) -> Result<()> {
        let address = device.address().clone();
        let entry = self
            .entries
            .get_mut(&address)
            .ok_or_else(|| DeviceError::DeviceNotFound(address.clone()))?;

        entry.device.set_family(device.family());
        entry.device.set_alias(device.alias().map(str::to_string));
        entry.capabilities = Arc::new(device.family().capabilities());
        debug!(address = %address, family = %device.family(), "Updated device");
        Ok(())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceFamily;
    use crate::drivers::test::TestBench;
    use crate::driver::{DriverContext, RadioAdapter};
    use crate::prefs::MemoryPreferences;
    use tokio::sync::mpsc;

    fn driver_for(bench: &Arc<TestBench>, address: &str) -> SharedDriver {
        let (tx, _rx) = mpsc::unbounded_channel();
        let context = DriverContext::new(
            Address::new(address),
            DeviceFamily::Test,
            Arc::new(RadioAdapter::new(true, true)),
            Arc::new(MemoryPreferences::new()),
            tx,
        );
        (bench.constructor())(context).unwrap()
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ConnectionRegistry::default();

        registry.register(DeviceHandle::new("AA:BB:CC:DD:EE:01", DeviceFamily::MiBand));
        registry.register(
            DeviceHandle::new("aa:bb:cc:dd:ee:01", DeviceFamily::Pebble).with_alias("dup"),
        );

        assert_eq!(registry.len(), 1);
        let entry = registry.lookup(&Address::new("AA:BB:CC:DD:EE:01")).unwrap();
        assert_eq!(entry.device().family(), DeviceFamily::MiBand);
        assert_eq!(entry.device().alias(), None);
        assert_eq!(entry.device().state(), ConnectionState::NotConnected);
    }

    #[test]
    fn test_at_most_one_driver() {
        let bench = TestBench::new();
        let mut registry = ConnectionRegistry::default();
        registry.register(DeviceHandle::new("watch", DeviceFamily::Test));

        let address = Address::new("watch");
        registry.attach_driver(&address, driver_for(&bench, "watch")).unwrap();
        let second = registry.attach_driver(&address, driver_for(&bench, "watch"));
        assert!(matches!(second, Err(DeviceError::DriverAlreadyAttached(_))));

        let missing = registry.attach_driver(&Address::new("nope"), driver_for(&bench, "nope"));
        assert!(matches!(missing, Err(DeviceError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_detach_and_dispose_is_idempotent() {
        let bench = TestBench::new();
        let mut registry = ConnectionRegistry::default();
        registry.register(DeviceHandle::new("watch", DeviceFamily::Test));
        let address = Address::new("watch");
        registry.attach_driver(&address, driver_for(&bench, "watch")).unwrap();

        assert!(registry.detach_and_dispose(&address).await);
        assert!(!registry.detach_and_dispose(&address).await);
        assert!(!registry.detach_and_dispose(&Address::new("unknown")).await);
        assert!(registry.lookup(&address).unwrap().driver().is_none());
        assert_eq!(bench.dispose_count(&address), 1);
    }

    #[tokio::test]
    async fn test_failed_dispose_still_clears_slot() {
        let bench = TestBench::new();
        let address = Address::new("watch");
        bench.fail_dispose(&address);

        let mut registry = ConnectionRegistry::default();
        registry.register(DeviceHandle::new("watch", DeviceFamily::Test));
        registry.attach_driver(&address, driver_for(&bench, "watch")).unwrap();

        assert!(registry.detach_and_dispose(&address).await);
        assert!(registry.lookup(&address).unwrap().driver().is_none());
    }

    #[tokio::test]
    async fn test_remove_disposes_and_forgets() {
        let bench = TestBench::new();
        let mut registry = ConnectionRegistry::default();
        registry.register(DeviceHandle::new("one", DeviceFamily::Test));
        registry.register(DeviceHandle::new("two", DeviceFamily::Test));
        let one = Address::new("one");
        registry.attach_driver(&one, driver_for(&bench, "one")).unwrap();

        let removed = registry.remove(&one).await.unwrap();
        assert_eq!(removed.address(), &one);
        assert_eq!(bench.dispose_count(&one), 1);
        assert_eq!(registry.addresses(), vec![Address::new("two")]);
        assert!(registry.remove(&one).await.is_none());
    }

    #[test]
    fn test_set_state_returns_previous() {
        let mut registry = ConnectionRegistry::default();
        registry.register(DeviceHandle::new("watch", DeviceFamily::Test));
        let address = Address::new("watch");

        let previous = registry.set_state(&address, ConnectionState::Connecting).unwrap();
        assert_eq!(previous, ConnectionState::NotConnected);
        let previous = registry.set_state(&address, ConnectionState::Connecting).unwrap();
        assert_eq!(previous, ConnectionState::Connecting);

        // Applied even though the lifecycle does not expect it.
        let previous = registry.set_state(&address, ConnectionState::Scanned).unwrap();
        assert_eq!(previous, ConnectionState::Connecting);
        assert_eq!(
            registry.lookup(&address).unwrap().device().state(),
            ConnectionState::Scanned
        );
        assert!(registry.set_state(&Address::new("x"), ConnectionState::Connected).is_err());
    }

    #[test]
    fn test_update_device_replaces_descriptor() {
        let mut registry = ConnectionRegistry::default();
        registry.register(DeviceHandle::new("AA:BB:CC:DD:EE:02", DeviceFamily::CasioWatch));
        let address = Address::new("AA:BB:CC:DD:EE:02");
        registry.set_state(&address, ConnectionState::Connected).unwrap();
        let before = registry.lookup(&address).unwrap().capabilities().clone();
        assert!(!before.weather);

        registry
            .update_device(DeviceHandle::new("AA:BB:CC:DD:EE:02", DeviceFamily::Pebble).with_alias("renamed"))
            .unwrap();

        let entry = registry.lookup(&address).unwrap();
        assert!(entry.capabilities().weather);
        assert!(!Arc::ptr_eq(entry.capabilities(), &before));
        assert_eq!(entry.device().state(), ConnectionState::Connected);
        assert_eq!(entry.device().alias(), Some("renamed"));
    }
}
