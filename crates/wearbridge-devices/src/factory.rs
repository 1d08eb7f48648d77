/*!
 * Driver factory.
 *
 * Picks a transport from the shape of a device address:
 *
 * - exactly one `:` (`host:port`): network socket driver
 * - several `:` (a radio MAC): the radio driver named by the device's
 *   capability descriptor
 * - no `:`: the address is itself a type tag looked up in the table of
 *   named constructors (simulated and test devices)
 *
 * The factory never caches; every call builds a fresh driver stamped with
 * a new generation, so events from a replaced driver can be told apart.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use wearbridge_core::types::Address;

use crate::device::{CapabilityDescriptor, DeviceHandle};
use crate::driver::{DriverContext, DriverEventSender, SharedDriver, SharedRadio};
use crate::error::{DeviceError, Result};
use crate::prefs::SharedPreferences;

/// A function building a driver from its context
pub type DriverConstructor = Arc<dyn Fn(DriverContext) -> Result<SharedDriver> + Send + Sync>;

/// Transport chosen for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// `host:port`
    Network,
    /// Radio MAC address
    Radio,
    /// Type tag resolved through the named constructor table
    Named,
}

impl Transport {
    /// Classify an address by its `:` separators
    pub fn classify(address: &Address) -> Self {
        let text = address.as_str();
        match text.find(':') {
            Some(first) if first > 0 => {
                if text.rfind(':') == Some(first) {
                    Transport::Network
                } else {
                    Transport::Radio
                }
            }
            _ => Transport::Named,
        }
    }
}

/// Availability of the platform radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    /// Present and switched on
    Ready,
    /// No adapter on this host
    Missing,
    /// Adapter switched off
    Disabled,
}

impl RadioStatus {
    /// Advisory text for the user, if any
    pub fn advisory(self) -> Option<&'static str> {
        match self {
            RadioStatus::Ready => None,
            RadioStatus::Missing => Some("Bluetooth is not supported on this host"),
            RadioStatus::Disabled => Some("Bluetooth is disabled"),
        }
    }
}

/// Builds drivers for devices
pub struct DriverFactory {
    radio: SharedRadio,
    prefs: SharedPreferences,
    radio_drivers: HashMap<String, DriverConstructor>,
    named: HashMap<String, DriverConstructor>,
    generations: AtomicU64,
}

impl fmt::Debug for DriverFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut radio: Vec<_> = self.radio_drivers.keys().collect();
        radio.sort();
        let mut named: Vec<_> = self.named.keys().collect();
        named.sort();
        f.debug_struct("DriverFactory")
            .field("radio", &self.radio)
            .field("radio_drivers", &radio)
            .field("named", &named)
            .finish()
    }
}

impl DriverFactory {
    /// Create a factory with empty constructor tables
    pub fn new(radio: SharedRadio, prefs: SharedPreferences) -> Self {
        Self {
            radio,
            prefs,
            radio_drivers: HashMap::new(),
            named: HashMap::new(),
            generations: AtomicU64::new(1),
        }
    }

    /// Register the radio driver for a driver tag
    pub fn register_radio<S: Into<String>>(&mut self, driver_tag: S, constructor: DriverConstructor) -> &mut Self {
        self.radio_drivers.insert(driver_tag.into().to_ascii_lowercase(), constructor);
        self
    }

    /// Register a named constructor for tag-addressed devices
    pub fn register_named<S: Into<String>>(&mut self, tag: S, constructor: DriverConstructor) -> &mut Self {
        self.named.insert(tag.into().to_ascii_lowercase(), constructor);
        self
    }

    /// The shared radio handle
    pub fn radio(&self) -> &SharedRadio {
        &self.radio
    }

    /// Current radio availability
    pub fn radio_status(&self) -> RadioStatus {
        if !self.radio.is_present() {
            RadioStatus::Missing
        } else if !self.radio.is_enabled() {
            RadioStatus::Disabled
        } else {
            RadioStatus::Ready
        }
    }

    /// Build a driver for a device.
    ///
    /// `Ok(None)` means the radio transport is needed but unavailable; the
    /// caller reports [`RadioStatus::advisory`] to the user.
    pub fn create(
        &self,
        device: &DeviceHandle,
        capabilities: &CapabilityDescriptor,
        events: DriverEventSender,
    ) -> Result<Option<SharedDriver>> {
        let address = device.address();
        let context = DriverContext::new(
            address.clone(),
            device.family(),
            Arc::clone(&self.radio),
            Arc::clone(&self.prefs),
            events,
        )
        .with_generation(self.generations.fetch_add(1, Ordering::SeqCst));

        let transport = Transport::classify(address);
        debug!(address = %address, ?transport, driver = %capabilities.driver, "Creating driver");

        let driver = match transport {
            Transport::Network => network_driver(context)?,
            Transport::Radio => {
                if self.radio_status() != RadioStatus::Ready {
                    return Ok(None);
                }
                let constructor = self
                    .radio_drivers
                    .get(&capabilities.driver.to_ascii_lowercase())
                    .ok_or_else(|| {
                        DeviceError::construction(
                            address,
                            format!("no radio driver registered for {}", capabilities.driver),
                        )
                    })?;
                construct(constructor, context)?
            }
            Transport::Named => {
                let tag = address.as_str().to_ascii_lowercase();
                let constructor = self.named.get(&tag).ok_or_else(|| {
                    DeviceError::construction(address, format!("no constructor named {}", tag))
                })?;
                construct(constructor, context)?
            }
        };

        Ok(Some(driver))
    }
}

fn construct(constructor: &DriverConstructor, context: DriverContext) -> Result<SharedDriver> {
    let address = context.address().clone();
    constructor(context).map_err(|e| match e {
        e @ DeviceError::Construction { .. } => e,
        other => DeviceError::construction(&address, other.to_string()),
    })
}

#[cfg(feature = "tcp")]
fn network_driver(context: DriverContext) -> Result<SharedDriver> {
    Ok(Arc::new(crate::drivers::tcp::TcpDriver::new(context)))
}

#[cfg(not(feature = "tcp"))]
fn network_driver(context: DriverContext) -> Result<SharedDriver> {
    Err(DeviceError::construction(
        context.address(),
        "network transport not compiled in",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceFamily;
    use crate::driver::RadioAdapter;
    use crate::drivers::test::TestBench;
    use crate::prefs::MemoryPreferences;
    use tokio::sync::mpsc;

    fn factory(present: bool, enabled: bool) -> (DriverFactory, Arc<TestBench>) {
        let bench = TestBench::new();
        let mut factory = DriverFactory::new(
            Arc::new(RadioAdapter::new(present, enabled)),
            Arc::new(MemoryPreferences::new()),
        );
        factory
            .register_named("test", bench.constructor())
            .register_radio("mi_band", bench.constructor());
        (factory, bench)
    }

    fn create(factory: &DriverFactory, address: &str, family: DeviceFamily) -> Result<Option<SharedDriver>> {
        let device = DeviceHandle::new(address, family);
        let (tx, _rx) = mpsc::unbounded_channel();
        factory.create(&device, &family.capabilities(), tx)
    }

    #[test]
    fn test_classify() {
        assert_eq!(Transport::classify(&Address::new("10.0.0.2:9000")), Transport::Network);
        assert_eq!(Transport::classify(&Address::new("AA:BB:CC:DD:EE:FF")), Transport::Radio);
        assert_eq!(Transport::classify(&Address::new("test")), Transport::Named);
        assert_eq!(Transport::classify(&Address::new(":9000")), Transport::Named);
    }

    #[test]
    fn test_named_constructor() {
        let (factory, bench) = factory(true, true);
        let driver = create(&factory, "test", DeviceFamily::Test).unwrap().unwrap();
        assert_eq!(driver.address(), &Address::new("test"));
        assert_eq!(bench.drivers_created(), 1);

        let again = create(&factory, "test", DeviceFamily::Test).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&driver, &again));
        assert!(again.generation() > driver.generation());
        assert_eq!(bench.drivers_created(), 2);
    }

    #[test]
    fn test_unknown_tag_is_construction_error() {
        let (factory, _bench) = factory(true, true);
        let result = create(&factory, "toaster", DeviceFamily::Test);
        match result {
            Err(DeviceError::Construction { address, cause }) => {
                assert_eq!(address, Address::new("toaster"));
                assert!(cause.contains("toaster"));
            }
            other => panic!("unexpected {:?}", other.map(|d| d.is_some())),
        }
    }

    #[test]
    fn test_radio_driver_from_descriptor() {
        let (factory, bench) = factory(true, true);
        assert!(create(&factory, "AA:BB:CC:DD:EE:01", DeviceFamily::MiBand).unwrap().is_some());
        assert_eq!(bench.drivers_created(), 1);

        let missing = create(&factory, "AA:BB:CC:DD:EE:02", DeviceFamily::Pebble);
        assert!(matches!(missing, Err(DeviceError::Construction { .. })));
    }

    #[test]
    fn test_radio_unavailable_yields_nothing() {
        let (factory, bench) = factory(false, false);
        assert_eq!(factory.radio_status(), RadioStatus::Missing);
        assert!(create(&factory, "AA:BB:CC:DD:EE:01", DeviceFamily::MiBand).unwrap().is_none());

        let (factory, _) = self::factory(true, false);
        assert_eq!(factory.radio_status(), RadioStatus::Disabled);
        assert!(create(&factory, "AA:BB:CC:DD:EE:01", DeviceFamily::MiBand).unwrap().is_none());
        assert_eq!(bench.drivers_created(), 0);
        assert!(RadioStatus::Disabled.advisory().is_some());
    }

    #[cfg(feature = "tcp")]
    #[test]
    fn test_network_driver() {
        let (factory, _bench) = factory(false, false);
        let driver = create(&factory, "127.0.0.1:9", DeviceFamily::NetworkCompanion)
            .unwrap()
            .unwrap();
        assert!(!driver.is_connected());
    }
}
