/*!
 * Wearbridge Devices
 *
 * Device model, the protocol driver contract, the driver factory, the
 * connection registry and the scan coordinator for the Wearbridge
 * companion bridge.
 */

#![warn(missing_docs)]

// Re-export core types
pub use wearbridge_core::prelude;

pub mod device;
pub mod discovery;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod factory;
pub mod model;
pub mod prefs;
pub mod registry;

pub use device::{BatteryState, CapabilityDescriptor, ConnectionState, DeviceFamily, DeviceHandle};
pub use discovery::{ScanCoordinator, ScanPolicy, SightingOutcome};
pub use driver::{Driver, DriverBase, DriverContext, DriverEvent, RadioAdapter, SharedDriver};
pub use error::{DeviceError, Result};
pub use factory::{DriverConstructor, DriverFactory, RadioStatus, Transport};
pub use prefs::{MemoryPreferences, Preferences, SharedPreferences};
pub use registry::{ConnectionRegistry, RegistryEntry};

/// Wearbridge devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device layer
pub fn init() -> std::result::Result<(), wearbridge_core::error::Error> {
    tracing::info!("Wearbridge Devices {} initialized", VERSION);
    Ok(())
}

/// Transports compiled into this build
pub fn available_transports() -> Vec<&'static str> {
    let mut transports = vec!["radio", "named"];

    #[cfg(feature = "tcp")]
    transports.push("tcp");

    transports
}
