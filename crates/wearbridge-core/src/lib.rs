/*!
 * Wearbridge Core
 *
 * Shared foundations for the Wearbridge companion bridge: the error type,
 * device addresses and loosely typed values, layered configuration,
 * logging and runtime setup.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod runtime;
pub mod types;
pub mod utils;

/// Wearbridge core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install logging from the configuration and announce the core version.
///
/// Call once per process, before any other crate's `init`.
pub fn init(config: &config::Config) -> Result<(), error::Error> {
    logging::init_from_config(&config.logging)?;
    tracing::info!("Wearbridge Core {} initialized", VERSION);
    Ok(())
}
