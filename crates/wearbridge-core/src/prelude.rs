/*!
 * Prelude module for Wearbridge Core.
 *
 * Re-exports the types most crates in the workspace need.
 */

pub use crate::error::{Error, Result};

pub use crate::types::{Address, Metadata, Value};

pub use crate::config::{Config, ConfigBuilder, SharedConfig};

pub use crate::utils::{millis_to_duration, spawn_and_log, with_timeout};

pub use tracing::{debug, error, info, trace, warn};

pub use crate::init;
