/*!
 * Wearbridge Engine
 *
 * The runtime core of the bridge: command envelopes, the dispatcher that
 * routes them to device drivers, offline notification queues, capability
 * aggregation with the subscription lifecycle that follows from it, and
 * the service actor that serialises all of the above.
 */

#![warn(missing_docs)]

// Re-export core types
pub use wearbridge_core::prelude;

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod features;
pub mod queue;
pub mod sanitize;
pub mod scheduler;
pub mod service;
pub mod stress;
pub mod subscription;

// Re-export main types for convenience
pub use command::{Command, CommandScope, Envelope};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherSettings, ServiceNotice};
pub use error::{Error, Result};
pub use features::{AggregatedFeatures, FeatureSet};
pub use queue::PendingCommandQueue;
pub use service::{spawn, ServiceHandle};
pub use subscription::{
    LoggingSubscriptions, RecordingSubscriptions, SubscriptionFamily, SubscriptionManager,
    SubscriptionProvider,
};

/// Wearbridge engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine
pub fn init() -> Result<()> {
    tracing::info!("Wearbridge Engine {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
