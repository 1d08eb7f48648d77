/*!
 * Error types for the Wearbridge engine crate.
 */
use thiserror::Error;

/// Error type for Wearbridge engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// An envelope could not be routed to any device
    #[error("Routing error: {0}")]
    Routing(String),

    /// A command failed on a device
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// The service loop is gone
    #[error("Service has shut down")]
    ServiceShutdown,

    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] wearbridge_devices::DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] wearbridge_core::error::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for Wearbridge engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new routing error
    pub fn routing<S: AsRef<str>>(msg: S) -> Self {
        Error::Routing(msg.as_ref().to_string())
    }

    /// Create a new dispatch error
    pub fn dispatch<S: AsRef<str>>(msg: S) -> Self {
        Error::Dispatch(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }

    /// Whether this wraps a device-not-found error
    pub fn is_device_not_found(&self) -> bool {
        matches!(self, Error::Device(e) if e.is_not_found())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ServiceShutdown
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ServiceShutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wearbridge_core::types::Address;
    use wearbridge_devices::DeviceError;

    #[test]
    fn test_device_not_found_is_detected() {
        let err: Error = DeviceError::DeviceNotFound(Address::new("watch")).into();
        assert!(err.is_device_not_found());
        assert_eq!(err.to_string(), "Device error: device watch not found");
        assert!(!Error::routing("nowhere").is_device_not_found());
    }
}
