/*!
 * Error types for the Wearbridge devices crate.
 */
use thiserror::Error;

use wearbridge_core::error::Error as CoreError;
use wearbridge_core::types::Address;

/// Error type for device and driver operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No registered device or no live driver for the address
    #[error("device {0} not found")]
    DeviceNotFound(Address),

    /// The device link is not up
    #[error("device {0} not connected")]
    NotConnected(Address),

    /// A driver is already attached to the address
    #[error("device {0} already has a live driver")]
    DriverAlreadyAttached(Address),

    /// A driver could not be constructed
    #[error("cannot create driver for {address}: {cause}")]
    Construction {
        /// Device address
        address: Address,
        /// Readable cause
        cause: String,
    },

    /// Transport level failure while talking to a device
    #[error("Transport error: {0}")]
    Transport(String),

    /// The operation is not supported by this device
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The device is in an invalid state for the operation
    #[error("Invalid device state: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    /// Create a new construction error
    pub fn construction<S: AsRef<str>>(address: &Address, cause: S) -> Self {
        DeviceError::Construction {
            address: address.clone(),
            cause: cause.as_ref().to_string(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Transport(msg.as_ref().to_string())
    }

    /// Create a new unsupported error
    pub fn unsupported<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Unsupported(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Other(msg.as_ref().to_string())
    }

    /// Whether this error only means the target is unknown
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeviceError::DeviceNotFound(_))
    }
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        DeviceError::Serialization(err.to_string())
    }
}
