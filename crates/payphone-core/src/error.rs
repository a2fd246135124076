//! Error types for the payphone gateway

use thiserror::Error;

/// Result type for gateway operations
pub type PayphoneResult<T> = Result<T, PayphoneError>;

/// Errors raised by the serial link and its port implementations
#[derive(Debug, Error)]
pub enum LinkError {
    /// The device could not be opened
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Read or write on an open device failed
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration or status query failed
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
}

impl LinkError {
    /// Create an open error for `port`
    pub fn open(port: impl Into<String>, source: serialport::Error) -> Self {
        Self::Open {
            port: port.into(),
            source,
        }
    }

    /// Create an open error for a device that is not present
    pub fn no_device(port: impl Into<String>, description: impl Into<String>) -> Self {
        Self::open(
            port,
            serialport::Error::new(serialport::ErrorKind::NoDevice, description.into()),
        )
    }
}

/// A bounded queue rejected an item because it was full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{queue} queue is full")]
pub struct QueueFull {
    /// Name of the queue that rejected the item
    pub queue: &'static str,
}

/// Failures reported by the call-signaling collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// Account registration with the server failed
    #[error("registration with {server} failed: {reason}")]
    Registration { server: String, reason: String },

    /// A call operation (place, answer, hangup, dtmf) failed
    #[error("{operation} failed: {reason}")]
    CallFailed { operation: String, reason: String },

    /// The signaling stack has been shut down
    #[error("signaling stack unavailable")]
    Unavailable,
}

impl SignalingError {
    /// Create a registration error
    pub fn registration(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Registration {
            server: server.into(),
            reason: reason.into(),
        }
    }

    /// Create a call operation error
    pub fn call_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CallFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Top level gateway errors
///
/// Every variant returned from [`crate::PhoneController::run`] is fatal: the
/// controller has already torn down the link and the call session when the
/// caller sees it.
#[derive(Debug, Error)]
pub enum PayphoneError {
    /// Serial link failure
    #[error("serial link error: {0}")]
    Link(#[from] LinkError),

    /// Serial worker did not come back after the configured number of restarts
    #[error("serial link failed to recover after {attempts} restart attempts")]
    LinkUnrecoverable { attempts: u32 },

    /// Call-signaling failure
    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl PayphoneError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
