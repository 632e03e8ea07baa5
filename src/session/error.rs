//! Session error types.

use crate::config::ConfigError;
use crate::device::DeviceError;
use thiserror::Error;

/// Errors from opening or querying a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The device could not be opened.
    #[error("no capture device available: {0}")]
    DeviceUnavailable(DeviceError),
    /// The device refused a parameter write.
    #[error("device rejected capture parameters: {0}")]
    ParameterRejected(DeviceError),
    /// The session configuration failed validation.
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
    /// Any other device failure.
    #[error("device error: {0}")]
    Device(DeviceError),
    /// The completion thread could not be spawned.
    #[error("failed to start completion worker: {0}")]
    Worker(#[from] std::io::Error),
    /// The session has been closed.
    #[error("session is closed")]
    Closed,
}

/// Why a capture request was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Another capture holds the busy guard.
    #[error("a capture is already in progress")]
    Busy,
    /// The session has been closed.
    #[error("session is closed")]
    Closed,
    /// The device refused to issue the capture.
    #[error("device refused the capture: {0}")]
    Issue(DeviceError),
}
