//! Capture device abstraction.
//!
//! This module provides a trait-based abstraction over still-capture camera
//! hardware, allowing for both real devices and mock implementations for
//! testing.

use super::DeviceParameters;
use thiserror::Error;

/// Errors reported by a capture device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No device could be opened.
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
    /// The device is already open elsewhere.
    #[error("capture device is held by another session")]
    Busy,
    /// A parameter write was refused.
    #[error("device rejected parameters: {0}")]
    ParametersRejected(String),
    /// The preview could not be started.
    #[error("failed to start preview: {0}")]
    Preview(String),
    /// The capture could not be taken.
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    /// The handle was used after `release`.
    #[error("device has been released")]
    Released,
}

/// Completion callback for an asynchronous still capture.
///
/// Receives the raw (compressed) capture buffer. Devices may invoke it on any
/// thread, including synchronously from within
/// [`CaptureDevice::take_picture`].
pub type CaptureCallback = Box<dyn FnOnce(Result<Vec<u8>, DeviceError>) + Send + 'static>;

/// Offscreen surface the preview stream is routed to.
///
/// Some hardware refuses still captures unless a preview is running, so the
/// session keeps one of these around even though nothing displays it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewTarget {
    /// Surface identifier.
    pub id: u32,
}

impl PreviewTarget {
    /// Creates an offscreen target.
    pub fn offscreen(id: u32) -> Self {
        Self { id }
    }
}

/// Trait for still-capture devices.
///
/// Implementations own the hardware handle. All methods block the caller for
/// the duration of the device round-trip except `take_picture`, which returns
/// once the request is issued.
pub trait CaptureDevice: Send + 'static {
    /// Reads the full parameter set.
    fn parameters(&self) -> Result<DeviceParameters, DeviceError>;

    /// Writes the full parameter set.
    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), DeviceError>;

    /// Routes the preview stream to `target` and starts it.
    fn start_preview(&mut self, target: &PreviewTarget) -> Result<(), DeviceError>;

    /// Stops the preview. A no-op if the preview is not running.
    fn stop_preview(&mut self);

    /// Issues an asynchronous still capture.
    fn take_picture(&mut self, on_complete: CaptureCallback) -> Result<(), DeviceError>;

    /// Releases the hardware handle. Must tolerate repeated calls.
    fn release(&mut self);
}
