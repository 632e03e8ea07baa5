//! Capture hardware abstraction.
//!
//! The session talks to the camera only through [`CaptureDevice`], so the
//! same orchestration runs against real hardware and against
//! [`MockHardware`].

mod camera;
mod mock;
mod parameters;

pub use camera::{CaptureCallback, CaptureDevice, DeviceError, PreviewTarget};
pub use mock::{CompletionMode, MockDevice, MockHardware, Payload};
pub use parameters::{
    Antibanding, CaptureSize, ColorEffect, DeviceParameters, FocusMode, SceneMode,
};
