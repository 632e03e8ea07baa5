//! Sphere Capture Library
//!
//! Orchestrates a single camera for photo-sphere shooting: picks a 16:9
//! capture size, pins exposure and white balance before the first shot, runs
//! one capture at a time and turns each completed capture into a decoded,
//! pose-tagged artifact for a downstream stitcher.
//!
//! # Architecture
//!
//! ```text
//! negotiation ─▶ session ─▶ device (take_picture)
//!                   │              │
//!               exposure       completion ─▶ decode ─▶ artifact slot
//!                   │
//!                 pose snapshot
//! ```
//!
//! # Design Principles
//!
//! - **One capture in flight**: overlapping requests are rejected, never queued
//! - **Lock once**: AE/AWB are pinned before the first capture so tiles match
//! - **Snapshot at issuance**: pose and reference point are taken when the
//!   capture is issued, not when it completes
//! - **Explicit lifecycle**: `close` releases the device exactly once
//!
//! # Example
//!
//! ```no_run
//! use sphere_capture::{
//!     ArtifactCollector, CaptureSession, FixedPose, MockHardware, ReferencePoint,
//!     SessionConfig, SizePreference,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let hardware = MockHardware::new();
//! let collector = Arc::new(ArtifactCollector::new());
//!
//! let session = CaptureSession::open(
//!     || hardware.open(),
//!     Arc::new(FixedPose::default()),
//!     collector.clone(),
//!     SizePreference::UNSET,
//!     SessionConfig::default(),
//! )
//! .expect("no camera");
//!
//! let slot = session.take_picture(ReferencePoint::new(0, 0.0, 0.0)).unwrap();
//! slot.wait(Duration::from_secs(5));
//! assert!(slot.is_saved());
//!
//! session.close();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod artifact;
pub mod config;
pub mod decode;
pub mod device;
pub mod exposure;
pub mod metrics;
pub mod negotiation;
pub mod pose;
pub mod session;

// Re-export commonly used types at crate root
pub use artifact::{
    ArtifactCollector, ArtifactSink, ArtifactSlot, CaptureArtifact, CaptureFailure, SlotStatus,
};
pub use config::{ConfigError, FileConfig, GuardRelease, PixelFormat, SessionConfig, SizePreference};
pub use decode::{DecodedImage, PixelData};
pub use device::{CaptureDevice, CaptureSize, DeviceError, DeviceParameters, MockHardware};
pub use exposure::ExposureLockController;
pub use negotiation::SizeNegotiator;
pub use pose::{FixedPose, PoseProvider, ReferencePoint, RotationMatrix};
pub use session::{CaptureError, CaptureSession, SessionError, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
