//! Prometheus metrics exporter for capture sessions.
//!
//! Counters come from a session's [`StatsSnapshot`](crate::session::StatsSnapshot);
//! nothing here is process-global.
//!
//! # Metrics Exposed
//!
//! ## Requests
//! - `sphere_capture_requested_total` - Capture requests received
//! - `sphere_capture_rejected_busy_total` - Requests rejected by the busy guard
//! - `sphere_capture_issued_total` - Captures handed to the device
//! - `sphere_capture_issue_failures_total` - Captures the device refused
//!
//! ## Completions
//! - `sphere_capture_completed_total` - Artifacts produced
//! - `sphere_capture_failed_total` - Captures without an artifact
//! - `sphere_capture_decode_failures_total` - Undecodable captures
//! - `sphere_capture_timed_out_total` - Captures with no completion in time
//!
//! ## Device
//! - `sphere_capture_parameter_rejections_total` - Rejected parameter writes
//! - `sphere_capture_preview_failures_total` - Failed preview starts
//! - `sphere_capture_exposure_locks_total` - Exposure locks applied
//! - `sphere_capture_busy` - Busy guard state (1=busy, 0=idle)
//!
//! # Example
//!
//! ```no_run
//! use sphere_capture::metrics::MetricsRegistry;
//! use sphere_capture::session::StatsSnapshot;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = StatsSnapshot {
//!     requested: 12,
//!     issued: 10,
//!     completed: 9,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot, false);
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState};
