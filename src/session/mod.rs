//! Capture session: one device, one capture in flight.
//!
//! The session owns the device behind a mutex. Every parameter read or write
//! goes through it, but the mutex is never held across the exposure warm-up
//! or across the gap between issuing a capture and its completion.
//!
//! # Capture sequence
//!
//! ```text
//! take_picture ─▶ busy guard ─▶ reserve slot ─▶ preview ─▶ lock (first only) ─▶ issue
//!                                                                                  │
//!                   slot filled ◀── completion worker ◀── device callback ◀────────┘
//! ```

mod completion;
mod error;
mod guard;
mod state;
mod stats;

pub use error::{CaptureError, SessionError};
pub use guard::{FlightToken, SingleFlight};
pub use state::SessionState;
pub use stats::{SessionStats, StatsSnapshot};

use crate::artifact::{ArtifactBuilder, ArtifactSink, ArtifactSlot, CaptureFailure, CaptureSnapshot};
use crate::config::{GuardRelease, SessionConfig, SizePreference};
use crate::device::{
    CaptureCallback, CaptureDevice, CaptureSize, DeviceError, DeviceParameters, PreviewTarget,
};
use crate::exposure::ExposureLockController;
use crate::negotiation::SizeNegotiator;
use crate::pose::{PoseProvider, ReferencePoint};
use completion::{Completion, CompletionWorker, Deadline, PendingCapture, SharedToken, WorkerMessage};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Offscreen surface id used for the session's preview.
const PREVIEW_SURFACE_ID: u32 = 0;

/// Owns a capture device for the duration of one shooting sequence.
pub struct CaptureSession<D: CaptureDevice> {
    device: Arc<Mutex<D>>,
    pose: Arc<dyn PoseProvider>,
    sink: Arc<dyn ArtifactSink>,
    exposure: ExposureLockController,
    config: SessionConfig,
    capture_size: CaptureSize,
    preview_target: PreviewTarget,
    guard: Arc<SingleFlight>,
    state: Mutex<SessionState>,
    locked: AtomicBool,
    closed: Arc<AtomicBool>,
    sequence: AtomicU64,
    stats: Arc<SessionStats>,
    worker: Sender<WorkerMessage>,
}

impl<D: CaptureDevice> CaptureSession<D> {
    /// Opens a session, or returns `None` if no usable session can be made.
    ///
    /// The reason is logged. Use [`CaptureSession::try_open`] to inspect it.
    pub fn open<F>(
        open_device: F,
        pose: Arc<dyn PoseProvider>,
        sink: Arc<dyn ArtifactSink>,
        preference: SizePreference,
        config: SessionConfig,
    ) -> Option<Self>
    where
        F: FnOnce() -> Result<D, DeviceError>,
    {
        match Self::try_open(open_device, pose, sink, preference, config) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(error = %e, "Unable to open capture session");
                None
            }
        }
    }

    /// Opens the device, negotiates the capture size and starts the
    /// completion worker.
    ///
    /// Fails if the device cannot be opened or rejects the chosen size. The
    /// device is released again on failure.
    pub fn try_open<F>(
        open_device: F,
        pose: Arc<dyn PoseProvider>,
        sink: Arc<dyn ArtifactSink>,
        preference: SizePreference,
        config: SessionConfig,
    ) -> Result<Self, SessionError>
    where
        F: FnOnce() -> Result<D, DeviceError>,
    {
        config.validate()?;
        let mut device = open_device().map_err(SessionError::DeviceUnavailable)?;

        let negotiated = SizeNegotiator::new(config.reference_width)
            .apply(&mut device, preference)
            .and_then(|_| device.parameters());
        let capture_size = match negotiated {
            Ok(params) => params.picture_size,
            Err(e) => {
                device.release();
                return Err(SessionError::ParameterRejected(e));
            }
        };

        let device = Arc::new(Mutex::new(device));
        let closed = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(SessionStats::default());
        let (worker_tx, receiver) = mpsc::channel();

        let worker = CompletionWorker {
            device: Arc::clone(&device),
            builder: ArtifactBuilder::new(config.decode.clone()),
            closed: Arc::clone(&closed),
            stats: Arc::clone(&stats),
        };
        let spawned = std::thread::Builder::new()
            .name("capture-completion".to_owned())
            .spawn(move || worker.run(receiver));
        if let Err(e) = spawned {
            lock_device(&device).release();
            return Err(SessionError::Worker(e));
        }

        tracing::info!(
            size = %capture_size,
            guard_release = ?config.guard_release,
            "Capture session opened"
        );

        Ok(Self {
            device,
            pose,
            sink,
            exposure: ExposureLockController::new(),
            config,
            capture_size,
            preview_target: PreviewTarget::offscreen(PREVIEW_SURFACE_ID),
            guard: SingleFlight::new(),
            state: Mutex::new(SessionState::Idle),
            locked: AtomicBool::new(false),
            closed,
            sequence: AtomicU64::new(0),
            stats,
            worker: worker_tx,
        })
    }

    /// Requests a capture for `reference_point`.
    ///
    /// Returns the reserved slot immediately; it is filled (or failed) when
    /// the device completes, or failed with [`CaptureFailure::TimedOut`] once
    /// the completion timeout passes. Rejects with [`CaptureError::Busy`]
    /// instead of queueing if another capture holds the busy guard.
    pub fn take_picture(&self, reference_point: ReferencePoint) -> Result<ArtifactSlot, CaptureError> {
        if self.is_closed() {
            return Err(CaptureError::Closed);
        }
        self.stats.record_requested();

        let Some(token) = self.guard.try_acquire() else {
            self.stats.record_rejected_busy();
            tracing::debug!(reference = reference_point.id, "Capture rejected, session busy");
            return Err(CaptureError::Busy);
        };
        if self.is_closed() {
            return Err(CaptureError::Closed);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = self.sink.reserve();
        let snapshot = CaptureSnapshot {
            rotation: self.pose.rotation_matrix(),
            reference_point,
            sequence,
        };

        self.transition(SessionState::PreviewStarting);
        self.start_preview();

        if !self.is_locked() {
            self.transition(SessionState::Locking);
            std::thread::sleep(self.config.lock_warmup());
            self.apply_lock();
        }

        self.transition(SessionState::Capturing);
        let (travelling, held) = match self.config.guard_release {
            GuardRelease::OnIssue => (None, Some(token)),
            GuardRelease::OnCompletion => (Some(SharedToken::new(token)), None),
        };
        let deadline = Deadline::new(
            slot.clone(),
            sequence,
            travelling.clone(),
            self.config.completion_timeout(),
        );
        if self.worker.send(WorkerMessage::Watch(deadline)).is_err() {
            tracing::warn!(sequence, "Completion worker gone, capture has no deadline");
        }
        let pending = PendingCapture::new(slot.clone(), snapshot, travelling);
        let sender = self.worker.clone();
        let callback: CaptureCallback = Box::new(move |result| {
            // A send error means the worker is gone; dropping the pending
            // capture marks its slot abandoned.
            let _ = sender.send(WorkerMessage::Completed(Completion { pending, result }));
        });

        tracing::debug!(sequence, reference = reference_point.id, "Issuing capture");
        let issued = self.lock_device().take_picture(callback);
        self.transition(SessionState::Idle);
        drop(held);

        match issued {
            Ok(()) => {
                self.stats.record_issued();
                Ok(slot)
            }
            Err(e) => {
                self.stats.record_issue_failure();
                tracing::warn!(sequence, error = %e, "Capture could not be issued");
                slot.fail(CaptureFailure::Device(e.clone()));
                Err(CaptureError::Issue(e))
            }
        }
    }

    /// Releases the AE/AWB locks. The next capture locks again after the
    /// warm-up.
    pub fn unlock(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        match self.exposure.unlock(&mut *self.lock_device()) {
            Ok(_) => {
                self.locked.store(false, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.stats.record_parameter_rejection();
                tracing::warn!(error = %e, "Unlock rejected");
                Err(SessionError::ParameterRejected(e))
            }
        }
    }

    /// Stops the preview and releases the device. Safe to call repeatedly.
    ///
    /// Does not wait for in-flight completions; they settle their slots as
    /// [`CaptureFailure::SessionClosed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Capture session already closed");
            return;
        }
        {
            let mut device = self.lock_device();
            device.stop_preview();
            device.release();
        }
        *self.lock_state() = SessionState::Closed;
        tracing::info!(stats = ?self.stats.snapshot(), "Capture session closed");
    }

    /// Reads the device's current parameter set.
    pub fn current_device_parameters(&self) -> Result<DeviceParameters, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.lock_device().parameters().map_err(SessionError::Device)
    }

    /// Capture size chosen at construction.
    #[inline]
    pub fn capture_size(&self) -> CaptureSize {
        self.capture_size
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Whether AE/AWB are pinned.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Whether the busy guard is held.
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Per-session counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn start_preview(&self) {
        if let Err(e) = self.lock_device().start_preview(&self.preview_target) {
            self.stats.record_preview_failure();
            tracing::warn!(error = %e, "Preview failed to start, capturing anyway");
        }
    }

    fn apply_lock(&self) {
        match self.exposure.lock(&mut *self.lock_device()) {
            Ok(_) => {
                self.locked.store(true, Ordering::Release);
                self.stats.record_lock();
            }
            Err(e) => {
                self.stats.record_parameter_rejection();
                tracing::warn!(error = %e, "Exposure lock rejected, will retry on next capture");
            }
        }
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.lock_state();
        if *state == SessionState::Closed {
            return;
        }
        if !state.can_transition_to(next) {
            tracing::warn!(from = %*state, to = %next, "Unexpected session transition");
        }
        tracing::debug!(from = %*state, to = %next, "Session transition");
        *state = next;
    }

    fn lock_device(&self) -> MutexGuard<'_, D> {
        lock_device(&self.device)
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: CaptureDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_device<D>(device: &Mutex<D>) -> MutexGuard<'_, D> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests;
