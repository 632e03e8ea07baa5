//! Completion delivery.
//!
//! Device callbacks may fire on any thread. They only post a [`Completion`]
//! to the session's worker, which is the single place that reads the
//! parameter snapshot and settles slots. The worker also owns the completion
//! deadlines, so a capture the device never answers cannot hold the busy
//! guard forever.

use super::guard::FlightToken;
use super::stats::SessionStats;
use crate::artifact::{ArtifactBuilder, ArtifactSlot, CaptureArtifact, CaptureFailure, CaptureSnapshot};
use crate::device::{CaptureDevice, DeviceError, DeviceParameters};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Busy-guard token shared by a pending capture and its deadline.
///
/// Whichever side finishes first releases it.
#[derive(Clone)]
pub(crate) struct SharedToken(Arc<Mutex<Option<FlightToken>>>);

impl SharedToken {
    pub(crate) fn new(token: FlightToken) -> Self {
        Self(Arc::new(Mutex::new(Some(token))))
    }

    fn release(&self) {
        drop(self.0.lock().unwrap_or_else(PoisonError::into_inner).take());
    }
}

/// An accepted capture waiting for its completion.
///
/// Consumed exactly once, either by [`PendingCapture::settle`] or by being
/// dropped, in which case the slot is failed as abandoned.
pub(crate) struct PendingCapture {
    slot: Option<ArtifactSlot>,
    snapshot: CaptureSnapshot,
    token: Option<SharedToken>,
}

impl PendingCapture {
    pub(crate) fn new(slot: ArtifactSlot, snapshot: CaptureSnapshot, token: Option<SharedToken>) -> Self {
        Self {
            slot: Some(slot),
            snapshot,
            token,
        }
    }

    pub(crate) fn snapshot(&self) -> CaptureSnapshot {
        self.snapshot
    }

    /// True once the slot has been settled elsewhere, e.g. by a deadline.
    fn is_settled(&self) -> bool {
        self.slot.as_ref().map_or(true, |slot| !slot.is_pending())
    }

    /// Frees the busy guard, then settles the slot.
    pub(crate) fn settle(mut self, outcome: Result<CaptureArtifact, CaptureFailure>) {
        if let Some(token) = self.token.take() {
            token.release();
        }
        let Some(slot) = self.slot.take() else {
            return;
        };
        match outcome {
            Ok(artifact) => {
                slot.fill(artifact);
            }
            Err(failure) => {
                slot.fail(failure);
            }
        }
    }
}

impl Drop for PendingCapture {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.release();
        }
        if let Some(slot) = self.slot.take() {
            if slot.fail(CaptureFailure::Abandoned) {
                tracing::warn!(
                    sequence = self.snapshot.sequence,
                    "Capture callback dropped without completing"
                );
            }
        }
    }
}

/// Point in time by which an issued capture must have completed.
pub(crate) struct Deadline {
    slot: ArtifactSlot,
    sequence: u64,
    token: Option<SharedToken>,
    at: Instant,
}

impl Deadline {
    pub(crate) fn new(
        slot: ArtifactSlot,
        sequence: u64,
        token: Option<SharedToken>,
        timeout: Duration,
    ) -> Self {
        Self {
            slot,
            sequence,
            token,
            at: Instant::now() + timeout,
        }
    }
}

/// Message posted by a device callback.
pub(crate) struct Completion {
    pub(crate) pending: PendingCapture,
    pub(crate) result: Result<Vec<u8>, DeviceError>,
}

/// Work for the completion worker.
pub(crate) enum WorkerMessage {
    /// Posted before issuance, so it always precedes the matching completion.
    Watch(Deadline),
    Completed(Completion),
}

/// Builds artifacts for completed captures, one at a time.
pub(crate) struct CompletionWorker<D> {
    pub(crate) device: Arc<Mutex<D>>,
    pub(crate) builder: ArtifactBuilder,
    pub(crate) closed: Arc<AtomicBool>,
    pub(crate) stats: Arc<SessionStats>,
}

impl<D: CaptureDevice> CompletionWorker<D> {
    /// Handles messages until every sender is gone.
    pub(crate) fn run(self, messages: Receiver<WorkerMessage>) {
        let mut deadlines: Vec<Deadline> = Vec::new();
        loop {
            let next = deadlines.iter().map(|deadline| deadline.at).min();
            let message = match next {
                Some(at) => match messages.recv_timeout(at.saturating_duration_since(Instant::now())) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match messages.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                },
            };

            match message {
                Some(WorkerMessage::Watch(deadline)) => deadlines.push(deadline),
                Some(WorkerMessage::Completed(completion)) => self.handle(completion),
                None => {}
            }
            self.expire(&mut deadlines, Instant::now());
        }
        tracing::debug!("Completion worker stopped");
    }

    /// Drops settled deadlines and times out the ones past due.
    fn expire(&self, deadlines: &mut Vec<Deadline>, now: Instant) {
        deadlines.retain(|deadline| {
            if !deadline.slot.is_pending() {
                return false;
            }
            if deadline.at > now {
                return true;
            }
            if let Some(token) = &deadline.token {
                token.release();
            }
            if deadline.slot.fail(CaptureFailure::TimedOut) {
                self.stats.record_timed_out();
                tracing::warn!(
                    sequence = deadline.sequence,
                    "Capture did not complete in time, busy guard released"
                );
            }
            false
        });
    }

    fn handle(&self, completion: Completion) {
        let Completion { pending, result } = completion;
        let snapshot = pending.snapshot();

        if pending.is_settled() {
            tracing::debug!(sequence = snapshot.sequence, "Discarding late completion");
            return;
        }

        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(sequence = snapshot.sequence, "Completion arrived after close");
            self.stats.record_failed(false);
            pending.settle(Err(CaptureFailure::SessionClosed));
            return;
        }

        let outcome = result
            .map_err(CaptureFailure::from)
            .and_then(|raw| {
                let parameters = self.read_parameters()?;
                self.builder.build(raw, snapshot, parameters)
            });

        match &outcome {
            Ok(_) => {
                self.stats.record_completed();
                tracing::info!(
                    sequence = snapshot.sequence,
                    reference = snapshot.reference_point.id,
                    "Capture saved"
                );
            }
            Err(failure) => {
                self.stats
                    .record_failed(matches!(failure, CaptureFailure::Decode(_)));
                tracing::warn!(
                    sequence = snapshot.sequence,
                    error = %failure,
                    "Capture failed"
                );
            }
        }

        pending.settle(outcome);
    }

    /// Reads the parameter snapshot under the device mutex.
    ///
    /// `close` sets the flag before taking the mutex to release the device,
    /// so checking it under the mutex never reads from a released device.
    fn read_parameters(&self) -> Result<DeviceParameters, CaptureFailure> {
        let device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return Err(CaptureFailure::SessionClosed);
        }
        Ok(device.parameters()?)
    }
}
