//! Capture artifacts and the slots they are delivered through.
//!
//! A slot is reserved from the [`ArtifactSink`] when a capture is accepted
//! and handed back to the caller straight away. The completion worker fills
//! it later, so the caller sees one of three outcomes: still pending, saved,
//! or failed with a reason.

use crate::config::DecodeOptions;
use crate::decode::{decode_capture, DecodedImage};
use crate::device::{DeviceError, DeviceParameters};
use crate::pose::{ReferencePoint, RotationMatrix};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a reserved slot was not filled with an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureFailure {
    /// The capture data could not be decoded.
    #[error("failed to decode capture: {0}")]
    Decode(String),
    /// The device reported an error for this capture.
    #[error("device reported a failed capture: {0}")]
    Device(#[from] DeviceError),
    /// The session closed before the capture could be saved.
    #[error("session closed before the capture completed")]
    SessionClosed,
    /// The device dropped the callback without invoking it.
    #[error("device dropped the capture without completing it")]
    Abandoned,
    /// No completion arrived within the configured deadline.
    #[error("capture did not complete in time")]
    TimedOut,
}

/// A finished capture, ready for the stitcher.
#[derive(Debug, Clone)]
pub struct CaptureArtifact {
    /// Oriented, packed image.
    pub image: DecodedImage,
    /// Pose snapshot taken when the capture was issued.
    pub rotation: RotationMatrix,
    /// Device parameters at completion time.
    pub parameters: DeviceParameters,
    /// Position in the capture sequence.
    pub reference_point: ReferencePoint,
    /// Completion time.
    pub captured_at: DateTime<Utc>,
    /// Per-session capture number, starting at 1.
    pub sequence: u64,
}

/// Observable state of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    /// Reserved, waiting for the completion.
    Pending,
    /// Filled with an artifact.
    Saved,
    /// The capture did not produce an artifact.
    Failed(CaptureFailure),
    /// The artifact has been moved out with [`ArtifactSlot::take_artifact`].
    Taken,
}

enum SlotContent {
    Pending,
    Saved(Box<CaptureArtifact>),
    Failed(CaptureFailure),
    Taken,
}

struct SlotInner {
    id: u64,
    content: Mutex<SlotContent>,
    settled: Condvar,
}

/// Shared handle to a reserved artifact.
///
/// Cloning yields another handle to the same slot.
#[derive(Clone)]
pub struct ArtifactSlot {
    inner: Arc<SlotInner>,
}

impl ArtifactSlot {
    /// Creates an empty, pending slot.
    pub fn new(id: u64) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                id,
                content: Mutex::new(SlotContent::Pending),
                settled: Condvar::new(),
            }),
        }
    }

    /// Identifier assigned by the sink.
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current status.
    pub fn status(&self) -> SlotStatus {
        status_of(&self.lock())
    }

    /// True once the slot holds an artifact.
    ///
    /// A slot that never reaches this state must be treated as invalid.
    pub fn is_saved(&self) -> bool {
        matches!(*self.lock(), SlotContent::Saved(_))
    }

    /// True while the completion has not arrived.
    pub fn is_pending(&self) -> bool {
        matches!(*self.lock(), SlotContent::Pending)
    }

    /// Blocks until the slot settles or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> SlotStatus {
        let deadline = Instant::now() + timeout;
        let mut content = self.lock();
        while matches!(*content, SlotContent::Pending) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            content = match self.inner.settled.wait_timeout(content, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        status_of(&content)
    }

    /// Runs `f` on the artifact if the slot is saved.
    pub fn with_artifact<R>(&self, f: impl FnOnce(&CaptureArtifact) -> R) -> Option<R> {
        match &*self.lock() {
            SlotContent::Saved(artifact) => Some(f(artifact.as_ref())),
            _ => None,
        }
    }

    /// Moves the artifact out, leaving the slot `Taken`.
    pub fn take_artifact(&self) -> Option<CaptureArtifact> {
        let mut content = self.lock();
        if !matches!(*content, SlotContent::Saved(_)) {
            return None;
        }
        match std::mem::replace(&mut *content, SlotContent::Taken) {
            SlotContent::Saved(artifact) => Some(*artifact),
            _ => None,
        }
    }

    /// Fills a pending slot. Returns false if it had already settled.
    pub(crate) fn fill(&self, artifact: CaptureArtifact) -> bool {
        self.settle(SlotContent::Saved(Box::new(artifact)))
    }

    /// Fails a pending slot. Returns false if it had already settled.
    pub(crate) fn fail(&self, failure: CaptureFailure) -> bool {
        self.settle(SlotContent::Failed(failure))
    }

    fn settle(&self, outcome: SlotContent) -> bool {
        let mut content = self.lock();
        if !matches!(*content, SlotContent::Pending) {
            return false;
        }
        *content = outcome;
        self.inner.settled.notify_all();
        true
    }

    fn lock(&self) -> MutexGuard<'_, SlotContent> {
        self.inner.content.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ArtifactSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSlot")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

fn status_of(content: &SlotContent) -> SlotStatus {
    match content {
        SlotContent::Pending => SlotStatus::Pending,
        SlotContent::Saved(_) => SlotStatus::Saved,
        SlotContent::Failed(failure) => SlotStatus::Failed(failure.clone()),
        SlotContent::Taken => SlotStatus::Taken,
    }
}

/// Owner of artifact slots, typically the view that shows capture progress.
pub trait ArtifactSink: Send + Sync {
    /// Reserves a fresh slot for an accepted capture.
    fn reserve(&self) -> ArtifactSlot;
}

/// Sink that keeps every reserved slot in order, for handing to a stitcher.
#[derive(Default)]
pub struct ArtifactCollector {
    slots: Mutex<Vec<ArtifactSlot>>,
}

impl ArtifactCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every slot reserved so far.
    pub fn slots(&self) -> Vec<ArtifactSlot> {
        self.lock().clone()
    }

    /// Slots that hold an artifact.
    pub fn saved(&self) -> Vec<ArtifactSlot> {
        self.lock()
            .iter()
            .filter(|slot| slot.is_saved())
            .cloned()
            .collect()
    }

    /// Number of reserved slots.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing has been reserved.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ArtifactSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArtifactSink for ArtifactCollector {
    fn reserve(&self) -> ArtifactSlot {
        let mut slots = self.lock();
        let slot = ArtifactSlot::new(slots.len() as u64);
        slots.push(slot.clone());
        slot
    }
}

/// Metadata captured when a capture is issued.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSnapshot {
    /// Pose at issuance.
    pub rotation: RotationMatrix,
    /// Position in the sequence.
    pub reference_point: ReferencePoint,
    /// Per-session capture number.
    pub sequence: u64,
}

/// Turns raw capture buffers into artifacts.
#[derive(Debug, Clone, Default)]
pub struct ArtifactBuilder {
    options: DecodeOptions,
}

impl ArtifactBuilder {
    /// Creates a builder with the given post-processing options.
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    /// Post-processing options.
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decodes `raw` and packages it with the snapshot and parameters.
    pub fn build(
        &self,
        raw: Vec<u8>,
        snapshot: CaptureSnapshot,
        parameters: DeviceParameters,
    ) -> Result<CaptureArtifact, CaptureFailure> {
        let image = decode_capture(raw, &self.options)
            .map_err(|e| CaptureFailure::Decode(e.to_string()))?;

        tracing::debug!(
            sequence = snapshot.sequence,
            width = image.width(),
            height = image.height(),
            bytes = image.byte_len(),
            "Artifact built"
        );

        Ok(CaptureArtifact {
            image,
            rotation: snapshot.rotation,
            parameters,
            reference_point: snapshot.reference_point,
            captured_at: Utc::now(),
            sequence: snapshot.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CaptureSize;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 100, 50])))
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
            .unwrap();
        buffer
    }

    fn snapshot() -> CaptureSnapshot {
        CaptureSnapshot {
            rotation: RotationMatrix::from_yaw(0.5),
            reference_point: ReferencePoint::new(7, 45.0, 0.0),
            sequence: 3,
        }
    }

    fn params() -> DeviceParameters {
        DeviceParameters::with_supported_sizes(vec![CaptureSize::new(32, 18).unwrap()])
    }

    #[test]
    fn test_build_carries_snapshot() {
        let artifact = ArtifactBuilder::default()
            .build(jpeg(32, 18), snapshot(), params())
            .unwrap();

        assert_eq!((artifact.image.width(), artifact.image.height()), (18, 32));
        assert_eq!(artifact.rotation, RotationMatrix::from_yaw(0.5));
        assert_eq!(artifact.reference_point, ReferencePoint::new(7, 45.0, 0.0));
        assert_eq!(artifact.sequence, 3);
        assert_eq!(artifact.parameters, params());
    }

    #[test]
    fn test_build_rejects_garbage() {
        let result = ArtifactBuilder::default().build(b"garbage".to_vec(), snapshot(), params());
        assert!(matches!(result, Err(CaptureFailure::Decode(_))));
    }

    #[test]
    fn test_slot_settles_once() {
        let slot = ArtifactSlot::new(0);
        assert!(slot.is_pending());

        assert!(slot.fail(CaptureFailure::Abandoned));
        assert!(!slot.fail(CaptureFailure::SessionClosed));
        assert_eq!(slot.status(), SlotStatus::Failed(CaptureFailure::Abandoned));
        assert!(!slot.is_saved());
    }

    #[test]
    fn test_take_artifact() {
        let slot = ArtifactSlot::new(0);
        let artifact = ArtifactBuilder::default()
            .build(jpeg(32, 18), snapshot(), params())
            .unwrap();
        assert!(slot.fill(artifact));

        assert_eq!(slot.with_artifact(|a| a.sequence), Some(3));
        assert!(slot.take_artifact().is_some());
        assert_eq!(slot.status(), SlotStatus::Taken);
        assert!(slot.take_artifact().is_none());
    }

    #[test]
    fn test_wait_times_out_while_pending() {
        let slot = ArtifactSlot::new(0);
        assert_eq!(slot.wait(Duration::from_millis(10)), SlotStatus::Pending);
    }

    #[test]
    fn test_wait_wakes_on_fill() {
        let slot = ArtifactSlot::new(0);
        let filler = slot.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            filler.fail(CaptureFailure::Decode("bad".to_owned()));
        });

        let status = slot.wait(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(status, SlotStatus::Failed(CaptureFailure::Decode("bad".to_owned())));
    }

    #[test]
    fn test_collector_tracks_saved() {
        let collector = ArtifactCollector::new();
        let first = collector.reserve();
        let second = collector.reserve();
        assert_eq!((first.id(), second.id()), (0, 1));

        let artifact = ArtifactBuilder::default()
            .build(jpeg(16, 9), snapshot(), params())
            .unwrap();
        second.fill(artifact);

        assert_eq!(collector.len(), 2);
        let saved = collector.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id(), 1);
    }
}
