//! Mock capture hardware for testing without a camera.
//!
//! [`MockHardware`] plays the role of the physical device: it hands out at
//! most one open [`MockDevice`] at a time and stays reachable after the
//! device has been moved into a session, so tests can inject failures,
//! deliver deferred completions and read call counters.

use super::{CaptureCallback, CaptureDevice, CaptureSize, DeviceError, DeviceParameters, PreviewTarget};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// When the mock invokes capture callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Synchronously, from inside `take_picture`.
    Immediate,
    /// From a spawned thread after the given delay.
    Threaded(Duration),
    /// Queued until [`MockHardware::complete_next`] is called.
    Manual,
}

/// What a capture delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// JPEG of a horizontal/vertical gradient at the current picture size.
    Gradient,
    /// JPEG of a single color at the current picture size.
    Solid([u8; 3]),
    /// Bytes that no decoder accepts.
    Corrupt,
}

struct MockState {
    params: DeviceParameters,
    available: bool,
    open: bool,
    reject_parameters: bool,
    fail_preview: bool,
    fail_capture: bool,
    payload: Payload,
    completion: CompletionMode,
    pending: VecDeque<CaptureCallback>,
    preview_running: bool,
    parameter_writes: u32,
    preview_starts: u32,
    captures: u32,
    locked_at_issue: Vec<bool>,
    releases: u32,
}

/// Shared handle to a simulated camera.
#[derive(Clone)]
pub struct MockHardware {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHardware {
    /// Creates hardware reporting a typical phone sensor's size list.
    pub fn new() -> Self {
        let sizes = [(4000, 3000), (1920, 1080), (1600, 900), (1280, 720), (640, 480)]
            .into_iter()
            .filter_map(|(w, h)| CaptureSize::new(w, h))
            .collect();
        Self::with_supported_sizes(sizes)
    }

    /// Creates hardware reporting `sizes`; the largest is the default.
    pub fn with_supported_sizes(sizes: Vec<CaptureSize>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                params: DeviceParameters::with_supported_sizes(sizes),
                available: true,
                open: false,
                reject_parameters: false,
                fail_preview: false,
                fail_capture: false,
                payload: Payload::Gradient,
                completion: CompletionMode::Immediate,
                pending: VecDeque::new(),
                preview_running: false,
                parameter_writes: 0,
                preview_starts: 0,
                captures: 0,
                locked_at_issue: Vec::new(),
                releases: 0,
            })),
        }
    }

    /// Sets reported AE/AWB lock support.
    #[must_use]
    pub fn with_lock_support(self, auto_exposure: bool, auto_white_balance: bool) -> Self {
        {
            let mut state = self.lock();
            state.params.auto_exposure_lock_supported = auto_exposure;
            state.params.auto_white_balance_lock_supported = auto_white_balance;
        }
        self
    }

    /// Sets when capture callbacks fire.
    #[must_use]
    pub fn with_completion(self, mode: CompletionMode) -> Self {
        self.lock().completion = mode;
        self
    }

    /// Sets the capture payload.
    #[must_use]
    pub fn with_payload(self, payload: Payload) -> Self {
        self.lock().payload = payload;
        self
    }

    /// Makes every subsequent `open` fail.
    #[must_use]
    pub fn unavailable(self) -> Self {
        self.lock().available = false;
        self
    }

    /// Opens the device. Fails if it is unavailable or already open.
    pub fn open(&self) -> Result<MockDevice, DeviceError> {
        let mut state = self.lock();
        if !state.available {
            return Err(DeviceError::Unavailable("mock camera disconnected".to_owned()));
        }
        if state.open {
            return Err(DeviceError::Busy);
        }
        state.open = true;
        tracing::info!("MockHardware opened");
        Ok(MockDevice {
            state: Arc::clone(&self.state),
            released: false,
        })
    }

    /// Rejects (or accepts again) parameter writes.
    pub fn set_reject_parameters(&self, reject: bool) {
        self.lock().reject_parameters = reject;
    }

    /// Fails (or allows again) preview starts.
    pub fn set_fail_preview(&self, fail: bool) {
        self.lock().fail_preview = fail;
    }

    /// Fails (or allows again) capture issuance.
    pub fn set_fail_capture(&self, fail: bool) {
        self.lock().fail_capture = fail;
    }

    /// Changes the payload of subsequent completions.
    pub fn set_payload(&self, payload: Payload) {
        self.lock().payload = payload;
    }

    /// Delivers the oldest queued completion. Returns false if none queued.
    ///
    /// Queued completions survive `release`, which lets tests simulate a
    /// callback arriving after the session closed.
    pub fn complete_next(&self) -> bool {
        let (callback, payload, size) = {
            let mut state = self.lock();
            let Some(callback) = state.pending.pop_front() else {
                return false;
            };
            (callback, state.payload, state.params.picture_size)
        };
        callback(render_payload(payload, size));
        true
    }

    /// Drops every queued completion without invoking it.
    pub fn discard_pending(&self) -> usize {
        let drained: Vec<CaptureCallback> = self.lock().pending.drain(..).collect();
        drained.len()
    }

    /// Number of queued completions.
    pub fn pending_captures(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether a `MockDevice` is currently open.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Whether the preview is running.
    pub fn is_previewing(&self) -> bool {
        self.lock().preview_running
    }

    /// Current parameter set, bypassing the device handle.
    pub fn parameters(&self) -> DeviceParameters {
        self.lock().params.clone()
    }

    /// Accepted parameter writes.
    pub fn parameter_writes(&self) -> u32 {
        self.lock().parameter_writes
    }

    /// Successful preview starts.
    pub fn preview_starts(&self) -> u32 {
        self.lock().preview_starts
    }

    /// Issued captures.
    pub fn captures(&self) -> u32 {
        self.lock().captures
    }

    /// Auto-exposure lock state observed by each issued capture, in order.
    pub fn locked_at_issue(&self) -> Vec<bool> {
        self.lock().locked_at_issue.clone()
    }

    /// Effective releases (repeat releases are not counted).
    pub fn releases(&self) -> u32 {
        self.lock().releases
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open handle to a [`MockHardware`].
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
    released: bool,
}

impl MockDevice {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.released {
            Err(DeviceError::Released)
        } else {
            Ok(())
        }
    }
}

impl CaptureDevice for MockDevice {
    fn parameters(&self) -> Result<DeviceParameters, DeviceError> {
        self.ensure_open()?;
        Ok(self.lock().params.clone())
    }

    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), DeviceError> {
        self.ensure_open()?;
        let mut state = self.lock();
        if state.reject_parameters {
            return Err(DeviceError::ParametersRejected("mock rejects writes".to_owned()));
        }

        // Capability fields are read-only.
        let supported = std::mem::take(&mut state.params.supported_picture_sizes);
        let ae_supported = state.params.auto_exposure_lock_supported;
        let awb_supported = state.params.auto_white_balance_lock_supported;
        state.params = DeviceParameters {
            supported_picture_sizes: supported,
            auto_exposure_lock_supported: ae_supported,
            auto_white_balance_lock_supported: awb_supported,
            ..params.clone()
        };
        state.parameter_writes += 1;
        Ok(())
    }

    fn start_preview(&mut self, target: &PreviewTarget) -> Result<(), DeviceError> {
        self.ensure_open()?;
        let mut state = self.lock();
        if state.fail_preview {
            return Err(DeviceError::Preview(format!("surface {} not ready", target.id)));
        }
        state.preview_running = true;
        state.preview_starts += 1;
        Ok(())
    }

    fn stop_preview(&mut self) {
        if !self.released {
            self.lock().preview_running = false;
        }
    }

    fn take_picture(&mut self, on_complete: CaptureCallback) -> Result<(), DeviceError> {
        self.ensure_open()?;
        let (mode, payload, size) = {
            let mut state = self.lock();
            if state.fail_capture {
                return Err(DeviceError::CaptureFailed("shutter jammed".to_owned()));
            }
            state.captures += 1;
            let locked = state.params.auto_exposure_lock;
            state.locked_at_issue.push(locked);
            if state.completion == CompletionMode::Manual {
                state.pending.push_back(on_complete);
                return Ok(());
            }
            (state.completion, state.payload, state.params.picture_size)
        };

        match mode {
            CompletionMode::Threaded(delay) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    on_complete(render_payload(payload, size));
                });
            }
            _ => on_complete(render_payload(payload, size)),
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut state = self.lock();
        state.open = false;
        state.preview_running = false;
        state.releases += 1;
        tracing::info!("MockDevice released");
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.release();
    }
}

fn render_payload(payload: Payload, size: CaptureSize) -> Result<Vec<u8>, DeviceError> {
    let image = match payload {
        Payload::Corrupt => return Ok(b"\xff\xd8 truncated sensor dump".to_vec()),
        Payload::Solid(rgb) => RgbImage::from_pixel(size.width, size.height, image::Rgb(rgb)),
        Payload::Gradient => RgbImage::from_fn(size.width, size.height, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            let r = (u64::from(x) * 255 / u64::from(size.width)) as u8;
            #[allow(clippy::cast_possible_truncation)]
            let g = (u64::from(y) * 255 / u64::from(size.height)) as u8;
            image::Rgb([r, g, 128])
        }),
    };

    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
        .map_err(|e| DeviceError::CaptureFailed(e.to_string()))?;
    Ok(buffer)
}
