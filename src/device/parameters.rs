//! Device parameter set and capture sizes.
//!
//! The parameter set is read and written as a whole: every change is a
//! read-modify-write round-trip through [`CaptureDevice`](super::CaptureDevice).

use serde::{Deserialize, Serialize};

/// A still-capture resolution in pixels.
///
/// Devices report sizes landscape-referenced (width ≥ height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CaptureSize {
    /// Creates a size, returning `None` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    /// True for an exact 16:9 aspect ratio.
    #[inline]
    pub fn is_sixteen_by_nine(&self) -> bool {
        u64::from(self.width) * 9 == u64::from(self.height) * 16
    }

    /// True when width ≥ height.
    #[inline]
    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }

    /// Total pixel count.
    #[inline]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Display for CaptureSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Scene mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneMode {
    /// Let the device choose.
    #[default]
    Auto,
    /// Landscape preset.
    Landscape,
    /// Night preset.
    Night,
}

/// Color effect applied by the image signal processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorEffect {
    /// No effect.
    #[default]
    None,
    /// Monochrome.
    Mono,
    /// Sepia.
    Sepia,
}

/// Mains-flicker compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Antibanding {
    /// Disabled.
    Off,
    /// Device decides.
    #[default]
    Auto,
    /// 50 Hz mains.
    Hz50,
    /// 60 Hz mains.
    Hz60,
}

/// Focus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusMode {
    /// Continuous autofocus for stills.
    #[default]
    ContinuousPicture,
    /// Single-shot autofocus.
    Auto,
    /// Fixed at infinity.
    Infinity,
    /// Fixed-focus lens.
    Fixed,
}

/// Full parameter set of a capture device.
///
/// Capability fields (`supported_picture_sizes`, `*_lock_supported`) are
/// reported by the device and ignored on write.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceParameters {
    /// Current still-capture size.
    pub picture_size: CaptureSize,
    /// Sizes the device accepts for still capture.
    pub supported_picture_sizes: Vec<CaptureSize>,
    /// Scene mode.
    pub scene_mode: SceneMode,
    /// Color effect.
    pub color_effect: ColorEffect,
    /// Antibanding mode.
    pub antibanding: Antibanding,
    /// Zoom index, 0 being no zoom.
    pub zoom: u32,
    /// Focus mode.
    pub focus_mode: FocusMode,
    /// Hint that the session records video.
    pub recording_hint: bool,
    /// Whether auto-exposure is currently locked.
    pub auto_exposure_lock: bool,
    /// Whether auto-white-balance is currently locked.
    pub auto_white_balance_lock: bool,
    /// Whether the device can lock auto-exposure.
    pub auto_exposure_lock_supported: bool,
    /// Whether the device can lock auto-white-balance.
    pub auto_white_balance_lock_supported: bool,
    /// Horizontal view angle in degrees, used downstream for mosaicking.
    pub horizontal_view_angle: f32,
    /// Vertical view angle in degrees.
    pub vertical_view_angle: f32,
}

impl DeviceParameters {
    /// Creates a parameter set for a device whose default size is the
    /// largest of `supported`.
    pub fn with_supported_sizes(supported: Vec<CaptureSize>) -> Self {
        let picture_size = supported
            .iter()
            .copied()
            .max_by_key(CaptureSize::pixel_count)
            .unwrap_or(CaptureSize {
                width: 640,
                height: 480,
            });

        Self {
            picture_size,
            supported_picture_sizes: supported,
            scene_mode: SceneMode::default(),
            color_effect: ColorEffect::default(),
            antibanding: Antibanding::default(),
            zoom: 0,
            focus_mode: FocusMode::default(),
            recording_hint: false,
            auto_exposure_lock: false,
            auto_white_balance_lock: false,
            auto_exposure_lock_supported: true,
            auto_white_balance_lock_supported: true,
            horizontal_view_angle: 62.0,
            vertical_view_angle: 48.0,
        }
    }
}
