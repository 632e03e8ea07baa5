//! Capture size negotiation.
//!
//! A saved size from a previous session wins outright. Otherwise the
//! negotiator looks for a 16:9 size tall enough for stitching (height > 500),
//! preferring the narrowest one that still reaches the reference width. When
//! nothing qualifies the device keeps its own default, which is usually its
//! largest size.

use crate::config::SizePreference;
use crate::device::{CaptureDevice, CaptureSize, DeviceError};

/// Sizes at or below this height are too small to stitch.
pub const MIN_CAPTURE_HEIGHT: u32 = 500;

/// Picks and applies the capture size for a session.
#[derive(Debug, Clone, Copy)]
pub struct SizeNegotiator {
    reference_width: u32,
}

impl SizeNegotiator {
    /// Creates a negotiator preferring widths of at least `reference_width`.
    pub fn new(reference_width: u32) -> Self {
        Self { reference_width }
    }

    /// Chooses a size, or `None` to keep the device default.
    ///
    /// A saved preference is trusted verbatim and is not checked against
    /// `supported`.
    pub fn negotiate(
        &self,
        supported: &[CaptureSize],
        preference: SizePreference,
    ) -> Option<CaptureSize> {
        if let Some(saved) = preference.size() {
            return Some(saved);
        }

        let qualifying = || {
            supported
                .iter()
                .copied()
                .filter(|s| s.is_sixteen_by_nine() && s.height > MIN_CAPTURE_HEIGHT)
        };

        qualifying()
            .filter(|s| s.width >= self.reference_width)
            .min_by_key(|s| s.width)
            .or_else(|| qualifying().max_by_key(|s| s.width))
    }

    /// Negotiates against the device's reported sizes and writes the choice.
    ///
    /// Performs exactly one parameter write when a size is chosen and none
    /// otherwise.
    pub fn apply<D: CaptureDevice>(
        &self,
        device: &mut D,
        preference: SizePreference,
    ) -> Result<Option<CaptureSize>, DeviceError> {
        let mut params = device.parameters()?;
        for size in &params.supported_picture_sizes {
            tracing::trace!(width = size.width, height = size.height, "Supported size");
        }

        let Some(chosen) = self.negotiate(&params.supported_picture_sizes, preference) else {
            tracing::info!(
                default = %params.picture_size,
                "No 16:9 size qualifies, keeping device default"
            );
            return Ok(None);
        };

        params.picture_size = chosen;
        device.set_parameters(&params)?;
        tracing::info!(
            size = %chosen,
            saved = preference.size().is_some(),
            "Capture size applied"
        );
        Ok(Some(chosen))
    }
}

impl Default for SizeNegotiator {
    fn default() -> Self {
        Self::new(1000)
    }
}
