//! Exposure and white-balance locking.
//!
//! Every frame of a sphere must share the same exposure and white balance or
//! the seams show. Locking pins AE/AWB and also fixes the parameters that
//! would otherwise drift between shots (scene, focus, zoom).
//!
//! `unlock` only releases the AE/AWB locks. The scene, focus and zoom
//! settings written by `lock` stay in place.

use crate::device::{
    Antibanding, CaptureDevice, ColorEffect, DeviceError, DeviceParameters, FocusMode, SceneMode,
};

/// Applies and releases exposure locks on a device.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExposureLockController;

impl ExposureLockController {
    /// Creates a controller.
    pub fn new() -> Self {
        Self
    }

    /// Pins exposure, white balance, focus and scene parameters.
    ///
    /// AE and AWB locks are only requested when the device reports support
    /// for them. Returns the parameter set that was written.
    pub fn lock<D: CaptureDevice>(&self, device: &mut D) -> Result<DeviceParameters, DeviceError> {
        let mut params = device.parameters()?;
        params.scene_mode = SceneMode::Auto;
        params.color_effect = ColorEffect::None;
        params.antibanding = Antibanding::Off;
        params.zoom = 0;
        params.focus_mode = FocusMode::Infinity;
        params.recording_hint = false;

        if params.auto_exposure_lock_supported {
            params.auto_exposure_lock = true;
        }
        if params.auto_white_balance_lock_supported {
            params.auto_white_balance_lock = true;
        }

        device.set_parameters(&params)?;
        tracing::info!(
            ae_locked = params.auto_exposure_lock,
            awb_locked = params.auto_white_balance_lock,
            "Exposure locked"
        );
        Ok(params)
    }

    /// Releases the AE and AWB locks where supported.
    pub fn unlock<D: CaptureDevice>(
        &self,
        device: &mut D,
    ) -> Result<DeviceParameters, DeviceError> {
        let mut params = device.parameters()?;
        if params.auto_exposure_lock_supported {
            params.auto_exposure_lock = false;
        }
        if params.auto_white_balance_lock_supported {
            params.auto_white_balance_lock = false;
        }

        device.set_parameters(&params)?;
        tracing::info!("Exposure unlocked");
        Ok(params)
    }
}
