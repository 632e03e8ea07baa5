//! Capture session configuration.
//!
//! Exposure is pinned after a short warm-up so that every frame of a
//! sphere shares the same photometry. The warm-up length, the reference
//! width used to pick a capture size, and the post-processing format all
//! live here.

use crate::device::CaptureSize;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// When the single-flight token is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardRelease {
    /// As soon as the capture request has been issued. A new capture may be
    /// issued while the previous completion is still in flight.
    OnIssue,
    /// After the completion has filled the reserved slot.
    #[default]
    OnCompletion,
}

/// Pixel layout of decoded artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 16 bits per pixel, 5-6-5.
    #[default]
    Rgb565,
    /// 32 bits per pixel.
    Rgba8888,
}

impl PixelFormat {
    /// Bytes per pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb565 => 2,
            Self::Rgba8888 => 4,
        }
    }
}

/// Post-processing applied to raw captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Output pixel format.
    pub pixel_format: PixelFormat,
    /// Ordered dithering when reducing to a 16-bit format.
    pub dither: bool,
    /// Power-of-two downsampling factor (1 keeps full resolution).
    ///
    /// Applied after a full-resolution decode, so it shrinks the stored
    /// artifact but not the peak memory of decoding itself.
    pub sample_size: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb565,
            dither: true,
            sample_size: 1,
        }
    }
}

/// Configuration for a capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum width preferred when choosing a 16:9 capture size.
    pub reference_width: u32,
    /// Delay before the first lock, letting AE/AWB converge.
    pub lock_warmup_ms: u64,
    /// Busy-guard release policy.
    pub guard_release: GuardRelease,
    /// How long an issued capture may stay without a completion before its
    /// slot is failed and the busy guard is freed.
    pub completion_timeout_ms: u64,
    /// Artifact post-processing.
    pub decode: DecodeOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reference_width: 1000,
            lock_warmup_ms: 150,
            guard_release: GuardRelease::OnCompletion,
            completion_timeout_ms: 10_000,
            decode: DecodeOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Warm-up delay as a `Duration`.
    #[inline]
    pub fn lock_warmup(&self) -> Duration {
        Duration::from_millis(self.lock_warmup_ms)
    }

    /// Completion deadline as a `Duration`.
    #[inline]
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reference_width == 0 {
            return Err(ConfigError::InvalidReferenceWidth);
        }
        if self.lock_warmup_ms > 5000 {
            return Err(ConfigError::InvalidWarmup(self.lock_warmup_ms));
        }
        if self.completion_timeout_ms == 0 || self.completion_timeout_ms > 120_000 {
            return Err(ConfigError::InvalidCompletionTimeout(
                self.completion_timeout_ms,
            ));
        }
        let sample = self.decode.sample_size;
        if !sample.is_power_of_two() || sample > 16 {
            return Err(ConfigError::InvalidSampleSize(sample));
        }
        Ok(())
    }
}

/// Previously chosen capture size. `0 x 0` means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SizePreference {
    /// Saved width, 0 if unset.
    pub width: u32,
    /// Saved height, 0 if unset.
    pub height: u32,
}

impl SizePreference {
    /// No saved size.
    pub const UNSET: Self = Self {
        width: 0,
        height: 0,
    };

    /// Creates a preference.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The saved size, if both dimensions are positive.
    pub fn size(&self) -> Option<CaptureSize> {
        CaptureSize::new(self.width, self.height)
    }

    /// Validates that the pair is either fully set or fully unset.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (self.width == 0) != (self.height == 0) {
            return Err(ConfigError::InvalidPreference {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// `reference_width` is zero.
    #[error("reference width must be positive")]
    InvalidReferenceWidth,
    /// `lock_warmup_ms` is too long.
    #[error("lock warm-up of {0} ms exceeds 5000 ms")]
    InvalidWarmup(u64),
    /// `completion_timeout_ms` is zero or too long.
    #[error("completion timeout of {0} ms must be between 1 and 120000 ms")]
    InvalidCompletionTimeout(u64),
    /// `sample_size` is not a supported power of two.
    #[error("sample size {0} must be a power of two between 1 and 16")]
    InvalidSampleSize(u32),
    /// Only one dimension of the saved size is set.
    #[error("saved size {width}x{height} must set both dimensions or neither")]
    InvalidPreference {
        /// Saved width.
        width: u32,
        /// Saved height.
        height: u32,
    },
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[session]` table.
    #[serde(default)]
    pub session: SessionConfig,
    /// `[preference]` table.
    #[serde(default)]
    pub preference: SizePreference,
    /// `[demo]` table.
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Settings for the demonstration binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of captures to take if not continuous.
    pub captures: u32,
    /// Pause between captures.
    pub interval_ms: u64,
    /// How long to wait for each artifact.
    pub wait_timeout_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            captures: 5,
            interval_ms: 200,
            wait_timeout_ms: 5000,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.session.validate()?;
        config.preference.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock_warmup(), Duration::from_millis(150));
    }

    #[test]
    fn test_zero_reference_width_invalid() {
        let config = SessionConfig {
            reference_width: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidReferenceWidth)
        ));
    }

    #[test]
    fn test_completion_timeout_bounds() {
        let mut config = SessionConfig {
            completion_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCompletionTimeout(0))
        ));
        config.completion_timeout_ms = 120_001;
        assert!(config.validate().is_err());
        config.completion_timeout_ms = 250;
        assert!(config.validate().is_ok());
        assert_eq!(config.completion_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_sample_size_must_be_power_of_two() {
        let mut config = SessionConfig::default();
        config.decode.sample_size = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSampleSize(3))
        ));
        config.decode.sample_size = 0;
        assert!(config.validate().is_err());
        config.decode.sample_size = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preference_half_set_invalid() {
        assert!(SizePreference::new(1920, 0).validate().is_err());
        assert!(SizePreference::UNSET.validate().is_ok());
        assert_eq!(SizePreference::UNSET.size(), None);
        assert_eq!(
            SizePreference::new(1920, 1080).size(),
            CaptureSize::new(1920, 1080)
        );
    }

    #[test]
    fn test_parse_toml() {
        let config = FileConfig::from_toml(
            r#"
            [session]
            reference_width = 1200
            lock_warmup_ms = 50
            guard_release = "on_issue"

            [session.decode]
            pixel_format = "rgba8888"
            dither = false
            sample_size = 2

            [preference]
            width = 1920
            height = 1080
            "#,
        )
        .unwrap();

        assert_eq!(config.session.reference_width, 1200);
        assert_eq!(config.session.guard_release, GuardRelease::OnIssue);
        assert_eq!(config.session.decode.pixel_format, PixelFormat::Rgba8888);
        assert_eq!(config.session.decode.sample_size, 2);
        assert_eq!(config.preference, SizePreference::new(1920, 1080));
        assert_eq!(config.demo.captures, 5);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = FileConfig::from_toml("").unwrap();
        assert_eq!(config.session.reference_width, 1000);
        assert_eq!(config.preference, SizePreference::UNSET);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            FileConfig::from_toml("[session]\nlock_warmup_ms = 99999\nreference_width = 1\nguard_release = \"on_issue\""),
            Err(ConfigError::InvalidWarmup(99999))
        ));
        assert!(matches!(
            FileConfig::from_toml("[session"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
