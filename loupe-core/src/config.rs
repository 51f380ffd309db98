//! Runtime configuration.
//!
//! Everything here has a default, so an empty file (or no file at all) gives
//! the stock behaviour:
//!
//! ```toml
//! zoom_min = 0.25
//! zoom_step = 0.01
//! tap_threshold_ms = 560
//! mode_direction = "inverted"
//! calibration_path = "calibration.txt"
//!
//! [overlay]
//! shadow_offset = [22.0, 13.0]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::Deserialize;

use crate::error::LoupeError;
use crate::input::{AdjustSteps, ControlId, DEFAULT_TAP_THRESHOLD, Direction};
use crate::overlay::{DEFAULT_VISIBLE_FOR, OverlayLayout};

/// Tunables for the preview core.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Smallest zoom factor (largest magnification), in `(0, 1)`.
    pub zoom_min: f32,
    /// Zoom change per detent.
    pub zoom_step: f32,
    /// Threshold and pivot change per detent.
    pub contrast_step: f32,
    /// Global contrast change per detent.
    pub global_contrast_step: f32,
    /// Presses shorter than this are taps.
    pub tap_threshold_ms: u64,
    /// How long an overlay stays up after a change.
    pub overlay_duration_ms: u64,
    /// Sign convention of the mode encoder.
    pub mode_direction: Direction,
    /// Sign convention of the zoom encoder.
    pub zoom_direction: Direction,
    /// Where contrast calibration is kept.
    pub calibration_path: PathBuf,
    /// Overlay text placement.
    pub overlay: OverlayLayout,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        let steps = AdjustSteps::default();
        Self {
            zoom_min: 0.25,
            zoom_step: steps.zoom,
            contrast_step: steps.contrast,
            global_contrast_step: steps.global_contrast,
            tap_threshold_ms: DEFAULT_TAP_THRESHOLD.as_millis() as u64,
            overlay_duration_ms: DEFAULT_VISIBLE_FOR.as_millis() as u64,
            mode_direction: Direction::Inverted,
            zoom_direction: Direction::Inverted,
            calibration_path: PathBuf::from("calibration.txt"),
            overlay: OverlayLayout::default(),
        }
    }
}

impl PreviewConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, LoupeError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, LoupeError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is usable.
    ///
    /// # Errors
    /// Returns [`LoupeError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), LoupeError> {
        fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> LoupeError {
            LoupeError::InvalidConfig {
                field,
                value: value.to_string(),
                reason,
            }
        }

        if !(self.zoom_min > 0.0 && self.zoom_min < 1.0) {
            return Err(invalid("zoom_min", self.zoom_min, "must be in (0, 1)"));
        }
        for (field, step) in [
            ("zoom_step", self.zoom_step),
            ("contrast_step", self.contrast_step),
            ("global_contrast_step", self.global_contrast_step),
        ] {
            if !(step.is_finite() && step > 0.0) {
                return Err(invalid(field, step, "must be positive"));
            }
        }
        if self.tap_threshold_ms == 0 {
            return Err(invalid("tap_threshold_ms", 0, "must be positive"));
        }
        Ok(())
    }

    /// Tap threshold as a duration.
    pub fn tap_threshold(&self) -> Duration {
        Duration::from_millis(self.tap_threshold_ms)
    }

    /// Overlay visibility window as a duration.
    pub fn overlay_duration(&self) -> Duration {
        Duration::from_millis(self.overlay_duration_ms)
    }

    /// Sign convention for `control`.
    pub fn direction(&self, control: ControlId) -> Direction {
        match control {
            ControlId::Mode => self.mode_direction,
            ControlId::Zoom => self.zoom_direction,
        }
    }

    /// Per-detent steps.
    pub fn steps(&self) -> AdjustSteps {
        AdjustSteps {
            zoom: self.zoom_step,
            contrast: self.contrast_step,
            global_contrast: self.global_contrast_step,
        }
    }
}
