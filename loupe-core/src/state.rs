//! Display state snapshot.

use std::time::Instant;

use crate::calibration::Calibration;
use crate::camera::Rect;
use crate::modes::DisplayMode;

/// Smallest allowed distance between `contrast_a` and `contrast_b`.
pub const CONTRAST_PAIR_GAP: f32 = 0.01;
/// Upper bound of `contrast_a`.
pub const CONTRAST_A_MAX: f32 = 1.0;
/// Bounds of `contrast_c`.
pub const CONTRAST_C_RANGE: (f32, f32) = (-1.0, 0.5);
/// Bounds of `global_contrast`.
pub const GLOBAL_CONTRAST_RANGE: (f32, f32) = (1.0, 4.0);
/// Zoom factor showing the full sensor crop.
pub const ZOOM_MAX: f32 = 1.0;

/// A user-visible change that gets a transient overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeCategory {
    /// Zoom factor changed.
    Zoom,
    /// Autofocus lock toggled.
    Autofocus,
    /// Display mode changed.
    Mode,
}

/// When each [`ChangeCategory`] last changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeTimes {
    /// Last zoom change.
    pub zoom: Option<Instant>,
    /// Last autofocus toggle.
    pub autofocus: Option<Instant>,
    /// Last mode change.
    pub mode: Option<Instant>,
}

impl ChangeTimes {
    /// Timestamp for a category.
    pub fn get(&self, category: ChangeCategory) -> Option<Instant> {
        match category {
            ChangeCategory::Zoom => self.zoom,
            ChangeCategory::Autofocus => self.autofocus,
            ChangeCategory::Mode => self.mode,
        }
    }

    pub(crate) fn stamp(&mut self, category: ChangeCategory, now: Instant) {
        let slot = match category {
            ChangeCategory::Zoom => &mut self.zoom,
            ChangeCategory::Autofocus => &mut self.autofocus,
            ChangeCategory::Mode => &mut self.mode,
        };
        *slot = Some(now);
    }
}

/// A snapshot of the shared rendering parameters.
///
/// The live copy sits behind
/// [`DisplayStateStore`](crate::DisplayStateStore); everything else only
/// ever sees clones taken with
/// [`snapshot`](crate::DisplayStateStore::snapshot).
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    /// Mode applied to the live frame.
    pub active_mode: DisplayMode,
    /// Last non-natural mode, restored by a swap from natural.
    pub previous_mode: DisplayMode,
    /// Zoom factor in `[zoom_min, 1.0]`; 1.0 shows the full sensor crop.
    pub zoom: f32,
    /// Configured lower bound of `zoom`.
    pub zoom_min: f32,
    /// Largest sensor crop, once the camera reported it.
    pub crop_maximum: Option<Rect>,
    /// Crop currently requested from the camera.
    pub crop: Option<Rect>,
    /// Upper binarization threshold; always `>= contrast_b + 0.01`.
    pub contrast_a: f32,
    /// Lower binarization threshold.
    pub contrast_b: f32,
    /// Natural-mode contrast pivot in `[-1.0, 0.5]`.
    pub contrast_c: f32,
    /// Global contrast gain in `[1.0, 4.0]`.
    pub global_contrast: f32,
    /// Whether autofocus is locked (manual).
    pub autofocus_locked: bool,
    /// Overlay timestamps.
    pub changed: ChangeTimes,
}

impl DisplayState {
    /// Initial state from persisted calibration.
    ///
    /// `zoom_min` must lie in `(0, 1)`; it is clamped there otherwise.
    pub fn new(calibration: Calibration, zoom_min: f32) -> Self {
        let calibration = calibration.sanitized();
        Self {
            active_mode: DisplayMode::Natural,
            previous_mode: DisplayMode::Natural.cycled(1),
            zoom: ZOOM_MAX,
            zoom_min: zoom_min.clamp(f32::EPSILON, ZOOM_MAX - f32::EPSILON),
            crop_maximum: None,
            crop: None,
            contrast_a: calibration.contrast_a,
            contrast_b: calibration.contrast_b,
            contrast_c: calibration.contrast_c,
            global_contrast: calibration.global_contrast,
            autofocus_locked: false,
            changed: ChangeTimes::default(),
        }
    }

    /// The persisted subset of this state.
    pub fn calibration(&self) -> Calibration {
        Calibration {
            contrast_a: self.contrast_a,
            contrast_b: self.contrast_b,
            contrast_c: self.contrast_c,
            global_contrast: self.global_contrast,
        }
    }

    /// Zoom progress in `[0, 1]`: 0 at no zoom, 1 at `zoom_min`.
    pub fn zoom_fraction(&self) -> f32 {
        (1.0 - (self.zoom - self.zoom_min) / (ZOOM_MAX - self.zoom_min)).clamp(0.0, 1.0)
    }

    /// Zoom progress as a whole percentage.
    pub fn zoom_percent(&self) -> u32 {
        (self.zoom_fraction() * 100.0).round() as u32
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new(Calibration::default(), 0.25)
    }
}
