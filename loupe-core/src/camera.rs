//! Camera capture seam.
//!
//! The capture pipeline itself lives outside this crate. It hands frames over
//! as opaque [`Descriptor`]s with per-frame [`StreamInfo`], expects each one
//! back through a [`DoneCallback`] once it may be reused, and accepts
//! [`Control`] updates for autofocus and cropping.

use std::fmt;

use log::warn;

use crate::error::LoupeError;

// =============================================================================
// Frames
// =============================================================================

/// Opaque handle to frame memory owned by the capture subsystem
/// (a dma-buf file descriptor on Linux).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor(pub i32);

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Color space reported by the camera for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// JPEG-style full-range BT.601.
    Sycc,
    /// Limited-range BT.601.
    Smpte170m,
    /// Limited-range BT.709.
    Rec709,
    /// Limited-range BT.2020.
    Rec2020,
    /// Raw sensor data.
    Raw,
}

/// Geometry and encoding of the frames in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Luma row stride in bytes.
    pub stride: u32,
    /// Color space, if the camera reported one.
    pub color_space: Option<ColorSpace>,
}

/// A completed frame delivered by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Handle to the frame memory.
    pub descriptor: Descriptor,
    /// Size of the mapped buffer in bytes.
    pub size: usize,
    /// Frame metadata.
    pub info: StreamInfo,
}

/// Called with a descriptor once the producer may overwrite it.
///
/// Runs on the rendering thread and must not block.
pub type DoneCallback = Box<dyn FnMut(Descriptor) + Send>;

// =============================================================================
// Import Hints
// =============================================================================

/// YUV matrix used when importing a frame as a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YuvEncoding {
    /// ITU-R BT.601.
    Rec601,
    /// ITU-R BT.709.
    Rec709,
}

/// Sample range used when importing a frame as a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRange {
    /// 16-235 luma.
    Narrow,
    /// 0-255 luma.
    Full,
}

/// Color-space hints passed to the compositor on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportHints {
    /// YUV matrix.
    pub encoding: YuvEncoding,
    /// Sample range.
    pub range: SampleRange,
}

impl ImportHints {
    /// Map a stream color space to import hints.
    ///
    /// Unknown or unsupported spaces fall back to narrow-range BT.601.
    pub fn for_color_space(color_space: Option<ColorSpace>) -> Self {
        let mut hints = ImportHints {
            encoding: YuvEncoding::Rec601,
            range: SampleRange::Narrow,
        };

        match color_space {
            Some(ColorSpace::Sycc) => hints.range = SampleRange::Full,
            Some(ColorSpace::Smpte170m) => {}
            Some(ColorSpace::Rec709) => hints.encoding = YuvEncoding::Rec709,
            other => warn!("unexpected colour space {:?}, assuming smpte170m", other),
        }

        hints
    }
}

// =============================================================================
// Controls
// =============================================================================

/// A rectangle in sensor pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a rectangle.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, rounded towards the top-left.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// Crop for a zoom factor, centered on this (maximum) crop.
    ///
    /// Each side is scaled by `zoom²`, which gives a perceptually even step
    /// per encoder detent. `zoom` is clamped into `(0, 1]`.
    pub fn zoomed(&self, zoom: f32) -> Rect {
        let zoom = zoom.clamp(f32::EPSILON, 1.0);
        let factor = zoom * zoom;

        let width = ((self.width as f32 * factor).round() as u32).clamp(1, self.width.max(1));
        let height = ((self.height as f32 * factor).round() as u32).clamp(1, self.height.max(1));

        let (cx, cy) = self.center();
        Rect {
            x: cx - (width / 2) as i32,
            y: cy - (height / 2) as i32,
            width,
            height,
        }
    }
}

/// Autofocus control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfMode {
    /// Lens is left where it is.
    Manual,
    /// Lens continuously refocuses.
    Continuous,
}

/// A control update for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Set the autofocus mode.
    AfMode(AfMode),
    /// Set the sensor crop used for digital zoom.
    ScalerCrop(Rect),
}

/// Accepts control updates for the running camera.
///
/// Called from input threads while the display state is locked, so
/// implementations must only queue the update.
pub trait CameraControls: Send + Sync {
    /// Queue controls to be applied to upcoming requests.
    fn set_controls(&self, controls: &[Control]);
}

// =============================================================================
// Camera Source
// =============================================================================

/// What the camera event loop received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraMessage {
    /// A frame is ready to be shown.
    RequestComplete(Frame),
    /// No frame arrived within the expected interval.
    Timeout,
    /// The camera was shut down.
    Quit,
}

/// A running capture pipeline as seen by the preview loop.
pub trait CameraSource {
    /// Start (or restart) streaming.
    fn start(&mut self) -> Result<(), LoupeError>;

    /// Stop streaming.
    fn stop(&mut self);

    /// Block until the next event.
    fn wait(&mut self) -> CameraMessage;

    /// Largest crop the sensor supports, known once the camera is started.
    fn sensor_crop_maximum(&self) -> Option<Rect>;

    /// Callback handing descriptors back to this camera.
    fn done_callback(&self) -> DoneCallback;
}
