//! Compositing layer seam.

use crate::camera::{Frame, ImportHints, StreamInfo};
use crate::error::LoupeError;
use crate::modes::DisplayMode;
use crate::state::DisplayState;

/// Handle to a texture owned by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Values fed to the fragment program for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderUniforms {
    /// Active display mode.
    pub mode: DisplayMode,
    /// Upper binarization threshold.
    pub contrast_a: f32,
    /// Lower binarization threshold.
    pub contrast_b: f32,
    /// Pivot of the natural-mode contrast stretch.
    pub contrast_c: f32,
    /// Gain applied around mid-gray before any other transform.
    pub global_contrast: f32,
}

impl ShaderUniforms {
    /// Uniforms for a state snapshot.
    pub fn from_state(state: &DisplayState) -> Self {
        Self {
            mode: state.active_mode,
            contrast_a: state.contrast_a,
            contrast_b: state.contrast_b,
            contrast_c: state.contrast_c,
            global_contrast: state.global_contrast,
        }
    }
}

/// Linear RGB color with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
}

impl Color {
    /// Shadow color.
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);
    /// Label color.
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);
    /// "Off" / low-end color.
    pub const RED: Color = Color::new(1.0, 0.2, 0.2);
    /// "On" / high-end color.
    pub const GREEN: Color = Color::new(0.2, 1.0, 0.2);

    /// Create a color.
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Linear interpolation towards `other`; `t` is clamped into `[0, 1]`.
    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: f32, b: f32| (1.0 - t) * a + t * b;
        Color::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

/// A run of glyphs to draw on top of the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDraw {
    /// Text to draw.
    pub text: String,
    /// Baseline origin, x.
    pub x: f32,
    /// Baseline origin, y.
    pub y: f32,
    /// Glyph scale.
    pub scale: f32,
    /// Fill color.
    pub color: Color,
}

/// The graphics layer that turns frames into pixels on screen.
///
/// Only the rendering thread touches a compositor.
pub trait Compositor {
    /// Prepare programs for a stream; called before the first import and
    /// again after every [`release_context`](Compositor::release_context).
    fn setup(&mut self, info: &StreamInfo) -> Result<(), LoupeError>;

    /// Import a frame as a sampleable texture without copying it.
    ///
    /// # Errors
    /// Returns [`LoupeError::Import`] if the descriptor is rejected.
    fn import(&mut self, frame: &Frame, hints: ImportHints) -> Result<TextureId, LoupeError>;

    /// Clear the target and draw `texture` through the display-mode program.
    fn draw_frame(
        &mut self,
        texture: TextureId,
        uniforms: &ShaderUniforms,
    ) -> Result<(), LoupeError>;

    /// Draw text over the current frame.
    fn draw_text(&mut self, text: &TextDraw);

    /// Put the drawn frame on screen.
    fn present(&mut self) -> Result<(), LoupeError>;

    /// Free an imported texture.
    fn delete_texture(&mut self, texture: TextureId);

    /// Drop the rendering context so the next frame sets up from scratch.
    fn release_context(&mut self) {}

    /// Show `text` in the window title or equivalent.
    fn set_info_text(&mut self, _text: &str) {}

    /// Whether the user asked to close the preview.
    fn quit_requested(&mut self) -> bool {
        false
    }

    /// Largest image the compositor can import, as (width, height).
    fn max_image_size(&self) -> (u32, u32);
}
