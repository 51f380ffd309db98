//! Transient status overlay.
//!
//! After a zoom, autofocus or mode change, a short text block is drawn over
//! the preview for two seconds. Every string is drawn twice: a black copy
//! offset by [`OverlayLayout::shadow_offset`] first, then the colored text.

use std::time::{Duration, Instant};

use log::trace;
use serde::Deserialize;

use crate::compositor::{Color, Compositor, TextDraw};
use crate::state::{ChangeCategory, DisplayState};

/// Default time an overlay stays visible after a change.
pub const DEFAULT_VISIBLE_FOR: Duration = Duration::from_millis(2000);

/// Where overlay text goes, in compositor text coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayLayout {
    /// Offset of the drop shadow from the text.
    pub shadow_offset: [f32; 2],
    /// Glyph scale.
    pub scale: f32,
    /// "Zoom" label origin.
    pub zoom_label: [f32; 2],
    /// Zoom percentage origin for a three-digit value.
    pub zoom_value: [f32; 2],
    /// Shift right per digit fewer than three, keeping the value centered.
    pub digit_indent: f32,
    /// "Autofocus" label origin.
    pub autofocus_label: [f32; 2],
    /// Autofocus state origin.
    pub autofocus_value: [f32; 2],
    /// "Mode" label origin.
    pub mode_label: [f32; 2],
    /// Mode name origin.
    pub mode_value: [f32; 2],
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            shadow_offset: [22.0, 13.0],
            scale: 1.0,
            zoom_label: [1896.0, 2200.0],
            zoom_value: [1920.0, 2450.0],
            digit_indent: 95.0,
            autofocus_label: [90.0, 350.0],
            autofocus_value: [1300.0, 350.0],
            mode_label: [90.0, 2200.0],
            mode_value: [90.0, 2450.0],
        }
    }
}

/// Draws the status overlay from a state snapshot.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    layout: OverlayLayout,
    visible_for: Duration,
    draws: u64,
}

impl OverlayRenderer {
    /// Create a renderer.
    pub fn new(layout: OverlayLayout, visible_for: Duration) -> Self {
        Self {
            layout,
            visible_for,
            draws: 0,
        }
    }

    /// Whether `category` changed recently enough to be shown at `now`.
    pub fn is_visible(&self, state: &DisplayState, category: ChangeCategory, now: Instant) -> bool {
        state
            .changed
            .get(category)
            .is_some_and(|at| now.saturating_duration_since(at) < self.visible_for)
    }

    /// Text to draw for `state` at `now`, shadows before their text.
    pub fn compose(&self, state: &DisplayState, now: Instant) -> Vec<TextDraw> {
        let mut out = Vec::new();

        if self.is_visible(state, ChangeCategory::Zoom, now) {
            let percent = state.zoom_percent();
            let digits = percent.to_string().len() as f32;
            let [x, y] = self.layout.zoom_value;
            let x = x + (3.0 - digits).max(0.0) * self.layout.digit_indent;
            let color = Color::RED.lerp(Color::GREEN, state.zoom_fraction());

            self.push(&mut out, "Zoom", self.layout.zoom_label, Color::WHITE);
            self.push(&mut out, &format!("{}%", percent), [x, y], color);
        }

        if self.is_visible(state, ChangeCategory::Autofocus, now) {
            let (text, color) = if state.autofocus_locked {
                ("Disabled", Color::RED)
            } else {
                ("Enabled", Color::GREEN)
            };

            self.push(&mut out, "Autofocus ", self.layout.autofocus_label, Color::WHITE);
            self.push(&mut out, text, self.layout.autofocus_value, color);
        }

        if self.is_visible(state, ChangeCategory::Mode, now) {
            self.push(&mut out, "Mode", self.layout.mode_label, Color::WHITE);
            self.push(&mut out, state.active_mode.name(), self.layout.mode_value, Color::WHITE);
        }

        out
    }

    fn push(&self, out: &mut Vec<TextDraw>, text: &str, [x, y]: [f32; 2], color: Color) {
        let [dx, dy] = self.layout.shadow_offset;
        out.push(TextDraw {
            text: text.to_string(),
            x: x + dx,
            y: y + dy,
            scale: self.layout.scale,
            color: Color::BLACK,
        });
        out.push(TextDraw {
            text: text.to_string(),
            x,
            y,
            scale: self.layout.scale,
            color,
        });
    }

    /// Draw the overlay through `compositor`; returns how many runs were drawn.
    pub fn render<C: Compositor + ?Sized>(
        &mut self,
        compositor: &mut C,
        state: &DisplayState,
        now: Instant,
    ) -> usize {
        let draws = self.compose(state, now);
        for text in &draws {
            compositor.draw_text(text);
        }
        self.draws += 1;
        trace!("overlay pass {} drew {} runs", self.draws, draws.len());
        draws.len()
    }

    /// Number of overlay passes so far.
    pub fn draw_count(&self) -> u64 {
        self.draws
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(OverlayLayout::default(), DEFAULT_VISIBLE_FOR)
    }
}
