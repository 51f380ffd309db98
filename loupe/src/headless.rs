//! A compositor that logs instead of drawing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, trace};
use loupe_core::{
    Compositor, Descriptor, Frame, ImportHints, LoupeError, ShaderUniforms, StreamInfo, TextDraw,
    TextureId,
};

/// Largest texture edge accepted, like a typical GLES driver limit.
pub const MAX_TEXTURE_SIZE: u32 = 4096;

/// Stands in for the display on machines without one.
pub struct HeadlessCompositor {
    quit: Arc<AtomicBool>,
    stream: Option<StreamInfo>,
    textures: HashMap<TextureId, Descriptor>,
    next_texture: u32,
    overlay: Vec<String>,
    last_overlay: Vec<String>,
    presented: u64,
}

impl HeadlessCompositor {
    /// Create a compositor that reports a close request once `quit` is set.
    pub fn new(quit: Arc<AtomicBool>) -> Self {
        Self {
            quit,
            stream: None,
            textures: HashMap::new(),
            next_texture: 1,
            overlay: Vec::new(),
            last_overlay: Vec::new(),
            presented: 0,
        }
    }
}

impl Compositor for HeadlessCompositor {
    fn setup(&mut self, info: &StreamInfo) -> Result<(), LoupeError> {
        info!(
            "preview program for {}x{} ({:?})",
            info.width, info.height, info.color_space
        );
        self.stream = Some(*info);
        Ok(())
    }

    fn import(&mut self, frame: &Frame, hints: ImportHints) -> Result<TextureId, LoupeError> {
        let (max_width, max_height) = self.max_image_size();
        if frame.info.width > max_width || frame.info.height > max_height {
            return Err(LoupeError::Import {
                descriptor: frame.descriptor,
                reason: format!(
                    "{}x{} exceeds {}x{}",
                    frame.info.width, frame.info.height, max_width, max_height
                ),
            });
        }
        if self.stream.is_none() {
            return Err(LoupeError::Import {
                descriptor: frame.descriptor,
                reason: "no program set up".into(),
            });
        }

        let texture = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(texture, frame.descriptor);
        debug!(
            "{} -> texture {} ({:?}, {:?} range)",
            frame.descriptor, texture.0, hints.encoding, hints.range
        );
        Ok(texture)
    }

    fn draw_frame(
        &mut self,
        texture: TextureId,
        uniforms: &ShaderUniforms,
    ) -> Result<(), LoupeError> {
        let descriptor = self
            .textures
            .get(&texture)
            .ok_or_else(|| LoupeError::Render(format!("unknown texture {}", texture.0)))?;
        trace!("draw {} as {} {:?}", descriptor, uniforms.mode, uniforms);
        self.overlay.clear();
        Ok(())
    }

    fn draw_text(&mut self, text: &TextDraw) {
        // every run arrives twice, shadow first
        if self.overlay.last() != Some(&text.text) {
            self.overlay.push(text.text.clone());
        }
    }

    fn present(&mut self) -> Result<(), LoupeError> {
        self.presented += 1;
        if self.overlay != self.last_overlay {
            if !self.overlay.is_empty() {
                info!("overlay: {}", self.overlay.join(" "));
            }
            self.last_overlay = std::mem::take(&mut self.overlay);
        }
        trace!("presented frame {}", self.presented);
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn release_context(&mut self) {
        debug!("releasing context, {} textures left", self.textures.len());
        self.textures.clear();
        self.stream = None;
    }

    fn set_info_text(&mut self, text: &str) {
        info!("{}", text);
    }

    fn quit_requested(&mut self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    fn max_image_size(&self) -> (u32, u32) {
        (MAX_TEXTURE_SIZE, MAX_TEXTURE_SIZE)
    }
}
