//! Frame buffer lifecycle.
//!
//! A descriptor moves through
//! `Unseen -> Imported -> Presenting -> ReleasePending -> Released`.
//! The texture import happens once per descriptor and is cached until
//! [`FrameBufferManager::reset`]. Only one descriptor is ever presenting; it
//! goes back to the producer through the done-callback when a different
//! descriptor has replaced it on screen, and not before.

use std::collections::HashMap;

use log::{debug, info, trace, warn};

use crate::camera::{Descriptor, DoneCallback, Frame, ImportHints, StreamInfo};
use crate::compositor::{Compositor, ShaderUniforms, TextureId};
use crate::error::LoupeError;

#[derive(Debug, Clone, Copy)]
struct Buffer {
    size: usize,
    info: StreamInfo,
    texture: TextureId,
}

/// Imports frames, shows them and hands them back in presentation order.
///
/// Owned by the rendering thread.
pub struct FrameBufferManager {
    buffers: HashMap<Descriptor, Buffer>,
    presenting: Option<Descriptor>,
    needs_setup: bool,
    done: DoneCallback,
}

impl FrameBufferManager {
    /// Create a manager that hands descriptors back through `done`.
    pub fn new(done: DoneCallback) -> Self {
        Self {
            buffers: HashMap::new(),
            presenting: None,
            needs_setup: true,
            done,
        }
    }

    /// The descriptor currently on screen.
    pub fn presenting(&self) -> Option<Descriptor> {
        self.presenting
    }

    /// Number of imported descriptors.
    pub fn imported(&self) -> usize {
        self.buffers.len()
    }

    /// Show `frame` with `uniforms`, calling `overlay` after the frame is drawn
    /// and before it is presented.
    ///
    /// # Errors
    /// [`LoupeError::Import`] if the compositor rejects the descriptor, or the
    /// compositor's error if drawing or presenting fails. A frame that does
    /// not make it on screen is handed back immediately, and the frame shown
    /// before it stays up.
    pub fn show<C, F>(
        &mut self,
        compositor: &mut C,
        frame: &Frame,
        uniforms: &ShaderUniforms,
        overlay: F,
    ) -> Result<(), LoupeError>
    where
        C: Compositor + ?Sized,
        F: FnOnce(&mut C),
    {
        let descriptor = frame.descriptor;

        match self.draw(compositor, frame, uniforms, overlay) {
            Ok(()) => {
                if self.presenting != Some(descriptor) {
                    if let Some(previous) = self.presenting.replace(descriptor) {
                        trace!("releasing {}", previous);
                        (self.done)(previous);
                    }
                }
                Ok(())
            }
            Err(e) => {
                if self.presenting != Some(descriptor) {
                    warn!("{} not shown, handing it back: {}", descriptor, e);
                    (self.done)(descriptor);
                }
                Err(e)
            }
        }
    }

    fn draw<C, F>(
        &mut self,
        compositor: &mut C,
        frame: &Frame,
        uniforms: &ShaderUniforms,
        overlay: F,
    ) -> Result<(), LoupeError>
    where
        C: Compositor + ?Sized,
        F: FnOnce(&mut C),
    {
        let texture = self.texture_for(compositor, frame)?;
        compositor.draw_frame(texture, uniforms)?;
        overlay(compositor);
        compositor.present()
    }

    fn texture_for<C>(&mut self, compositor: &mut C, frame: &Frame) -> Result<TextureId, LoupeError>
    where
        C: Compositor + ?Sized,
    {
        if let Some(buffer) = self.buffers.get(&frame.descriptor) {
            if buffer.info != frame.info || buffer.size != frame.size {
                debug!(
                    "{} metadata changed without a reset, keeping the first import",
                    frame.descriptor
                );
            }
            return Ok(buffer.texture);
        }

        if self.needs_setup {
            compositor.setup(&frame.info)?;
            self.needs_setup = false;
            info!(
                "compositor set up for {}x{} stride {}",
                frame.info.width, frame.info.height, frame.info.stride
            );
        }

        let hints = ImportHints::for_color_space(frame.info.color_space);
        let texture = compositor.import(frame, hints)?;
        debug!("imported {} as {:?}", frame.descriptor, texture);

        self.buffers.insert(
            frame.descriptor,
            Buffer {
                size: frame.size,
                info: frame.info,
                texture,
            },
        );
        Ok(texture)
    }

    /// Drop every imported texture and forget the presenting descriptor.
    ///
    /// Used when the stream format changes and the producer discards its
    /// buffers, so nothing is handed back. The next frame sets the compositor
    /// up again.
    pub fn reset<C: Compositor + ?Sized>(&mut self, compositor: &mut C) {
        for (_, buffer) in self.buffers.drain() {
            compositor.delete_texture(buffer.texture);
        }
        self.presenting = None;
        compositor.release_context();
        self.needs_setup = true;
        debug!("frame buffers reset");
    }
}
