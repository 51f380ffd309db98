//! In-memory stand-ins for the camera, compositor, clock and calibration
//! store.
//!
//! These let the preview core run without a camera or a GPU, in tests and
//! in the headless binary.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use loupe_core::{DisplayState, DisplayStateStore, ManualClock, MemoryCalibration, MockCamera};
//!
//! let camera = Arc::new(MockCamera::new());
//! let store = DisplayStateStore::new(
//!     DisplayState::default(),
//!     camera.clone(),
//!     Box::new(MemoryCalibration::new()),
//!     Arc::new(ManualClock::new()),
//! );
//! store.toggle_autofocus_lock();
//! assert_eq!(camera.controls().len(), 1);
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::calibration::{Calibration, CalibrationSink};
use crate::camera::{
    CameraControls, CameraMessage, CameraSource, Control, Descriptor, DoneCallback, Frame,
    ImportHints, Rect, StreamInfo,
};
use crate::clock::Clock;
use crate::compositor::{Compositor, ShaderUniforms, TextDraw, TextureId};
use crate::error::LoupeError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Camera
// =============================================================================

/// Records every control update it receives.
#[derive(Debug, Default)]
pub struct MockCamera {
    controls: Mutex<Vec<Control>>,
}

impl MockCamera {
    /// Create a camera with no recorded controls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every control received so far, oldest first.
    pub fn controls(&self) -> Vec<Control> {
        lock(&self.controls).clone()
    }
}

impl CameraControls for MockCamera {
    fn set_controls(&self, controls: &[Control]) {
        lock(&self.controls).extend_from_slice(controls);
    }
}

/// A camera that plays back a fixed list of events.
///
/// Once the script runs out every [`wait`](CameraSource::wait) returns
/// [`CameraMessage::Quit`].
pub struct ScriptedCamera {
    script: VecDeque<CameraMessage>,
    crop_maximum: Option<Rect>,
    running: bool,
    starts: usize,
    stops: usize,
    start_limit: Option<usize>,
    released: Arc<Mutex<Vec<Descriptor>>>,
}

impl ScriptedCamera {
    /// Create a camera that will deliver `script` in order.
    pub fn new(script: impl IntoIterator<Item = CameraMessage>) -> Self {
        Self {
            script: script.into_iter().collect(),
            crop_maximum: None,
            running: false,
            starts: 0,
            stops: 0,
            start_limit: None,
            released: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report `maximum` as the sensor crop once started.
    pub fn with_crop_maximum(mut self, maximum: Rect) -> Self {
        self.crop_maximum = Some(maximum);
        self
    }

    /// Let only the first `limit` calls to `start` succeed.
    pub fn with_start_limit(mut self, limit: usize) -> Self {
        self.start_limit = Some(limit);
        self
    }

    /// Successful and failed `start` calls so far.
    pub fn starts(&self) -> usize {
        self.starts
    }

    /// `stop` calls so far.
    pub fn stops(&self) -> usize {
        self.stops
    }

    /// Whether the camera is streaming.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Descriptors handed back through the done-callback, in order.
    pub fn released(&self) -> Vec<Descriptor> {
        lock(&self.released).clone()
    }
}

impl CameraSource for ScriptedCamera {
    fn start(&mut self) -> Result<(), LoupeError> {
        self.starts += 1;
        if self.start_limit.is_some_and(|limit| self.starts > limit) {
            return Err(LoupeError::Camera("scripted start failure".into()));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.running = false;
    }

    fn wait(&mut self) -> CameraMessage {
        self.script.pop_front().unwrap_or(CameraMessage::Quit)
    }

    fn sensor_crop_maximum(&self) -> Option<Rect> {
        if self.running { self.crop_maximum } else { None }
    }

    fn done_callback(&self) -> DoneCallback {
        let released = self.released.clone();
        Box::new(move |descriptor| lock(&released).push(descriptor))
    }
}

// =============================================================================
// Compositor
// =============================================================================

/// A compositor that records what it was asked to do.
#[derive(Debug)]
pub struct MockCompositor {
    next_texture: u32,
    setups: usize,
    releases: usize,
    imports: Vec<Descriptor>,
    frames: Vec<(TextureId, ShaderUniforms)>,
    texts: Vec<TextDraw>,
    presents: usize,
    deleted: Vec<TextureId>,
    rejected: HashSet<Descriptor>,
    fail_present: bool,
    quit: bool,
    info_text: Option<String>,
    max_image_size: (u32, u32),
}

impl MockCompositor {
    /// Create a compositor that accepts everything.
    pub fn new() -> Self {
        Self {
            next_texture: 1,
            setups: 0,
            releases: 0,
            imports: Vec::new(),
            frames: Vec::new(),
            texts: Vec::new(),
            presents: 0,
            deleted: Vec::new(),
            rejected: HashSet::new(),
            fail_present: false,
            quit: false,
            info_text: None,
            max_image_size: (4096, 4096),
        }
    }

    /// Refuse to import `descriptor`.
    pub fn reject(&mut self, descriptor: Descriptor) {
        self.rejected.insert(descriptor);
    }

    /// Make `present` fail until switched off again.
    pub fn fail_present(&mut self, fail: bool) {
        self.fail_present = fail;
    }

    /// Report a quit request from now on.
    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    /// Number of `setup` calls.
    pub fn setups(&self) -> usize {
        self.setups
    }

    /// Number of `release_context` calls.
    pub fn releases(&self) -> usize {
        self.releases
    }

    /// Imported descriptors, in import order.
    pub fn imports(&self) -> Vec<Descriptor> {
        self.imports.clone()
    }

    /// Drawn frames with the uniforms they were drawn with.
    pub fn frames(&self) -> Vec<(TextureId, ShaderUniforms)> {
        self.frames.clone()
    }

    /// Every text run drawn.
    pub fn texts(&self) -> Vec<TextDraw> {
        self.texts.clone()
    }

    /// Number of successful presents.
    pub fn presents(&self) -> usize {
        self.presents
    }

    /// Deleted textures.
    pub fn deleted(&self) -> Vec<TextureId> {
        self.deleted.clone()
    }

    /// Last text passed to `set_info_text`.
    pub fn info_text(&self) -> Option<&str> {
        self.info_text.as_deref()
    }
}

impl Default for MockCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor for MockCompositor {
    fn setup(&mut self, _info: &StreamInfo) -> Result<(), LoupeError> {
        self.setups += 1;
        Ok(())
    }

    fn import(&mut self, frame: &Frame, _hints: ImportHints) -> Result<TextureId, LoupeError> {
        if self.rejected.contains(&frame.descriptor) {
            return Err(LoupeError::Import {
                descriptor: frame.descriptor,
                reason: "rejected by mock".into(),
            });
        }
        self.imports.push(frame.descriptor);
        let texture = TextureId(self.next_texture);
        self.next_texture += 1;
        Ok(texture)
    }

    fn draw_frame(
        &mut self,
        texture: TextureId,
        uniforms: &ShaderUniforms,
    ) -> Result<(), LoupeError> {
        self.frames.push((texture, *uniforms));
        Ok(())
    }

    fn draw_text(&mut self, text: &TextDraw) {
        self.texts.push(text.clone());
    }

    fn present(&mut self) -> Result<(), LoupeError> {
        if self.fail_present {
            return Err(LoupeError::Render("present failed".into()));
        }
        self.presents += 1;
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.deleted.push(texture);
    }

    fn release_context(&mut self) {
        self.releases += 1;
    }

    fn set_info_text(&mut self, text: &str) {
        self.info_text = Some(text.to_string());
    }

    fn quit_requested(&mut self) -> bool {
        self.quit
    }

    fn max_image_size(&self) -> (u32, u32) {
        self.max_image_size
    }
}

// =============================================================================
// Clock and Calibration
// =============================================================================

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Create a clock stopped at the current instant.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *lock(&self.now)
    }
}

/// Keeps every stored calibration in memory.
#[derive(Debug, Default)]
pub struct MemoryCalibration {
    saved: Mutex<Vec<Calibration>>,
}

impl MemoryCalibration {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored calibration, oldest first.
    pub fn saved(&self) -> Vec<Calibration> {
        lock(&self.saved).clone()
    }
}

impl CalibrationSink for MemoryCalibration {
    fn store(&self, calibration: &Calibration) {
        lock(&self.saved).push(*calibration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_camera_plays_back_then_quits() {
        let mut camera = ScriptedCamera::new([CameraMessage::Timeout])
            .with_crop_maximum(Rect::new(0, 0, 100, 100));

        assert_eq!(camera.sensor_crop_maximum(), None);
        camera.start().unwrap();
        assert_eq!(camera.sensor_crop_maximum(), Some(Rect::new(0, 0, 100, 100)));
        assert_eq!(camera.wait(), CameraMessage::Timeout);
        assert_eq!(camera.wait(), CameraMessage::Quit);

        let mut done = camera.done_callback();
        done(Descriptor(3));
        assert_eq!(camera.released(), vec![Descriptor(3)]);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now() - t0, Duration::from_secs(1));
    }
}
