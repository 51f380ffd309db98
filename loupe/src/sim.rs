//! Simulated camera.
//!
//! Cycles a fixed pool of descriptors at a steady frame rate. A descriptor
//! only comes back into the pool through the done-callback, so a preview
//! that holds on to buffers starves the camera and gets timeouts, like a
//! real capture pipeline.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace};
use loupe_core::{
    AfMode, CameraControls, CameraMessage, CameraSource, ColorSpace, Control, Descriptor,
    DoneCallback, Frame, LoupeError, Rect, StreamInfo,
};

const FIRST_DESCRIPTOR: i32 = 20;

/// One buffer stays on screen until another replaces it.
const MIN_BUFFERS: usize = 2;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shape of the simulated stream.
#[derive(Debug, Clone, Copy)]
pub struct SimOptions {
    /// Frames per second.
    pub fps: u32,
    /// Number of descriptors in the pool.
    pub buffers: usize,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
}

/// Control state last applied to the simulated sensor.
#[derive(Debug, Default)]
pub struct SimControls {
    state: Mutex<(Option<AfMode>, Option<Rect>)>,
}

impl SimControls {
    /// Current autofocus mode and crop.
    pub fn current(&self) -> (Option<AfMode>, Option<Rect>) {
        *lock(&self.state)
    }
}

impl CameraControls for SimControls {
    fn set_controls(&self, controls: &[Control]) {
        let mut state = lock(&self.state);
        for control in controls {
            match *control {
                Control::AfMode(mode) => state.0 = Some(mode),
                Control::ScalerCrop(crop) => state.1 = Some(crop),
            }
            debug!("camera control {:?}", control);
        }
    }
}

/// A camera producing blank frames from a descriptor pool.
pub struct SimCamera {
    options: SimOptions,
    free: Arc<Mutex<VecDeque<Descriptor>>>,
    controls: Arc<SimControls>,
    running: bool,
    next_frame: Instant,
    sequence: u64,
}

impl SimCamera {
    /// Create a stopped camera.
    pub fn new(options: SimOptions) -> Self {
        let free = (0..options.buffers)
            .map(|i| Descriptor(FIRST_DESCRIPTOR + i as i32))
            .collect();
        Self {
            options,
            free: Arc::new(Mutex::new(free)),
            controls: Arc::new(SimControls::default()),
            running: false,
            next_frame: Instant::now(),
            sequence: 0,
        }
    }

    /// Handle for control updates.
    pub fn controls(&self) -> Arc<SimControls> {
        self.controls.clone()
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(1) / self.options.fps.max(1)
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.options.width,
            height: self.options.height,
            stride: self.options.width,
            color_space: Some(ColorSpace::Smpte170m),
        }
    }
}

impl CameraSource for SimCamera {
    fn start(&mut self) -> Result<(), LoupeError> {
        if self.options.buffers < MIN_BUFFERS {
            return Err(LoupeError::Camera(format!(
                "{} buffers allocated, need at least {}",
                self.options.buffers, MIN_BUFFERS
            )));
        }
        self.running = true;
        self.next_frame = Instant::now();
        info!(
            "simulated camera {}x{} at {} fps with {} buffers",
            self.options.width, self.options.height, self.options.fps, self.options.buffers
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        debug!("simulated camera stopped after {} frames", self.sequence);
    }

    fn wait(&mut self) -> CameraMessage {
        if !self.running {
            return CameraMessage::Quit;
        }

        let now = Instant::now();
        if self.next_frame > now {
            thread::sleep(self.next_frame - now);
        }
        self.next_frame += self.interval();

        let Some(descriptor) = lock(&self.free).pop_front() else {
            return CameraMessage::Timeout;
        };

        self.sequence += 1;
        trace!("frame {} in {}", self.sequence, descriptor);
        let info = self.info();
        CameraMessage::RequestComplete(Frame {
            descriptor,
            size: (info.stride * info.height * 3 / 2) as usize,
            info,
        })
    }

    fn sensor_crop_maximum(&self) -> Option<Rect> {
        self.running
            .then(|| Rect::new(0, 0, self.options.width, self.options.height))
    }

    fn done_callback(&self) -> DoneCallback {
        let free = self.free.clone();
        Box::new(move |descriptor| lock(&free).push_back(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(buffers: usize) -> SimCamera {
        SimCamera::new(SimOptions {
            fps: 1000,
            buffers,
            width: 64,
            height: 48,
        })
    }

    fn descriptor(message: CameraMessage) -> Descriptor {
        match message {
            CameraMessage::RequestComplete(frame) => frame.descriptor,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn test_pool_exhaustion_times_out() {
        let mut camera = camera(2);
        camera.start().unwrap();

        let a = descriptor(camera.wait());
        let b = descriptor(camera.wait());
        assert_ne!(a, b);
        assert_eq!(camera.wait(), CameraMessage::Timeout);

        let mut done = camera.done_callback();
        done(a);
        assert_eq!(descriptor(camera.wait()), a);
    }

    #[test]
    fn test_stopped_camera_quits() {
        let mut camera = camera(2);
        assert_eq!(camera.wait(), CameraMessage::Quit);
        assert_eq!(camera.sensor_crop_maximum(), None);

        camera.start().unwrap();
        assert_eq!(camera.sensor_crop_maximum(), Some(Rect::new(0, 0, 64, 48)));
    }

    #[test]
    fn test_controls_remember_latest() {
        let camera = camera(1);
        let controls = camera.controls();
        controls.set_controls(&[
            Control::AfMode(AfMode::Manual),
            Control::ScalerCrop(Rect::new(1, 2, 3, 4)),
        ]);
        assert_eq!(
            controls.current(),
            (Some(AfMode::Manual), Some(Rect::new(1, 2, 3, 4)))
        );
    }

    #[test]
    fn test_too_few_buffers_fail_to_start() {
        assert!(matches!(camera(0).start(), Err(LoupeError::Camera(_))));
        assert!(matches!(camera(1).start(), Err(LoupeError::Camera(_))));
        assert!(camera(2).start().is_ok());
    }
}
