//! Preview controller: the rendering thread's main loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};

use crate::buffers::FrameBufferManager;
use crate::camera::{CameraMessage, CameraSource, DoneCallback, Frame};
use crate::clock::Clock;
use crate::compositor::{Compositor, ShaderUniforms};
use crate::error::LoupeError;
use crate::input::ControlWorkers;
use crate::overlay::OverlayRenderer;
use crate::state::DisplayState;
use crate::store::DisplayStateStore;

/// When [`PreviewController::run`] should stop on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    /// Stop after this many frames were shown.
    pub max_frames: Option<u64>,
    /// Stop once this much time has passed since the camera started.
    pub max_duration: Option<Duration>,
}

impl RunLimits {
    /// Run until the camera quits or the compositor asks to close.
    pub fn unlimited() -> Self {
        Self::default()
    }

    fn reached(&self, summary: &RunSummary, elapsed: Duration) -> bool {
        self.max_frames.is_some_and(|max| summary.frames >= max)
            || self.max_duration.is_some_and(|max| elapsed >= max)
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames that made it on screen.
    pub frames: u64,
    /// Frames that failed to draw or present and were handed back.
    pub dropped: u64,
    /// Camera timeouts seen.
    pub timeouts: u64,
    /// Time between camera start and the end of the loop.
    pub elapsed: Duration,
}

/// Owns everything on the rendering thread.
///
/// Each frame takes one [`DisplayStateStore::snapshot`], so the frame and its
/// overlay always agree even while the input threads keep changing state.
pub struct PreviewController<C: Compositor> {
    store: Arc<DisplayStateStore>,
    compositor: C,
    buffers: FrameBufferManager,
    overlay: OverlayRenderer,
    clock: Arc<dyn Clock>,
    workers: Option<ControlWorkers>,
    info_text: String,
}

impl<C: Compositor> PreviewController<C> {
    /// Create a controller drawing through `compositor`.
    ///
    /// `done` hands shown frames back to the camera.
    pub fn new(
        store: Arc<DisplayStateStore>,
        compositor: C,
        done: DoneCallback,
        overlay: OverlayRenderer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            compositor,
            buffers: FrameBufferManager::new(done),
            overlay,
            clock,
            workers: None,
            info_text: String::new(),
        }
    }

    /// Stop and join `workers` when the run ends.
    pub fn with_workers(mut self, workers: ControlWorkers) -> Self {
        self.workers = Some(workers);
        self
    }

    /// The compositor.
    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    /// The compositor, mutably.
    pub fn compositor_mut(&mut self) -> &mut C {
        &mut self.compositor
    }

    /// The shared display state.
    pub fn store(&self) -> &Arc<DisplayStateStore> {
        &self.store
    }

    /// The overlay renderer.
    pub fn overlay(&self) -> &OverlayRenderer {
        &self.overlay
    }

    /// Draw `frame` with the current display state and overlay on top.
    ///
    /// # Errors
    /// Whatever the frame buffer manager reports. The frame has already been
    /// handed back when this fails.
    pub fn show_frame(&mut self, frame: &Frame) -> Result<(), LoupeError> {
        let state = self.store.snapshot();
        let uniforms = ShaderUniforms::from_state(&state);
        let now = self.clock.now();

        let overlay = &mut self.overlay;
        self.buffers
            .show(&mut self.compositor, frame, &uniforms, |compositor| {
                overlay.render(compositor, &state, now);
            })?;

        self.update_info_text(&state);
        trace!("showed {}", frame.descriptor);
        Ok(())
    }

    fn update_info_text(&mut self, state: &DisplayState) {
        let text = format!(
            "loupe - {} - zoom {}%{}",
            state.active_mode,
            state.zoom_percent(),
            if state.autofocus_locked { " - focus locked" } else { "" }
        );
        if text != self.info_text {
            self.compositor.set_info_text(&text);
            self.info_text = text;
        }
    }

    /// Drop every imported frame, e.g. after the stream was reconfigured.
    pub fn reset(&mut self) {
        self.buffers.reset(&mut self.compositor);
    }

    /// Run the camera event loop until the camera quits, the compositor asks
    /// to close or `limits` are reached.
    ///
    /// A camera timeout restarts the camera and keeps the last frame up.
    ///
    /// # Errors
    /// Returns [`LoupeError::Camera`] if the camera cannot be (re)started and
    /// [`LoupeError::Import`] if a frame cannot be imported. Draw and present
    /// failures only drop the frame.
    pub fn run<S>(&mut self, camera: &mut S, limits: RunLimits) -> Result<RunSummary, LoupeError>
    where
        S: CameraSource + ?Sized,
    {
        camera.start()?;
        info!("camera started");

        match camera.sensor_crop_maximum() {
            Some(maximum) => self.store.set_sensor_crop_maximum(maximum),
            None => warn!("camera reports no crop maximum, zoom will not reach the sensor"),
        }

        let started = self.clock.now();
        let mut summary = RunSummary::default();
        let result = self.event_loop(camera, limits, started, &mut summary);

        camera.stop();
        self.reset();
        summary.elapsed = self.clock.now().saturating_duration_since(started);
        if let Some(workers) = self.workers.take() {
            workers.shutdown();
        }

        info!(
            "preview stopped after {} frames ({} dropped, {} timeouts) in {:.1?}",
            summary.frames, summary.dropped, summary.timeouts, summary.elapsed
        );
        result.map(|()| summary)
    }

    fn event_loop<S>(
        &mut self,
        camera: &mut S,
        limits: RunLimits,
        started: Instant,
        summary: &mut RunSummary,
    ) -> Result<(), LoupeError>
    where
        S: CameraSource + ?Sized,
    {
        loop {
            if self.compositor.quit_requested() {
                info!("close requested");
                return Ok(());
            }
            let elapsed = self.clock.now().saturating_duration_since(started);
            if limits.reached(summary, elapsed) {
                debug!("run limits reached");
                return Ok(());
            }

            match camera.wait() {
                CameraMessage::RequestComplete(frame) => match self.show_frame(&frame) {
                    Ok(()) => summary.frames += 1,
                    Err(e @ LoupeError::Import { .. }) => return Err(e),
                    Err(e) => {
                        warn!("dropped {}: {}", frame.descriptor, e);
                        summary.dropped += 1;
                    }
                },
                CameraMessage::Timeout => {
                    summary.timeouts += 1;
                    warn!("camera timed out, restarting");
                    camera.stop();
                    if let Err(e) = camera.start() {
                        error!("camera restart failed: {}", e);
                        return Err(e);
                    }
                }
                CameraMessage::Quit => {
                    info!("camera quit");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::camera::{AfMode, ColorSpace, Control, Descriptor, Rect, StreamInfo};
    use crate::config::PreviewConfig;
    use crate::input::{ControlId, Edge};
    use crate::mock::{ManualClock, MemoryCalibration, MockCamera, MockCompositor, ScriptedCamera};
    use crate::modes::DisplayMode;

    fn frame(fd: i32) -> CameraMessage {
        CameraMessage::RequestComplete(Frame {
            descriptor: Descriptor(fd),
            size: 1024,
            info: StreamInfo {
                width: 32,
                height: 16,
                stride: 32,
                color_space: Some(ColorSpace::Rec709),
            },
        })
    }

    struct Fixture {
        controls: Arc<MockCamera>,
        clock: Arc<ManualClock>,
        store: Arc<DisplayStateStore>,
    }

    fn fixture() -> Fixture {
        let controls = Arc::new(MockCamera::new());
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(DisplayStateStore::new(
            DisplayState::default(),
            controls.clone(),
            Box::new(MemoryCalibration::new()),
            clock.clone(),
        ));
        Fixture {
            controls,
            clock,
            store,
        }
    }

    fn controller(f: &Fixture, camera: &ScriptedCamera) -> PreviewController<MockCompositor> {
        PreviewController::new(
            f.store.clone(),
            MockCompositor::new(),
            camera.done_callback(),
            OverlayRenderer::default(),
            f.clock.clone(),
        )
    }

    #[test]
    fn test_run_shows_frames_in_order() {
        let f = fixture();
        let mut camera = ScriptedCamera::new([frame(1), frame(2), frame(2), frame(3)]);
        let mut controller = controller(&f, &camera);

        let summary = controller.run(&mut camera, RunLimits::unlimited()).unwrap();

        assert_eq!(summary.frames, 4);
        assert_eq!(camera.released(), vec![Descriptor(1), Descriptor(2)]);
        assert_eq!(controller.compositor().presents(), 4);
        assert_eq!(controller.compositor().imports().len(), 3);
        assert_eq!((camera.starts(), camera.stops()), (1, 1));
        assert_eq!(controller.compositor().releases(), 1);
    }

    #[test]
    fn test_timeout_restarts_camera() {
        let f = fixture();
        let mut camera = ScriptedCamera::new([frame(1), CameraMessage::Timeout, frame(2)]);
        let mut controller = controller(&f, &camera);

        let summary = controller.run(&mut camera, RunLimits::unlimited()).unwrap();

        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.frames, 2);
        assert_eq!(camera.starts(), 2);
        assert_eq!(camera.stops(), 2);
    }

    #[test]
    fn test_failed_start_is_reported() {
        let f = fixture();
        let mut camera = ScriptedCamera::new([frame(1)]).with_start_limit(0);
        let mut controller = controller(&f, &camera);

        assert!(matches!(
            controller.run(&mut camera, RunLimits::unlimited()),
            Err(LoupeError::Camera(_))
        ));
        assert_eq!(controller.compositor().presents(), 0);
    }

    #[test]
    fn test_failed_restart_ends_run() {
        let f = fixture();
        let mut camera =
            ScriptedCamera::new([frame(1), CameraMessage::Timeout, frame(2)]).with_start_limit(1);
        let mut controller = controller(&f, &camera);

        assert!(matches!(
            controller.run(&mut camera, RunLimits::unlimited()),
            Err(LoupeError::Camera(_))
        ));
        assert_eq!(controller.compositor().presents(), 1);
        assert_eq!(camera.starts(), 2);
        assert!(!camera.is_running());
    }

    #[test]
    fn test_frame_limit_stops_loop() {
        let f = fixture();
        let mut camera = ScriptedCamera::new((0..10).map(frame));
        let mut controller = controller(&f, &camera);

        let limits = RunLimits {
            max_frames: Some(3),
            ..RunLimits::default()
        };
        let summary = controller.run(&mut camera, limits).unwrap();
        assert_eq!(summary.frames, 3);
    }

    #[test]
    fn test_time_limit_stops_loop() {
        let f = fixture();
        let mut camera = ScriptedCamera::new([frame(1)]);
        let mut controller = controller(&f, &camera);

        let limits = RunLimits {
            max_duration: Some(Duration::ZERO),
            ..RunLimits::default()
        };
        let summary = controller.run(&mut camera, limits).unwrap();
        assert_eq!(summary.frames, 0);
    }

    #[test]
    fn test_quit_request_stops_loop() {
        let f = fixture();
        let mut camera = ScriptedCamera::new([frame(1), frame(2)]);
        let mut controller = controller(&f, &camera);
        controller.compositor_mut().request_quit();

        let summary = controller.run(&mut camera, RunLimits::unlimited()).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(camera.stops(), 1);
    }

    #[test]
    fn test_import_failure_is_fatal() {
        let f = fixture();
        let mut camera = ScriptedCamera::new([frame(1), frame(2), frame(3)]);
        let mut controller = controller(&f, &camera);
        controller.compositor_mut().reject(Descriptor(2));

        let err = controller.run(&mut camera, RunLimits::unlimited()).unwrap_err();
        assert!(matches!(err, LoupeError::Import { descriptor: Descriptor(2), .. }));
        assert_eq!(camera.released(), vec![Descriptor(2)]);
        assert_eq!(camera.stops(), 1);
    }

    #[test]
    fn test_present_failure_drops_frame() {
        let f = fixture();
        let mut camera = ScriptedCamera::new([frame(1)]);
        let mut controller = controller(&f, &camera);
        controller.compositor_mut().fail_present(true);

        let summary = controller.run(&mut camera, RunLimits::unlimited()).unwrap();
        assert_eq!(summary.dropped, 1);
        assert_eq!(camera.released(), vec![Descriptor(1)]);
    }

    #[test]
    fn test_crop_maximum_applied_on_start() {
        let f = fixture();
        let maximum = Rect::new(0, 0, 4000, 3000);
        let mut camera = ScriptedCamera::new(Vec::<CameraMessage>::new()).with_crop_maximum(maximum);
        let mut controller = controller(&f, &camera);

        controller.run(&mut camera, RunLimits::unlimited()).unwrap();
        assert_eq!(f.controls.controls(), vec![Control::ScalerCrop(maximum)]);
    }

    #[test]
    fn test_frame_uses_state_snapshot() {
        let f = fixture();
        f.store.cycle_mode(4);
        f.store.toggle_autofocus_lock();

        let mut camera = ScriptedCamera::new([frame(1)]);
        let mut controller = controller(&f, &camera);
        controller.run(&mut camera, RunLimits::unlimited()).unwrap();

        let (_, uniforms) = controller.compositor().frames()[0];
        assert_eq!(uniforms.mode, DisplayMode::WhiteOnBlack);
        assert!(controller.compositor().texts().iter().any(|t| t.text == "Disabled"));
        assert_eq!(
            controller.compositor().info_text(),
            Some("loupe - White on Black - zoom 0% - focus locked")
        );
        assert_eq!(f.controls.controls(), vec![Control::AfMode(AfMode::Manual)]);
    }

    #[test]
    fn test_run_shuts_down_workers() {
        let f = fixture();
        let (workers, senders) =
            ControlWorkers::spawn(f.store.clone(), &PreviewConfig::default()).unwrap();
        let running = workers.running();

        let mut camera = ScriptedCamera::new([frame(1)]);
        let mut controller = controller(&f, &camera).with_workers(workers);
        controller.run(&mut camera, RunLimits::unlimited()).unwrap();

        assert!(!running.load(std::sync::atomic::Ordering::SeqCst));
        assert!(!senders.get(ControlId::Zoom).edge(Edge::Rising, f.clock.now()));
    }
}
