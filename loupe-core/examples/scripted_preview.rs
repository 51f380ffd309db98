//! Drives the preview loop with scripted camera frames and a few encoder
//! gestures, then prints what the compositor was asked to draw.
//!
//! Run with `cargo run -p loupe-core --example scripted_preview`.

use std::sync::Arc;
use std::time::Duration;

use loupe_core::{
    CameraMessage, CameraSource, Clock, ColorSpace, ControlWorkers, Descriptor, DisplayState,
    DisplayStateStore, Edge, Frame, ManualClock, MemoryCalibration, MockCamera, MockCompositor,
    OverlayRenderer, PreviewConfig, PreviewController, RunLimits, ScriptedCamera, StreamInfo,
};

fn frame(fd: i32) -> CameraMessage {
    CameraMessage::RequestComplete(Frame {
        descriptor: Descriptor(fd),
        size: 1280 * 720 * 3 / 2,
        info: StreamInfo {
            width: 1280,
            height: 720,
            stride: 1280,
            color_space: Some(ColorSpace::Smpte170m),
        },
    })
}

fn main() -> Result<(), loupe_core::LoupeError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let clock = Arc::new(ManualClock::new());
    let camera_controls = Arc::new(MockCamera::new());
    let store = Arc::new(DisplayStateStore::new(
        DisplayState::default(),
        camera_controls.clone(),
        Box::new(MemoryCalibration::new()),
        clock.clone(),
    ));

    let (workers, senders) = ControlWorkers::spawn(store.clone(), &PreviewConfig::default())?;

    // one detent on the mode encoder, a quick tap on the zoom button
    senders.mode.rotate(-1);
    let t0 = clock.now();
    senders.zoom.edge(Edge::Falling, t0);
    senders.zoom.edge(Edge::Rising, t0 + Duration::from_millis(80));
    workers.shutdown();

    let mut camera = ScriptedCamera::new([frame(10), frame(11), CameraMessage::Timeout, frame(10)]);
    let mut controller = PreviewController::new(
        store.clone(),
        MockCompositor::new(),
        camera.done_callback(),
        OverlayRenderer::default(),
        clock,
    );
    let summary = controller.run(&mut camera, RunLimits::unlimited())?;

    println!(
        "{} frames, {} timeouts, {} camera starts",
        summary.frames,
        summary.timeouts,
        camera.starts()
    );
    println!("mode now {}", store.snapshot().active_mode);
    println!("returned to camera: {:?}", camera.released());
    println!("camera controls: {:?}", camera_controls.controls());
    for text in controller.compositor().texts() {
        println!("overlay: {:?}", text.text);
    }
    Ok(())
}
