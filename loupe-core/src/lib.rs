//! Core of a camera preview for low-vision readers.
//!
//! Frames from a camera are drawn full screen through one of nine display
//! modes (natural color or a high-contrast two-color binarization), digitally
//! zoomed, and annotated with a short-lived status overlay. Two rotary
//! encoders with push buttons drive everything: rotating one cycles the mode,
//! the other zooms; holding a button while rotating tunes contrast instead,
//! and a quick press toggles between natural and the last high-contrast mode
//! or locks autofocus.
//!
//! The camera and the compositing layer live outside this crate, behind the
//! [`CameraSource`], [`CameraControls`] and [`Compositor`] traits.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use loupe_core::{
//!     CameraMessage, CameraSource, DisplayState, DisplayStateStore, ManualClock,
//!     MemoryCalibration, MockCamera, MockCompositor, OverlayRenderer, PreviewController,
//!     RunLimits, ScriptedCamera,
//! };
//!
//! fn main() -> Result<(), loupe_core::LoupeError> {
//!     let clock = Arc::new(ManualClock::new());
//!     let store = Arc::new(DisplayStateStore::new(
//!         DisplayState::default(),
//!         Arc::new(MockCamera::new()),
//!         Box::new(MemoryCalibration::new()),
//!         clock.clone(),
//!     ));
//!
//!     let mut camera = ScriptedCamera::new([CameraMessage::Timeout]);
//!     let mut controller = PreviewController::new(
//!         store.clone(),
//!         MockCompositor::new(),
//!         camera.done_callback(),
//!         OverlayRenderer::default(),
//!         clock,
//!     );
//!
//!     // the rendering thread
//!     let summary = controller.run(&mut camera, RunLimits::unlimited())?;
//!     assert_eq!(summary.timeouts, 1);
//!
//!     // what an input thread does on a zoom detent
//!     store.adjust_zoom(-0.25);
//!     assert_eq!(store.snapshot().zoom_percent(), 33);
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The [`MockCompositor`], [`ScriptedCamera`], [`MockCamera`],
//! [`ManualClock`] and [`MemoryCalibration`] types stand in for the outside
//! world and record what the core asked of them.

#![warn(missing_docs)]

mod buffers;
mod calibration;
mod camera;
mod clock;
mod compositor;
mod config;
mod controller;
mod error;
mod input;
mod mock;
mod modes;
mod overlay;
mod state;
mod store;

// Re-export public API
pub use buffers::FrameBufferManager;
pub use calibration::{Calibration, CalibrationFile, CalibrationSink, CalibrationWriter};
pub use camera::{
    AfMode, CameraControls, CameraMessage, CameraSource, ColorSpace, Control, Descriptor,
    DoneCallback, Frame, ImportHints, Rect, SampleRange, StreamInfo, YuvEncoding,
};
pub use clock::{Clock, SystemClock};
pub use compositor::{Color, Compositor, ShaderUniforms, TextDraw, TextureId};
pub use config::PreviewConfig;
pub use controller::{PreviewController, RunLimits, RunSummary};
pub use error::LoupeError;
pub use input::{
    AdjustSteps, ControlBinding, ControlEvent, ControlId, ControlWorkers, DEFAULT_TAP_THRESHOLD,
    Direction, Edge, InputClassifier, InputSender, InputSenders, Intent,
};
pub use mock::{ManualClock, MemoryCalibration, MockCamera, MockCompositor, ScriptedCamera};
pub use modes::{DisplayMode, MODE_COUNT};
pub use overlay::{DEFAULT_VISIBLE_FOR, OverlayLayout, OverlayRenderer};
pub use state::{ChangeCategory, ChangeTimes, DisplayState};
pub use store::DisplayStateStore;
