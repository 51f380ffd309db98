//! Encoder and button input.
//!
//! Each physical control is a rotary encoder with a push button. Raw
//! positions and button edges go through an [`InputClassifier`], which turns
//! them into [`Intent`]s using an explicit per-control gesture state:
//!
//! | state  | event             | next   | intent                          |
//! |--------|-------------------|--------|---------------------------------|
//! | Idle   | rotate            | Idle   | `TapRotate(d)`                  |
//! | Idle   | press             | Held   | `HoldBegin`                     |
//! | Idle   | release           | Idle   | none                            |
//! | Held   | rotate            | Held   | `HoldRotate(d)`, marks rotated  |
//! | Held   | press             | Held   | `HoldBegin` (restarts the hold) |
//! | Held   | release, quick    | Idle   | `Tap`, `HoldEnd`                |
//! | Held   | release, otherwise| Idle   | `HoldEnd`                       |
//!
//! A release is quick when it comes less than the tap threshold (560 ms by
//! default) after the press and the control was not rotated while held.
//! A [`ControlBinding`] then maps intents onto [`DisplayStateStore`]
//! operations, and [`ControlWorkers`] runs one classifier thread per control.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, trace};
use serde::Deserialize;

use crate::config::PreviewConfig;
use crate::error::LoupeError;
use crate::store::DisplayStateStore;

/// Default press length below which a release counts as a tap.
pub const DEFAULT_TAP_THRESHOLD: Duration = Duration::from_millis(560);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// Events and Intents
// =============================================================================

/// The physical controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlId {
    /// Selects the display mode; hold and turn for threshold contrast.
    Mode,
    /// Sets the zoom; hold and turn for the natural-mode pivot, tap for
    /// autofocus lock.
    Zoom,
}

impl ControlId {
    /// Both controls.
    pub const ALL: [ControlId; 2] = [ControlId::Mode, ControlId::Zoom];

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            ControlId::Mode => "mode",
            ControlId::Zoom => "zoom",
        }
    }
}

/// Button signal edge. Buttons are pulled up, so pressing gives a falling
/// edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Button released.
    Rising,
    /// Button pressed.
    Falling,
}

/// A raw report from the GPIO daemon for one control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// The encoder's accumulated position changed.
    Rotate {
        /// New accumulated position.
        position: i32,
    },
    /// The button changed level.
    Edge {
        /// Which edge.
        edge: Edge,
        /// When the edge happened.
        at: Instant,
    },
}

/// What the user meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Turned without the button held, by this many detents.
    TapRotate(i32),
    /// Button went down.
    HoldBegin,
    /// Turned with the button held, by this many detents.
    HoldRotate(i32),
    /// Button came up.
    HoldEnd,
    /// Quick press and release without turning.
    Tap,
}

/// Which way of turning counts as forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Increasing position is forward.
    Normal,
    /// Decreasing position is forward.
    #[default]
    Inverted,
}

impl Direction {
    /// Convert a raw position delta into a forward-positive delta.
    pub fn apply(self, raw: i32) -> i32 {
        match self {
            Direction::Normal => raw,
            Direction::Inverted => raw.saturating_neg(),
        }
    }
}

// =============================================================================
// Classifier
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gesture {
    Idle,
    Held { since: Instant, rotated: bool },
}

/// Per-control gesture state machine.
#[derive(Debug, Clone)]
pub struct InputClassifier {
    position: i32,
    gesture: Gesture,
    direction: Direction,
    tap_threshold: Duration,
}

impl InputClassifier {
    /// Create a classifier; the encoder position starts at 0.
    pub fn new(direction: Direction, tap_threshold: Duration) -> Self {
        Self {
            position: 0,
            gesture: Gesture::Idle,
            direction,
            tap_threshold,
        }
    }

    /// Whether the button is currently held.
    pub fn is_held(&self) -> bool {
        matches!(self.gesture, Gesture::Held { .. })
    }

    /// Feed one event and collect the resulting intents, in order.
    pub fn handle(&mut self, event: ControlEvent) -> Vec<Intent> {
        match event {
            ControlEvent::Rotate { position } => self.rotate(position).into_iter().collect(),
            ControlEvent::Edge {
                edge: Edge::Falling,
                at,
            } => vec![self.press(at)],
            ControlEvent::Edge {
                edge: Edge::Rising,
                at,
            } => self.release(at),
        }
    }

    fn rotate(&mut self, position: i32) -> Option<Intent> {
        let raw = position.wrapping_sub(self.position);
        self.position = position;

        let delta = self.direction.apply(raw);
        if delta == 0 {
            return None;
        }

        match &mut self.gesture {
            Gesture::Idle => Some(Intent::TapRotate(delta)),
            Gesture::Held { rotated, .. } => {
                *rotated = true;
                Some(Intent::HoldRotate(delta))
            }
        }
    }

    fn press(&mut self, at: Instant) -> Intent {
        if self.is_held() {
            debug!("press while already held, restarting hold");
        }
        self.gesture = Gesture::Held {
            since: at,
            rotated: false,
        };
        Intent::HoldBegin
    }

    fn release(&mut self, at: Instant) -> Vec<Intent> {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => {
                debug!("release without press ignored");
                Vec::new()
            }
            Gesture::Held { since, rotated } => {
                let elapsed = at.saturating_duration_since(since);
                if elapsed < self.tap_threshold && !rotated {
                    vec![Intent::Tap, Intent::HoldEnd]
                } else {
                    vec![Intent::HoldEnd]
                }
            }
        }
    }
}

// =============================================================================
// Bindings
// =============================================================================

/// How far one detent moves each parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustSteps {
    /// Zoom factor change per detent.
    pub zoom: f32,
    /// Threshold / pivot change per detent.
    pub contrast: f32,
    /// Global contrast change per detent.
    pub global_contrast: f32,
}

impl Default for AdjustSteps {
    fn default() -> Self {
        Self {
            zoom: 0.01,
            contrast: 0.01,
            global_contrast: 0.05,
        }
    }
}

/// Maps a control's intents onto store operations.
#[derive(Debug, Clone, Copy)]
pub struct ControlBinding {
    control: ControlId,
    steps: AdjustSteps,
}

impl ControlBinding {
    /// Binding for `control`.
    pub fn new(control: ControlId, steps: AdjustSteps) -> Self {
        Self { control, steps }
    }

    /// Apply one intent.
    pub fn apply(&self, intent: Intent, store: &DisplayStateStore) {
        trace!("{} control: {:?}", self.control.name(), intent);

        match (self.control, intent) {
            (ControlId::Mode, Intent::TapRotate(d)) => {
                store.cycle_mode(d);
            }
            (ControlId::Mode, Intent::HoldRotate(d)) => {
                store.adjust_contrast_pair(
                    d as f32 * self.steps.contrast,
                    d as f32 * self.steps.global_contrast,
                );
            }
            (ControlId::Mode, Intent::Tap) => {
                store.swap_active_and_previous();
            }
            (ControlId::Zoom, Intent::TapRotate(d)) => {
                store.adjust_zoom(d as f32 * self.steps.zoom);
            }
            (ControlId::Zoom, Intent::HoldRotate(d)) => {
                store.adjust_contrast_c(d as f32 * self.steps.contrast);
            }
            (ControlId::Zoom, Intent::Tap) => {
                store.toggle_autofocus_lock();
            }
            (_, Intent::HoldBegin | Intent::HoldEnd) => {
                debug!("{} control: {:?}", self.control.name(), intent);
            }
        }
    }
}

// =============================================================================
// Control Threads
// =============================================================================

/// Feeds raw events to one control's classifier thread.
#[derive(Debug, Clone)]
pub struct InputSender {
    control: ControlId,
    tx: Sender<ControlEvent>,
}

impl InputSender {
    /// The control this sender feeds.
    pub fn control(&self) -> ControlId {
        self.control
    }

    /// Queue an event; returns `false` once the control thread has exited.
    pub fn send(&self, event: ControlEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Report a new accumulated encoder position.
    pub fn rotate(&self, position: i32) -> bool {
        self.send(ControlEvent::Rotate { position })
    }

    /// Report a button edge.
    pub fn edge(&self, edge: Edge, at: Instant) -> bool {
        self.send(ControlEvent::Edge { edge, at })
    }
}

/// Senders for both controls.
#[derive(Debug, Clone)]
pub struct InputSenders {
    /// Mode control.
    pub mode: InputSender,
    /// Zoom control.
    pub zoom: InputSender,
}

impl InputSenders {
    /// Sender for `control`.
    pub fn get(&self, control: ControlId) -> &InputSender {
        match control {
            ControlId::Mode => &self.mode,
            ControlId::Zoom => &self.zoom,
        }
    }
}

/// One classifier thread per control, all stopped together.
///
/// Events for a control are handled strictly in the order they were sent;
/// the two controls are independent of each other.
pub struct ControlWorkers {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl ControlWorkers {
    /// Start a thread for each control.
    pub fn spawn(
        store: Arc<DisplayStateStore>,
        config: &PreviewConfig,
    ) -> Result<(Self, InputSenders), LoupeError> {
        let running = Arc::new(AtomicBool::new(true));
        let mut workers = Self {
            running: running.clone(),
            handles: Vec::with_capacity(ControlId::ALL.len()),
        };

        let mut spawn = |control: ControlId| -> Result<InputSender, LoupeError> {
            let (tx, rx) = mpsc::channel();
            let classifier =
                InputClassifier::new(config.direction(control), config.tap_threshold());
            let binding = ControlBinding::new(control, config.steps());
            let store = store.clone();
            let running = running.clone();

            let handle = thread::Builder::new()
                .name(format!("loupe-{}-control", control.name()))
                .spawn(move || control_loop(classifier, binding, rx, store, running))?;
            workers.handles.push(handle);

            Ok(InputSender { control, tx })
        };

        let senders = InputSenders {
            mode: spawn(ControlId::Mode)?,
            zoom: spawn(ControlId::Zoom)?,
        };

        Ok((workers, senders))
    }

    /// Flag shared with the threads; cleared on shutdown.
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Stop the threads after they handle what is already queued.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("control thread panicked");
            }
        }
    }
}

impl Drop for ControlWorkers {
    fn drop(&mut self) {
        self.stop();
    }
}

fn control_loop(
    mut classifier: InputClassifier,
    binding: ControlBinding,
    rx: Receiver<ControlEvent>,
    store: Arc<DisplayStateStore>,
    running: Arc<AtomicBool>,
) {
    let mut handle = |event: ControlEvent| {
        for intent in classifier.handle(event) {
            binding.apply(intent, &store);
        }
    };

    while running.load(Ordering::Acquire) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => handle(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }

    while let Ok(event) = rx.try_recv() {
        handle(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;
    use crate::mock::{ManualClock, MemoryCalibration, MockCamera};
    use crate::modes::DisplayMode;
    use crate::state::DisplayState;

    fn classifier() -> InputClassifier {
        InputClassifier::new(Direction::Normal, DEFAULT_TAP_THRESHOLD)
    }

    fn press(at: Instant) -> ControlEvent {
        ControlEvent::Edge {
            edge: Edge::Falling,
            at,
        }
    }

    fn release(at: Instant) -> ControlEvent {
        ControlEvent::Edge {
            edge: Edge::Rising,
            at,
        }
    }

    fn run(classifier: &mut InputClassifier, events: &[ControlEvent]) -> Vec<Intent> {
        events
            .iter()
            .flat_map(|event| classifier.handle(*event))
            .collect()
    }

    fn count(intents: &[Intent], pred: impl Fn(&Intent) -> bool) -> usize {
        intents.iter().filter(|i| pred(i)).count()
    }

    #[test]
    fn test_tap_gesture() {
        let t0 = Instant::now();
        let intents = run(
            &mut classifier(),
            &[press(t0), release(t0 + Duration::from_millis(120))],
        );

        assert_eq!(intents, vec![Intent::HoldBegin, Intent::Tap, Intent::HoldEnd]);
        assert_eq!(count(&intents, |i| matches!(i, Intent::HoldRotate(_))), 0);
    }

    #[test]
    fn test_second_press_restarts_hold() {
        let t0 = Instant::now();
        let intents = run(
            &mut classifier(),
            &[
                press(t0),
                ControlEvent::Rotate { position: 1 },
                press(t0 + Duration::from_secs(1)),
                release(t0 + Duration::from_millis(1100)),
            ],
        );

        assert_eq!(
            intents,
            vec![
                Intent::HoldBegin,
                Intent::HoldRotate(1),
                Intent::HoldBegin,
                Intent::Tap,
                Intent::HoldEnd,
            ]
        );
    }

    #[test]
    fn test_long_press_without_rotation_is_not_a_tap() {
        let t0 = Instant::now();
        let intents = run(
            &mut classifier(),
            &[press(t0), release(t0 + Duration::from_millis(560))],
        );
        assert_eq!(intents, vec![Intent::HoldBegin, Intent::HoldEnd]);
    }

    #[test]
    fn test_hold_gesture() {
        let t0 = Instant::now();
        let intents = run(
            &mut classifier(),
            &[
                press(t0),
                ControlEvent::Rotate { position: 1 },
                ControlEvent::Rotate { position: 2 },
                ControlEvent::Rotate { position: 1 },
                release(t0 + Duration::from_millis(900)),
            ],
        );

        assert_eq!(count(&intents, |i| *i == Intent::Tap), 0);
        assert_eq!(
            intents,
            vec![
                Intent::HoldBegin,
                Intent::HoldRotate(1),
                Intent::HoldRotate(1),
                Intent::HoldRotate(-1),
                Intent::HoldEnd,
            ]
        );
    }

    #[test]
    fn test_quick_release_after_rotation_is_not_a_tap() {
        let t0 = Instant::now();
        let intents = run(
            &mut classifier(),
            &[
                press(t0),
                ControlEvent::Rotate { position: 3 },
                release(t0 + Duration::from_millis(100)),
            ],
        );
        assert_eq!(count(&intents, |i| *i == Intent::Tap), 0);
        assert_eq!(count(&intents, |i| *i == Intent::HoldRotate(3)), 1);
    }

    #[test]
    fn test_rotation_while_idle() {
        let mut c = classifier();
        assert_eq!(c.handle(ControlEvent::Rotate { position: 2 }), vec![Intent::TapRotate(2)]);
        assert!(c.handle(ControlEvent::Rotate { position: 2 }).is_empty());
        assert_eq!(c.handle(ControlEvent::Rotate { position: -1 }), vec![Intent::TapRotate(-3)]);
    }

    #[test]
    fn test_inverted_direction() {
        let mut c = InputClassifier::new(Direction::Inverted, DEFAULT_TAP_THRESHOLD);
        assert_eq!(c.handle(ControlEvent::Rotate { position: -1 }), vec![Intent::TapRotate(1)]);
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut c = classifier();
        assert!(c.handle(release(Instant::now())).is_empty());
        assert!(!c.is_held());
    }

    #[test]
    fn test_gesture_resets_after_release() {
        let t0 = Instant::now();
        let mut c = classifier();
        run(
            &mut c,
            &[
                press(t0),
                ControlEvent::Rotate { position: 1 },
                release(t0 + Duration::from_millis(50)),
            ],
        );

        let t1 = t0 + Duration::from_secs(1);
        let intents = run(&mut c, &[press(t1), release(t1 + Duration::from_millis(50))]);
        assert_eq!(count(&intents, |i| *i == Intent::Tap), 1);
    }

    fn store() -> (Arc<DisplayStateStore>, Arc<MockCamera>) {
        let camera = Arc::new(MockCamera::new());
        let store = DisplayStateStore::new(
            DisplayState::new(Calibration::default(), 0.25),
            camera.clone(),
            Box::new(MemoryCalibration::new()),
            Arc::new(ManualClock::new()),
        );
        (Arc::new(store), camera)
    }

    #[test]
    fn test_mode_binding() {
        let (store, _) = store();
        let binding = ControlBinding::new(ControlId::Mode, AdjustSteps::default());

        binding.apply(Intent::TapRotate(2), &store);
        assert_eq!(store.snapshot().active_mode, DisplayMode::YellowOnBlue);

        binding.apply(Intent::HoldRotate(-3), &store);
        assert!((store.snapshot().contrast_a - 0.67).abs() < 1e-6);

        binding.apply(Intent::Tap, &store);
        assert_eq!(store.snapshot().active_mode, DisplayMode::Natural);

        binding.apply(Intent::HoldRotate(2), &store);
        assert!((store.snapshot().global_contrast - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_binding() {
        let (store, camera) = store();
        let binding = ControlBinding::new(ControlId::Zoom, AdjustSteps::default());

        binding.apply(Intent::TapRotate(-10), &store);
        assert!((store.snapshot().zoom - 0.9).abs() < 1e-6);

        binding.apply(Intent::HoldRotate(5), &store);
        assert!((store.snapshot().contrast_c - 0.25).abs() < 1e-6);

        binding.apply(Intent::Tap, &store);
        assert!(store.snapshot().autofocus_locked);
        assert_eq!(camera.controls().len(), 1);

        binding.apply(Intent::HoldBegin, &store);
        binding.apply(Intent::HoldEnd, &store);
        assert_eq!(camera.controls().len(), 1);
    }

    #[test]
    fn test_workers_apply_gestures_in_order() {
        let (store, _) = store();
        let config = PreviewConfig {
            mode_direction: Direction::Normal,
            ..PreviewConfig::default()
        };
        let (workers, senders) = ControlWorkers::spawn(store.clone(), &config).unwrap();

        let t0 = Instant::now();
        assert!(senders.mode.rotate(1));
        assert!(senders.mode.rotate(2));
        assert!(senders.mode.edge(Edge::Falling, t0));
        assert!(senders.mode.edge(Edge::Rising, t0 + Duration::from_millis(100)));
        assert!(senders.zoom.edge(Edge::Falling, t0));
        assert!(senders.zoom.edge(Edge::Rising, t0 + Duration::from_millis(100)));

        workers.shutdown();

        let state = store.snapshot();
        assert_eq!(state.active_mode, DisplayMode::Natural);
        assert_eq!(state.previous_mode, DisplayMode::YellowOnBlue);
        assert!(state.autofocus_locked);
        assert!(!senders.mode.rotate(3));
    }
}
