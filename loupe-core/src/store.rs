//! The shared display state and its mutation policy.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::calibration::{Calibration, CalibrationSink};
use crate::camera::{AfMode, CameraControls, Control, Rect};
use crate::clock::Clock;
use crate::modes::DisplayMode;
use crate::state::{
    CONTRAST_A_MAX, CONTRAST_C_RANGE, CONTRAST_PAIR_GAP, ChangeCategory, DisplayState,
    GLOBAL_CONTRAST_RANGE, ZOOM_MAX,
};

/// Holds the live [`DisplayState`] shared by the input threads and the
/// renderer.
///
/// Every operation runs as one critical section, so a
/// [`snapshot`](Self::snapshot) never sees half of an update. Camera control
/// updates and calibration writes are issued from inside the same section,
/// which keeps them in mutation order.
pub struct DisplayStateStore {
    state: Mutex<DisplayState>,
    camera: Arc<dyn CameraControls>,
    calibration: Box<dyn CalibrationSink>,
    clock: Arc<dyn Clock>,
}

impl DisplayStateStore {
    /// Create a store around an initial state.
    pub fn new(
        initial: DisplayState,
        camera: Arc<dyn CameraControls>,
        calibration: Box<dyn CalibrationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Mutex::new(initial),
            camera,
            calibration,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        // every section leaves the state valid, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A consistent copy of the current state.
    pub fn snapshot(&self) -> DisplayState {
        self.lock().clone()
    }

    /// The current contrast coefficients.
    pub fn calibration(&self) -> Calibration {
        self.lock().calibration()
    }

    /// Move the active mode `steps` positions, wrapping around.
    pub fn cycle_mode(&self, steps: i32) -> DisplayMode {
        let mut state = self.lock();
        state.active_mode = state.active_mode.cycled(steps);
        state.changed.stamp(ChangeCategory::Mode, self.clock.now());
        debug!("mode cycled by {} to {}", steps, state.active_mode);
        state.active_mode
    }

    /// Toggle between natural and the last non-natural mode.
    pub fn swap_active_and_previous(&self) -> DisplayMode {
        let mut state = self.lock();
        if state.active_mode.is_natural() {
            state.active_mode = state.previous_mode;
            info!("restoring {}", state.active_mode);
        } else {
            state.previous_mode = state.active_mode;
            state.active_mode = DisplayMode::Natural;
            info!("switching from {} to natural", state.previous_mode);
        }
        state.changed.stamp(ChangeCategory::Mode, self.clock.now());
        state.active_mode
    }

    /// Change the zoom factor by `delta`, clamped into `[zoom_min, 1.0]`.
    pub fn adjust_zoom(&self, delta: f32) -> f32 {
        let mut state = self.lock();
        let zoom = (state.zoom + delta).clamp(state.zoom_min, ZOOM_MAX);
        state.zoom = zoom;
        self.apply_crop(&mut state);
        // stamped even when clamped at a bound
        state.changed.stamp(ChangeCategory::Zoom, self.clock.now());
        debug!("zoom {:.2} ({}%)", zoom, state.zoom_percent());
        zoom
    }

    /// Record the largest sensor crop and re-apply the current zoom to it.
    pub fn set_sensor_crop_maximum(&self, maximum: Rect) {
        let mut state = self.lock();
        state.crop_maximum = Some(maximum);
        self.apply_crop(&mut state);
        info!("sensor crop maximum {:?}", maximum);
    }

    fn apply_crop(&self, state: &mut DisplayState) {
        if let Some(maximum) = state.crop_maximum {
            let crop = maximum.zoomed(state.zoom);
            if state.crop != Some(crop) {
                state.crop = Some(crop);
                self.camera.set_controls(&[Control::ScalerCrop(crop)]);
            }
        }
    }

    /// Adjust the binarization pair, or the global contrast in natural mode.
    ///
    /// `pair_delta` moves `contrast_a`, keeping it at least 0.01 above
    /// `contrast_b`; `global_delta` moves `global_contrast` within
    /// `[1.0, 4.0]`. Which one applies depends on the active mode at the time
    /// of the call.
    pub fn adjust_contrast_pair(&self, pair_delta: f32, global_delta: f32) -> Calibration {
        let mut state = self.lock();
        if state.active_mode.is_natural() {
            let (min, max) = GLOBAL_CONTRAST_RANGE;
            state.global_contrast = (state.global_contrast + global_delta).clamp(min, max);
            debug!("global contrast {:.2}", state.global_contrast);
        } else {
            state.contrast_a = (state.contrast_a + pair_delta)
                .max(state.contrast_b + CONTRAST_PAIR_GAP)
                .min(CONTRAST_A_MAX);
            debug!(
                "contrast pair {:.2}/{:.2}",
                state.contrast_a, state.contrast_b
            );
        }
        self.persist(&state)
    }

    /// Adjust the natural-mode pivot within `[-1.0, 0.5]`.
    pub fn adjust_contrast_c(&self, delta: f32) -> Calibration {
        let mut state = self.lock();
        let (min, max) = CONTRAST_C_RANGE;
        state.contrast_c = (state.contrast_c + delta).clamp(min, max);
        debug!("contrast pivot {:.2}", state.contrast_c);
        self.persist(&state)
    }

    fn persist(&self, state: &DisplayState) -> Calibration {
        let calibration = state.calibration();
        self.calibration.store(&calibration);
        calibration
    }

    /// Flip the autofocus lock and tell the camera.
    ///
    /// Returns whether autofocus is now locked.
    pub fn toggle_autofocus_lock(&self) -> bool {
        let mut state = self.lock();
        state.autofocus_locked = !state.autofocus_locked;
        let mode = if state.autofocus_locked {
            AfMode::Manual
        } else {
            AfMode::Continuous
        };
        self.camera.set_controls(&[Control::AfMode(mode)]);
        state.changed.stamp(ChangeCategory::Autofocus, self.clock.now());
        info!(
            "autofocus {}",
            if state.autofocus_locked { "locked" } else { "unlocked" }
        );
        state.autofocus_locked
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::mock::{ManualClock, MemoryCalibration, MockCamera};
    use crate::modes::MODE_COUNT;

    struct Fixture {
        store: DisplayStateStore,
        camera: Arc<MockCamera>,
        saved: Arc<MemoryCalibration>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let camera = Arc::new(MockCamera::new());
        let saved = Arc::new(MemoryCalibration::new());
        let clock = Arc::new(ManualClock::new());
        let store = DisplayStateStore::new(
            DisplayState::default(),
            camera.clone(),
            Box::new(saved.clone()),
            clock.clone(),
        );
        Fixture {
            store,
            camera,
            saved,
            clock,
        }
    }

    #[test]
    fn test_cycle_mode_is_cyclic() {
        let f = fixture();
        for _ in 0..MODE_COUNT {
            f.store.cycle_mode(1);
        }
        assert_eq!(f.store.snapshot().active_mode, DisplayMode::Natural);

        assert_eq!(f.store.cycle_mode(-1), DisplayMode::GreenOnBlack);
        assert_eq!(f.store.cycle_mode(1), DisplayMode::Natural);
    }

    #[test]
    fn test_cycle_mode_stamps_mode_change() {
        let f = fixture();
        f.clock.advance(Duration::from_millis(5));
        f.store.cycle_mode(1);
        assert_eq!(f.store.snapshot().changed.mode, Some(f.clock.now()));
    }

    #[test]
    fn test_swap_is_its_own_inverse() {
        let f = fixture();

        let before = f.store.snapshot().active_mode;
        f.store.swap_active_and_previous();
        f.store.swap_active_and_previous();
        assert_eq!(f.store.snapshot().active_mode, before);

        f.store.cycle_mode(3);
        assert_eq!(f.store.swap_active_and_previous(), DisplayMode::Natural);
        assert_eq!(f.store.snapshot().previous_mode, DisplayMode::BlackOnWhite);
        assert_eq!(f.store.swap_active_and_previous(), DisplayMode::BlackOnWhite);
    }

    #[test]
    fn test_swap_from_start_reaches_non_natural_mode() {
        let f = fixture();
        let mode = f.store.swap_active_and_previous();
        assert!(!mode.is_natural());
    }

    #[test]
    fn test_zoom_clamps_at_bounds() {
        let f = fixture();

        assert_eq!(f.store.adjust_zoom(0.1), 1.0);
        assert_eq!(f.store.adjust_zoom(0.1), 1.0);

        assert_eq!(f.store.adjust_zoom(-5.0), 0.25);
        assert_eq!(f.store.adjust_zoom(-0.01), 0.25);
    }

    #[test]
    fn test_zoom_at_bound_still_stamps_change() {
        let f = fixture();
        f.clock.advance(Duration::from_millis(40));
        assert_eq!(f.store.adjust_zoom(0.1), 1.0);
        assert_eq!(f.store.snapshot().changed.zoom, Some(f.clock.now()));
    }

    #[test]
    fn test_zoom_sends_centered_crop_once_maximum_known() {
        let f = fixture();
        f.store.adjust_zoom(-0.5);
        assert!(f.camera.controls().is_empty());

        let maximum = Rect::new(0, 0, 4000, 3000);
        f.store.set_sensor_crop_maximum(maximum);
        let crop = maximum.zoomed(0.5);
        assert_eq!(f.camera.controls(), vec![Control::ScalerCrop(crop)]);
        assert_eq!(f.store.snapshot().crop, Some(crop));
    }

    #[test]
    fn test_zoom_at_bound_does_not_resend_crop() {
        let f = fixture();
        f.store.set_sensor_crop_maximum(Rect::new(0, 0, 4000, 3000));
        f.store.adjust_zoom(0.1);
        f.store.adjust_zoom(0.1);
        assert_eq!(f.camera.controls().len(), 1);
    }

    #[test]
    fn test_contrast_pair_keeps_gap() {
        let f = fixture();
        f.store.cycle_mode(1);

        let calibration = f.store.adjust_contrast_pair(-10.0, 0.0);
        assert!((calibration.contrast_a - 0.21).abs() < 1e-6);
        assert_eq!(f.store.adjust_contrast_pair(-0.1, 0.0), calibration);

        let calibration = f.store.adjust_contrast_pair(10.0, 0.0);
        assert_eq!(calibration.contrast_a, 1.0);
    }

    #[test]
    fn test_contrast_pair_stays_capped_after_out_of_range_calibration() {
        let store = DisplayStateStore::new(
            DisplayState::new(
                Calibration {
                    contrast_a: 0.7,
                    contrast_b: 1.5,
                    ..Calibration::default()
                },
                0.25,
            ),
            Arc::new(MockCamera::new()),
            Box::new(MemoryCalibration::new()),
            Arc::new(ManualClock::new()),
        );
        store.cycle_mode(1);

        let calibration = store.adjust_contrast_pair(-0.5, 0.0);
        assert!(calibration.contrast_a <= CONTRAST_A_MAX);
        assert!(calibration.contrast_b < calibration.contrast_a);

        let calibration = store.adjust_contrast_pair(0.5, 0.0);
        assert_eq!(calibration.contrast_a, CONTRAST_A_MAX);
    }

    #[test]
    fn test_contrast_pair_adjusts_global_in_natural_mode() {
        let f = fixture();

        let calibration = f.store.adjust_contrast_pair(0.5, 0.5);
        assert_eq!(calibration.contrast_a, 0.7);
        assert_eq!(calibration.global_contrast, 1.5);

        assert_eq!(f.store.adjust_contrast_pair(0.0, 10.0).global_contrast, 4.0);
        assert_eq!(f.store.adjust_contrast_pair(0.0, -10.0).global_contrast, 1.0);
        assert_eq!(f.store.adjust_contrast_pair(0.0, -1.0).global_contrast, 1.0);
    }

    #[test]
    fn test_contrast_c_clamps() {
        let f = fixture();
        assert_eq!(f.store.adjust_contrast_c(5.0).contrast_c, 0.5);
        assert_eq!(f.store.adjust_contrast_c(0.1).contrast_c, 0.5);
        assert_eq!(f.store.adjust_contrast_c(-5.0).contrast_c, -1.0);
        assert_eq!(f.store.adjust_contrast_c(-0.1).contrast_c, -1.0);
    }

    #[test]
    fn test_contrast_changes_are_persisted_in_order() {
        let f = fixture();
        f.store.adjust_contrast_c(0.1);
        f.store.adjust_contrast_c(0.1);
        f.store.adjust_zoom(-0.1);

        let saved = f.saved.saved();
        assert_eq!(saved.len(), 2);
        assert!((saved[0].contrast_c - 0.3).abs() < 1e-6);
        assert!((saved[1].contrast_c - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_toggle_autofocus_sends_af_mode() {
        let f = fixture();

        assert!(f.store.toggle_autofocus_lock());
        assert!(!f.store.toggle_autofocus_lock());
        assert_eq!(
            f.camera.controls(),
            vec![
                Control::AfMode(AfMode::Manual),
                Control::AfMode(AfMode::Continuous)
            ]
        );
        assert!(f.store.snapshot().changed.autofocus.is_some());
    }

    #[test]
    fn test_concurrent_updates_never_tear() {
        let f = fixture();
        let store = Arc::new(f.store);
        store.cycle_mode(1);

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let delta = if i % 2 == 0 { 0.05 } else { -0.05 };
                        store.adjust_contrast_pair(delta, delta);
                        store.adjust_zoom(delta);
                    }
                })
            })
            .collect();

        for _ in 0..500 {
            let snapshot = store.snapshot();
            assert!(snapshot.contrast_a >= snapshot.contrast_b + CONTRAST_PAIR_GAP - 1e-6);
            assert!(snapshot.zoom >= snapshot.zoom_min && snapshot.zoom <= 1.0);
        }

        for writer in writers {
            writer.join().unwrap();
        }
    }

    proptest! {
        #[test]
        fn prop_contrast_pair_invariant_holds(
            steps in proptest::collection::vec((-0.5f32..0.5, any::<bool>()), 0..64)
        ) {
            let f = fixture();
            for (delta, cycle) in steps {
                if cycle {
                    f.store.cycle_mode(1);
                }
                f.store.adjust_contrast_pair(delta, delta);
                let state = f.store.snapshot();
                prop_assert!(state.contrast_a > state.contrast_b);
                prop_assert!(state.global_contrast >= 1.0 && state.global_contrast <= 4.0);
            }
        }

        #[test]
        fn prop_zoom_stays_in_range(deltas in proptest::collection::vec(-0.3f32..0.3, 0..64)) {
            let f = fixture();
            for delta in deltas {
                let zoom = f.store.adjust_zoom(delta);
                prop_assert!((0.25..=1.0).contains(&zoom));
            }
        }
    }
}
