//! Contrast calibration persistence.
//!
//! The four contrast coefficients live in a flat text file, one decimal per
//! line, in the order `contrast_a`, `contrast_b`, `contrast_c`,
//! `global_contrast`. Writes go through a background [`CalibrationWriter`]
//! so encoder threads never wait on the disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::error::LoupeError;
use crate::state::{
    CONTRAST_A_MAX, CONTRAST_C_RANGE, CONTRAST_PAIR_GAP, GLOBAL_CONTRAST_RANGE,
};

const VALUE_COUNT: usize = 4;

/// The persisted contrast coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Upper binarization threshold.
    pub contrast_a: f32,
    /// Lower binarization threshold.
    pub contrast_b: f32,
    /// Natural-mode contrast pivot.
    pub contrast_c: f32,
    /// Global contrast gain.
    pub global_contrast: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            contrast_a: 0.7,
            contrast_b: 0.2,
            contrast_c: 0.2,
            global_contrast: 1.0,
        }
    }
}

impl Calibration {
    /// Parse the file format.
    ///
    /// # Errors
    /// Returns [`LoupeError::CalibrationParse`] for a non-numeric line and
    /// [`LoupeError::CalibrationLength`] if there are not exactly four values.
    pub fn parse(text: &str) -> Result<Self, LoupeError> {
        let mut values = Vec::with_capacity(VALUE_COUNT);
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value = line
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| LoupeError::CalibrationParse {
                    line: i + 1,
                    value: line.to_string(),
                })?;
            values.push(value);
        }

        match values.as_slice() {
            &[contrast_a, contrast_b, contrast_c, global_contrast] => Ok(Self {
                contrast_a,
                contrast_b,
                contrast_c,
                global_contrast,
            }),
            _ => Err(LoupeError::CalibrationLength {
                found: values.len(),
                expected: VALUE_COUNT,
            }),
        }
    }

    /// Render in the file format.
    pub fn to_file_string(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n",
            self.contrast_a, self.contrast_b, self.contrast_c, self.global_contrast
        )
    }

    /// Clamp every coefficient into its documented range.
    pub fn sanitized(self) -> Self {
        let (c_min, c_max) = CONTRAST_C_RANGE;
        let (g_min, g_max) = GLOBAL_CONTRAST_RANGE;
        // contrast_a needs room for the gap below its cap
        let contrast_b = self.contrast_b.min(CONTRAST_A_MAX - CONTRAST_PAIR_GAP);
        Self {
            contrast_a: self
                .contrast_a
                .max(contrast_b + CONTRAST_PAIR_GAP)
                .min(CONTRAST_A_MAX),
            contrast_b,
            contrast_c: self.contrast_c.clamp(c_min, c_max),
            global_contrast: self.global_contrast.clamp(g_min, g_max),
        }
    }
}

// =============================================================================
// Calibration Sink
// =============================================================================

/// Receives every contrast change for persistence.
///
/// Called while the display state is locked, in mutation order, so
/// implementations must not block for long.
pub trait CalibrationSink: Send + Sync {
    /// Persist `calibration`.
    fn store(&self, calibration: &Calibration);
}

impl<T: CalibrationSink + ?Sized> CalibrationSink for std::sync::Arc<T> {
    fn store(&self, calibration: &Calibration) {
        (**self).store(calibration)
    }
}

// =============================================================================
// Calibration File
// =============================================================================

/// The calibration file on disk.
#[derive(Debug, Clone)]
pub struct CalibrationFile {
    path: PathBuf,
}

impl CalibrationFile {
    /// Refer to the file at `path`; nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file.
    pub fn load(&self) -> Result<Calibration, LoupeError> {
        let text = fs::read_to_string(&self.path)?;
        Calibration::parse(&text)
    }

    /// Read the file, falling back to defaults if it is missing or corrupt.
    pub fn load_or_default(&self) -> Calibration {
        match self.load() {
            Ok(calibration) => {
                info!("loaded calibration from {}", self.path.display());
                calibration
            }
            Err(e) => {
                warn!(
                    "using default calibration, {} unusable: {}",
                    self.path.display(),
                    e
                );
                Calibration::default()
            }
        }
    }

    /// Replace the file contents.
    ///
    /// Writes a sibling temporary file and renames it over the target so a
    /// crash mid-write leaves the previous values intact.
    pub fn save(&self, calibration: &Calibration) -> Result<(), LoupeError> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, calibration.to_file_string())?;
        fs::rename(&tmp, &self.path)?;
        debug!("saved calibration to {}", self.path.display());
        Ok(())
    }
}

// =============================================================================
// Write-behind Writer
// =============================================================================

/// Persists calibration on a background thread.
///
/// Bursts of changes (an encoder spun while held) collapse into a single
/// write of the newest values. Dropping the writer flushes anything pending.
pub struct CalibrationWriter {
    tx: Option<Sender<Calibration>>,
    handle: Option<JoinHandle<()>>,
}

impl CalibrationWriter {
    /// Start the writer thread for `file`.
    pub fn spawn(file: CalibrationFile) -> Result<Self, LoupeError> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("loupe-calibration".into())
            .spawn(move || write_loop(file, rx))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }
}

impl CalibrationSink for CalibrationWriter {
    fn store(&self, calibration: &Calibration) {
        if let Some(tx) = &self.tx {
            if tx.send(*calibration).is_err() {
                error!("calibration writer stopped, dropping {:?}", calibration);
            }
        }
    }
}

impl Drop for CalibrationWriter {
    fn drop(&mut self) {
        // closing the channel ends the loop after the final write
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("calibration writer panicked");
            }
        }
    }
}

fn write_loop(file: CalibrationFile, rx: Receiver<Calibration>) {
    while let Ok(mut latest) = rx.recv() {
        while let Ok(newer) = rx.try_recv() {
            latest = newer;
        }
        if let Err(e) = file.save(&latest) {
            error!("failed to save calibration: {}", e);
        }
    }
    debug!("calibration writer finished");
}

impl CalibrationSink for CalibrationFile {
    fn store(&self, calibration: &Calibration) {
        if let Err(e) = self.save(calibration) {
            error!("failed to save calibration: {}", e);
        }
    }
}
