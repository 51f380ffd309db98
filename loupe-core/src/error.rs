//! Error types for the preview core.

use crate::camera::Descriptor;

/// Errors that can occur while running the preview core.
#[derive(Debug, thiserror::Error)]
pub enum LoupeError {
    /// The compositing layer rejected a frame descriptor.
    ///
    /// This is a configuration mismatch between the camera and the display
    /// and is never retried.
    #[error("Failed to import {descriptor} ({reason})")]
    Import {
        /// The rejected descriptor.
        descriptor: Descriptor,
        /// Reason reported by the compositing layer.
        reason: String,
    },

    /// Drawing or presenting a frame failed.
    #[error("Render failed: {0}")]
    Render(String),

    /// The camera subsystem reported a failure it could not recover from.
    #[error("Camera error: {0}")]
    Camera(String),

    /// A calibration file line could not be parsed.
    #[error("Invalid calibration value {value:?} on line {line}")]
    CalibrationParse {
        /// One-based line number.
        line: usize,
        /// The offending text.
        value: String,
    },

    /// The calibration file had the wrong number of values.
    #[error("Calibration file has {found} values (expected {expected})")]
    CalibrationLength {
        /// Number of values found.
        found: usize,
        /// Number of values required.
        expected: usize,
    },

    /// The configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// A configuration value was outside its valid range.
    #[error("Invalid config value {value} for {field} ({reason})")]
    InvalidConfig {
        /// The field name.
        field: &'static str,
        /// The invalid value provided.
        value: String,
        /// What the value must satisfy.
        reason: &'static str,
    },

    /// An I/O error occurred (e.g., reading the calibration file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
