//! Error types for the light meter.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for meter operations.
pub type MeterResult<T> = Result<T, MeterError>;

/// Errors raised around the exposure math.
///
/// The solver itself is total; everything here belongs to sampling,
/// configuration or the service plumbing.
#[derive(Debug, Error)]
pub enum MeterError {
    /// The frame is smaller than the metering spot, usually because the
    /// capture device has not delivered real dimensions yet.
    #[error("Frame {width}x{height} is smaller than the {spot}px metering spot")]
    FrameNotReady { width: u32, height: u32, spot: u32 },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The capture source is gone. The meter keeps its last reading.
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Calibration offset {0} is outside [-5, +5]")]
    InvalidCalibration(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Meter service stopped")]
    ServiceStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MeterError {
    /// Create a capture-unavailable error.
    pub fn capture_unavailable(message: impl Into<String>) -> Self {
        Self::CaptureUnavailable(message.into())
    }

    /// Create an invalid-frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame(message.into())
    }

    /// True when the sampler should be abandoned rather than retried next tick.
    pub fn is_capture_lost(&self) -> bool {
        matches!(self, Self::CaptureUnavailable(_))
    }
}
