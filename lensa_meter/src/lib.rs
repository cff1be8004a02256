// THEORY:
// This file is the main entry point for the `lensa_meter` library crate.
// It exposes the `LightMeter` and its associated data structures (`MeterConfig`,
// `Reading`, `ExposureTriple`, `LockMask`) as the clean, high-level interface
// of the light meter. The math lives in `core_modules`; `meter` wraps it into a
// stateful per-tick API; `sampling` drives that API from a live frame source.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod meter;
pub mod sampling;

pub use config::{CalibrationOffset, MeterConfig};
pub use core_modules::exposure::{ExposureTriple, ExposureVariable, LockMask, SolvePolicy, solve};
pub use error::{MeterError, MeterResult};
pub use meter::{LightMeter, MeterStatus, Reading};
