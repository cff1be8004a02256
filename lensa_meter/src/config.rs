// THEORY:
// `config` holds everything the surrounding application owns and the meter only
// reads: the calibration offset, the starting triple and the sampling knobs.
// It is a plain data struct with public fields, like any other tunable config,
// plus JSON persistence so the calibration survives restarts and an environment
// overlay for quick field tweaks.

use crate::core_modules::ev::{DEFAULT_INITIAL_EV, DEFAULT_SMOOTHING_FACTOR, EV_FLOOR, Ev};
use crate::core_modules::exposure::ExposureTriple;
use crate::core_modules::spot::spot::DEFAULT_SPOT_SIZE;
use crate::error::{MeterError, MeterResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

pub const CALIBRATION_LIMIT: f64 = 5.0;
const CALIBRATION_STEPS_PER_EV: f64 = 10.0;
/// 2 Hz.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

pub const ENV_CALIBRATION: &str = "LENSA_CALIBRATION";
pub const ENV_TICK_MS: &str = "LENSA_TICK_MS";
pub const ENV_SPOT_SIZE: &str = "LENSA_SPOT_SIZE";

/// User calibration added to the smoothed EV, in [-5, +5] at 0.1 EV resolution.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct CalibrationOffset(f64);

impl CalibrationOffset {
    pub const ZERO: CalibrationOffset = CalibrationOffset(0.0);

    /// Validates the range and rounds to the nearest 0.1 EV.
    pub fn new(ev: Ev) -> MeterResult<Self> {
        if !ev.is_finite() || ev.abs() > CALIBRATION_LIMIT + f64::EPSILON {
            return Err(MeterError::InvalidCalibration(ev));
        }
        Ok(Self::quantize(ev))
    }

    /// Like `new`, but pulls out-of-range values onto the nearest limit.
    pub fn clamped(ev: Ev) -> Self {
        if ev.is_nan() {
            return Self::ZERO;
        }
        Self::quantize(ev.clamp(-CALIBRATION_LIMIT, CALIBRATION_LIMIT))
    }

    fn quantize(ev: Ev) -> Self {
        let steps = (ev * CALIBRATION_STEPS_PER_EV).round();
        // avoid -0.0 showing up as "-0.0"
        Self((steps / CALIBRATION_STEPS_PER_EV) + 0.0)
    }

    pub fn value(self) -> Ev {
        self.0
    }
}

impl TryFrom<f64> for CalibrationOffset {
    type Error = MeterError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CalibrationOffset> for f64 {
    fn from(offset: CalibrationOffset) -> Self {
        offset.0
    }
}

impl fmt::Display for CalibrationOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.1}", self.0)
    }
}

/// Configuration for the `LightMeter`, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Smoothed EV before the first sample arrives (daylight).
    pub initial_ev: Ev,
    /// Low-pass factor applied per tick, in (0, 1].
    pub smoothing_factor: f64,
    /// Lowest effective EV handed to the solver.
    pub ev_floor: Ev,
    /// Edge length of the centre metering spot in pixels.
    pub spot_size: u32,
    /// Sampling cadence in milliseconds.
    pub tick_interval_ms: u64,
    /// Triple shown before the first solve.
    pub initial_triple: ExposureTriple,
    pub calibration: CalibrationOffset,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            initial_ev: DEFAULT_INITIAL_EV,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            ev_floor: EV_FLOOR,
            spot_size: DEFAULT_SPOT_SIZE,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            initial_triple: ExposureTriple::default(),
            calibration: CalibrationOffset::ZERO,
        }
    }
}

impl MeterConfig {
    /// Checks the invariants the meter relies on.
    pub fn validate(&self) -> MeterResult<()> {
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(MeterError::InvalidConfig(format!(
                "smoothing_factor must be in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        if !self.initial_ev.is_finite() || !self.ev_floor.is_finite() {
            return Err(MeterError::InvalidConfig("initial_ev and ev_floor must be finite".into()));
        }
        if self.spot_size == 0 {
            return Err(MeterError::InvalidConfig("spot_size must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(MeterError::InvalidConfig("tick_interval_ms must be at least 1".into()));
        }
        if !self.initial_triple.is_on_stops() {
            return Err(MeterError::InvalidConfig(format!(
                "initial_triple {} is not on the stop tables",
                self.initial_triple
            )));
        }
        Ok(())
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> MeterResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MeterError::ConfigNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: MeterConfig = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), calibration = %config.calibration, "Loaded meter config");
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> MeterResult<Self> {
        match Self::load(path) {
            Err(MeterError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> MeterResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Saved meter config");
        Ok(())
    }

    /// Overlays `LENSA_CALIBRATION`, `LENSA_TICK_MS` and `LENSA_SPOT_SIZE`.
    /// Unparseable values are logged and ignored.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_CALIBRATION) {
            match raw.trim().parse::<f64>().map_err(|e| e.to_string()).and_then(|v| {
                CalibrationOffset::new(v).map_err(|e| e.to_string())
            }) {
                Ok(offset) => self.calibration = offset,
                Err(e) => warn!(key = ENV_CALIBRATION, value = %raw, error = %e, "Ignoring override"),
            }
        }
        if let Some(raw) = lookup(ENV_TICK_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.tick_interval_ms = ms,
                _ => warn!(key = ENV_TICK_MS, value = %raw, "Ignoring override"),
            }
        }
        if let Some(raw) = lookup(ENV_SPOT_SIZE) {
            match raw.trim().parse::<u32>() {
                Ok(size) if size > 0 => self.spot_size = size,
                _ => warn!(key = ENV_SPOT_SIZE, value = %raw, "Ignoring override"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn calibration_is_quantized_to_tenths() {
        assert_eq!(CalibrationOffset::new(0.34).unwrap().value(), 0.3);
        assert_eq!(CalibrationOffset::new(-1.26).unwrap().value(), -1.3);
        assert_eq!(CalibrationOffset::new(5.0).unwrap().value(), 5.0);
        assert_eq!(CalibrationOffset::new(-0.01).unwrap().to_string(), "+0.0");
    }

    #[test]
    fn calibration_outside_limits_is_rejected_or_clamped() {
        assert!(matches!(CalibrationOffset::new(5.5), Err(MeterError::InvalidCalibration(_))));
        assert!(CalibrationOffset::new(f64::NAN).is_err());
        assert_eq!(CalibrationOffset::clamped(-9.0).value(), -5.0);
        assert_eq!(CalibrationOffset::clamped(f64::NAN), CalibrationOffset::ZERO);
    }

    #[test]
    fn config_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meter.json");
        let config = MeterConfig {
            calibration: CalibrationOffset::new(-0.7).unwrap(),
            tick_interval_ms: 250,
            ..MeterConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(MeterConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meter.json");
        std::fs::write(&path, r#"{ "calibration": 1.2 }"#).unwrap();
        let config = MeterConfig::load(&path).unwrap();
        assert_eq!(config.calibration.value(), 1.2);
        assert_eq!(config.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(config.initial_triple, ExposureTriple::default());
    }

    #[test]
    fn out_of_range_calibration_in_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meter.json");
        std::fs::write(&path, r#"{ "calibration": 7.0 }"#).unwrap();
        assert!(matches!(MeterConfig::load(&path), Err(MeterError::JsonParse(_))));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(MeterConfig::load(&path), Err(MeterError::ConfigNotFound(_))));
        assert_eq!(MeterConfig::load_or_default(&path).unwrap(), MeterConfig::default());
    }

    #[test]
    fn validate_rejects_off_table_initial_triple() {
        let config = MeterConfig {
            initial_triple: ExposureTriple::new(300.0, 5.6, 1.0 / 60.0),
            ..MeterConfig::default()
        };
        assert!(matches!(config.validate(), Err(MeterError::InvalidConfig(_))));
        assert!(MeterConfig::default().validate().is_ok());
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_CALIBRATION, "0.5"),
            (ENV_TICK_MS, "0"),
            (ENV_SPOT_SIZE, "64"),
        ]);
        let mut config = MeterConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.calibration.value(), 0.5);
        assert_eq!(config.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(config.spot_size, 64);
    }
}
