// THEORY:
// The `meter` module is the top-level, synchronous API of the light meter. It
// encapsulates the full stack (spot sampling, EV estimation, smoothing,
// calibration and the exposure solver) behind a single owned value.
//
// One `LightMeter` holds every piece of mutable state the solver reads: the
// smoothed EV, the lock mask and the current triple. Whoever owns it owns the
// sampling loop, so each solve sees a consistent snapshot without any locking.
// Lock and calibration changes re-solve straight away against the current EV,
// the same way a fresh sample does.

use crate::config::{CalibrationOffset, MeterConfig};
use crate::core_modules::ev::{Ev, EvSmoother, estimate_ev};
use crate::core_modules::exposure::{ExposureTriple, ExposureVariable, LockMask, solve};
use crate::core_modules::spot::spot::{Brightness, SpotMeter};
use crate::core_modules::stops::{format_aperture, format_iso, format_shutter};
use crate::error::MeterResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Overall state shown next to the EV readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterStatus {
    /// At least one setting is being derived from the scene.
    Metering,
    /// All three settings are locked; the solver is inert.
    Locked,
    /// The capture source is gone. The last triple is kept.
    CaptureUnavailable,
}

impl MeterStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Metering => "METERING",
            Self::Locked => "LOCKED",
            Self::CaptureUnavailable => "NO CAPTURE",
        }
    }
}

/// The primary output of the meter for a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Smoothed scene EV before calibration.
    pub smoothed_ev: Ev,
    /// Calibrated, floored EV the solver actually used.
    pub effective_ev: Ev,
    pub triple: ExposureTriple,
    pub locks: LockMask,
    pub status: MeterStatus,
    /// Stops of over (+) or under (-) exposure left after snapping to the tables.
    pub deviation: Ev,
}

impl Reading {
    /// `EV 10.1`
    pub fn ev_label(&self) -> String {
        format!("EV {:.1}", self.smoothed_ev)
    }

    pub fn iso_label(&self) -> String {
        format_iso(self.triple.iso)
    }

    pub fn aperture_label(&self) -> String {
        format_aperture(self.triple.aperture)
    }

    pub fn shutter_label(&self) -> String {
        format_shutter(self.triple.shutter)
    }
}

/// The main, top-level struct for the light meter.
pub struct LightMeter {
    config: MeterConfig,
    spot_meter: SpotMeter,
    smoother: EvSmoother,
    current: ExposureTriple,
    locks: LockMask,
    calibration: CalibrationOffset,
    capture_lost: bool,
}

impl Default for LightMeter {
    fn default() -> Self {
        Self::new(MeterConfig::default())
    }
}

impl LightMeter {
    pub fn new(config: MeterConfig) -> Self {
        Self {
            spot_meter: SpotMeter::new(config.spot_size),
            smoother: EvSmoother::new(config.initial_ev, config.smoothing_factor),
            current: config.initial_triple.snapped(),
            locks: LockMask::NONE,
            calibration: config.calibration,
            capture_lost: false,
            config,
        }
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn spot_meter(&self) -> SpotMeter {
        self.spot_meter
    }

    /// Folds one brightness sample into the meter and re-solves.
    pub fn ingest_brightness(&mut self, brightness: Brightness) -> Reading {
        let raw_ev = estimate_ev(brightness);
        let smoothed = self.smoother.update(raw_ev);
        self.capture_lost = false;
        debug!(brightness, raw_ev, smoothed_ev = smoothed, "Sample ingested");
        self.resolve()
    }

    /// Spot-meters an RGBA8 frame and ingests the result.
    pub fn ingest_frame(&mut self, frame_buffer: &[u8], width: u32, height: u32) -> MeterResult<Reading> {
        let brightness = self.spot_meter.measure(frame_buffer, width, height)?;
        Ok(self.ingest_brightness(brightness))
    }

    pub fn set_locks(&mut self, locks: LockMask) -> Reading {
        if locks != self.locks {
            info!(iso = locks.iso, aperture = locks.aperture, shutter = locks.shutter, "Locks changed");
        }
        self.locks = locks;
        self.resolve()
    }

    pub fn toggle_lock(&mut self, variable: ExposureVariable) -> Reading {
        self.set_locks(self.locks.toggled(variable))
    }

    pub fn set_calibration(&mut self, calibration: CalibrationOffset) -> Reading {
        info!(calibration = %calibration, "Calibration changed");
        self.calibration = calibration;
        self.config.calibration = calibration;
        self.resolve()
    }

    /// Marks the capture source as gone. Nothing else changes.
    pub fn mark_capture_lost(&mut self) -> Reading {
        self.capture_lost = true;
        self.reading()
    }

    /// Smoothed EV plus calibration, floored for the solver.
    pub fn effective_ev(&self) -> Ev {
        (self.smoother.value() + self.calibration.value()).max(self.config.ev_floor)
    }

    pub fn locks(&self) -> LockMask {
        self.locks
    }

    pub fn current(&self) -> ExposureTriple {
        self.current
    }

    pub fn calibration(&self) -> CalibrationOffset {
        self.calibration
    }

    pub fn status(&self) -> MeterStatus {
        if self.capture_lost {
            MeterStatus::CaptureUnavailable
        } else if self.locks.is_fully_locked() {
            MeterStatus::Locked
        } else {
            MeterStatus::Metering
        }
    }

    fn resolve(&mut self) -> Reading {
        self.current = solve(self.effective_ev(), self.current, self.locks);
        self.reading()
    }

    /// Snapshot of the current state without solving.
    pub fn reading(&self) -> Reading {
        let effective_ev = self.effective_ev();
        Reading {
            smoothed_ev: self.smoother.value(),
            effective_ev,
            triple: self.current,
            locks: self.locks,
            status: self.status(),
            deviation: self.current.exposure_value() - effective_ev,
        }
    }
}
