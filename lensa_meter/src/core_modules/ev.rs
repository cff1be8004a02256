// THEORY:
// The `ev` module converts a brightness sample into an exposure value and keeps a
// temporally smoothed copy of it.
//
// 1.  **Estimation** is a pure heuristic: brightness is normalized, pushed through
//     a power-law curve to a pseudo-lux figure and converted to an ISO 100
//     referenced EV. Pitch black has no logarithm, so it floors at -2.
// 2.  **Smoothing** is a single-pole low-pass filter. Its state is one scalar,
//     owned by whoever drives the sampling loop; there is no reset, a fresh
//     `EvSmoother` is the reset.

use crate::core_modules::spot::spot::Brightness;

/// Scene exposure value referenced to ISO 100. May be negative.
pub type Ev = f64;

/// EV reported for a sample with no light at all, and the floor applied before solving.
pub const EV_FLOOR: Ev = -2.0;
/// Daylight starting point for a fresh smoother.
pub const DEFAULT_INITIAL_EV: Ev = 10.0;
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.1;

const MAX_BRIGHTNESS: Brightness = 255.0;
const LUX_CURVE_SCALE: f64 = 100.0;
const LUX_CURVE_GAIN: f64 = 5.0;
const LUX_PER_EV_ZERO: f64 = 2.5;

/// Maps a brightness sample in [0, 255] to a scene EV at ISO 100.
///
/// Out-of-range input is clamped into [0, 255]; NaN reads as black.
pub fn estimate_ev(brightness: Brightness) -> Ev {
    let brightness = if brightness.is_nan() {
        0.0
    } else {
        brightness.clamp(0.0, MAX_BRIGHTNESS)
    };
    let normalized = brightness / MAX_BRIGHTNESS;
    let lux = (normalized * LUX_CURVE_SCALE).powi(2) * LUX_CURVE_GAIN;

    if lux == 0.0 {
        return EV_FLOOR;
    }

    (lux / LUX_PER_EV_ZERO).log2()
}

/// Exponential low-pass filter over the raw EV stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvSmoother {
    smoothed_ev: Ev,
    factor: f64,
}

impl Default for EvSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_EV, DEFAULT_SMOOTHING_FACTOR)
    }
}

impl EvSmoother {
    /// `factor` is clamped into (0, 1]; non-finite values fall back to the default.
    pub fn new(initial_ev: Ev, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor > 0.0 {
            factor.min(1.0)
        } else {
            DEFAULT_SMOOTHING_FACTOR
        };
        let smoothed_ev = if initial_ev.is_finite() {
            initial_ev
        } else {
            DEFAULT_INITIAL_EV
        };
        Self { smoothed_ev, factor }
    }

    /// Folds one raw EV into the filter and returns the new smoothed value.
    pub fn update(&mut self, raw_ev: Ev) -> Ev {
        self.smoothed_ev += (raw_ev - self.smoothed_ev) * self.factor;
        self.smoothed_ev
    }

    pub fn value(&self) -> Ev {
        self.smoothed_ev
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}
