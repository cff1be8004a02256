// THEORY:
// The `exposure` module is the decision-making core of the meter. Given the
// effective scene EV, the triple currently on display and the user's locks, it
// derives a new (ISO, aperture, shutter) triple that satisfies
//
//     ev = log2(N^2) - log2(t) + log2(iso / 100)
//
// as closely as the stop tables allow.
//
// Key architectural principles:
// 1.  **Policy as Data**: Which variable gets solved is a pure function of the
//     3-bit lock mask, written down once in `SOLVE_POLICIES`. The solver only
//     executes a policy; it never re-derives one from nested conditionals.
// 2.  **Soft Locks**: With exactly one lock, the two unlocked fields keep their
//     current values and only one of them is re-derived (shutter, or aperture
//     when shutter is the lock). ISO is only ever derived when both aperture and
//     shutter are locked. Repeated solves therefore settle instead of drifting.
// 3.  **Full Auto Resets**: With no locks, ISO and aperture go back to 400 and
//     f/5.6 before shutter is derived, regardless of what was shown before.
// 4.  **Closed Range**: Every derived value passes through `snap_to_nearest`, so
//     the solver can only ever emit table members.

use crate::core_modules::ev::Ev;
use crate::core_modules::stops::{
    APERTURE_STOPS, FNumber, ISO_STOPS, Iso, SHUTTER_STOPS, Seconds, format_aperture, format_iso,
    format_shutter, snap_to_nearest,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO used by full-auto mode.
pub const AUTO_ISO: Iso = 400.0;
/// Aperture used by full-auto mode.
pub const AUTO_APERTURE: FNumber = 5.6;
/// Shutter shown before the first solve.
pub const DEFAULT_SHUTTER: Seconds = 1.0 / 60.0;

const ISO_REFERENCE: f64 = 100.0;

/// One leg of the exposure triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureVariable {
    Iso,
    Aperture,
    Shutter,
}

impl ExposureVariable {
    pub const ALL: [ExposureVariable; 3] = [Self::Iso, Self::Aperture, Self::Shutter];

    /// The table every value of this variable must come from.
    pub fn stops(self) -> &'static [f64] {
        match self {
            Self::Iso => &ISO_STOPS,
            Self::Aperture => &APERTURE_STOPS,
            Self::Shutter => &SHUTTER_STOPS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Iso => "ISO",
            Self::Aperture => "Aperture",
            Self::Shutter => "Shutter",
        }
    }

    fn lock_bit(self) -> u8 {
        match self {
            Self::Iso => 0b001,
            Self::Aperture => 0b010,
            Self::Shutter => 0b100,
        }
    }
}

impl std::str::FromStr for ExposureVariable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iso" => Ok(Self::Iso),
            "aperture" | "f" => Ok(Self::Aperture),
            "shutter" | "t" => Ok(Self::Shutter),
            other => Err(format!("unknown exposure variable '{other}'")),
        }
    }
}

/// The three settings shown to the photographer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureTriple {
    pub iso: Iso,
    /// f-number.
    pub aperture: FNumber,
    /// Seconds.
    pub shutter: Seconds,
}

impl Default for ExposureTriple {
    fn default() -> Self {
        Self {
            iso: AUTO_ISO,
            aperture: AUTO_APERTURE,
            shutter: DEFAULT_SHUTTER,
        }
    }
}

impl ExposureTriple {
    pub fn new(iso: Iso, aperture: FNumber, shutter: Seconds) -> Self {
        Self { iso, aperture, shutter }
    }

    pub fn get(&self, variable: ExposureVariable) -> f64 {
        match variable {
            ExposureVariable::Iso => self.iso,
            ExposureVariable::Aperture => self.aperture,
            ExposureVariable::Shutter => self.shutter,
        }
    }

    fn with(mut self, variable: ExposureVariable, value: f64) -> Self {
        match variable {
            ExposureVariable::Iso => self.iso = value,
            ExposureVariable::Aperture => self.aperture = value,
            ExposureVariable::Shutter => self.shutter = value,
        }
        self
    }

    /// The scene EV this triple exposes correctly for.
    pub fn exposure_value(&self) -> Ev {
        (self.aperture * self.aperture).log2() - self.shutter.log2() + (self.iso / ISO_REFERENCE).log2()
    }

    /// True when every field is a member of its stop table.
    pub fn is_on_stops(&self) -> bool {
        ExposureVariable::ALL
            .iter()
            .all(|&variable| variable.stops().contains(&self.get(variable)))
    }

    /// Snaps every field onto its stop table.
    pub fn snapped(&self) -> Self {
        ExposureVariable::ALL.iter().fold(*self, |triple, &variable| {
            triple.with(variable, snap_to_nearest(triple.get(variable), variable.stops()))
        })
    }
}

impl fmt::Display for ExposureTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ISO {} {} {}",
            format_iso(self.iso),
            format_aperture(self.aperture),
            format_shutter(self.shutter)
        )
    }
}

/// Which settings the user has pinned. Every combination is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct LockMask {
    pub iso: bool,
    pub aperture: bool,
    pub shutter: bool,
}

impl LockMask {
    pub const NONE: LockMask = LockMask {
        iso: false,
        aperture: false,
        shutter: false,
    };
    pub const ALL: LockMask = LockMask {
        iso: true,
        aperture: true,
        shutter: true,
    };

    pub fn new(iso: bool, aperture: bool, shutter: bool) -> Self {
        Self { iso, aperture, shutter }
    }

    /// Packs the mask as `shutter << 2 | aperture << 1 | iso`.
    pub fn bits(self) -> u8 {
        ExposureVariable::ALL
            .iter()
            .filter(|&&variable| self.is_locked(variable))
            .fold(0, |bits, variable| bits | variable.lock_bit())
    }

    /// Inverse of `bits`; bits above the third are ignored.
    pub fn from_bits(bits: u8) -> Self {
        let has = |variable: ExposureVariable| bits & variable.lock_bit() != 0;
        Self::new(
            has(ExposureVariable::Iso),
            has(ExposureVariable::Aperture),
            has(ExposureVariable::Shutter),
        )
    }

    pub fn is_locked(self, variable: ExposureVariable) -> bool {
        match variable {
            ExposureVariable::Iso => self.iso,
            ExposureVariable::Aperture => self.aperture,
            ExposureVariable::Shutter => self.shutter,
        }
    }

    pub fn count(self) -> u32 {
        self.bits().count_ones()
    }

    pub fn is_fully_locked(self) -> bool {
        self == Self::ALL
    }

    pub fn with(mut self, variable: ExposureVariable, locked: bool) -> Self {
        match variable {
            ExposureVariable::Iso => self.iso = locked,
            ExposureVariable::Aperture => self.aperture = locked,
            ExposureVariable::Shutter => self.shutter = locked,
        }
        self
    }

    pub fn toggled(self, variable: ExposureVariable) -> Self {
        self.with(variable, !self.is_locked(variable))
    }
}

/// What the solver does for a given lock mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePolicy {
    /// Everything is locked; the current triple is returned untouched.
    Hold,
    /// Derive this variable from the other two current values.
    Derive(ExposureVariable),
    /// Reset ISO and aperture to the auto defaults, then derive shutter.
    FullAuto,
}

/// Indexed by `LockMask::bits()`.
pub const SOLVE_POLICIES: [SolvePolicy; 8] = [
    // none
    SolvePolicy::FullAuto,
    // iso
    SolvePolicy::Derive(ExposureVariable::Shutter),
    // aperture
    SolvePolicy::Derive(ExposureVariable::Shutter),
    // iso + aperture
    SolvePolicy::Derive(ExposureVariable::Shutter),
    // shutter
    SolvePolicy::Derive(ExposureVariable::Aperture),
    // iso + shutter
    SolvePolicy::Derive(ExposureVariable::Aperture),
    // aperture + shutter
    SolvePolicy::Derive(ExposureVariable::Iso),
    // all
    SolvePolicy::Hold,
];

impl SolvePolicy {
    pub fn for_locks(locks: LockMask) -> Self {
        SOLVE_POLICIES[locks.bits() as usize]
    }

    /// The variable this policy writes, if any.
    pub fn solved_variable(self) -> Option<ExposureVariable> {
        match self {
            Self::Hold => None,
            Self::Derive(variable) => Some(variable),
            Self::FullAuto => Some(ExposureVariable::Shutter),
        }
    }
}

/// Unsnapped value of `target` that satisfies the exposure equation with the
/// other two fields of `triple` held fixed.
pub fn derive_value(target: ExposureVariable, ev: Ev, triple: &ExposureTriple) -> f64 {
    let log_aperture_sq = (triple.aperture * triple.aperture).log2();
    let log_iso_gain = (triple.iso / ISO_REFERENCE).log2();
    let log_shutter = triple.shutter.log2();

    match target {
        ExposureVariable::Shutter => (log_aperture_sq + log_iso_gain - ev).exp2(),
        ExposureVariable::Aperture => (ev + log_shutter - log_iso_gain).exp2().sqrt(),
        ExposureVariable::Iso => ISO_REFERENCE * (ev - log_aperture_sq + log_shutter).exp2(),
    }
}

/// Solves the exposure triangle for `effective_ev` under `locks`.
///
/// Deterministic and total; the result is always on the stop tables for every
/// field the policy writes.
pub fn solve(effective_ev: Ev, current: ExposureTriple, locks: LockMask) -> ExposureTriple {
    match SolvePolicy::for_locks(locks) {
        SolvePolicy::Hold => current,
        SolvePolicy::Derive(target) => derive_snapped(target, effective_ev, current),
        SolvePolicy::FullAuto => {
            let reset = ExposureTriple {
                iso: AUTO_ISO,
                aperture: AUTO_APERTURE,
                ..current
            };
            derive_snapped(ExposureVariable::Shutter, effective_ev, reset)
        }
    }
}

fn derive_snapped(target: ExposureVariable, ev: Ev, triple: ExposureTriple) -> ExposureTriple {
    let raw = derive_value(target, ev, &triple);
    triple.with(target, snap_to_nearest(raw, target.stops()))
}
