// THEORY:
// The `stops` module holds the only values the meter is ever allowed to show:
// full photographic stops for ISO, aperture and shutter speed. Every solved value
// is snapped onto one of these tables, so the tables are the range of the solver.

/// Film speed.
pub type Iso = f64;
/// Aperture f-number.
pub type FNumber = f64;
/// Shutter time in seconds.
pub type Seconds = f64;

pub const ISO_STOPS: [Iso; 8] = [50.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0];

pub const APERTURE_STOPS: [FNumber; 9] = [1.4, 2.0, 2.8, 4.0, 5.6, 8.0, 11.0, 16.0, 22.0];

pub const SHUTTER_STOPS: [Seconds; 18] = [
    1.0 / 4000.0,
    1.0 / 2000.0,
    1.0 / 1000.0,
    1.0 / 500.0,
    1.0 / 250.0,
    1.0 / 125.0,
    1.0 / 60.0,
    1.0 / 30.0,
    1.0 / 15.0,
    1.0 / 8.0,
    1.0 / 4.0,
    1.0 / 2.0,
    1.0,
    2.0,
    4.0,
    8.0,
    15.0,
    30.0,
];

/// Returns the table entry closest to `value`.
///
/// Scans left to right and only replaces the candidate on a strictly smaller
/// distance, so ties go to the earlier entry. Values past either end land on
/// that end. A NaN value yields the first entry.
///
/// # Panics
/// Panics if `table` is empty.
pub fn snap_to_nearest(value: f64, table: &[f64]) -> f64 {
    let (first, rest) = table.split_first().expect("stop table must not be empty");
    rest.iter().fold(*first, |best, &candidate| {
        if (candidate - value).abs() < (best - value).abs() {
            candidate
        } else {
            best
        }
    })
}

/// `1/60`, `1/4000`, or whole seconds with a `"` suffix (`2"`).
pub fn format_shutter(seconds: Seconds) -> String {
    if seconds >= 1.0 {
        format!("{}\"", seconds.round() as i64)
    } else {
        format!("1/{}", (1.0 / seconds).round() as i64)
    }
}

pub fn format_aperture(f_number: FNumber) -> String {
    format!("f/{f_number}")
}

pub fn format_iso(iso: Iso) -> String {
    format!("{}", iso.round() as i64)
}
