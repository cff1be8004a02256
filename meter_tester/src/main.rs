use anyhow::{Context, bail};
use image::{Rgba, RgbaImage};
use lensa_meter::core_modules::spot::spot::SpotMeter;
use lensa_meter::{CalibrationOffset, ExposureVariable, LightMeter, LockMask, MeterConfig, Reading};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const USAGE: &str = "Usage: meter_tester [--lock iso,aperture,shutter] [--calibration EV] [--config FILE] [--annotate OUT.png] <frame>...";

/// Fraction of the original brightness kept outside the metering spot.
const DIM_FACTOR: f32 = 0.4;
const SPOT_OUTLINE: Rgba<u8> = Rgba([255, 59, 48, 255]);

#[derive(Debug, Default)]
struct Args {
    frames: Vec<PathBuf>,
    locks: LockMask,
    calibration: Option<f64>,
    config: Option<PathBuf>,
    annotate: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) if !args.frames.is_empty() => args,
        Ok(_) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(e) => {
            println!("{e}\n{USAGE}");
            return Ok(());
        }
    };

    // --- 2. Meter Initialization ---
    let mut config = match &args.config {
        Some(path) => MeterConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => MeterConfig::default(),
    }
    .apply_env();
    if let Some(calibration) = args.calibration {
        config.calibration = CalibrationOffset::new(calibration)?;
    }
    config.validate()?;

    let mut meter = LightMeter::new(config);
    meter.set_locks(args.locks);

    // --- 3. Main Processing Loop ---
    let mut last_frame: Option<RgbaImage> = None;
    for path in &args.frames {
        let frame = match image::open(path) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable frame");
                continue;
            }
        };

        match meter.ingest_frame(frame.as_raw(), frame.width(), frame.height()) {
            Ok(reading) => print_reading(path, &reading),
            Err(e) => warn!(path = %path.display(), error = %e, "Frame not metered"),
        }
        last_frame = Some(frame);
    }

    // --- 4. Annotation ---
    if let Some(output) = &args.annotate {
        let Some(mut frame) = last_frame else {
            bail!("no frame could be decoded, nothing to annotate");
        };
        annotate_spot(&mut frame, meter.spot_meter());
        frame
            .save(output)
            .with_context(|| format!("writing {}", output.display()))?;
        info!(path = %output.display(), "Annotated frame saved");
    }

    Ok(())
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut args = Args::default();
    while let Some(arg) = raw.next() {
        let mut value = |flag: &str| raw.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--lock" => {
                for name in value("--lock")?.split(',').filter(|s| !s.trim().is_empty()) {
                    let variable: ExposureVariable = name.parse().map_err(anyhow::Error::msg)?;
                    args.locks = args.locks.with(variable, true);
                }
            }
            "--calibration" => args.calibration = Some(value("--calibration")?.parse()?),
            "--config" => args.config = Some(value("--config")?.into()),
            "--annotate" => args.annotate = Some(value("--annotate")?.into()),
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ => args.frames.push(PathBuf::from(&arg)),
        }
    }
    Ok(args)
}

fn print_reading(path: &std::path::Path, reading: &Reading) {
    println!(
        "{}: {} | ISO {} {} {} | {} ({:+.1} stops)",
        path.display(),
        reading.ev_label(),
        reading.iso_label(),
        reading.aperture_label(),
        reading.shutter_label(),
        reading.status.label(),
        reading.deviation
    );
}

/// Dims everything outside the metering spot and outlines the spot.
fn annotate_spot(frame: &mut RgbaImage, spot_meter: SpotMeter) {
    let Some((x0, y0)) = spot_meter.spot_origin(frame.width(), frame.height()) else {
        return;
    };
    let size = spot_meter.sample_size;
    let inside = |x: u32, y: u32| x >= x0 && x < x0 + size && y >= y0 && y < y0 + size;

    for (x, y, pixel) in frame.enumerate_pixels_mut() {
        if !inside(x, y) {
            for channel in &mut pixel.0[..3] {
                *channel = (*channel as f32 * DIM_FACTOR) as u8;
            }
        } else if x == x0 || y == y0 || x == x0 + size - 1 || y == y0 + size - 1 {
            *pixel = SPOT_OUTLINE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_locks_and_frames() {
        let parsed = args(&["--lock", "iso,shutter", "a.png", "b.png", "--calibration", "0.4"]).unwrap();
        assert_eq!(parsed.locks, LockMask::new(true, false, true));
        assert_eq!(parsed.frames.len(), 2);
        assert_eq!(parsed.calibration, Some(0.4));
    }

    #[test]
    fn rejects_unknown_flags_and_variables() {
        assert!(args(&["--zoom", "2"]).is_err());
        assert!(args(&["--lock", "focus"]).is_err());
        assert!(args(&["--config"]).is_err());
    }

    #[test]
    fn annotation_dims_outside_and_outlines_the_spot() {
        let mut frame = RgbaImage::from_pixel(100, 100, Rgba([200, 200, 200, 255]));
        annotate_spot(&mut frame, SpotMeter::new(10));
        assert_eq!(frame.get_pixel(0, 0).0, [80, 80, 80, 255]);
        assert_eq!(*frame.get_pixel(45, 45), SPOT_OUTLINE);
        assert_eq!(frame.get_pixel(50, 50).0, [200, 200, 200, 255]);
    }
}
