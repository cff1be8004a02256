// Example runner for the `lensa_meter` library.
// Feeds the meter a synthetic dusk-to-daylight brightness ramp at the configured
// cadence and prints what a meter display would show.

use anyhow::Context;
use lensa_meter::core_modules::spot::spot::FnSampler;
use lensa_meter::sampling::MeterService;
use lensa_meter::{LightMeter, MeterConfig, MeterResult};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEMO_TICKS: u32 = 24;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => MeterConfig::load_or_default(&path).with_context(|| format!("reading config {path}"))?,
        None => MeterConfig::default(),
    }
    .apply_env();
    config.validate()?;
    info!("Meter config: {:?}", config);

    let mut tick = 0u32;
    let sampler = FnSampler(move || -> MeterResult<f64> {
        tick += 1;
        Ok((tick as f64 * 10.0).min(255.0))
    });

    let service = MeterService::spawn_with_sampler(LightMeter::new(config), sampler);
    let mut readings = service.subscribe();

    for _ in 0..DEMO_TICKS {
        readings.changed().await.context("meter task stopped")?;
        let reading = readings.borrow_and_update().clone();
        println!(
            "{:<8} ISO {:<5} {:<6} {:<7} {}",
            reading.ev_label(),
            reading.iso_label(),
            reading.aperture_label(),
            reading.shutter_label(),
            reading.status.label()
        );
    }

    service.shutdown().await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lensa_meter=info"));
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter)
            .init();
    }
}
