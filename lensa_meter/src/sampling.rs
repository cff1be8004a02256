// THEORY:
// The `sampling` module drives a `LightMeter` from a live capture source.
//
// 1.  **Single Consumer**: exactly one task owns the meter. Samples and user
//     commands are serialized through that task, so the smoothed EV is never
//     updated twice at once and every solve reads a consistent snapshot.
// 2.  **External Cadence**: `sample_stream` turns any `LumaSampler` into a
//     stream ticking at a fixed period (2 Hz by default). Frames that are not
//     ready are skipped; a lost capture ends the stream.
// 3.  **Publish, Don't Share**: readings go out through a `watch` channel, so
//     any number of observers see the latest value without touching the meter.
// 4.  **Idle on Loss**: once capture is gone the task stops sampling but keeps
//     serving commands. The last triple stays on display.

use crate::config::CalibrationOffset;
use crate::core_modules::exposure::{ExposureVariable, LockMask};
use crate::core_modules::spot::spot::{Brightness, LumaSampler};
use crate::error::{MeterError, MeterResult};
use crate::meter::{LightMeter, Reading};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const COMMAND_QUEUE_SIZE: usize = 16;

/// Messages accepted by the sampling task.
pub enum MeterCommand {
    SetLocks(LockMask),
    ToggleLock(ExposureVariable),
    SetCalibration(CalibrationOffset),
    Snapshot(oneshot::Sender<Reading>),
    Shutdown,
}

struct TickState<S> {
    sampler: S,
    period: Duration,
    interval: Option<Interval>,
    finished: bool,
}

/// Polls `sampler` once per `period` and yields each brightness sample.
///
/// Ticks whose frame is not ready (or is malformed) are skipped. A lost capture
/// is yielded once as an error, after which the stream ends.
pub fn sample_stream<S>(sampler: S, period: Duration) -> impl Stream<Item = MeterResult<Brightness>> + Send
where
    S: LumaSampler + Send + 'static,
{
    let state = TickState {
        sampler,
        period: period.max(Duration::from_millis(1)),
        interval: None,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        // the timer needs a runtime, so it is created on first poll
        let mut interval = state.interval.take().unwrap_or_else(|| {
            let mut interval = tokio::time::interval(state.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let item = loop {
            interval.tick().await;
            match state.sampler.sample() {
                Ok(brightness) => break Ok(brightness),
                Err(e) if e.is_capture_lost() => {
                    state.finished = true;
                    break Err(e);
                }
                Err(MeterError::FrameNotReady { width, height, spot }) => {
                    debug!(width, height, spot, "Frame not ready, skipping tick");
                }
                Err(e) => warn!(error = %e, "Skipping unusable frame"),
            }
        };

        state.interval = Some(interval);
        Some((item, state))
    })
}

/// Handle to a running sampling task.
pub struct MeterService {
    command_tx: mpsc::Sender<MeterCommand>,
    readings: watch::Receiver<Reading>,
    task: JoinHandle<LightMeter>,
}

impl MeterService {
    /// Spawns the sampling task on the current tokio runtime.
    pub fn spawn<St>(meter: LightMeter, samples: St) -> Self
    where
        St: Stream<Item = MeterResult<Brightness>> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (reading_tx, readings) = watch::channel(meter.reading());
        let task = tokio::spawn(run_meter(meter, samples, command_rx, reading_tx));
        Self {
            command_tx,
            readings,
            task,
        }
    }

    /// Spawns the task fed by `sampler` at the meter's configured cadence.
    pub fn spawn_with_sampler<S>(meter: LightMeter, sampler: S) -> Self
    where
        S: LumaSampler + Send + 'static,
    {
        let period = Duration::from_millis(meter.config().tick_interval_ms);
        Self::spawn(meter, sample_stream(sampler, period))
    }

    pub fn subscribe(&self) -> watch::Receiver<Reading> {
        self.readings.clone()
    }

    /// Last published reading.
    pub fn latest(&self) -> Reading {
        self.readings.borrow().clone()
    }

    pub async fn set_locks(&self, locks: LockMask) -> MeterResult<()> {
        self.send(MeterCommand::SetLocks(locks)).await
    }

    pub async fn toggle_lock(&self, variable: ExposureVariable) -> MeterResult<()> {
        self.send(MeterCommand::ToggleLock(variable)).await
    }

    pub async fn set_calibration(&self, calibration: CalibrationOffset) -> MeterResult<()> {
        self.send(MeterCommand::SetCalibration(calibration)).await
    }

    /// Reading taken inside the task, after every command sent before it.
    pub async fn snapshot(&self) -> MeterResult<Reading> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(MeterCommand::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| MeterError::ServiceStopped)
    }

    /// Stops the task and hands the meter back.
    pub async fn shutdown(self) -> MeterResult<LightMeter> {
        // the task may already be gone; the join below reports that
        let _ = self.command_tx.send(MeterCommand::Shutdown).await;
        self.task.await.map_err(|_| MeterError::ServiceStopped)
    }

    async fn send(&self, command: MeterCommand) -> MeterResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| MeterError::ServiceStopped)
    }
}

async fn run_meter<St>(
    mut meter: LightMeter,
    samples: St,
    mut commands: mpsc::Receiver<MeterCommand>,
    readings: watch::Sender<Reading>,
) -> LightMeter
where
    St: Stream<Item = MeterResult<Brightness>> + Send,
{
    let samples = samples.fuse();
    tokio::pin!(samples);
    let mut sampling = true;
    info!("Meter sampling started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let reading = match command {
                    Some(MeterCommand::SetLocks(locks)) => meter.set_locks(locks),
                    Some(MeterCommand::ToggleLock(variable)) => meter.toggle_lock(variable),
                    Some(MeterCommand::SetCalibration(offset)) => meter.set_calibration(offset),
                    Some(MeterCommand::Snapshot(reply)) => {
                        let _ = reply.send(meter.reading());
                        continue;
                    }
                    Some(MeterCommand::Shutdown) | None => break,
                };
                readings.send_replace(reading);
            }
            sample = samples.next(), if sampling => {
                let reading = match sample {
                    Some(Ok(brightness)) => meter.ingest_brightness(brightness),
                    Some(Err(e)) => {
                        warn!(error = %e, "Sampling stopped");
                        sampling = false;
                        meter.mark_capture_lost()
                    }
                    None => {
                        warn!("Sample source ended");
                        sampling = false;
                        meter.mark_capture_lost()
                    }
                };
                readings.send_replace(reading);
            }
        }
    }

    info!("Meter sampling stopped");
    meter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::ev::estimate_ev;
    use crate::core_modules::spot::spot::FnSampler;
    use crate::meter::MeterStatus;

    fn smoothed_after(samples: &[f64]) -> f64 {
        samples
            .iter()
            .fold(10.0, |ev, &b| ev + (estimate_ev(b) - ev) * 0.1)
    }

    #[tokio::test]
    async fn stream_skips_unready_frames_and_ends_on_capture_loss() {
        let mut script = vec![
            Err(MeterError::FrameNotReady { width: 0, height: 0, spot: 50 }),
            Ok(100.0),
            Err(MeterError::invalid_frame("short buffer")),
            Ok(140.0),
            Err(MeterError::capture_unavailable("camera unplugged")),
            Ok(999.0),
        ]
        .into_iter();
        let sampler = FnSampler(move || script.next().unwrap_or(Ok(0.0)));

        let items: Vec<_> = sample_stream(sampler, Duration::from_millis(1)).collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), &100.0);
        assert_eq!(items[1].as_ref().unwrap(), &140.0);
        assert!(items[2].as_ref().unwrap_err().is_capture_lost());
    }

    #[tokio::test]
    async fn service_ingests_samples_then_idles_when_the_source_ends() {
        let samples = vec![128.0, 128.0, 64.0];
        let stream = futures::stream::iter(samples.clone().into_iter().map(Ok));
        let service = MeterService::spawn(LightMeter::default(), stream);

        let mut readings = service.subscribe();
        let last = readings
            .wait_for(|r| r.status == MeterStatus::CaptureUnavailable)
            .await
            .unwrap()
            .clone();
        assert!((last.smoothed_ev - smoothed_after(&samples)).abs() < 1e-12);
        assert!(last.triple.is_on_stops());

        // commands still work while idle
        service.set_locks(LockMask::ALL).await.unwrap();
        let snapshot = service.snapshot().await.unwrap();
        assert_eq!(snapshot.locks, LockMask::ALL);
        assert_eq!(snapshot.triple, last.triple);

        let meter = service.shutdown().await.unwrap();
        assert_eq!(meter.locks(), LockMask::ALL);
    }

    #[tokio::test]
    async fn commands_are_applied_in_order() {
        let service = MeterService::spawn(LightMeter::default(), futures::stream::pending());

        service.toggle_lock(ExposureVariable::Shutter).await.unwrap();
        service.toggle_lock(ExposureVariable::Iso).await.unwrap();
        service.set_calibration(CalibrationOffset::new(2.0).unwrap()).await.unwrap();
        let snapshot = service.snapshot().await.unwrap();

        assert_eq!(snapshot.locks, LockMask::new(true, false, true));
        assert_eq!(snapshot.status, MeterStatus::Metering);
        assert!((snapshot.effective_ev - 12.0).abs() < 1e-12);
        assert_eq!(service.latest(), snapshot);

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn capture_loss_error_keeps_the_last_triple() {
        let stream = futures::stream::iter(vec![
            Ok(200.0),
            Err(MeterError::capture_unavailable("permission denied")),
        ]);
        let service = MeterService::spawn(LightMeter::default(), stream);
        let mut readings = service.subscribe();
        let lost = readings
            .wait_for(|r| r.status == MeterStatus::CaptureUnavailable)
            .await
            .unwrap()
            .clone();
        assert!((lost.smoothed_ev - smoothed_after(&[200.0])).abs() < 1e-12);
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn sampler_driven_service_reads_frames() {
        let sampler = FnSampler(|| Ok(128.0));
        let config = crate::config::MeterConfig {
            tick_interval_ms: 1,
            ..Default::default()
        };
        let service = MeterService::spawn_with_sampler(LightMeter::new(config), sampler);
        let mut readings = service.subscribe();
        let reading = readings.wait_for(|r| r.smoothed_ev > 10.1).await.unwrap().clone();
        assert_eq!(reading.status, MeterStatus::Metering);
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn commands_after_shutdown_fail() {
        let service = MeterService::spawn(LightMeter::default(), futures::stream::pending());
        let sender = service.command_tx.clone();
        service.shutdown().await.unwrap();
        assert!(sender.send(MeterCommand::Shutdown).await.is_err());
    }
}
