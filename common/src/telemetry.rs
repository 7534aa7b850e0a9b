use log::{debug, warn};

use crate::{
    actuator::RelayOutput,
    connectivity::{SendError, TelemetrySink},
    sensor::{AnalogInput, SensorReader},
    state::DeviceState,
    types::TelemetrySample,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub published: u64,
    pub failed: u64,
    pub consecutive_failures: u64,
}

/// Fixed-cadence telemetry. The timer starts at boot (time zero).
pub struct TelemetryPublisher {
    interval_ms: u64,
    last_publish_ms: u64,
    stats: PublishStats,
}

impl TelemetryPublisher {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_publish_ms: 0,
            stats: PublishStats::default(),
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_publish_ms) >= self.interval_ms
    }

    pub fn restart_timer(&mut self, now_ms: u64) {
        self.last_publish_ms = now_ms;
    }

    pub fn build_sample<A: AnalogInput, O: RelayOutput>(
        now_ms: u64,
        sensor: &mut SensorReader<A>,
        state: &DeviceState<O>,
    ) -> TelemetrySample {
        TelemetrySample {
            humidity: sensor.read_humidity(),
            pump_on: state.actuator().get_pump(),
            timestamp: now_ms / 1000,
        }
    }

    /// Samples, serializes and sends one report. Failures are logged and
    /// counted; nothing is retried or buffered.
    pub fn publish<A, O, S>(
        &mut self,
        now_ms: u64,
        sensor: &mut SensorReader<A>,
        state: &DeviceState<O>,
        sink: &mut S,
    ) -> Result<TelemetrySample, SendError>
    where
        A: AnalogInput,
        O: RelayOutput,
        S: TelemetrySink,
    {
        let sample = Self::build_sample(now_ms, sensor, state);
        let result = serde_json::to_vec(&sample)
            .map_err(|err| SendError::Encode(err.to_string()))
            .and_then(|body| sink.send(&body));

        match result {
            Ok(()) => {
                self.stats.published += 1;
                self.stats.consecutive_failures = 0;
                debug!(
                    "telemetry sent: humidity={} pump_on={} t={}",
                    sample.humidity, sample.pump_on, sample.timestamp
                );
                Ok(sample)
            }
            Err(err) => {
                self.stats.failed += 1;
                self.stats.consecutive_failures += 1;
                match &err {
                    SendError::Status(code) => warn!("telemetry rejected with HTTP {code}"),
                    other => warn!("telemetry not sent: {other}"),
                }
                Err(err)
            }
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }
}
