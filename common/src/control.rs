use std::time::{Duration, Instant};

use log::{debug, info};

use crate::{
    actuator::RelayOutput,
    connectivity::{ConnectivityManager, ControlChannel, NetworkLink, TelemetryTransport},
    protocol,
    sensor::{AnalogInput, SensorReader},
    state::DeviceState,
    telemetry::TelemetryPublisher,
};

/// Milliseconds since an arbitrary fixed origin (boot).
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<K: Clock + ?Sized> Clock for &K {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

/// Cooperative single-threaded device loop. Owns every component; nothing
/// else touches `DeviceState`.
pub struct ControlLoop<A, O, L, C, T, K> {
    sensor: SensorReader<A>,
    state: DeviceState<O>,
    connectivity: ConnectivityManager<L, C, T>,
    telemetry: TelemetryPublisher,
    clock: K,
}

impl<A, O, L, C, T, K> ControlLoop<A, O, L, C, T, K>
where
    A: AnalogInput,
    O: RelayOutput,
    L: NetworkLink,
    C: ControlChannel,
    T: TelemetryTransport,
    K: Clock,
{
    pub fn new(
        sensor: SensorReader<A>,
        state: DeviceState<O>,
        connectivity: ConnectivityManager<L, C, T>,
        telemetry: TelemetryPublisher,
        clock: K,
    ) -> Self {
        Self {
            sensor,
            state,
            connectivity,
            telemetry,
            clock,
        }
    }

    pub fn start(&mut self, sleep: impl FnMut(Duration)) {
        let snapshot = self.state.snapshot();
        info!(
            "device starting: pump_on={} thresholds={}..{} telemetry every {} ms",
            snapshot.pump_on,
            snapshot.min_humidity,
            snapshot.max_humidity,
            self.telemetry.interval_ms()
        );
        self.connectivity.start(sleep);
    }

    /// One iteration: drain control frames, then publish telemetry if due.
    pub fn step(&mut self) {
        let now_ms = self.clock.now_ms();
        for frame in self.connectivity.poll(now_ms) {
            let outcome = protocol::handle(&frame, &mut self.state);
            debug!("control frame handled: {outcome:?}");
        }

        let now_ms = self.clock.now_ms();
        if self.telemetry.is_due(now_ms) {
            if let Err(err) = self.telemetry.publish(
                now_ms,
                &mut self.sensor,
                &self.state,
                &mut self.connectivity,
            ) {
                debug!("telemetry tick at {now_ms} ms: {err}");
            }
            self.telemetry.restart_timer(self.clock.now_ms());
        }
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    pub fn state(&self) -> &DeviceState<O> {
        &self.state
    }

    pub fn sensor_mut(&mut self) -> &mut SensorReader<A> {
        &mut self.sensor
    }

    pub fn connectivity(&self) -> &ConnectivityManager<L, C, T> {
        &self.connectivity
    }

    pub fn connectivity_mut(&mut self) -> &mut ConnectivityManager<L, C, T> {
        &mut self.connectivity
    }

    pub fn telemetry(&self) -> &TelemetryPublisher {
        &self.telemetry
    }
}
