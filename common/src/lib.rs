pub mod actuator;
pub mod config;
pub mod connectivity;
pub mod control;
pub mod endpoints;
pub mod protocol;
pub mod sensor;
pub mod state;
pub mod telemetry;
pub mod thresholds;
pub mod types;

#[cfg(test)]
mod testing;

pub use actuator::{ActuatorController, RelayOutput};
pub use config::{DeviceConfig, NetworkConfig, PinConfig, SensorCalibration, TimingConfig};
pub use connectivity::{
    ChannelEvent, ConnectivityManager, ControlChannel, LinkError, LinkStats, NetworkLink,
    SendError, TelemetrySink, TelemetryTransport,
};
pub use control::{Clock, ControlLoop, MonotonicClock};
pub use endpoints::Endpoints;
pub use protocol::{Dispatch, MAX_FRAME_BYTES};
pub use sensor::{AnalogInput, SensorReader};
pub use state::DeviceState;
pub use telemetry::{PublishStats, TelemetryPublisher};
pub use thresholds::ThresholdStore;
pub use types::{DeviceSnapshot, InboundMessage, LinkState, TelemetrySample, Thresholds};
