use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_humidity: i32,
    pub max_humidity: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_humidity: 20,
            max_humidity: 40,
        }
    }
}

impl Thresholds {
    pub fn is_ordered(&self) -> bool {
        self.min_humidity <= self.max_humidity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        }
    }
}

/// One telemetry report, built fresh on every publish tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetrySample {
    pub humidity: i32,
    pub pump_on: bool,
    /// Seconds since boot.
    pub timestamp: u64,
}

/// Inbound control-channel message, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Command {
        pump_on: bool,
    },
    Config {
        min_humidity: i32,
        max_humidity: i32,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub pump_on: bool,
    pub min_humidity: i32,
    pub max_humidity: i32,
}
