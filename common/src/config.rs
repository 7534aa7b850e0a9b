use serde::{Deserialize, Serialize};

use crate::{endpoints::Endpoints, types::Thresholds};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub server_host: String,
    pub server_port: u16,
    pub device_token: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            server_host: "192.168.1.100".to_string(),
            server_port: 8000,
            device_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinConfig {
    pub humidity_sensor_pin: i32,
    pub pump_relay_pin: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            humidity_sensor_pin: 34,
            pump_relay_pin: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub telemetry_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    pub association_retry_ms: u64,
    pub handshake_timeout_ms: u64,
    pub poll_wait_ms: u64,
    pub http_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: 1_000,
            reconnect_interval_ms: 5_000,
            association_retry_ms: 500,
            handshake_timeout_ms: 10_000,
            poll_wait_ms: 10,
            http_timeout_ms: 5_000,
        }
    }
}

/// Raw ADC endpoints mapped onto 1..=100 % humidity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorCalibration {
    pub raw_min: i32,
    pub raw_max: i32,
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self {
            raw_min: 0,
            raw_max: 4095,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub calibration: SensorCalibration,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        self.network.sanitize();
        self.pins.sanitize();
        self.timing.sanitize();
        self.calibration.sanitize();
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(
            &self.network.server_host,
            self.network.server_port,
            &self.network.device_token,
        )
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        let host = self.server_host.trim().to_string();
        self.server_host = if host.is_empty() {
            Self::default().server_host
        } else {
            host
        };

        if self.server_port == 0 {
            self.server_port = Self::default().server_port;
        }
    }
}

impl PinConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.humidity_sensor_pin < 0 {
            self.humidity_sensor_pin = defaults.humidity_sensor_pin;
        }
        if self.pump_relay_pin < 0 {
            self.pump_relay_pin = defaults.pump_relay_pin;
        }
    }
}

impl TimingConfig {
    pub fn sanitize(&mut self) {
        self.telemetry_interval_ms = self.telemetry_interval_ms.max(100);
        self.reconnect_interval_ms = self.reconnect_interval_ms.max(500);
        self.association_retry_ms = self.association_retry_ms.clamp(100, 10_000);
        self.handshake_timeout_ms = self.handshake_timeout_ms.max(1_000);
        self.poll_wait_ms = self.poll_wait_ms.min(50);
        self.http_timeout_ms = self.http_timeout_ms.clamp(500, 30_000);
    }
}

impl SensorCalibration {
    pub fn sanitize(&mut self) {
        if self.raw_min == self.raw_max {
            *self = Self::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let raw = r#"{"network":{"wifi_ssid":"garden","wifi_pass":"pw","server_host":"10.0.0.2","server_port":9000,"device_token":"tok"}}"#;
        let config: DeviceConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.network.server_host, "10.0.0.2");
        assert_eq!(config.network.server_port, 9000);
        assert_eq!(config.pins, PinConfig::default());
        assert_eq!(config.calibration, SensorCalibration::default());
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.timing.telemetry_interval_ms, 1_000);
        assert_eq!(config.timing.reconnect_interval_ms, 5_000);
    }

    #[test]
    fn sanitize_repairs_unusable_values() {
        let mut config = DeviceConfig::default();
        config.network.server_host = "   ".to_string();
        config.network.server_port = 0;
        config.pins.pump_relay_pin = -1;
        config.timing.telemetry_interval_ms = 0;
        config.timing.reconnect_interval_ms = 10;
        config.timing.poll_wait_ms = 5_000;
        config.calibration = SensorCalibration {
            raw_min: 100,
            raw_max: 100,
        };

        config.sanitize();

        assert_eq!(config.network.server_host, "192.168.1.100");
        assert_eq!(config.network.server_port, 8000);
        assert_eq!(config.pins.pump_relay_pin, 25);
        assert_eq!(config.timing.telemetry_interval_ms, 100);
        assert_eq!(config.timing.reconnect_interval_ms, 500);
        assert_eq!(config.timing.poll_wait_ms, 50);
        assert_eq!(config.calibration, SensorCalibration::default());
    }

    #[test]
    fn sanitize_keeps_inverted_calibration_and_loose_thresholds() {
        let mut config = DeviceConfig::default();
        config.calibration = SensorCalibration {
            raw_min: 3000,
            raw_max: 1200,
        };
        config.thresholds = Thresholds {
            min_humidity: 80,
            max_humidity: 10,
        };

        config.sanitize();

        assert_eq!(config.calibration.raw_min, 3000);
        assert_eq!(config.calibration.raw_max, 1200);
        assert_eq!(config.thresholds.min_humidity, 80);
        assert_eq!(config.thresholds.max_humidity, 10);
    }

    #[test]
    fn endpoints_follow_network_config() {
        let mut config = DeviceConfig::default();
        config.network.server_host = " example.org ".to_string();
        config.network.server_port = 8080;
        config.network.device_token = "t0k".to_string();
        config.sanitize();

        let endpoints = config.endpoints();

        assert_eq!(
            endpoints.telemetry_url,
            "http://example.org:8080/api/telemetry/"
        );
        assert_eq!(
            endpoints.control_url,
            "ws://example.org:8080/ws/device/?token=t0k"
        );
    }
}
