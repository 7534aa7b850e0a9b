use std::{
    ptr,
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{client::Client as HttpClient, Status},
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    gpio::{Gpio34, Output, PinDriver},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::AnyOutputPin, modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    sys::{self, EspError},
    wifi::{BlockingWifi, EspWifi},
    ws::client::{
        EspWebSocketClient, EspWebSocketClientConfig, WebSocketEvent, WebSocketEventType,
    },
};
use log::{info, warn};

use humidity_common::{
    AnalogInput, ChannelEvent, ConnectivityManager, ControlChannel, ControlLoop, DeviceConfig,
    DeviceState, LinkError, MonotonicClock, NetworkConfig, NetworkLink, RelayOutput, SendError,
    SensorReader, TelemetryPublisher, TelemetryTransport,
};

const NVS_NAMESPACE: &str = "humidity";
const NVS_CONFIG_KEY: &str = "device_json";

const ADC_SENSOR_PIN: i32 = 34;
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);
const WS_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run() -> anyhow::Result<()> {
    sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut config = nvs_store.load_device_config().unwrap_or_else(|err| {
        warn!("failed to load device config from NVS: {err:#}");
        DeviceConfig::default()
    });
    ensure_build_defaults(&mut config.network);
    config.sanitize();

    let Peripherals {
        modem, pins, adc1, ..
    } = Peripherals::take()?;

    // Relay goes low before anything touches the network.
    let relay = GpioRelay::new(config.pins.pump_relay_pin)
        .with_context(|| format!("failed to claim relay GPIO{}", config.pins.pump_relay_pin))?;
    if config.pins.humidity_sensor_pin != ADC_SENSOR_PIN {
        warn!(
            "humidity sensor pin {} not supported; sampling GPIO{ADC_SENSOR_PIN}",
            config.pins.humidity_sensor_pin
        );
    }
    let input = AdcHumidityInput::new(adc1, pins.gpio34).context("failed to initialize ADC")?;

    let link = WifiLink::new(modem, sys_loop, nvs_partition, &config.network)
        .context("wifi startup failed")?;
    let endpoints = config.endpoints();
    info!(
        "device configured: control={} telemetry={}",
        endpoints.redacted_control_url(),
        endpoints.telemetry_url
    );

    let connectivity = ConnectivityManager::new(
        link,
        EspControlChannel::new(),
        EspTelemetryTransport {
            timeout: Duration::from_millis(config.timing.http_timeout_ms),
        },
        endpoints,
        &config.timing,
    );
    let mut device = ControlLoop::new(
        SensorReader::new(input, config.calibration),
        DeviceState::new(relay, config.thresholds),
        connectivity,
        TelemetryPublisher::new(config.timing.telemetry_interval_ms),
        MonotonicClock::new(),
    );

    device.start(thread::sleep);

    let watchdog = TaskWatchdog::subscribe_current_task(WATCHDOG_TIMEOUT)?;
    loop {
        watchdog.feed();
        device.step();
    }
}

fn ensure_build_defaults(network: &mut NetworkConfig) {
    if network.wifi_ssid.is_empty() {
        network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string();
    }

    if network.wifi_pass.is_empty() {
        network.wifi_pass = option_env!("WIFI_PASS").unwrap_or("CHANGE_ME").to_string();
    }

    if let Some(host) = option_env!("SERVER_HOST") {
        if network.server_host == NetworkConfig::default().server_host {
            network.server_host = host.to_string();
        }
    }

    if network.device_token.is_empty() {
        network.device_token = option_env!("DEVICE_TOKEN").unwrap_or_default().to_string();
    }
}

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    fn load_device_config(&self) -> anyhow::Result<DeviceConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 2048];

        match nvs.get_str(NVS_CONFIG_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<DeviceConfig>(value)?),
            None => Ok(DeviceConfig::default()),
        }
    }
}

struct GpioRelay {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl GpioRelay {
    fn new(pin: i32) -> anyhow::Result<Self> {
        if pin < 0 {
            return Err(anyhow!("invalid relay pin: {pin}"));
        }
        let pin = unsafe { PinDriver::output(AnyOutputPin::new(pin)) }?;
        Ok(Self { pin })
    }
}

impl RelayOutput for GpioRelay {
    fn set_level(&mut self, high: bool) {
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };

        if let Err(err) = result {
            warn!("failed to drive pump relay: {err}");
        }
    }
}

struct AdcHumidityInput {
    channel: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
    last_raw: i32,
}

impl AdcHumidityInput {
    fn new(adc: ADC1, pin: Gpio34) -> anyhow::Result<Self> {
        let driver = AdcDriver::new(adc)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(driver, pin, &config)?;
        Ok(Self {
            channel,
            last_raw: 0,
        })
    }
}

impl AnalogInput for AdcHumidityInput {
    fn read_raw(&mut self) -> i32 {
        match self.channel.read_raw() {
            Ok(raw) => self.last_raw = i32::from(raw),
            Err(err) => warn!("adc read failed, reusing last sample: {err}"),
        }
        self.last_raw
    }
}

struct WifiLink {
    wifi: BlockingWifi<EspWifi<'static>>,
}

impl WifiLink {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
        network: &NetworkConfig,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

        let auth_method = if network.wifi_pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: network
                .wifi_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi ssid too long"))?,
            password: network
                .wifi_pass
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi password too long"))?,
            auth_method,
            ..Default::default()
        }))?;

        wifi.start()?;
        info!("wifi started, connecting to `{}`", network.wifi_ssid);

        let rc = unsafe { sys::esp_wifi_set_ps(sys::wifi_ps_type_t_WIFI_PS_NONE) };
        match EspError::convert(rc) {
            Ok(()) => info!("wifi power save off"),
            Err(err) => warn!("wifi power save left on: {err}"),
        }

        Ok(Self { wifi })
    }
}

impl NetworkLink for WifiLink {
    fn associate(&mut self) -> Result<(), LinkError> {
        let result = self
            .wifi
            .connect()
            .and_then(|()| self.wifi.wait_netif_up());

        if let Err(err) = result {
            let _ = self.wifi.disconnect();
            return Err(LinkError::Association(format!("{err:#}")));
        }
        info!("wifi connected and netif up");
        Ok(())
    }

    fn is_associated(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }
}

struct EspControlChannel {
    client: Option<EspWebSocketClient<'static>>,
    events: Option<mpsc::Receiver<ChannelEvent>>,
}

impl EspControlChannel {
    fn new() -> Self {
        Self {
            client: None,
            events: None,
        }
    }
}

impl ControlChannel for EspControlChannel {
    fn open(&mut self, url: &str) -> Result<(), LinkError> {
        self.close();

        let (tx, rx) = mpsc::channel();
        let config = EspWebSocketClientConfig {
            disable_auto_reconnect: true,
            ..Default::default()
        };
        let client = EspWebSocketClient::new(url, &config, WS_CLIENT_TIMEOUT, move |event| {
            if let Some(event) = translate_ws_event(event) {
                let _ = tx.send(event);
            }
        })
        .map_err(|err| LinkError::Open(format!("{err:?}")))?;

        self.client = Some(client);
        self.events = Some(rx);
        Ok(())
    }

    fn close(&mut self) {
        self.events = None;
        self.client = None;
    }

    fn next_event(&mut self, wait: Duration) -> Option<ChannelEvent> {
        let Some(events) = &self.events else {
            thread::sleep(wait);
            return None;
        };

        match events.recv_timeout(wait) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.events = None;
                Some(ChannelEvent::Disconnected {
                    reason: Some("websocket client dropped".to_string()),
                })
            }
        }
    }
}

fn translate_ws_event(
    event: &Result<WebSocketEvent<'_>, esp_idf_svc::io::EspIOError>,
) -> Option<ChannelEvent> {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            return Some(ChannelEvent::Disconnected {
                reason: Some(format!("{err:?}")),
            })
        }
    };

    match &event.event_type {
        WebSocketEventType::Connected => Some(ChannelEvent::Connected),
        WebSocketEventType::Text(text) => Some(ChannelEvent::Text(text.to_string())),
        WebSocketEventType::Close(_) => Some(ChannelEvent::Disconnected {
            reason: Some("server closed the connection".to_string()),
        }),
        WebSocketEventType::Disconnected | WebSocketEventType::Closed => {
            Some(ChannelEvent::Disconnected { reason: None })
        }
        _ => None,
    }
}

struct EspTelemetryTransport {
    timeout: Duration,
}

impl EspTelemetryTransport {
    fn post(&self, url: &str, credential: &str, body: &[u8]) -> anyhow::Result<u16> {
        let http_conf = HttpClientConfiguration {
            timeout: Some(self.timeout),
            ..Default::default()
        };
        let mut client = HttpClient::wrap(EspHttpConnection::new(&http_conf)?);

        let authorization = format!("Bearer {credential}");
        let content_length = body.len().to_string();
        let headers = [
            ("content-type", "application/json"),
            ("authorization", authorization.as_str()),
            ("content-length", content_length.as_str()),
        ];

        let mut request = client.post(url, &headers)?;
        request.write_all(body)?;
        request.flush()?;
        let response = request.submit().map_err(|e| anyhow!("{e:?}"))?;
        Ok(response.status())
    }
}

impl TelemetryTransport for EspTelemetryTransport {
    fn post_json(&mut self, url: &str, credential: &str, body: &[u8]) -> Result<u16, SendError> {
        self.post(url, credential, body)
            .map_err(|err| SendError::Transport(format!("{err:#}")))
    }
}

/// The calling task's subscription to the ESP-IDF task watchdog. Once
/// subscribed, a missed `feed` within the timeout panics and reboots.
struct TaskWatchdog;

impl TaskWatchdog {
    fn subscribe_current_task(timeout: Duration) -> anyhow::Result<Self> {
        let config = sys::esp_task_wdt_config_t {
            timeout_ms: timeout.as_millis().try_into().unwrap_or(u32::MAX),
            idle_core_mask: 0,
            trigger_panic: true,
        };
        // Invalid state means the bootloader already did this step.
        unless_already_done(unsafe { sys::esp_task_wdt_init(&config) })
            .context("task watchdog init failed")?;
        unless_already_done(unsafe { sys::esp_task_wdt_add(ptr::null_mut()) })
            .context("task watchdog subscribe failed")?;

        info!("task watchdog armed: {} ms", config.timeout_ms);
        Ok(Self)
    }

    fn feed(&self) {
        if let Err(err) = EspError::convert(unsafe { sys::esp_task_wdt_reset() }) {
            warn!("task watchdog feed failed: {err}");
        }
    }
}

fn unless_already_done(rc: sys::esp_err_t) -> Result<(), EspError> {
    match EspError::convert(rc) {
        Err(err) if err.code() == sys::ESP_ERR_INVALID_STATE as sys::esp_err_t => Ok(()),
        other => other,
    }
}
