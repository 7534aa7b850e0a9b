use std::{
    io::ErrorKind,
    net::ToSocketAddrs,
    path::PathBuf,
    sync::mpsc::{self, RecvTimeoutError},
    time::Duration,
};

use anyhow::Context;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest, handshake::client::Request, Message,
};
use tracing::{debug, info, warn};

use humidity_common::{
    ChannelEvent, ConnectivityManager, ControlChannel, ControlLoop, DeviceConfig, DeviceState,
    LinkError, MonotonicClock, NetworkLink, SendError, SensorReader, TelemetryPublisher,
    TelemetryTransport,
};

use crate::sim;

/// Midpoint of the 12-bit ADC range.
const SIM_INITIAL_RAW: i32 = 2048;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("humidity-io")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let store = ConfigStore::new();
    let mut config = runtime
        .block_on(store.load_device_config())
        .unwrap_or_else(|err| {
            warn!("failed to load device config from store: {err:#}");
            DeviceConfig::default()
        });
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    let endpoints = config.endpoints();
    info!(
        "device configured: control={} telemetry={}",
        endpoints.redacted_control_url(),
        endpoints.telemetry_url
    );

    let transport =
        HttpTelemetryTransport::new(Duration::from_millis(config.timing.http_timeout_ms))?;
    let link = HostNetwork::new(&config.network.server_host, config.network.server_port);
    let channel = WsControlChannel::new(runtime.handle().clone());
    let connectivity =
        ConnectivityManager::new(link, channel, transport, endpoints, &config.timing);

    let (soil, relay) = sim::soil_with_relay(SIM_INITIAL_RAW);
    let mut device = ControlLoop::new(
        SensorReader::new(soil, config.calibration),
        DeviceState::new(relay, config.thresholds),
        connectivity,
        TelemetryPublisher::new(config.timing.telemetry_interval_ms),
        MonotonicClock::new(),
    );

    device.start(std::thread::sleep);
    device.run()
}

struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("HUMIDITY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.humidity"));

        Self {
            config_path: data_dir.join("device.json"),
        }
    }

    async fn load_device_config(&self) -> anyhow::Result<DeviceConfig> {
        match tokio::fs::read(&self.config_path).await {
            Ok(raw) => Ok(serde_json::from_slice::<DeviceConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(DeviceConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn apply_overrides(config: &mut DeviceConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("SERVER_HOST") {
        config.network.server_host = host;
    }
    if let Some(value) = lookup("SERVER_PORT") {
        match value.parse::<u16>() {
            Ok(port) => config.network.server_port = port,
            Err(_) => warn!("ignoring invalid SERVER_PORT `{value}`"),
        }
    }
    if let Some(token) = lookup("DEVICE_TOKEN") {
        config.network.device_token = token;
    }
    if let Some(value) = lookup("TELEMETRY_INTERVAL_MS") {
        match value.parse::<u64>() {
            Ok(interval) => config.timing.telemetry_interval_ms = interval,
            Err(_) => warn!("ignoring invalid TELEMETRY_INTERVAL_MS `{value}`"),
        }
    }
}

/// On a host the network is always up; association means the server name resolves.
struct HostNetwork {
    host: String,
    port: u16,
    associated: bool,
}

impl HostNetwork {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            associated: false,
        }
    }
}

impl NetworkLink for HostNetwork {
    fn associate(&mut self) -> Result<(), LinkError> {
        let mut addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| LinkError::Association(format!("{}: {err}", self.host)))?;

        match addrs.next() {
            Some(addr) => {
                debug!("server {} resolved to {addr}", self.host);
                self.associated = true;
                Ok(())
            }
            None => Err(LinkError::Association(format!(
                "{} resolved to no addresses",
                self.host
            ))),
        }
    }

    fn is_associated(&self) -> bool {
        self.associated
    }
}

/// WebSocket control channel. Socket I/O runs as a task on the tokio
/// runtime; events reach the control loop through a per-session queue.
struct WsControlChannel {
    runtime: Handle,
    events: Option<mpsc::Receiver<ChannelEvent>>,
    session: Option<JoinHandle<()>>,
}

impl WsControlChannel {
    fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            events: None,
            session: None,
        }
    }
}

impl ControlChannel for WsControlChannel {
    fn open(&mut self, url: &str) -> Result<(), LinkError> {
        self.close();

        let request = url
            .into_client_request()
            .map_err(|err| LinkError::Open(err.to_string()))?;
        let (tx, rx) = mpsc::channel();
        self.session = Some(self.runtime.spawn(run_session(request, tx)));
        self.events = Some(rx);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.abort();
        }
        self.events = None;
    }

    fn next_event(&mut self, wait: Duration) -> Option<ChannelEvent> {
        let Some(events) = &self.events else {
            std::thread::sleep(wait);
            return None;
        };

        match events.recv_timeout(wait) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.events = None;
                Some(ChannelEvent::Disconnected {
                    reason: Some("session task ended".to_string()),
                })
            }
        }
    }
}

impl Drop for WsControlChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_session(request: Request, events: mpsc::Sender<ChannelEvent>) {
    let mut stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            let _ = events.send(ChannelEvent::Disconnected {
                reason: Some(err.to_string()),
            });
            return;
        }
    };

    if events.send(ChannelEvent::Connected).is_err() {
        return;
    }

    // Pings are answered by tungstenite on the next read.
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if events.send(ChannelEvent::Text(text)).is_err() {
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break frame.map(|frame| {
                    format!("server closed ({}): {}", u16::from(frame.code), frame.reason)
                });
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => break Some(err.to_string()),
            None => break None,
        }
    };

    let _ = events.send(ChannelEvent::Disconnected { reason });
}

struct HttpTelemetryTransport {
    client: reqwest::blocking::Client,
}

impl HttpTelemetryTransport {
    fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build telemetry http client")?;
        Ok(Self { client })
    }
}

impl TelemetryTransport for HttpTelemetryTransport {
    fn post_json(&mut self, url: &str, credential: &str, body: &[u8]) -> Result<u16, SendError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(credential)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .map_err(|err| SendError::Transport(err.to_string()))?;

        Ok(response.status().as_u16())
    }
}
