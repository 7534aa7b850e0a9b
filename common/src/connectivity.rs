use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::{config::TimingConfig, endpoints::Endpoints, types::LinkState};

/// Upper bound on channel events consumed by a single `poll`.
const MAX_EVENTS_PER_POLL: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Text(String),
    Disconnected { reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("network association failed: {0}")]
    Association(String),
    #[error("control channel open failed: {0}")]
    Open(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("server answered HTTP {0}")]
    Status(u16),
    #[error("telemetry transport failed: {0}")]
    Transport(String),
    #[error("telemetry encode failed: {0}")]
    Encode(String),
}

/// Wireless link below the control channel (WiFi station on hardware).
pub trait NetworkLink {
    fn associate(&mut self) -> Result<(), LinkError>;
    fn is_associated(&self) -> bool;
}

/// Persistent bidirectional text channel to the server.
///
/// `open` starts a new session and must discard any events left over from
/// the previous one. The outcome of the handshake arrives later as
/// `ChannelEvent::Connected` or `ChannelEvent::Disconnected`.
pub trait ControlChannel {
    fn open(&mut self, url: &str) -> Result<(), LinkError>;
    fn close(&mut self);
    /// Waits at most `wait` for the next event.
    fn next_event(&mut self, wait: Duration) -> Option<ChannelEvent>;
}

/// One-shot JSON POST; returns the HTTP status code.
pub trait TelemetryTransport {
    fn post_json(&mut self, url: &str, credential: &str, body: &[u8]) -> Result<u16, SendError>;
}

/// Outbound path for serialized telemetry samples.
pub trait TelemetrySink {
    fn send(&mut self, body: &[u8]) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub attempts: u64,
    pub connects: u64,
    pub disconnects: u64,
}

pub struct ConnectivityManager<L, C, T> {
    link: L,
    channel: C,
    transport: T,
    endpoints: Endpoints,
    state: LinkState,
    next_attempt_ms: u64,
    handshake_started_ms: Option<u64>,
    reconnect_interval_ms: u64,
    handshake_timeout_ms: u64,
    association_retry: Duration,
    poll_wait: Duration,
    stats: LinkStats,
}

impl<L, C, T> ConnectivityManager<L, C, T>
where
    L: NetworkLink,
    C: ControlChannel,
{
    pub fn new(
        link: L,
        channel: C,
        transport: T,
        endpoints: Endpoints,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            link,
            channel,
            transport,
            endpoints,
            state: LinkState::Disconnected,
            next_attempt_ms: 0,
            handshake_started_ms: None,
            reconnect_interval_ms: timing.reconnect_interval_ms,
            handshake_timeout_ms: timing.handshake_timeout_ms,
            association_retry: Duration::from_millis(timing.association_retry_ms),
            poll_wait: Duration::from_millis(timing.poll_wait_ms),
            stats: LinkStats::default(),
        }
    }

    /// Blocks until the network link associates, retrying forever, then
    /// arms an immediate control channel attempt.
    pub fn start(&mut self, mut sleep: impl FnMut(Duration)) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.link.associate() {
                Ok(()) => break,
                Err(err) => {
                    if attempt == 1 || attempt % 20 == 0 {
                        warn!("{err}; still retrying (attempt {attempt})");
                    }
                    sleep(self.association_retry);
                }
            }
        }
        info!("network associated after {attempt} attempt(s)");

        self.state = LinkState::Connecting;
        self.next_attempt_ms = 0;
        self.handshake_started_ms = None;
    }

    /// Advances the state machine and returns text frames received while
    /// connected. Never blocks longer than the configured poll wait.
    pub fn poll(&mut self, now_ms: u64) -> Vec<String> {
        let mut frames = Vec::new();

        match self.state {
            LinkState::Disconnected => self.idle(),
            LinkState::Connecting => {
                if self.handshake_started_ms.is_none() {
                    self.try_open(now_ms);
                }
                if self.handshake_started_ms.is_some() {
                    self.drain_events(now_ms, &mut frames);
                    self.expire_handshake(now_ms);
                } else {
                    self.idle();
                }
            }
            LinkState::Connected => self.drain_events(now_ms, &mut frames),
        }

        frames
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn try_open(&mut self, now_ms: u64) {
        if now_ms < self.next_attempt_ms {
            return;
        }

        if !self.link.is_associated() {
            debug!("network link down; deferring control channel attempt");
            self.next_attempt_ms = now_ms.saturating_add(self.reconnect_interval_ms);
            return;
        }

        self.stats.attempts += 1;
        info!(
            "opening control channel {} (attempt {})",
            self.endpoints.redacted_control_url(),
            self.stats.attempts
        );

        match self.channel.open(&self.endpoints.control_url) {
            Ok(()) => self.handshake_started_ms = Some(now_ms),
            Err(err) => {
                warn!("{err}; retrying in {} ms", self.reconnect_interval_ms);
                self.next_attempt_ms = now_ms.saturating_add(self.reconnect_interval_ms);
            }
        }
    }

    /// Spends the poll wait with no session in flight. The channel is closed
    /// here, so anything it yields is stale.
    fn idle(&mut self) {
        if let Some(event) = self.channel.next_event(self.poll_wait) {
            debug!("discarding {event:?} with no session open");
        }
    }

    fn drain_events(&mut self, now_ms: u64, frames: &mut Vec<String>) {
        let mut wait = self.poll_wait;

        for _ in 0..MAX_EVENTS_PER_POLL {
            let Some(event) = self.channel.next_event(wait) else {
                break;
            };
            wait = Duration::ZERO;

            match event {
                ChannelEvent::Connected => self.on_connected(),
                ChannelEvent::Text(text) if self.state == LinkState::Connected => frames.push(text),
                ChannelEvent::Text(_) => {
                    debug!("dropping frame received while {}", self.state.as_str());
                }
                ChannelEvent::Disconnected { reason } => {
                    self.on_disconnected(now_ms, reason);
                    break;
                }
            }
        }
    }

    fn on_connected(&mut self) {
        if self.state != LinkState::Connecting {
            return;
        }
        self.state = LinkState::Connected;
        self.handshake_started_ms = None;
        self.stats.connects += 1;
        info!("control channel connected");
    }

    fn on_disconnected(&mut self, now_ms: u64, reason: Option<String>) {
        let reason = reason.unwrap_or_else(|| "no reason given".to_string());
        if self.state == LinkState::Connected {
            self.stats.disconnects += 1;
            warn!("control channel disconnected: {reason}");
        } else {
            warn!("control channel handshake failed: {reason}");
        }

        self.channel.close();
        self.state = LinkState::Disconnected;
        self.schedule_retry(now_ms);
    }

    fn expire_handshake(&mut self, now_ms: u64) {
        let Some(started) = self.handshake_started_ms else {
            return;
        };
        if self.state != LinkState::Connecting
            || now_ms.saturating_sub(started) < self.handshake_timeout_ms
        {
            return;
        }

        warn!(
            "control channel handshake timed out after {} ms",
            self.handshake_timeout_ms
        );
        self.channel.close();
        self.schedule_retry(now_ms);
    }

    fn schedule_retry(&mut self, now_ms: u64) {
        self.state = LinkState::Connecting;
        self.handshake_started_ms = None;
        self.next_attempt_ms = now_ms.saturating_add(self.reconnect_interval_ms);
        info!("reconnecting in {} ms", self.reconnect_interval_ms);
    }
}

impl<L, C, T: TelemetryTransport> TelemetrySink for ConnectivityManager<L, C, T> {
    fn send(&mut self, body: &[u8]) -> Result<(), SendError> {
        let status = self.transport.post_json(
            &self.endpoints.telemetry_url,
            &self.endpoints.credential,
            body,
        )?;

        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(SendError::Status(status))
        }
    }
}
