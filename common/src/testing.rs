//! In-memory stand-ins for the hardware and network seams.

use std::{cell::Cell, collections::VecDeque, time::Duration};

use crate::{
    actuator::RelayOutput,
    connectivity::{
        ChannelEvent, ControlChannel, LinkError, NetworkLink, SendError, TelemetryTransport,
    },
    control::Clock,
    sensor::AnalogInput,
};

pub struct FixedInput {
    pub raw: i32,
    pub reads: usize,
}

impl FixedInput {
    pub fn new(raw: i32) -> Self {
        Self { raw, reads: 0 }
    }
}

impl AnalogInput for FixedInput {
    fn read_raw(&mut self) -> i32 {
        self.reads += 1;
        self.raw
    }
}

#[derive(Default)]
pub struct RecordingRelay {
    pub writes: Vec<bool>,
}

impl RecordingRelay {
    pub fn level(&self) -> Option<bool> {
        self.writes.last().copied()
    }
}

impl RelayOutput for RecordingRelay {
    fn set_level(&mut self, high: bool) {
        self.writes.push(high);
    }
}

#[derive(Default)]
pub struct FakeLink {
    pub failures_left: u32,
    pub associate_calls: u32,
    pub associated: bool,
}

impl FakeLink {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: times,
            ..Self::default()
        }
    }
}

impl NetworkLink for FakeLink {
    fn associate(&mut self) -> Result<(), LinkError> {
        self.associate_calls += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(LinkError::Association("no access point".to_string()));
        }
        self.associated = true;
        Ok(())
    }

    fn is_associated(&self) -> bool {
        self.associated
    }
}

/// Control channel driven entirely by the test. `open` discards anything
/// still queued from a previous session.
#[derive(Default)]
pub struct ScriptedChannel {
    /// Queue `Connected` as soon as `open` succeeds.
    pub handshake_on_open: bool,
    pub failing_opens: u32,
    pub events: VecDeque<ChannelEvent>,
    pub opened: Vec<String>,
    pub closes: usize,
    /// Every wait passed to `next_event`.
    pub waits: Vec<Duration>,
}

impl ScriptedChannel {
    pub fn accepting() -> Self {
        Self {
            handshake_on_open: true,
            ..Self::default()
        }
    }

    pub fn push_text(&mut self, text: &str) {
        self.events.push_back(ChannelEvent::Text(text.to_string()));
    }

    pub fn drop_connection(&mut self) {
        self.events.push_back(ChannelEvent::Disconnected {
            reason: Some("peer closed".to_string()),
        });
    }
}

impl ControlChannel for ScriptedChannel {
    fn open(&mut self, url: &str) -> Result<(), LinkError> {
        self.events.clear();
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(LinkError::Open("connection refused".to_string()));
        }
        self.opened.push(url.to_string());
        if self.handshake_on_open {
            self.events.push_back(ChannelEvent::Connected);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }

    fn next_event(&mut self, wait: Duration) -> Option<ChannelEvent> {
        self.waits.push(wait);
        self.events.pop_front()
    }
}

pub struct RecordedPost {
    pub url: String,
    pub credential: String,
    pub body: Vec<u8>,
}

#[derive(Default)]
pub struct RecordingTransport {
    pub posts: Vec<RecordedPost>,
    /// Scripted results, oldest first; HTTP 200 once exhausted.
    pub responses: VecDeque<Result<u16, SendError>>,
}

impl RecordingTransport {
    pub fn bodies(&self) -> Vec<String> {
        self.posts
            .iter()
            .map(|post| String::from_utf8_lossy(&post.body).into_owned())
            .collect()
    }
}

impl TelemetryTransport for RecordingTransport {
    fn post_json(&mut self, url: &str, credential: &str, body: &[u8]) -> Result<u16, SendError> {
        self.posts.push(RecordedPost {
            url: url.to_string(),
            credential: credential.to_string(),
            body: body.to_vec(),
        });
        self.responses.pop_front().unwrap_or(Ok(200))
    }
}

pub struct ManualClock(Cell<u64>);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(Cell::new(start_ms))
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.0.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}
