use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const CONTROL_CHANNEL_PATH: &str = "/ws/device/";
pub const TELEMETRY_PATH: &str = "/api/telemetry/";

/// RFC 3986 unreserved characters pass through; everything else is escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Server URLs and the device credential, derived once from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub control_url: String,
    pub telemetry_url: String,
    pub credential: String,
    host: String,
    port: u16,
}

impl Endpoints {
    pub fn new(host: &str, port: u16, credential: &str) -> Self {
        let token = utf8_percent_encode(credential, QUERY_VALUE);
        Self {
            control_url: format!("ws://{host}:{port}{CONTROL_CHANNEL_PATH}?token={token}"),
            telemetry_url: format!("http://{host}:{port}{TELEMETRY_PATH}"),
            credential: credential.to_string(),
            host: host.to_string(),
            port,
        }
    }

    /// Control URL safe for logs: the token is masked.
    pub fn redacted_control_url(&self) -> String {
        format!(
            "ws://{}:{}{CONTROL_CHANNEL_PATH}?token=***",
            self.host, self.port
        )
    }
}
