use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    actuator::RelayOutput,
    state::DeviceState,
    types::{InboundMessage, Thresholds},
};

/// Largest control frame accepted; anything bigger is rejected unparsed.
pub const MAX_FRAME_BYTES: usize = 512;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame too large ({0} bytes, limit {MAX_FRAME_BYTES})")]
    Oversized(usize),
    #[error("invalid control message: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a handled frame did to device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Pump(bool),
    Thresholds(Thresholds),
    Ignored,
    Rejected,
}

pub fn decode(raw: &str) -> Result<InboundMessage, DecodeError> {
    if raw.len() > MAX_FRAME_BYTES {
        return Err(DecodeError::Oversized(raw.len()));
    }
    Ok(serde_json::from_str(raw)?)
}

/// Decodes one control frame and applies it. Malformed frames leave state untouched.
pub fn handle<O: RelayOutput>(raw: &str, state: &mut DeviceState<O>) -> Dispatch {
    let message = match decode(raw) {
        Ok(message) => message,
        Err(err) => {
            warn!("dropping control frame: {err}");
            return Dispatch::Rejected;
        }
    };

    match message {
        InboundMessage::Command { pump_on } => {
            info!("pump command received: {}", if pump_on { "ON" } else { "OFF" });
            state.actuator_mut().set_pump(pump_on);
            Dispatch::Pump(pump_on)
        }
        InboundMessage::Config {
            min_humidity,
            max_humidity,
        } => {
            state
                .thresholds_mut()
                .set_thresholds(min_humidity, max_humidity);
            Dispatch::Thresholds(state.thresholds().thresholds())
        }
        InboundMessage::Unknown => {
            debug!("ignoring control frame with unrecognized type");
            Dispatch::Ignored
        }
    }
}
