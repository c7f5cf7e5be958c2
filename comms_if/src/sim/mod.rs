//! # Simulator messages
//!
//! The simulator speaks a socket.io style protocol over a WebSocket. Every event is a text frame
//! starting with the `42` marker (`4` for a message, `2` for an event) followed by a JSON array
//! whose first element is the event name and second element is the event data:
//!
//! ```text
//! 42["telemetry",{"cte":"0.7598","speed":"0.4380","steering_angle":"0.0000","throttle":"0.0000","image":"..."}]
//! ```
//!
//! Numeric telemetry fields are sent as strings. When the simulator is in manual mode the data
//! is `null` and the controller should answer with a `manual` event.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Prefix marking a frame as a socket.io event.
pub const EVENT_MARKER: &str = "42";

/// Name of the event carrying vehicle telemetry.
pub const TELEMETRY_EVENT: &str = "telemetry";

/// Name of the event carrying the steering command.
pub const STEER_EVENT: &str = "steer";

/// Frame sent back when an event carries no data.
pub const MANUAL_FRAME: &str = "42[\"manual\",{}]";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry sample decoded from a `telemetry` event.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Telemetry {
    /// Cross track error, the signed lateral distance between the vehicle and the target path.
    pub cte: f64,

    /// Vehicle speed as reported by the simulator.
    pub speed: f64,

    /// The steering angle currently applied in the simulator, if reported.
    pub steering_angle: Option<f64>,

    /// The throttle currently applied in the simulator, if reported.
    pub throttle: Option<f64>
}

/// Steering command sent back to the simulator.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteerCmd {
    /// Normalised steering angle between -1 and +1.
    pub steering_angle: f64,

    /// Throttle demand.
    pub throttle: f64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A decoded simulator event.
#[derive(Debug, Clone, PartialEq)]
pub enum SimMessage {
    /// Telemetry from the vehicle, which must be answered with a steering command.
    Telemetry(Telemetry),

    /// An event without any data, the simulator is being driven manually.
    Manual,

    /// Any other named event, which is ignored.
    Other(String)
}

/// Errors which can occur when decoding or encoding simulator frames.
#[derive(Debug, Error)]
pub enum SimMsgError {
    #[error("Frame contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Expected the frame payload to be a JSON array")]
    NotAnArray,

    #[error("Expected the first element of the payload to be the event name")]
    MissingEvent,

    #[error("Telemetry event has no data object")]
    MissingData,

    #[error("Telemetry field \"{0}\" is missing")]
    MissingField(&'static str),

    #[error("Telemetry field \"{0}\" is not a finite number")]
    InvalidField(&'static str),

    #[error("Could not serialise the command: {0}")]
    SerialiseError(serde_json::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimMessage {
    /// Decode a raw text frame.
    ///
    /// Returns `Ok(None)` if the frame is not an event (for example transport pings or the
    /// connection handshake), which the caller should ignore.
    pub fn from_frame(frame: &str) -> Result<Option<Self>, SimMsgError> {
        if frame.len() <= EVENT_MARKER.len() || !frame.starts_with(EVENT_MARKER) {
            return Ok(None)
        }

        let payload = match has_data(frame) {
            Some(p) => p,
            None => return Ok(Some(SimMessage::Manual))
        };

        let val: Value = serde_json::from_str(payload)
            .map_err(SimMsgError::InvalidJson)?;

        let items = val.as_array().ok_or(SimMsgError::NotAnArray)?;

        let event = items
            .get(0)
            .and_then(Value::as_str)
            .ok_or(SimMsgError::MissingEvent)?;

        if event == TELEMETRY_EVENT {
            let data = items.get(1).ok_or(SimMsgError::MissingData)?;
            Ok(Some(SimMessage::Telemetry(Telemetry::from_value(data)?)))
        }
        else {
            Ok(Some(SimMessage::Other(event.to_string())))
        }
    }
}

impl Telemetry {
    /// Build the telemetry from the data object of a `telemetry` event.
    pub fn from_value(data: &Value) -> Result<Self, SimMsgError> {
        if !data.is_object() {
            return Err(SimMsgError::MissingData)
        }

        Ok(Self {
            cte: parse_field(data, "cte")?,
            speed: parse_field(data, "speed")?,
            steering_angle: parse_field(data, "steering_angle").ok(),
            throttle: parse_field(data, "throttle").ok()
        })
    }
}

impl SteerCmd {
    /// Encode the command as a `steer` event frame.
    pub fn to_frame(&self) -> Result<String, SimMsgError> {
        let payload = serde_json::to_string(&(STEER_EVENT, self))
            .map_err(SimMsgError::SerialiseError)?;

        Ok(format!("{}{}", EVENT_MARKER, payload))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The reply to an event which carries no data.
pub fn manual_frame() -> String {
    MANUAL_FRAME.to_string()
}

/// Extract the JSON payload of a frame.
///
/// The payload is everything between the first `[` and the last `]` inclusive. Frames mentioning
/// `null` anywhere are treated as carrying no data.
pub fn has_data(frame: &str) -> Option<&str> {
    if frame.contains("null") {
        return None
    }

    let start = frame.find('[')?;
    let end = frame.rfind(']')?;

    if end < start {
        return None
    }

    Some(&frame[start..=end])
}

/// Parse a numeric field which may be sent either as a string or as a JSON number.
fn parse_field(data: &Value, name: &'static str) -> Result<f64, SimMsgError> {
    let value = match &data[name] {
        Value::Null => return Err(SimMsgError::MissingField(name)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| SimMsgError::InvalidField(name))?,
        Value::Number(n) => n.as_f64().ok_or(SimMsgError::InvalidField(name))?,
        _ => return Err(SimMsgError::InvalidField(name))
    };

    if value.is_finite() {
        Ok(value)
    }
    else {
        Err(SimMsgError::InvalidField(name))
    }
}
