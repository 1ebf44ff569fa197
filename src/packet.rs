//! GPIO-over-Ethernet frame decoding
//!
//! Boards multicast one JSON object per state change:
//!
//! ```json
//! {"host":"GPIOoE-1A2B3C","pno":42,"gpi":{"gpi0":0,"gpi1":1}}
//! ```
//!
//! `host` identifies the board, `pno` is its packet counter and `gpi` holds the
//! input levels keyed by channel name.

use serde_json::{Map, Value};
use thiserror::Error;

/// Number of GPI channels on a board
pub const CHANNEL_COUNT: usize = 8;

/// Datagram asking a board to resend its full state
pub const STATUS_REQUEST: &[u8] = br#"{"status":"get"}"#;

/// Host shown on the status line before the first frame arrives
pub const PLACEHOLDER_HOST: &str = "GPIOoE-??????";

/// Frame decoding errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("invalid channel name '{0}' (expected gpi0..gpi7)")]
    InvalidChannel(String),
}

/// Input levels of all channels, indexed from 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStates([bool; CHANNEL_COUNT]);

impl ChannelStates {
    /// All channels low
    pub fn all_low() -> Self {
        Self::default()
    }

    /// Level of a 0-based channel; out-of-range channels read as low
    pub fn get(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// Copy with one channel changed
    pub fn with(mut self, index: usize, level: bool) -> Self {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = level;
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().copied()
    }
}

/// One decoded board frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    /// Board identity (`host`)
    pub source: Option<String>,
    /// Packet counter (`pno`)
    pub sequence: Option<i64>,
    /// Input levels (`gpi`); `None` for frames that carry no channel data
    pub channels: Option<ChannelStates>,
}

impl DeviceSnapshot {
    /// Decode a raw datagram
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_slice(data)?;
        let object = value.as_object().ok_or(FrameError::NotAnObject)?;

        let source = object
            .get("host")
            .and_then(Value::as_str)
            .map(str::to_string);
        let sequence = object.get("pno").and_then(Value::as_i64);
        let channels = match object.get("gpi") {
            Some(Value::Object(gpi)) => Some(parse_channels(gpi)?),
            _ => None,
        };

        Ok(Self {
            source,
            sequence,
            channels,
        })
    }

    /// Snapshot shown before any board has reported
    pub fn placeholder() -> Self {
        Self {
            source: Some(PLACEHOLDER_HOST.to_string()),
            sequence: Some(0),
            channels: Some(ChannelStates::all_low()),
        }
    }

    /// Source id for display purposes
    pub fn source_label(&self) -> &str {
        self.source.as_deref().unwrap_or("unknown")
    }
}

fn parse_channels(gpi: &Map<String, Value>) -> Result<ChannelStates, FrameError> {
    let mut states = ChannelStates::all_low();
    for (name, level) in gpi {
        let index = channel_index(name).ok_or_else(|| FrameError::InvalidChannel(name.clone()))?;
        states = states.with(index, is_active(level));
    }
    Ok(states)
}

/// Channel index from the trailing digits of its name (`gpi3` -> 3)
fn channel_index(name: &str) -> Option<usize> {
    let digits_at = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let index: usize = name[digits_at..].parse().ok()?;
    (index < CHANNEL_COUNT).then_some(index)
}

/// Boards report levels as 0/1; booleans and "1" are accepted as well
fn is_active(level: &Value) -> bool {
    match level {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => s.trim() == "1",
        _ => false,
    }
}
