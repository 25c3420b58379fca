//! Wire formats for the kinematic, object and control channels
//!
//! Every payload is decoded into a [`ChannelMessage`] at the boundary. The
//! mutation code in [`crate::sync`] only ever sees validated messages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Number of joints on the reference robot
pub const JOINT_COUNT: usize = 7;

const F64_SIZE: usize = std::mem::size_of::<f64>();

/// One of the independent transport streams feeding the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Joint angles, binary
    Kinematic,
    /// Object snapshots, JSON text
    Object,
    /// Camera control deltas, JSON text
    Control,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Kinematic,
        ChannelKind::Object,
        ChannelKind::Control,
    ];

    /// WebSocket path the channel is served on
    pub fn endpoint(&self) -> &'static str {
        match self {
            ChannelKind::Kinematic => "/jointsWs",
            ChannelKind::Object => "/primitiveWs",
            ChannelKind::Control => "/controlsWs",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Kinematic => "kinematic",
            ChannelKind::Object => "object",
            ChannelKind::Control => "control",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ChannelKind::Kinematic => 0,
            ChannelKind::Object => 1,
            ChannelKind::Control => 2,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("frame length {len} is not a multiple of 8 bytes")]
    Misaligned { len: usize },
    #[error("expected {expected} joint values, got {actual}")]
    JointCount { expected: usize, actual: usize },
    #[error("{channel} channel expects a {expected} payload")]
    WrongPayload {
        channel: ChannelKind,
        expected: &'static str,
    },
    #[error("invalid JSON on {channel} channel: {message}")]
    Json {
        channel: ChannelKind,
        message: String,
    },
    #[error("{channel} channel expects {expected}")]
    Shape {
        channel: ChannelKind,
        expected: &'static str,
    },
    #[error("drawable size reply must be 16 bytes, got {len}")]
    DrawableSize { len: usize },
}

/// Raw payload as delivered by a transport
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Binary(&'a [u8]),
    Text(&'a str),
}

/// Decoded kinematic frame: one angle per joint, in joint-index order
#[derive(Debug, Clone, PartialEq)]
pub struct JointFrame(Vec<f64>);

impl JointFrame {
    pub fn new(angles: Vec<f64>) -> Self {
        Self(angles)
    }

    /// Decode little-endian f64 values, requiring exactly `expected` of them
    pub fn decode(bytes: &[u8], expected: usize) -> Result<Self, DecodeError> {
        if bytes.len() % F64_SIZE != 0 {
            return Err(DecodeError::Misaligned { len: bytes.len() });
        }
        let actual = bytes.len() / F64_SIZE;
        if actual != expected {
            return Err(DecodeError::JointCount { expected, actual });
        }

        let angles = bytes
            .chunks_exact(F64_SIZE)
            .map(|chunk| {
                let mut buf = [0u8; F64_SIZE];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect();
        Ok(Self(angles))
    }

    pub fn encode(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn angles(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One visible object in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Planar rotation in radians
    pub rot: f64,
}

/// Relative camera rotation in pointer-drag units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlDelta {
    pub rotate_left: f64,
    pub rotate_up: f64,
}

/// A validated message, discriminated by the channel it arrived on
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Kinematic(JointFrame),
    Object(Vec<ObjectRecord>),
    Control(ControlDelta),
}

impl ChannelMessage {
    /// Decode a payload received on `channel`
    pub fn decode(
        channel: ChannelKind,
        payload: Payload<'_>,
        expected_joints: usize,
    ) -> Result<Self, DecodeError> {
        match (channel, payload) {
            (ChannelKind::Kinematic, Payload::Binary(bytes)) => {
                JointFrame::decode(bytes, expected_joints).map(ChannelMessage::Kinematic)
            }
            (ChannelKind::Kinematic, Payload::Text(_)) => Err(DecodeError::WrongPayload {
                channel,
                expected: "binary",
            }),
            (ChannelKind::Object, Payload::Text(text)) => {
                let value = parse_json(channel, text)?;
                let records = value
                    .as_array()
                    .is_some_and(|items| items.iter().all(Value::is_object));
                if !records {
                    return Err(DecodeError::Shape {
                        channel,
                        expected: "an array of objects",
                    });
                }
                from_json(channel, value).map(ChannelMessage::Object)
            }
            (ChannelKind::Control, Payload::Text(text)) => {
                let value = parse_json(channel, text)?;
                if !value.is_object() {
                    return Err(DecodeError::Shape {
                        channel,
                        expected: "an object",
                    });
                }
                from_json(channel, value).map(ChannelMessage::Control)
            }
            (_, Payload::Binary(_)) => Err(DecodeError::WrongPayload {
                channel,
                expected: "text",
            }),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelMessage::Kinematic(_) => ChannelKind::Kinematic,
            ChannelMessage::Object(_) => ChannelKind::Object,
            ChannelMessage::Control(_) => ChannelKind::Control,
        }
    }
}

fn parse_json(channel: ChannelKind, text: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(text).map_err(|e| DecodeError::Json {
        channel,
        message: e.to_string(),
    })
}

// serde also accepts positional arrays for structs; callers check the shape first
fn from_json<T: DeserializeOwned>(channel: ChannelKind, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::Json {
        channel,
        message: e.to_string(),
    })
}
