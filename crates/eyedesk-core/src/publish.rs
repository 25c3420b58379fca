//! Request and response bodies of the daemon's publish API
//!
//! Shared by the daemon handlers and the producer client so both sides
//! agree on the JSON shapes.

use serde::{Deserialize, Serialize};

use crate::overlay::{ArucoMarker, CircleShape, LineSegment, RectShape, TextLabel};
use crate::wire::{ChannelKind, ObjectRecord};

/// `POST /api/robot`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotUpdate {
    pub joints: Vec<f64>,
}

/// `POST /api/objects`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectsUpdate {
    pub objects: Vec<ObjectRecord>,
}

/// `POST /api/draw/arucos`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArucosRequest {
    pub markers: Vec<ArucoMarker>,
}

/// `POST /api/draw/texts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextsRequest {
    pub texts: Vec<TextLabel>,
}

/// `POST /api/draw/circles`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CirclesRequest {
    pub circles: Vec<CircleShape>,
}

/// `POST /api/draw/lines`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinesRequest {
    pub lines: Vec<LineSegment>,
}

/// `POST /api/draw/rects`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectsRequest {
    pub rects: Vec<RectShape>,
}

/// Body of every successful publish or draw call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    /// Records published, primitives pending or sent, or positions stored
    #[serde(default)]
    pub count: usize,
}

impl PublishResponse {
    pub fn ok(count: usize) -> Self {
        Self {
            success: true,
            count,
        }
    }
}

/// `GET /api/draw/size`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawableSize {
    pub width: f64,
    pub height: f64,
}

/// One entry of `GET /api/channels`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel: ChannelKind,
    pub endpoint: String,
    pub subscribers: usize,
    pub published: u64,
    pub has_latest: bool,
}
