//! Projector overlay primitives
//!
//! The projector is a 2D surface drawn on top of the desk. Producers queue
//! primitives into a [`DrawBatch`]; flushing sends the whole batch to every
//! projector client as one JSON array.

use serde::{Deserialize, Serialize};

use crate::wire::DecodeError;

/// Socket path projector clients connect to
pub const DRAW_ENDPOINT: &str = "/DrawWs";

/// Text size 1.0 renders at this many pixels
pub const TEXT_BASE_PX: f32 = 16.0;
/// Stroke width of circle outlines
pub const CIRCLE_STROKE: f32 = 5.0;

/// One overlay primitive, in logical surface units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawObject {
    /// Fiducial marker image, `size` x `size`
    Aruco { x: f32, y: f32, size: f32 },
    Text {
        text: String,
        x: f32,
        y: f32,
        size: f32,
    },
    Circle {
        x: f32,
        y: f32,
        radius: f32,
        #[serde(default)]
        fill: bool,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        line_width: f32,
    },
    Rectangle {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        #[serde(default)]
        fill: bool,
        line_width: f32,
    },
}

impl DrawObject {
    /// Font size in pixels for a text primitive
    pub fn font_px(size: f32) -> f32 {
        size * TEXT_BASE_PX
    }
}

/// Marker placement as sent by producers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArucoMarker {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLabel {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleShape {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    #[serde(default)]
    pub fill: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(default = "default_line_width")]
    pub line_width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectShape {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub fill: bool,
    #[serde(default = "default_line_width")]
    pub line_width: f32,
}

fn default_line_width() -> f32 {
    1.0
}

impl From<ArucoMarker> for DrawObject {
    fn from(m: ArucoMarker) -> Self {
        DrawObject::Aruco { x: m.x, y: m.y, size: m.size }
    }
}

impl From<TextLabel> for DrawObject {
    fn from(t: TextLabel) -> Self {
        DrawObject::Text { text: t.text, x: t.x, y: t.y, size: t.size }
    }
}

impl From<CircleShape> for DrawObject {
    fn from(c: CircleShape) -> Self {
        DrawObject::Circle { x: c.x, y: c.y, radius: c.radius, fill: c.fill }
    }
}

impl From<LineSegment> for DrawObject {
    fn from(l: LineSegment) -> Self {
        DrawObject::Line { x1: l.x1, y1: l.y1, x2: l.x2, y2: l.y2, line_width: l.line_width }
    }
}

impl From<RectShape> for DrawObject {
    fn from(r: RectShape) -> Self {
        DrawObject::Rectangle {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
            fill: r.fill,
            line_width: r.line_width,
        }
    }
}

/// Pending primitives, cleared on flush
#[derive(Debug, Clone, Default)]
pub struct DrawBatch {
    pending: Vec<DrawObject>,
}

impl DrawBatch {
    pub fn push(&mut self, object: DrawObject) {
        self.pending.push(object);
    }

    pub fn extend(&mut self, objects: impl IntoIterator<Item = DrawObject>) {
        self.pending.extend(objects);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take everything queued so far, leaving the batch empty
    pub fn flush(&mut self) -> Vec<DrawObject> {
        std::mem::take(&mut self.pending)
    }
}

/// Commands the server sends to projector clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectorCommand {
    GetDrawableSize,
}

impl ProjectorCommand {
    pub fn code(&self) -> i32 {
        match self {
            ProjectorCommand::GetDrawableSize => 0,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ProjectorCommand::GetDrawableSize),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Text message on the projector socket: a command code or a draw batch
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectorMessage {
    Command(ProjectorCommand),
    Draw(Vec<DrawObject>),
}

impl ProjectorMessage {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        if let Ok(code) = text.trim().parse::<i32>() {
            if let Some(command) = ProjectorCommand::from_code(code) {
                return Ok(ProjectorMessage::Command(command));
            }
        }
        serde_json::from_str(text).map(ProjectorMessage::Draw)
    }
}

/// Drawable size reply: width then height, little-endian f64
pub fn encode_drawable_size(width: f64, height: f64) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&width.to_le_bytes());
    buf[8..].copy_from_slice(&height.to_le_bytes());
    buf
}

pub fn decode_drawable_size(bytes: &[u8]) -> Result<(f64, f64), DecodeError> {
    if bytes.len() != 16 {
        return Err(DecodeError::DrawableSize { len: bytes.len() });
    }
    let mut w = [0u8; 8];
    let mut h = [0u8; 8];
    w.copy_from_slice(&bytes[..8]);
    h.copy_from_slice(&bytes[8..]);
    Ok((f64::from_le_bytes(w), f64::from_le_bytes(h)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_json_is_externally_tagged() {
        let batch = vec![
            DrawObject::Aruco { x: 1.0, y: 2.0, size: 3.0 },
            DrawObject::Circle { x: 1.0, y: 2.0, radius: 3.0, fill: false },
        ];
        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.starts_with(r#"[{"Aruco":{"x":1.0,"y":2.0,"size":3.0}}"#));

        let text = r#"[{"Text":{"text":"Hello","x":10,"y":10,"size":1}},{"Circle":{"x":0,"y":0,"radius":200}}]"#;
        match ProjectorMessage::decode(text).unwrap() {
            ProjectorMessage::Draw(objects) => {
                assert_eq!(objects.len(), 2);
                assert_eq!(
                    objects[1],
                    DrawObject::Circle { x: 0.0, y: 0.0, radius: 200.0, fill: false }
                );
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_command_message() {
        let text = ProjectorCommand::GetDrawableSize.to_string();
        assert_eq!(text, "0");
        assert_eq!(
            ProjectorMessage::decode(&text).unwrap(),
            ProjectorMessage::Command(ProjectorCommand::GetDrawableSize)
        );
        assert!(ProjectorMessage::decode("7").is_err());
    }

    #[test]
    fn test_batch_flush_clears() {
        let mut batch = DrawBatch::default();
        batch.push(DrawObject::Aruco { x: 100.0, y: 100.0, size: 200.0 });
        batch.extend([DrawObject::Line { x1: 0.0, y1: 0.0, x2: 5.0, y2: 5.0, line_width: 2.0 }]);
        assert_eq!(batch.flush().len(), 2);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_drawable_size_reply() {
        let bytes = encode_drawable_size(1920.0, 1080.0);
        assert_eq!(decode_drawable_size(&bytes), Ok((1920.0, 1080.0)));
        assert_eq!(
            decode_drawable_size(&bytes[..12]),
            Err(DecodeError::DrawableSize { len: 12 })
        );
        assert_eq!(DrawObject::font_px(5.0), 80.0);
    }

    #[test]
    fn test_shapes_convert_to_primitives() {
        let rect: RectShape =
            serde_json::from_str(r#"{"x":0,"y":0,"width":40,"height":20}"#).unwrap();
        assert_eq!(
            DrawObject::from(rect),
            DrawObject::Rectangle {
                x: 0.0,
                y: 0.0,
                width: 40.0,
                height: 20.0,
                fill: false,
                line_width: 1.0,
            }
        );
        let label = TextLabel { text: "Hi".into(), x: 1.0, y: 2.0, size: 5.0 };
        assert!(matches!(DrawObject::from(label), DrawObject::Text { size, .. } if size == 5.0));
    }
}
