//! Eyedesk Core - Live scene synchronizer
//!
//! This crate provides the headless heart of the Eyedesk viewer:
//! - Wire formats for the kinematic, object and control channels
//! - Pose registry for tracked workspace objects
//! - Articulated robot model driven by joint frames
//! - Camera rig with an orbit controller and its drag gesture machine
//! - Scene state with per-channel write capabilities and a render loop
//! - Projector overlay primitives and per-channel health tracking
//! - Fiducial marker positions from camera detections
//! - Request/response bodies of the publish API

pub mod camera;
pub mod entity;
pub mod health;
pub mod kinematics;
pub mod manifest;
pub mod overlay;
pub mod publish;
pub mod registry;
pub mod render;
pub mod sync;
pub mod tracking;
pub mod viewport;
pub mod wire;

pub use camera::{CameraRig, OrbitController, PointerEvent, Projection, RelativeRotation};
pub use entity::{Entity, EntityId, Pose};
pub use health::{ChannelHealth, ChannelMonitor, LinkState};
pub use kinematics::{ArticulatedModel, Joint, PANDA_JOINTS};
pub use manifest::{AssetManifest, ManifestError};
pub use overlay::{
    decode_drawable_size, encode_drawable_size, ArucoMarker, CircleShape, DrawBatch, DrawObject,
    LineSegment, ProjectorCommand, ProjectorMessage, RectShape, TextLabel,
};
pub use publish::{
    ArucosRequest, ChannelStats, CirclesRequest, DrawableSize, LinesRequest, ObjectsUpdate,
    PublishResponse, RectsRequest, RobotUpdate, TextsRequest,
};
pub use registry::{PoseRegistry, ReconcileSummary};
pub use render::{FrameSink, RenderLoop, SceneView};
pub use sync::{Applied, SceneState, SceneSynchronizer, SceneWriters, SlotMarker, TransportEvent};
pub use tracking::{
    from_corners_to_position, ArucoDetection, ArucoDetections, ArucoPosition, ArucoPositions,
};
pub use viewport::Viewport;
pub use wire::{ChannelKind, ChannelMessage, ControlDelta, DecodeError, JointFrame, ObjectRecord, Payload, JOINT_COUNT};
