//! Scene state and the channel adapters that mutate it
//!
//! `SceneState` is the single shared resource. Its fields are private; the
//! only way to mutate them is through the per-channel writers handed out by
//! [`SceneState::split_mut`]:
//! - joint angles belong to the kinematic writer
//! - entity transforms and visibility belong to the object writer
//! - camera orientation belongs to the control writer (remote and local input)
//!
//! Each message is decoded and applied to completion before anything else
//! runs, so a render sample sees either none or all of a message's effect.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::camera::{CameraRig, PointerEvent, RelativeRotation};
use crate::health::ChannelMonitor;
use crate::kinematics::ArticulatedModel;
use crate::registry::{PoseRegistry, ReconcileSummary};
use crate::render::SceneView;
use crate::viewport::Viewport;
use crate::wire::{ChannelKind, ChannelMessage, ControlDelta, DecodeError, JointFrame, ObjectRecord, Payload};

/// Generation of the dynamic-objects slot; bumped on every object update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlotMarker(pub u64);

/// What a transport delivered on one channel
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Binary(Vec<u8>),
    Text(String),
    Closed,
    Error(String),
}

/// Robot, tracked objects and camera
#[derive(Debug, Clone)]
pub struct SceneState<H> {
    registry: PoseRegistry<H>,
    model: ArticulatedModel,
    camera: CameraRig,
    slot: SlotMarker,
}

impl<H> SceneState<H> {
    pub fn new(registry: PoseRegistry<H>, model: ArticulatedModel, camera: CameraRig) -> Self {
        Self {
            registry,
            model,
            camera,
            slot: SlotMarker::default(),
        }
    }

    pub fn registry(&self) -> &PoseRegistry<H> {
        &self.registry
    }

    pub fn model(&self) -> &ArticulatedModel {
        &self.model
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn slot(&self) -> SlotMarker {
        self.slot
    }

    /// Disjoint write capabilities, one per channel
    pub fn split_mut(&mut self) -> SceneWriters<'_, H> {
        SceneWriters {
            kinematic: KinematicWriter {
                model: &mut self.model,
            },
            object: ObjectWriter {
                registry: &mut self.registry,
                slot: &mut self.slot,
            },
            control: ControlWriter {
                camera: &mut self.camera,
            },
        }
    }

    /// Window resize: projection follows the new aspect ratio
    pub fn resize(&mut self, viewport: &Viewport) {
        self.camera.resize(viewport);
    }

    pub fn view(&self) -> SceneView<'_, H> {
        SceneView {
            registry: &self.registry,
            model: &self.model,
            camera: &self.camera,
            slot: self.slot,
        }
    }
}

pub struct SceneWriters<'a, H> {
    pub kinematic: KinematicWriter<'a>,
    pub object: ObjectWriter<'a, H>,
    pub control: ControlWriter<'a>,
}

/// Write access to joint angles
pub struct KinematicWriter<'a> {
    model: &'a mut ArticulatedModel,
}

impl KinematicWriter<'_> {
    pub fn apply(&mut self, frame: &JointFrame) -> Result<(), DecodeError> {
        self.model.apply(frame)
    }
}

/// Write access to entity poses and the dynamic-objects slot
pub struct ObjectWriter<'a, H> {
    registry: &'a mut PoseRegistry<H>,
    slot: &'a mut SlotMarker,
}

impl<H> ObjectWriter<'_, H> {
    /// Reset pass, apply pass, then a fresh dynamic-objects slot
    pub fn reconcile(&mut self, records: &[ObjectRecord]) -> ReconcileSummary {
        let summary = self.registry.reconcile(records);
        self.slot.0 += 1;
        summary
    }
}

/// Write access to the camera rig
pub struct ControlWriter<'a> {
    camera: &'a mut CameraRig,
}

impl ControlWriter<'_> {
    /// Remote control delta, replayed as one press/move/release cycle.
    /// Returns false when a local drag owns the controller and the delta
    /// was dropped.
    pub fn apply(&mut self, delta: &ControlDelta) -> bool {
        if self.camera.controller.is_dragging() {
            return false;
        }
        self.camera
            .apply_relative_rotation(delta.rotate_left as f32, delta.rotate_up as f32);
        true
    }

    /// Local pointer input
    pub fn pointer(&mut self, event: PointerEvent) {
        self.camera.handle_pointer(event);
    }

    pub fn zoom(&mut self, scroll: f32) {
        self.camera.controller.zoom(scroll);
    }

    pub fn update(&mut self, dt: f32) {
        self.camera.controller.update(dt);
    }
}

/// Result of applying one validated message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Joints,
    Objects(ReconcileSummary),
    Camera,
    /// Control delta dropped during a local drag
    CameraSkipped,
}

/// Scene state plus channel health; the entry point for transport events
#[derive(Debug, Clone)]
pub struct SceneSynchronizer<H> {
    state: SceneState<H>,
    health: ChannelMonitor,
}

impl<H> SceneSynchronizer<H> {
    pub fn new(state: SceneState<H>) -> Self {
        Self {
            state,
            health: ChannelMonitor::default(),
        }
    }

    pub fn state(&self) -> &SceneState<H> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SceneState<H> {
        &mut self.state
    }

    pub fn health(&self) -> &ChannelMonitor {
        &self.health
    }

    /// Handle one transport event for `channel`.
    ///
    /// Returns `Ok(None)` for link events, `Ok(Some(_))` for an applied
    /// message. A rejected payload leaves the scene untouched.
    pub fn ingest(
        &mut self,
        channel: ChannelKind,
        event: TransportEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<Applied>, DecodeError> {
        match event {
            TransportEvent::Open => {
                info!(channel = %channel, "Channel open");
                self.health.get_mut(channel).on_open(now);
                Ok(None)
            }
            TransportEvent::Closed => {
                warn!(channel = %channel, "Channel closed, holding last state");
                self.health.get_mut(channel).on_closed();
                Ok(None)
            }
            TransportEvent::Error(e) => {
                warn!(channel = %channel, error = %e, "Channel error, holding last state");
                self.health.get_mut(channel).on_error(e);
                Ok(None)
            }
            TransportEvent::Binary(bytes) => self.handle(channel, Payload::Binary(&bytes), now).map(Some),
            TransportEvent::Text(text) => self.handle(channel, Payload::Text(&text), now).map(Some),
        }
    }

    /// Decode at the boundary, then apply
    pub fn handle(
        &mut self,
        channel: ChannelKind,
        payload: Payload<'_>,
        now: DateTime<Utc>,
    ) -> Result<Applied, DecodeError> {
        let expected = self.state.model.joint_count();
        let result = ChannelMessage::decode(channel, payload, expected).and_then(|msg| self.apply(msg));

        let health = self.health.get_mut(channel);
        match &result {
            Ok(Applied::CameraSkipped) => health.on_skipped(now),
            Ok(_) => health.on_accepted(now),
            Err(e) => {
                warn!(channel = %channel, error = %e, "Rejected message");
                health.on_rejected(e.to_string());
            }
        }
        result
    }

    /// Apply an already validated message
    pub fn apply(&mut self, message: ChannelMessage) -> Result<Applied, DecodeError> {
        let mut writers = self.state.split_mut();
        match message {
            ChannelMessage::Kinematic(frame) => {
                writers.kinematic.apply(&frame)?;
                Ok(Applied::Joints)
            }
            ChannelMessage::Object(records) => {
                let summary = writers.object.reconcile(&records);
                debug!(placed = summary.placed, skipped = summary.skipped, "Objects reconciled");
                Ok(Applied::Objects(summary))
            }
            ChannelMessage::Control(delta) => {
                if writers.control.apply(&delta) {
                    Ok(Applied::Camera)
                } else {
                    debug!("Remote rotation dropped during local drag");
                    Ok(Applied::CameraSkipped)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::health::LinkState;
    use crate::manifest::AssetManifest;
    use proptest::prelude::*;

    fn synchronizer(names: &[&str]) -> SceneSynchronizer<String> {
        let manifest = AssetManifest::new(names.iter().map(|s| s.to_string()).collect());
        let registry = PoseRegistry::from_manifest(&manifest, |_, name| Some(name.to_string()));
        SceneSynchronizer::new(SceneState::new(
            registry,
            ArticulatedModel::panda(),
            CameraRig::default(),
        ))
    }

    fn frame_bytes(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn send_text(sync: &mut SceneSynchronizer<String>, channel: ChannelKind, text: &str) -> Result<Option<Applied>, DecodeError> {
        sync.ingest(channel, TransportEvent::Text(text.to_string()), Utc::now())
    }

    #[test]
    fn test_scenario_manifest_and_snapshot() {
        let mut sync = synchronizer(&["a", "b"]);
        send_text(&mut sync, ChannelKind::Object, r#"[{"id":0,"x":1,"y":0,"z":0,"rot":0}]"#).unwrap();

        let registry = sync.state().registry();
        let a = registry.get(EntityId(0)).unwrap();
        assert_eq!(a.name(), "a");
        assert!(a.is_visible());
        assert_eq!(a.pose().position, [1.0, 0.0, 0.0]);
        assert_eq!(a.pose().rot, 0.0);
        assert!(!registry.get(EntityId(1)).unwrap().is_visible());
    }

    #[test]
    fn test_scenario_seven_zeros() {
        let mut sync = synchronizer(&[]);
        sync.ingest(ChannelKind::Kinematic, TransportEvent::Binary(frame_bytes(&[0.3; 7])), Utc::now())
            .unwrap();
        let applied = sync
            .ingest(ChannelKind::Kinematic, TransportEvent::Binary(frame_bytes(&[0.0; 7])), Utc::now())
            .unwrap();
        assert_eq!(applied, Some(Applied::Joints));
        assert_eq!(sync.state().model().angles(), vec![0.0; 7]);
    }

    #[test]
    fn test_scenario_empty_snapshot_hides_all() {
        let mut sync = synchronizer(&["a", "b", "c"]);
        send_text(
            &mut sync,
            ChannelKind::Object,
            r#"[{"id":0,"x":1,"y":0,"z":0,"rot":0},{"id":2,"x":0,"y":1,"z":0,"rot":1}]"#,
        )
        .unwrap();
        assert_eq!(sync.state().registry().visible_count(), 2);

        send_text(&mut sync, ChannelKind::Object, "[]").unwrap();
        assert_eq!(sync.state().registry().visible_count(), 0);
    }

    #[test]
    fn test_scenario_omitted_id_goes_invisible() {
        let mut sync = synchronizer(&["a", "b"]);
        send_text(
            &mut sync,
            ChannelKind::Object,
            r#"[{"id":0,"x":1,"y":0,"z":0,"rot":0},{"id":1,"x":2,"y":0,"z":0,"rot":0}]"#,
        )
        .unwrap();
        send_text(&mut sync, ChannelKind::Object, r#"[{"id":1,"x":3,"y":0,"z":0,"rot":0}]"#).unwrap();

        let registry = sync.state().registry();
        assert!(!registry.get(EntityId(0)).unwrap().is_visible());
        let b = registry.get(EntityId(1)).unwrap();
        assert!(b.is_visible());
        assert_eq!(b.pose().position[0], 3.0);
    }

    #[test]
    fn test_slot_replaced_per_object_update() {
        let mut sync = synchronizer(&["a"]);
        let first = sync.state().slot();
        send_text(&mut sync, ChannelKind::Object, "[]").unwrap();
        let second = sync.state().slot();
        send_text(&mut sync, ChannelKind::Object, "[]").unwrap();
        assert_ne!(first, second);
        assert_ne!(second, sync.state().slot());

        // other channels leave the slot alone
        send_text(&mut sync, ChannelKind::Control, r#"{"rotate_left":1,"rotate_up":1}"#).unwrap();
        assert_eq!(sync.state().slot(), SlotMarker(2));
    }

    #[test]
    fn test_rejected_messages_leave_state_and_count() {
        let mut sync = synchronizer(&["a"]);
        send_text(&mut sync, ChannelKind::Object, r#"[{"id":0,"x":1,"y":0,"z":0,"rot":0}]"#).unwrap();

        assert!(send_text(&mut sync, ChannelKind::Object, "{not json").is_err());
        assert!(sync.state().registry().get(EntityId(0)).unwrap().is_visible());
        assert_eq!(sync.state().slot(), SlotMarker(1));

        let health = sync.health().get(ChannelKind::Object);
        assert_eq!(health.accepted, 1);
        assert_eq!(health.rejected, 1);
        assert!(health.last_error.is_some());
    }

    #[test]
    fn test_control_message_rotates_camera() {
        let mut sync = synchronizer(&[]);
        let (azimuth, elevation) = sync.state().camera().orientation();
        send_text(&mut sync, ChannelKind::Control, r#"{"rotate_left":20,"rotate_up":10}"#).unwrap();

        let (new_azimuth, new_elevation) = sync.state().camera().orientation();
        assert!((new_azimuth - (azimuth + 0.1)).abs() < 1e-6);
        assert!((new_elevation - (elevation - 0.05)).abs() < 1e-6);
        assert!(!sync.state().camera().controller.is_dragging());
    }

    #[test]
    fn test_link_events_tracked_without_touching_scene() {
        let mut sync = synchronizer(&["a"]);
        let now = Utc::now();
        assert_eq!(sync.ingest(ChannelKind::Kinematic, TransportEvent::Open, now), Ok(None));
        sync.ingest(ChannelKind::Kinematic, TransportEvent::Binary(frame_bytes(&[0.25; 7])), now)
            .unwrap();
        sync.ingest(ChannelKind::Kinematic, TransportEvent::Closed, now).unwrap();
        sync.ingest(ChannelKind::Object, TransportEvent::Error("reset".into()), now).unwrap();

        assert_eq!(sync.health().get(ChannelKind::Kinematic).state, LinkState::Closed);
        assert_eq!(sync.health().get(ChannelKind::Object).state, LinkState::Errored);
        assert_eq!(sync.health().get(ChannelKind::Control).state, LinkState::Connecting);
        // frozen at last good state
        assert_eq!(sync.state().model().angles(), vec![0.25; 7]);
    }

    #[test]
    fn test_local_pointer_through_control_writer() {
        let mut state = synchronizer(&[]).state().clone();
        let before = state.camera().orientation();
        let mut writers = state.split_mut();
        writers.control.pointer(PointerEvent::Down { pointer: 0, x: 10.0, y: 10.0 });
        writers.control.pointer(PointerEvent::Move { pointer: 0, x: 30.0, y: 10.0 });
        writers.control.pointer(PointerEvent::Up { pointer: 0 });
        assert_ne!(state.camera().orientation(), before);
    }

    #[test]
    fn test_remote_rotation_during_local_drag_is_skipped() {
        let mut sync = synchronizer(&[]);
        let delta = r#"{"rotate_left":20,"rotate_up":10}"#;
        sync.state_mut()
            .split_mut()
            .control
            .pointer(PointerEvent::Down { pointer: 0, x: 5.0, y: 5.0 });
        let before = sync.state().camera().orientation();

        assert_eq!(
            send_text(&mut sync, ChannelKind::Control, delta),
            Ok(Some(Applied::CameraSkipped))
        );
        assert_eq!(sync.state().camera().orientation(), before);
        let health = sync.health().get(ChannelKind::Control);
        assert_eq!((health.accepted, health.skipped), (0, 1));
        assert!(health.last_message_at.is_some());

        sync.state_mut()
            .split_mut()
            .control
            .pointer(PointerEvent::Up { pointer: 0 });
        assert_eq!(
            send_text(&mut sync, ChannelKind::Control, delta),
            Ok(Some(Applied::Camera))
        );
        assert_eq!(sync.health().get(ChannelKind::Control).accepted, 1);
    }

    proptest! {
        #[test]
        fn valid_frames_apply_exactly(values in proptest::collection::vec(-10.0f64..10.0, 7)) {
            let mut sync = synchronizer(&[]);
            sync.ingest(ChannelKind::Kinematic, TransportEvent::Binary(frame_bytes(&values)), Utc::now()).unwrap();
            prop_assert_eq!(sync.state().model().angles(), values);
        }

        #[test]
        fn invalid_frames_leave_model_unchanged(len in 0usize..128) {
            prop_assume!(len != 56);
            let mut sync = synchronizer(&[]);
            sync.ingest(ChannelKind::Kinematic, TransportEvent::Binary(frame_bytes(&[1.5; 7])), Utc::now()).unwrap();

            let result = sync.ingest(ChannelKind::Kinematic, TransportEvent::Binary(vec![0x3f; len]), Utc::now());
            prop_assert!(result.is_err());
            prop_assert_eq!(sync.state().model().angles(), vec![1.5; 7]);
        }

        #[test]
        fn reconciliation_matches_snapshot(
            records in proptest::collection::vec((0i64..8, -2.0f64..2.0, -3.2f64..3.2), 0..8)
        ) {
            let mut sync = synchronizer(&["a", "b", "c", "d", "e"]);
            let snapshot: Vec<ObjectRecord> = records
                .iter()
                .map(|&(id, x, rot)| ObjectRecord { id, x, y: 0.1, z: 0.0, rot })
                .collect();
            sync.apply(ChannelMessage::Object(snapshot.clone())).unwrap();

            for entity in sync.state().registry().iter() {
                match snapshot.iter().rev().find(|r| r.id == entity.id().0) {
                    Some(r) => {
                        prop_assert!(entity.is_visible());
                        prop_assert_eq!(entity.pose().position, [r.x, r.y, r.z]);
                        prop_assert_eq!(entity.pose().rot, r.rot);
                    }
                    None => prop_assert!(!entity.is_visible()),
                }
            }
        }

        #[test]
        fn reconciliation_is_idempotent(
            records in proptest::collection::vec((0i64..8, -2.0f64..2.0, -3.2f64..3.2), 0..8)
        ) {
            let snapshot: Vec<ObjectRecord> = records
                .iter()
                .map(|&(id, x, rot)| ObjectRecord { id, x, y: 0.0, z: 0.2, rot })
                .collect();
            let mut sync = synchronizer(&["a", "b", "c", "d", "e"]);

            sync.apply(ChannelMessage::Object(snapshot.clone())).unwrap();
            let once: Vec<_> = (0..5)
                .map(|i| {
                    let e = sync.state().registry().get(EntityId(i)).unwrap();
                    (e.is_visible(), e.pose())
                })
                .collect();

            sync.apply(ChannelMessage::Object(snapshot)).unwrap();
            let twice: Vec<_> = (0..5)
                .map(|i| {
                    let e = sync.state().registry().get(EntityId(i)).unwrap();
                    (e.is_visible(), e.pose())
                })
                .collect();
            prop_assert_eq!(once, twice);
        }
    }
}
