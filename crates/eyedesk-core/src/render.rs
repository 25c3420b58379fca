//! Render loop: one read-only draw of the current scene per display frame

use crate::camera::CameraRig;
use crate::kinematics::ArticulatedModel;
use crate::registry::PoseRegistry;
use crate::sync::{SceneState, SlotMarker};

/// Borrowed, read-only snapshot of the scene for one draw
pub struct SceneView<'a, H> {
    pub registry: &'a PoseRegistry<H>,
    pub model: &'a ArticulatedModel,
    pub camera: &'a CameraRig,
    pub slot: SlotMarker,
}

/// Something that can draw a scene view (a GPU renderer, a test recorder)
pub trait FrameSink<H> {
    fn draw(&mut self, view: &SceneView<'_, H>);
}

/// Samples the scene once per frame, whether or not any update arrived.
///
/// The host's frame scheduler re-invokes [`RenderLoop::frame`] before every
/// display refresh; the loop itself never consults a channel.
#[derive(Debug, Default)]
pub struct RenderLoop {
    frames: u64,
    last_slot: Option<SlotMarker>,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame<H, S>(&mut self, state: &SceneState<H>, sink: &mut S)
    where
        S: FrameSink<H> + ?Sized,
    {
        let view = state.view();
        sink.draw(&view);
        self.frames += 1;
        self.last_slot = Some(view.slot);
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }

    /// Slot generation seen by the most recent frame
    pub fn last_slot(&self) -> Option<SlotMarker> {
        self.last_slot
    }
}
