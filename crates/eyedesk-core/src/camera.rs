//! Camera rig and orbit navigation
//!
//! The orbit controller only understands pointer gestures. Remote control
//! goes through [`RelativeRotation`], which replays a synthetic drag on the
//! same input path a local mouse uses, so both are handled identically.

use glam::Vec3;

use crate::viewport::Viewport;

/// Pointer id used for synthesized drags
pub const SYNTHETIC_POINTER: u32 = 1;

const ELEVATION_LIMIT: f32 = 1.5;
const MIN_DISTANCE: f32 = 0.05;
const MAX_DISTANCE: f32 = 10.0;

/// Pointer input in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { pointer: u32, x: f32, y: f32 },
    Move { pointer: u32, x: f32, y: f32 },
    Up { pointer: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Dragging { pointer: u32, last: [f32; 2] },
}

/// Orbit controller settings and drag gesture state (Y up)
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitController {
    pub distance: f32,
    pub target_distance: f32,
    pub azimuth: f32,
    pub elevation: f32,
    pub target: Vec3,
    pub target_focus: Vec3,
    /// Radians per pointer unit
    pub sensitivity: f32,
    pub zoom_speed: f32,
    pub smooth_factor: f32,
    drag: DragState,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self::looking_at(Vec3::new(0.5, 1.5, 1.5), Vec3::new(0.5, 0.0, 0.0))
    }
}

impl OrbitController {
    /// Controller orbiting `target` from `eye`
    pub fn looking_at(eye: Vec3, target: Vec3) -> Self {
        let offset = eye - target;
        let distance = offset.length().max(MIN_DISTANCE);
        let elevation = (offset.y / distance).clamp(-1.0, 1.0).asin();
        let azimuth = offset.x.atan2(offset.z);

        Self {
            distance,
            target_distance: distance,
            azimuth,
            elevation: elevation.clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT),
            target,
            target_focus: target,
            sensitivity: 0.005,
            zoom_speed: 0.1,
            smooth_factor: 0.15,
            drag: DragState::Idle,
        }
    }

    /// Feed one pointer event through the drag state machine.
    ///
    /// Only a single drag is tracked; events from other pointers are ignored
    /// while it lasts.
    pub fn pointer(&mut self, event: PointerEvent) {
        match (self.drag, event) {
            (DragState::Idle, PointerEvent::Down { pointer, x, y }) => {
                self.drag = DragState::Dragging {
                    pointer,
                    last: [x, y],
                };
            }
            (DragState::Dragging { pointer, last }, PointerEvent::Move { pointer: p, x, y })
                if p == pointer =>
            {
                self.rotate(x - last[0], y - last[1]);
                self.drag = DragState::Dragging {
                    pointer,
                    last: [x, y],
                };
            }
            (DragState::Dragging { pointer, .. }, PointerEvent::Up { pointer: p }) if p == pointer => {
                self.drag = DragState::Idle;
            }
            _ => {}
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    fn rotate(&mut self, dx: f32, dy: f32) {
        self.azimuth -= dx * self.sensitivity;
        self.elevation = (self.elevation + dy * self.sensitivity).clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
    }

    /// Scroll zoom; positive `scroll` moves closer
    pub fn zoom(&mut self, scroll: f32) {
        let zoom_factor = 1.0 - scroll * self.zoom_speed * 0.3;
        self.target_distance = (self.target_distance * zoom_factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    /// Ease distance and focus toward their targets
    pub fn update(&mut self, dt: f32) {
        let lerp_factor = 1.0 - (-self.smooth_factor * 60.0 * dt).exp();
        self.distance += (self.target_distance - self.distance) * lerp_factor;
        self.target += (self.target_focus - self.target) * lerp_factor;
    }

    pub fn eye(&self) -> Vec3 {
        let horizontal = self.distance * self.elevation.cos();
        self.target
            + Vec3::new(
                horizontal * self.azimuth.sin(),
                self.distance * self.elevation.sin(),
                horizontal * self.azimuth.cos(),
            )
    }
}

/// Perspective projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y_degrees: 50.0,
            aspect: 16.0 / 9.0,
            near: 0.001,
            far: 100.0,
        }
    }
}

/// "Rotate the camera by a relative amount" capability
pub trait RelativeRotation {
    fn apply_relative_rotation(&mut self, rotate_left: f32, rotate_up: f32);
}

/// Viewpoint plus orbit controller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraRig {
    pub controller: OrbitController,
    pub projection: Projection,
}

impl CameraRig {
    pub fn new(controller: OrbitController, projection: Projection) -> Self {
        Self {
            controller,
            projection,
        }
    }

    /// Local pointer input
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        self.controller.pointer(event);
    }

    pub fn resize(&mut self, viewport: &Viewport) {
        self.projection.aspect = viewport.aspect();
    }

    pub fn eye(&self) -> Vec3 {
        self.controller.eye()
    }

    pub fn target(&self) -> Vec3 {
        self.controller.target
    }

    /// (azimuth, elevation) in radians
    pub fn orientation(&self) -> (f32, f32) {
        (self.controller.azimuth, self.controller.elevation)
    }
}

impl RelativeRotation for CameraRig {
    /// Press at the origin, move by the negated delta, release.
    fn apply_relative_rotation(&mut self, rotate_left: f32, rotate_up: f32) {
        self.handle_pointer(PointerEvent::Down {
            pointer: SYNTHETIC_POINTER,
            x: 0.0,
            y: 0.0,
        });
        self.handle_pointer(PointerEvent::Move {
            pointer: SYNTHETIC_POINTER,
            x: -rotate_left,
            y: -rotate_up,
        });
        self.handle_pointer(PointerEvent::Up {
            pointer: SYNTHETIC_POINTER,
        });
    }
}
