//! Tracked workspace objects

use serde::{Deserialize, Serialize};

use crate::wire::ObjectRecord;

/// Stable identity of a tracked object (its index in the asset manifest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position plus planar rotation (radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f64; 3],
    pub rot: f64,
}

impl From<&ObjectRecord> for Pose {
    fn from(record: &ObjectRecord) -> Self {
        Self {
            position: [record.x, record.y, record.z],
            rot: record.rot,
        }
    }
}

/// A tracked object and its persistent renderable handle
///
/// The handle is created once at bootstrap and reused for the whole session;
/// only the pose and visibility change afterwards.
#[derive(Debug, Clone)]
pub struct Entity<H> {
    id: EntityId,
    name: String,
    handle: H,
    pose: Pose,
    visible: bool,
}

impl<H> Entity<H> {
    /// New entities start hidden at the origin
    pub fn new(id: EntityId, name: impl Into<String>, handle: H) -> Self {
        Self {
            id,
            name: name.into(),
            handle,
            pose: Pose::default(),
            visible: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Asset folder name from the manifest
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub(crate) fn place(&mut self, pose: Pose) {
        self.pose = pose;
        self.visible = true;
    }

    pub(crate) fn hide(&mut self) {
        self.visible = false;
    }
}
