//! Articulated robot model driven by the kinematic channel

use serde::{Deserialize, Serialize};

use crate::wire::{DecodeError, JointFrame};

/// Joint order of the reference robot's kinematic frames
pub const PANDA_JOINTS: [&str; 7] = [
    "panda_joint1",
    "panda_joint2",
    "panda_joint3",
    "panda_joint4",
    "panda_joint5",
    "panda_joint6",
    "panda_joint7",
];

/// A revolute joint and its current angle in radians
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub angle: f64,
}

/// Joint structure is fixed at load time; only angles change
#[derive(Debug, Clone, PartialEq)]
pub struct ArticulatedModel {
    joints: Vec<Joint>,
}

impl ArticulatedModel {
    /// Create a model with the given joints, all at zero
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            joints: names
                .into_iter()
                .map(|name| Joint {
                    name: name.into(),
                    angle: 0.0,
                })
                .collect(),
        }
    }

    pub fn panda() -> Self {
        Self::new(PANDA_JOINTS)
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn angle(&self, name: &str) -> Option<f64> {
        self.joints.iter().find(|j| j.name == name).map(|j| j.angle)
    }

    pub fn angles(&self) -> Vec<f64> {
        self.joints.iter().map(|j| j.angle).collect()
    }

    /// Set every joint from `frame`, positionally.
    ///
    /// A frame of the wrong size is rejected and nothing is written.
    pub(crate) fn apply(&mut self, frame: &JointFrame) -> Result<(), DecodeError> {
        if frame.len() != self.joints.len() {
            return Err(DecodeError::JointCount {
                expected: self.joints.len(),
                actual: frame.len(),
            });
        }
        for (joint, angle) in self.joints.iter_mut().zip(frame.angles()) {
            joint.angle = *angle;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panda_joint_names() {
        let model = ArticulatedModel::panda();
        assert_eq!(model.joint_count(), 7);
        assert_eq!(model.joints()[0].name, "panda_joint1");
        assert_eq!(model.angle("panda_joint7"), Some(0.0));
        assert_eq!(model.angle("panda_finger_joint1"), None);
    }

    #[test]
    fn test_apply_is_positional() {
        use std::f64::consts::PI;
        let mut model = ArticulatedModel::panda();
        let ready = [0., -PI / 4., 0., -3. * PI / 4., 0., PI / 2., PI / 4.];
        model.apply(&JointFrame::new(ready.to_vec())).unwrap();
        assert_eq!(model.angles(), ready.to_vec());
        assert_eq!(model.angle("panda_joint4"), Some(-3. * PI / 4.));
    }

    #[test]
    fn test_apply_wrong_size_is_all_or_nothing() {
        let mut model = ArticulatedModel::panda();
        model.apply(&JointFrame::new(vec![0.5; 7])).unwrap();

        let err = model.apply(&JointFrame::new(vec![1.0; 6])).unwrap_err();
        assert_eq!(err, DecodeError::JointCount { expected: 7, actual: 6 });
        assert_eq!(model.angles(), vec![0.5; 7]);
    }
}
