//! Fiducial marker positions seen by the desk camera
//!
//! A detector reports each marker as four image corners. The daemon keeps
//! the positions derived from the newest detection and serves them to
//! producers that need to know where markers sit on the desk.

use serde::{Deserialize, Serialize};

/// One detected marker, corners in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArucoDetection {
    pub id: i32,
    /// Left top, right top, right bottom, left bottom
    pub corners: [[f32; 2]; 4],
}

/// Marker center, heading and side length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArucoPosition {
    pub id: i32,
    pub x: f32,
    pub y: f32,
    /// Radians, direction of the top edge
    pub rot: f32,
    /// Mean edge length
    pub size: f32,
}

impl From<&ArucoDetection> for ArucoPosition {
    fn from(detection: &ArucoDetection) -> Self {
        let [x, y, rot, size] = corners_to_position(&detection.corners);
        Self {
            id: detection.id,
            x,
            y,
            rot,
            size,
        }
    }
}

fn corners_to_position(corners: &[[f32; 2]; 4]) -> [f32; 4] {
    let (sum_x, sum_y) = corners
        .iter()
        .fold((0.0, 0.0), |(x, y), c| (x + c[0], y + c[1]));

    let [left_top, right_top, ..] = corners;
    let rot = (right_top[1] - left_top[1]).atan2(right_top[0] - left_top[0]);

    let perimeter: f32 = (0..4)
        .map(|i| {
            let (a, b) = (corners[i], corners[(i + 1) % 4]);
            (a[0] - b[0]).hypot(a[1] - b[1])
        })
        .sum();

    [sum_x / 4.0, sum_y / 4.0, rot, perimeter / 4.0]
}

/// Positions for a whole detection pass, in detector order
pub fn from_corners_to_position(detections: &[ArucoDetection]) -> Vec<ArucoPosition> {
    detections.iter().map(ArucoPosition::from).collect()
}

/// `POST /api/arucos`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArucoDetections {
    pub arucos: Vec<ArucoDetection>,
}

/// `GET /api/arucos`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArucoPositions {
    pub arucos: Vec<ArucoPosition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn square(id: i32, corners: [[f32; 2]; 4]) -> ArucoDetection {
        ArucoDetection { id, corners }
    }

    #[test]
    fn test_axis_aligned_marker() {
        let detection = square(3, [[10.0, 20.0], [30.0, 20.0], [30.0, 40.0], [10.0, 40.0]]);
        let position = ArucoPosition::from(&detection);
        assert_eq!(position.id, 3);
        assert_eq!((position.x, position.y), (20.0, 30.0));
        assert_eq!(position.rot, 0.0);
        assert_eq!(position.size, 20.0);
    }

    #[test]
    fn test_rotation_follows_top_edge() {
        // Top edge pointing down the image (+y)
        let detection = square(0, [[0.0, 0.0], [0.0, 10.0], [-10.0, 10.0], [-10.0, 0.0]]);
        let position = ArucoPosition::from(&detection);
        assert!((position.rot - FRAC_PI_2).abs() < 1e-6);
        assert_eq!((position.x, position.y), (-5.0, 5.0));
        assert_eq!(position.size, 10.0);
    }

    #[test]
    fn test_size_is_mean_edge_length() {
        // Edges 4, 3, 4, 3
        let detection = square(1, [[0.0, 0.0], [4.0, 0.0], [4.0, 3.0], [0.0, 3.0]]);
        assert_eq!(ArucoPosition::from(&detection).size, 3.5);
    }

    #[test]
    fn test_pass_keeps_detector_order() {
        let detections = [
            square(7, [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]),
            square(2, [[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 6.0]]),
        ];
        let ids: Vec<i32> = from_corners_to_position(&detections)
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![7, 2]);
        assert!(from_corners_to_position(&[]).is_empty());
    }

    #[test]
    fn test_detection_json_shape() {
        let body: ArucoDetections = serde_json::from_str(
            r#"{"arucos":[{"id":4,"corners":[[0,0],[2,0],[2,2],[0,2]]}]}"#,
        )
        .unwrap();
        assert_eq!(body.arucos[0].id, 4);
        assert_eq!(body.arucos[0].corners[2], [2.0, 2.0]);
    }
}
