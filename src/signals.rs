//! Signal extraction
//!
//! Pure functions that turn one frame's landmark meshes into the scalar
//! signals the condition monitor consumes:
//! - Head-turn ratio (nose position between the face edges)
//! - Eye aspect ratio per eye, averaged into the drowsiness signal
//! - Face count

use crate::config::LandmarkIndices;
use crate::error::ProctorError;
use crate::types::{FrameResult, Landmark, LandmarkSet};

/// Normalized horizontal nose position: |nose - left| / |right - left|
///
/// Coincident edge points produce a non-finite ratio, which never satisfies
/// a looking-away predicate.
pub fn head_turn_ratio(
    landmarks: &LandmarkSet,
    indices: &LandmarkIndices,
) -> Result<f64, ProctorError> {
    let nose = landmarks.point(indices.nose_tip)?;
    let left = landmarks.point(indices.left_edge)?;
    let right = landmarks.point(indices.right_edge)?;

    Ok((nose.x - left.x).abs() / (right.x - left.x).abs())
}

/// EAR = (|p1 - p5| + |p2 - p4|) / (2 |p0 - p3|)
pub fn eye_aspect_ratio(eye: &[Landmark; 6]) -> f64 {
    let vertical = eye[1].distance_2d(&eye[5]) + eye[2].distance_2d(&eye[4]);
    let horizontal = eye[0].distance_2d(&eye[3]);
    vertical / (2.0 * horizontal)
}

/// Mean of the left and right EAR
pub fn average_ear(
    landmarks: &LandmarkSet,
    indices: &LandmarkIndices,
) -> Result<f64, ProctorError> {
    let left = eye_aspect_ratio(&landmarks.eye(&indices.left_eye)?);
    let right = eye_aspect_ratio(&landmarks.eye(&indices.right_eye)?);
    Ok((left + right) / 2.0)
}

pub fn face_count(frame: &FrameResult) -> usize {
    frame.faces.len()
}

/// Gaze and eye signals of the primary face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceSignals {
    pub head_turn_ratio: f64,
    pub average_ear: f64,
}

/// Everything derived from one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSignals {
    pub face_count: usize,
    /// Signals of the first face, absent when no face was tracked
    pub primary: Option<FaceSignals>,
}

/// Extracts frame signals against a fixed landmark index contract
#[derive(Debug, Clone, Default)]
pub struct SignalExtractor {
    indices: LandmarkIndices,
}

impl SignalExtractor {
    pub fn new(indices: LandmarkIndices) -> Self {
        Self { indices }
    }

    /// Derive signals for one frame.
    ///
    /// Face-less frames never touch the landmark functions. A primary mesh
    /// that is too short for the index contract is an error; the caller
    /// decides whether to skip the frame's gaze evaluation.
    pub fn extract(&self, frame: &FrameResult) -> Result<FrameSignals, ProctorError> {
        let face_count = face_count(frame);

        let primary = match frame.faces.first() {
            Some(face) => Some(FaceSignals {
                head_turn_ratio: head_turn_ratio(face, &self.indices)?,
                average_ear: average_ear(face, &self.indices)?,
            }),
            None => None,
        };

        Ok(FrameSignals {
            face_count,
            primary,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{face, frame};
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_head_turn_ratio_centered() {
        let indices = LandmarkIndices::default();
        let ratio = head_turn_ratio(&face(0.5, 0.3), &indices).unwrap();
        assert!((ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_head_turn_ratio_exact_boundaries() {
        let indices = LandmarkIndices::default();
        assert_eq!(head_turn_ratio(&face(0.3, 0.3), &indices).unwrap(), 0.3);
        assert_eq!(head_turn_ratio(&face(0.7, 0.3), &indices).unwrap(), 0.7);
    }

    #[test]
    fn test_head_turn_ratio_degenerate_edges() {
        let indices = LandmarkIndices::default();
        let mut points = face(0.5, 0.3).points().to_vec();
        points[indices.right_edge] = points[indices.left_edge];
        let ratio = head_turn_ratio(&LandmarkSet::new(points), &indices).unwrap();
        assert!(!ratio.is_finite());
    }

    #[test]
    fn test_eye_aspect_ratio() {
        let eye = [
            Landmark::new(0.0, 0.0),
            Landmark::new(1.0, -1.0),
            Landmark::new(3.0, -1.0),
            Landmark::new(4.0, 0.0),
            Landmark::new(3.0, 1.0),
            Landmark::new(1.0, 1.0),
        ];
        // (2 + 2) / (2 * 4)
        assert!((eye_aspect_ratio(&eye) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_average_ear_from_fixture() {
        let indices = LandmarkIndices::default();
        let ear = average_ear(&face(0.5, 0.25), &indices).unwrap();
        assert!((ear - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_extract_without_faces() {
        let signals = SignalExtractor::default().extract(&frame(vec![])).unwrap();
        assert_eq!(signals.face_count, 0);
        assert!(signals.primary.is_none());
    }

    #[test]
    fn test_extract_uses_first_face() {
        let signals = SignalExtractor::default()
            .extract(&frame(vec![face(0.1, 0.3), face(0.5, 0.1)]))
            .unwrap();

        assert_eq!(signals.face_count, 2);
        let primary = signals.primary.unwrap();
        assert!((primary.head_turn_ratio - 0.1).abs() < 1e-12);
        assert!((primary.average_ear - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_extract_short_mesh_errors() {
        let short = LandmarkSet::new(vec![Landmark::new(0.5, 0.5); 100]);
        let result = SignalExtractor::default().extract(&frame(vec![short]));
        assert!(matches!(result, Err(ProctorError::MissingLandmark { .. })));
    }

    fn mirrored(set: &LandmarkSet, indices: &LandmarkIndices) -> LandmarkSet {
        let mut points: Vec<Landmark> = set
            .points()
            .iter()
            .map(|p| Landmark { x: 1.0 - p.x, ..*p })
            .collect();
        points.swap(indices.left_edge, indices.right_edge);
        LandmarkSet::new(points)
    }

    proptest! {
        #[test]
        fn test_head_turn_ratio_mirror_symmetry(
            left in 0.0f64..0.4,
            right in 0.6f64..1.0,
            t in 0.0f64..=1.0,
        ) {
            let indices = LandmarkIndices::default();
            let mut points = face(0.5, 0.3).points().to_vec();
            points[indices.left_edge] = Landmark::new(left, 0.5);
            points[indices.right_edge] = Landmark::new(right, 0.5);
            points[indices.nose_tip] = Landmark::new(left + t * (right - left), 0.5);
            let set = LandmarkSet::new(points);

            let ratio = head_turn_ratio(&set, &indices).unwrap();
            let mirror = head_turn_ratio(&mirrored(&set, &indices), &indices).unwrap();

            prop_assert!((ratio + mirror - 1.0).abs() < 1e-9);
            let away = |r: f64| r < 0.3 || r > 0.7;
            if (ratio - 0.3).abs() > 1e-9 && (ratio - 0.7).abs() > 1e-9 {
                prop_assert_eq!(away(ratio), away(mirror));
            }
        }
    }
}
