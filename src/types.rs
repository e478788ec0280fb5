//! Core types for the proctoring pipeline
//!
//! This module defines the data structures that flow through each stage:
//! perception input (landmarks, detections), integrity events, and the
//! persisted log entries consumed by scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProctorError;

/// A single tracked point in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    /// Depth estimate; unused by the 2D signals
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Euclidean distance in the 2D projection
    pub fn distance_2d(&self, other: &Landmark) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One face's landmark mesh, addressed by the tracker's fixed index contract
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Look up a contract index, failing when the mesh is too short
    pub fn point(&self, index: usize) -> Result<&Landmark, ProctorError> {
        self.points.get(index).ok_or(ProctorError::MissingLandmark {
            index,
            len: self.points.len(),
        })
    }

    /// Collect the six contour points of one eye in contract order
    pub fn eye(&self, indices: &[usize; 6]) -> Result<[Landmark; 6], ProctorError> {
        let mut eye = [Landmark::default(); 6];
        for (slot, &index) in eye.iter_mut().zip(indices.iter()) {
            *slot = *self.point(index)?;
        }
        Ok(eye)
    }
}

/// Object detector output for one box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    /// Class label (e.g. "cell phone")
    pub label: String,
    /// Detector confidence (0-1)
    pub confidence: f64,
    /// [x, y, width, height]; carried through but never scored
    #[serde(default)]
    pub bbox: [f64; 4],
}

impl DetectionBox {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: [0.0; 4],
        }
    }
}

/// Everything the perception collaborators produced for one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameResult {
    /// Capture time; required for replay, ignored for live sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Zero or more face meshes
    #[serde(default)]
    pub faces: Vec<LandmarkSet>,
    /// Object detections
    #[serde(default)]
    pub detections: Vec<DetectionBox>,
}

/// Integrity event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NoFace,
    LookingAway,
    Drowsiness,
    MultipleFaces,
    SuspiciousItem,
}

impl EventKind {
    /// The persisted event type string
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NoFace => "No Face Detected",
            EventKind::LookingAway => "User Looking Away",
            EventKind::Drowsiness => "Drowsiness Detected",
            EventKind::MultipleFaces => "Multiple Faces Detected",
            EventKind::SuspiciousItem => "Suspicious Item Detected",
        }
    }
}

/// An immutable integrity event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub candidate_id: String,
    pub kind: EventKind,
    /// Extra context, e.g. the detected object label
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(candidate_id: &str, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            kind,
            detail: None,
            timestamp,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Event string as handed to persistence, e.g. "Suspicious Item Detected: book"
    pub fn message(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {}", self.kind.as_str(), detail),
            None => self.kind.as_str().to_string(),
        }
    }
}

/// A persisted event as returned by the event store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(alias = "_id")]
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: String,
}

/// Entry in the bounded "recent alerts" view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub event: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_message_with_detail() {
        let event = Event::new("ada", EventKind::SuspiciousItem, Utc::now()).with_detail("book");
        assert_eq!(event.message(), "Suspicious Item Detected: book");

        let plain = Event::new("ada", EventKind::NoFace, Utc::now());
        assert_eq!(plain.message(), "No Face Detected");
    }

    #[test]
    fn test_missing_landmark() {
        let set = LandmarkSet::new(vec![Landmark::new(0.1, 0.2); 10]);
        assert!(set.point(9).is_ok());
        match set.point(234) {
            Err(ProctorError::MissingLandmark { index, len }) => {
                assert_eq!(index, 234);
                assert_eq!(len, 10);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_frame_result_parses_sparse_json() {
        let frame: FrameResult = serde_json::from_str(
            r#"{"detections": [{"label": "book", "confidence": 0.9}]}"#,
        )
        .unwrap();

        assert!(frame.timestamp.is_none());
        assert!(frame.faces.is_empty());
        assert_eq!(frame.detections[0].label, "book");
        assert_eq!(frame.detections[0].bbox, [0.0; 4]);
    }

    #[test]
    fn test_log_entry_accepts_mongo_id() {
        let entry: LogEntry = serde_json::from_str(
            r#"{"_id": "abc", "timestamp": "2024-01-15T14:00:00Z", "event": "No Face Detected"}"#,
        )
        .unwrap();
        assert_eq!(entry.id, "abc");
    }
}
