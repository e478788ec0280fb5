//! Immediate (non-debounced) event rules
//!
//! - Multiple faces: one event on every frame with more than one face
//! - Suspicious objects: one event per qualifying detection box

use std::collections::HashSet;

use crate::config::MonitorConfig;
use crate::types::{DetectionBox, EventKind, FrameResult};

/// An event the filter wants emitted, before it is stamped with a candidate and time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Immediate {
    pub kind: EventKind,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImmediateFilter {
    suspicious_labels: HashSet<String>,
    min_confidence: f64,
}

impl ImmediateFilter {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            suspicious_labels: config.suspicious_labels.iter().cloned().collect(),
            min_confidence: config.min_object_confidence,
        }
    }

    pub fn is_suspicious(&self, detection: &DetectionBox) -> bool {
        detection.confidence > self.min_confidence
            && self.suspicious_labels.contains(&detection.label)
    }

    /// Evaluate one frame. Multiple-faces comes first, then detections in
    /// detector order.
    pub fn evaluate(&self, frame: &FrameResult) -> Vec<Immediate> {
        let mut events = Vec::new();

        if frame.faces.len() > 1 {
            events.push(Immediate {
                kind: EventKind::MultipleFaces,
                detail: None,
            });
        }

        events.extend(
            frame
                .detections
                .iter()
                .filter(|detection| self.is_suspicious(detection))
                .map(|detection| Immediate {
                    kind: EventKind::SuspiciousItem,
                    detail: Some(detection.label.clone()),
                }),
        );

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LandmarkSet;
    use pretty_assertions::assert_eq;

    fn filter() -> ImmediateFilter {
        ImmediateFilter::new(&MonitorConfig::default())
    }

    fn frame(faces: usize, detections: Vec<DetectionBox>) -> FrameResult {
        FrameResult {
            timestamp: None,
            faces: vec![LandmarkSet::default(); faces],
            detections,
        }
    }

    #[test]
    fn test_multiple_faces_every_frame() {
        let filter = filter();
        for _ in 0..3 {
            let events = filter.evaluate(&frame(2, vec![]));
            assert_eq!(
                events,
                vec![Immediate {
                    kind: EventKind::MultipleFaces,
                    detail: None
                }]
            );
        }
        assert!(filter.evaluate(&frame(1, vec![])).is_empty());
        assert!(filter.evaluate(&frame(0, vec![])).is_empty());
    }

    #[test]
    fn test_suspicious_objects() {
        let events = filter().evaluate(&frame(
            1,
            vec![
                DetectionBox::new("cell phone", 0.91),
                DetectionBox::new("person", 0.99),
                DetectionBox::new("book", 0.6),
                DetectionBox::new("laptop", 0.61),
                DetectionBox::new("book", 0.7),
            ],
        ));

        let details: Vec<_> = events.iter().map(|e| e.detail.as_deref()).collect();
        assert_eq!(details, vec![Some("cell phone"), Some("laptop"), Some("book")]);
        assert!(events.iter().all(|e| e.kind == EventKind::SuspiciousItem));
    }

    #[test]
    fn test_multiple_faces_precede_objects() {
        let events = filter().evaluate(&frame(3, vec![DetectionBox::new("book", 0.8)]));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::MultipleFaces);
        assert_eq!(events[1].kind, EventKind::SuspiciousItem);
    }

    #[test]
    fn test_custom_label_list() {
        let config = MonitorConfig {
            suspicious_labels: vec!["tablet".to_string()],
            min_object_confidence: 0.3,
            ..MonitorConfig::default()
        };
        let filter = ImmediateFilter::new(&config);

        assert!(filter.is_suspicious(&DetectionBox::new("tablet", 0.4)));
        assert!(!filter.is_suspicious(&DetectionBox::new("cell phone", 0.9)));
    }
}
