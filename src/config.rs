//! Monitor and scoring configuration
//!
//! Both configurations are immutable values handed to the components that use
//! them. Defaults reproduce the production thresholds; JSON files may override
//! any subset of fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProctorError;
use crate::types::EventKind;

/// Longest accepted debounce delay (one day)
pub const MAX_DELAY_MS: u64 = 86_400_000;

/// Landmark index contract of the face-mesh tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkIndices {
    pub nose_tip: usize,
    pub left_edge: usize,
    pub right_edge: usize,
    pub left_eye: [usize; 6],
    pub right_eye: [usize; 6],
}

impl Default for LandmarkIndices {
    fn default() -> Self {
        Self {
            nose_tip: 1,
            left_edge: 234,
            right_edge: 454,
            left_eye: [33, 160, 158, 133, 153, 144],
            right_eye: [362, 385, 387, 263, 373, 380],
        }
    }
}

/// Thresholds for the debounced conditions and the immediate filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sustained absence before "No Face Detected" (ms)
    pub no_face_delay_ms: u64,
    /// Sustained head turn before "User Looking Away" (ms)
    pub looking_away_delay_ms: u64,
    /// Sustained eye closure before "Drowsiness Detected" (ms)
    pub drowsiness_delay_ms: u64,
    /// Head-turn ratios strictly below this are "looking away"
    pub head_turn_min: f64,
    /// Head-turn ratios strictly above this are "looking away"
    pub head_turn_max: f64,
    /// Average EAR strictly below this counts as eyes closed
    pub ear_threshold: f64,
    /// Object labels that raise "Suspicious Item Detected"
    pub suspicious_labels: Vec<String>,
    /// Detections must be strictly above this confidence
    pub min_object_confidence: f64,
    /// Size of the recent-alerts view
    pub recent_alert_capacity: usize,
    pub landmarks: LandmarkIndices,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            no_face_delay_ms: 10_000,
            looking_away_delay_ms: 5_000,
            drowsiness_delay_ms: 3_000,
            head_turn_min: 0.3,
            head_turn_max: 0.7,
            ear_threshold: 0.2,
            suspicious_labels: vec![
                "cell phone".to_string(),
                "book".to_string(),
                "laptop".to_string(),
            ],
            min_object_confidence: 0.6,
            recent_alert_capacity: 5,
            landmarks: LandmarkIndices::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.no_face_delay_ms == 0
            || self.looking_away_delay_ms == 0
            || self.drowsiness_delay_ms == 0
        {
            return Err(ProctorError::Config(
                "condition delays must be greater than zero".to_string(),
            ));
        }
        for (name, delay) in [
            ("no_face_delay_ms", self.no_face_delay_ms),
            ("looking_away_delay_ms", self.looking_away_delay_ms),
            ("drowsiness_delay_ms", self.drowsiness_delay_ms),
        ] {
            if delay > MAX_DELAY_MS {
                return Err(ProctorError::Config(format!(
                    "{name} ({delay}) exceeds the maximum of {MAX_DELAY_MS} ms"
                )));
            }
        }
        if !(self.head_turn_min < self.head_turn_max) {
            return Err(ProctorError::Config(format!(
                "head_turn_min ({}) must be below head_turn_max ({})",
                self.head_turn_min, self.head_turn_max
            )));
        }
        if !(0.0..=1.0).contains(&self.min_object_confidence) {
            return Err(ProctorError::Config(format!(
                "min_object_confidence {} is outside [0, 1]",
                self.min_object_confidence
            )));
        }
        if self.recent_alert_capacity == 0 {
            return Err(ProctorError::Config(
                "recent_alert_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Deduction charged per counted occurrence of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionRule {
    pub deduction_points: u32,
    pub max_occurrences_counted: u32,
}

impl DeductionRule {
    pub const fn new(deduction_points: u32, max_occurrences_counted: u32) -> Self {
        Self {
            deduction_points,
            max_occurrences_counted,
        }
    }
}

/// Canonical category → deduction rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreConfig {
    rules: BTreeMap<String, DeductionRule>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self::from_rules([
            (EventKind::LookingAway.as_str(), DeductionRule::new(5, 1)),
            (EventKind::NoFace.as_str(), DeductionRule::new(10, 1)),
            (EventKind::MultipleFaces.as_str(), DeductionRule::new(15, 1)),
            (EventKind::SuspiciousItem.as_str(), DeductionRule::new(20, 2)),
            (EventKind::Drowsiness.as_str(), DeductionRule::new(10, 1)),
        ])
    }
}

impl ScoreConfig {
    pub fn from_rules<'a>(rules: impl IntoIterator<Item = (&'a str, DeductionRule)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(category, rule)| (category.to_string(), rule))
                .collect(),
        }
    }

    pub fn rule(&self, category: &str) -> Option<&DeductionRule> {
        self.rules.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

/// Complete configuration file layout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub monitor: MonitorConfig,
    pub scoring: ScoreConfig,
}

impl ProctorConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ProctorError> {
        let config: ProctorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ProctorError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ProctorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ProctorError> {
        self.monitor.validate()
    }
}
