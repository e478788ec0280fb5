//! Integrity score aggregation
//!
//! Runs once per finished session over the persisted log:
//! 1. Collapse each event string to its canonical category
//! 2. Count every occurrence for the summary
//! 3. Charge deductions per category up to the configured cap
//! 4. Clamp `100 - deductions` into [0, 100]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ScoreConfig;
use crate::report::Report;
use crate::session::SessionRecord;
use crate::store::EventStore;
use crate::types::{EventKind, LogEntry};

/// Starting score before deductions
pub const MAX_SCORE: u32 = 100;

/// Scoring bucket for a persisted event string
///
/// Detail-bearing suspicious-item events collapse into one category; every
/// other event string is its own category.
pub fn canonical_category(event: &str) -> &str {
    let suspicious = EventKind::SuspiciousItem.as_str();
    if event.starts_with(suspicious) {
        suspicious
    } else {
        event
    }
}

/// Result of scoring one log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    /// 0-100
    pub score: u8,
    /// Sum of charged deductions before clamping
    pub total_deductions: u32,
    /// Every occurrence per category
    pub summary: BTreeMap<String, u32>,
    /// Occurrences charged against the score per category
    pub counted: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    config: ScoreConfig,
}

impl ScoreAggregator {
    pub fn new(config: ScoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    /// Score a log. Pure: the same log always yields the same outcome.
    pub fn score(&self, log: &[LogEntry]) -> ScoreOutcome {
        let mut summary: BTreeMap<String, u32> = BTreeMap::new();
        let mut counted: BTreeMap<String, u32> = BTreeMap::new();
        let mut total_deductions: u32 = 0;

        for entry in log {
            let category = canonical_category(&entry.event);
            *summary.entry(category.to_string()).or_insert(0) += 1;

            if let Some(rule) = self.config.rule(category) {
                let charged = counted.entry(category.to_string()).or_insert(0);
                if *charged < rule.max_occurrences_counted {
                    total_deductions = total_deductions.saturating_add(rule.deduction_points);
                    *charged += 1;
                }
            }
        }

        counted.retain(|_, charged| *charged > 0);

        ScoreOutcome {
            score: MAX_SCORE.saturating_sub(total_deductions) as u8,
            total_deductions,
            summary,
            counted,
        }
    }

    /// Fetch the candidate's log and build the session report.
    ///
    /// A failed read is logged and scored as an empty log.
    pub async fn build_report(&self, store: &dyn EventStore, session: &SessionRecord) -> Report {
        let log = match store.fetch_log(&session.candidate_id).await {
            Ok(log) => log,
            Err(e) => {
                warn!(candidate = %session.candidate_id, error = %e, "failed to fetch event log; scoring empty log");
                Vec::new()
            }
        };

        Report::new(
            &session.candidate_id,
            self.score(&log),
            session.duration_seconds(),
            log,
        )
    }
}
