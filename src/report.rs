//! Session report
//!
//! The report is produced once per finished session and never changes
//! afterwards. It carries the score, the uncapped per-category summary and a
//! snapshot of the persisted log, plus the CSV export of that log.

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::score::ScoreOutcome;
use crate::types::LogEntry;

/// Coarse reading of the score for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// 80 and above
    High,
    /// 50 to 79
    Moderate,
    /// Below 50
    Low,
}

impl ScoreBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => ScoreBand::High,
            50..=79 => ScoreBand::Moderate,
            _ => ScoreBand::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub candidate_id: String,
    pub score: u8,
    pub band: ScoreBand,
    pub duration_seconds: i64,
    pub summary: BTreeMap<String, u32>,
    pub log: Vec<LogEntry>,
}

impl Report {
    pub fn new(
        candidate_id: &str,
        outcome: ScoreOutcome,
        duration_seconds: i64,
        log: Vec<LogEntry>,
    ) -> Self {
        Self {
            candidate_id: candidate_id.trim().to_string(),
            score: outcome.score,
            band: ScoreBand::from_score(outcome.score),
            duration_seconds: duration_seconds.max(0),
            summary: outcome.summary,
            log,
        }
    }

    /// "<minutes>m <seconds>s"
    pub fn duration_display(&self) -> String {
        format!("{}m {}s", self.duration_seconds / 60, self.duration_seconds % 60)
    }

    /// `Timestamp,Event` header followed by one quoted row per log entry
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("Timestamp,Event\n");
        let rows: Vec<String> = self
            .log
            .iter()
            .map(|entry| {
                format!(
                    "{},\"{}\"",
                    entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                    entry.event.replace('"', "\"\"")
                )
            })
            .collect();
        csv.push_str(&rows.join("\n"));
        csv
    }

    /// e.g. "Ada_Lovelace_Proctoring_Report.csv"
    pub fn csv_file_name(&self) -> String {
        let name = self
            .candidate_id
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        format!("{name}_Proctoring_Report.csv")
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
