//! Proctor Core - integrity-event detection and scoring for camera-proctored sessions
//!
//! The core turns per-frame perception output (face landmarks, object
//! detections) into auditable integrity events, then scores a finished
//! session's persisted log:
//! signal extraction → debounced condition monitor + immediate filter →
//! alert sink → event store → score aggregation → report.
//!
//! Perception itself, video capture and presentation live outside this crate.

pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod monitor;
pub mod report;
pub mod scheduler;
pub mod score;
pub mod session;
pub mod signals;
pub mod sink;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DeductionRule, MonitorConfig, ProctorConfig, ScoreConfig};
pub use error::ProctorError;
pub use report::{Report, ScoreBand};
pub use score::{canonical_category, ScoreAggregator, ScoreOutcome};
pub use session::{ProctorSession, SessionRecord, SessionRunner};
pub use store::{EventStore, InMemoryEventStore, JsonlEventStore};
pub use types::{DetectionBox, Event, EventKind, FrameResult, Landmark, LandmarkSet, LogEntry};

/// Crate version embedded in CLI output
pub const PROCTOR_VERSION: &str = env!("CARGO_PKG_VERSION");
