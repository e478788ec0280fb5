//! Debounced condition monitoring
//!
//! Each monitored condition is a two-state machine:
//!
//! ```text
//!   Idle --violation--> Pending --timer expiry--> (emit event) --> Idle
//!                          |
//!                          +--signal clears--> (cancel timer) --> Idle
//! ```
//!
//! Only a violation that is sustained for the whole delay emits an event, and
//! each activation cycle emits at most one.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MonitorConfig;
use crate::scheduler::{FiredTimer, Scheduler, TimerHandle};
use crate::signals::FrameSignals;
use crate::types::EventKind;

/// Conditions that require a sustained violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    NoFace,
    LookingAway,
    Drowsiness,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::NoFace, Condition::LookingAway, Condition::Drowsiness];

    pub fn event_kind(&self) -> EventKind {
        match self {
            Condition::NoFace => EventKind::NoFace,
            Condition::LookingAway => EventKind::LookingAway,
            Condition::Drowsiness => EventKind::Drowsiness,
        }
    }
}

/// Per-condition record; `active` is true exactly while a timer is outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorState {
    pub active: bool,
    pub timer: Option<TimerHandle>,
}

impl MonitorState {
    pub fn is_pending(&self) -> bool {
        self.active
    }
}

/// Owns one [`MonitorState`] per condition
#[derive(Debug, Clone)]
pub struct ConditionMonitor {
    config: MonitorConfig,
    no_face: MonitorState,
    looking_away: MonitorState,
    drowsiness: MonitorState,
}

impl ConditionMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            no_face: MonitorState::default(),
            looking_away: MonitorState::default(),
            drowsiness: MonitorState::default(),
        }
    }

    pub fn state(&self, condition: Condition) -> &MonitorState {
        match condition {
            Condition::NoFace => &self.no_face,
            Condition::LookingAway => &self.looking_away,
            Condition::Drowsiness => &self.drowsiness,
        }
    }

    fn state_mut(&mut self, condition: Condition) -> &mut MonitorState {
        match condition {
            Condition::NoFace => &mut self.no_face,
            Condition::LookingAway => &mut self.looking_away,
            Condition::Drowsiness => &mut self.drowsiness,
        }
    }

    fn delay(&self, condition: Condition) -> Duration {
        let ms = match condition {
            Condition::NoFace => self.config.no_face_delay_ms,
            Condition::LookingAway => self.config.looking_away_delay_ms,
            Condition::Drowsiness => self.config.drowsiness_delay_ms,
        };
        Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }

    /// Strictly outside the centered band; NaN never qualifies
    pub fn is_looking_away(&self, ratio: f64) -> bool {
        ratio < self.config.head_turn_min || ratio > self.config.head_turn_max
    }

    pub fn is_drowsy(&self, average_ear: f64) -> bool {
        average_ear < self.config.ear_threshold
    }

    /// Apply one frame's signals.
    ///
    /// A face-less frame only drives the NoFace condition; gaze and eye
    /// conditions keep whatever state they had. A frame with faces but no
    /// usable primary signals only clears NoFace.
    pub fn observe(&mut self, signals: &FrameSignals, scheduler: &mut dyn Scheduler) {
        if signals.face_count == 0 {
            self.update(Condition::NoFace, true, scheduler);
            return;
        }

        self.update(Condition::NoFace, false, scheduler);

        if let Some(primary) = signals.primary {
            let away = self.is_looking_away(primary.head_turn_ratio);
            self.update(Condition::LookingAway, away, scheduler);

            let drowsy = self.is_drowsy(primary.average_ear);
            self.update(Condition::Drowsiness, drowsy, scheduler);
        }
    }

    fn update(&mut self, condition: Condition, violated: bool, scheduler: &mut dyn Scheduler) {
        let delay = self.delay(condition);
        let state = self.state_mut(condition);

        match (state.active, violated) {
            (false, true) => {
                state.timer = Some(scheduler.schedule(condition, delay));
                state.active = true;
                debug!(?condition, "condition pending");
            }
            (true, false) => {
                if let Some(handle) = state.timer.take() {
                    scheduler.cancel(handle);
                }
                state.active = false;
                debug!(?condition, "condition cleared before threshold");
            }
            _ => {}
        }
    }

    /// Resolve an expired timer into the event it stands for.
    ///
    /// Returns `None` for a timer this monitor no longer owns.
    pub fn on_timer_fired(&mut self, fired: &FiredTimer) -> Option<EventKind> {
        let state = self.state_mut(fired.condition);
        if state.timer != Some(fired.handle) {
            debug!(condition = ?fired.condition, "ignoring stale timer");
            return None;
        }

        *state = MonitorState::default();
        Some(fired.condition.event_kind())
    }

    /// Cancel every outstanding timer and return all conditions to Idle
    pub fn cancel_all(&mut self, scheduler: &mut dyn Scheduler) {
        for condition in Condition::ALL {
            let state = self.state_mut(condition);
            if let Some(handle) = state.timer.take() {
                scheduler.cancel(handle);
            }
            *state = MonitorState::default();
        }
    }
}
