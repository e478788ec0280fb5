//! Session orchestration
//!
//! A [`ProctorSession`] processes one frame at a time:
//! 1. Fire timers whose deadline has passed
//! 2. SignalExtractor - landmarks to scalar signals
//! 3. ConditionMonitor - debounced conditions
//! 4. ImmediateFilter - multiple faces and suspicious objects
//! 5. AlertSink - recent alerts and fire-and-forget persistence
//!
//! Finishing a session cancels every pending timer and waits for in-flight
//! persistence so the log is complete before scoring.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, ManualClock};
use crate::config::MonitorConfig;
use crate::error::ProctorError;
use crate::filter::ImmediateFilter;
use crate::monitor::ConditionMonitor;
use crate::scheduler::{DeadlineScheduler, Scheduler};
use crate::signals::{FrameSignals, SignalExtractor};
use crate::sink::{AlertSink, SinkStats};
use crate::store::EventStore;
use crate::types::{Alert, Event, FrameResult};

/// Summary of a finished session, the input to report generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub candidate_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub frames_processed: u64,
    pub events_emitted: u64,
}

impl SessionRecord {
    pub fn duration_seconds(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds()
    }
}

pub struct ProctorSession {
    candidate_id: String,
    clock: Arc<dyn Clock>,
    extractor: SignalExtractor,
    monitor: ConditionMonitor,
    filter: ImmediateFilter,
    scheduler: Box<dyn Scheduler>,
    sink: AlertSink,
    started_at: DateTime<Utc>,
    frames_processed: u64,
    finished: bool,
}

impl ProctorSession {
    /// Start a session timed by `clock` with a [`DeadlineScheduler`]
    pub fn new(
        candidate_id: &str,
        config: &MonitorConfig,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProctorError> {
        let scheduler = Box::new(DeadlineScheduler::new(Arc::clone(&clock)));
        Self::with_scheduler(candidate_id, config, store, clock, scheduler)
    }

    /// Start a session with an explicit scheduler
    pub fn with_scheduler(
        candidate_id: &str,
        config: &MonitorConfig,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        scheduler: Box<dyn Scheduler>,
    ) -> Result<Self, ProctorError> {
        if candidate_id.trim().is_empty() {
            return Err(ProctorError::InvalidCandidate(candidate_id.to_string()));
        }
        let candidate_id = candidate_id.trim();
        config.validate()?;

        let started_at = clock.now();
        info!(candidate = %candidate_id, %started_at, "session started");

        Ok(Self {
            candidate_id: candidate_id.to_string(),
            extractor: SignalExtractor::new(config.landmarks.clone()),
            monitor: ConditionMonitor::new(config.clone()),
            filter: ImmediateFilter::new(config),
            sink: AlertSink::new(store, config.recent_alert_capacity),
            clock,
            scheduler,
            started_at,
            frames_processed: 0,
            finished: false,
        })
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn monitor(&self) -> &ConditionMonitor {
        &self.monitor
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    /// Newest first
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.sink.recent().cloned().collect()
    }

    pub fn stats(&self) -> SinkStats {
        self.sink.stats()
    }

    /// Emit events for every condition whose debounce delay has elapsed
    pub fn poll_timers(&mut self) -> Vec<Event> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        for fired in self.scheduler.take_expired() {
            if let Some(kind) = self.monitor.on_timer_fired(&fired) {
                let event = Event::new(&self.candidate_id, kind, fired.deadline);
                self.sink.record(&event);
                events.push(event);
            }
        }
        events
    }

    /// Process one frame to completion and return the events it produced
    pub fn process_frame(&mut self, frame: &FrameResult) -> Result<Vec<Event>, ProctorError> {
        if self.finished {
            return Err(ProctorError::SessionFinished(self.candidate_id.clone()));
        }

        let mut events = self.poll_timers();
        self.frames_processed += 1;

        let signals = match self.extractor.extract(frame) {
            Ok(signals) => signals,
            Err(e) => {
                warn!(candidate = %self.candidate_id, error = %e, "unusable landmark set; skipping gaze and eye checks");
                FrameSignals {
                    face_count: frame.faces.len(),
                    primary: None,
                }
            }
        };
        debug!(faces = signals.face_count, primary = ?signals.primary, "frame signals");

        self.monitor.observe(&signals, self.scheduler.as_mut());

        let now = self.clock.now();
        for immediate in self.filter.evaluate(frame) {
            let mut event = Event::new(&self.candidate_id, immediate.kind, now);
            event.detail = immediate.detail;
            self.sink.record(&event);
            events.push(event);
        }

        Ok(events)
    }

    /// Move `clock` to the frame's capture time, then process it
    pub fn replay_frame(
        &mut self,
        clock: &ManualClock,
        frame: &FrameResult,
    ) -> Result<Vec<Event>, ProctorError> {
        let timestamp = frame.timestamp.ok_or(ProctorError::MissingTimestamp)?;
        if timestamp > clock.now() {
            clock.set(timestamp);
        }
        self.process_frame(frame)
    }

    /// End the session: cancel pending conditions and wait for persistence
    pub async fn finish(mut self) -> SessionRecord {
        self.monitor.cancel_all(self.scheduler.as_mut());
        self.finished = true;
        self.sink.flush().await;

        let record = SessionRecord {
            candidate_id: self.candidate_id.clone(),
            started_at: self.started_at,
            ended_at: self.clock.now(),
            frames_processed: self.frames_processed,
            events_emitted: self.sink.stats().emitted,
        };

        let stats = self.sink.stats();
        info!(
            candidate = %record.candidate_id,
            frames = record.frames_processed,
            events = record.events_emitted,
            persisted = stats.dispatched,
            failures = stats.dispatch_failures,
            "session finished"
        );
        record
    }
}

/// Drives a session from a bounded channel of frames
pub struct SessionRunner {
    poll_interval: Duration,
}

impl Default for SessionRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl SessionRunner {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Process frames until every sender is dropped, polling timers between
    /// frames, then finish the session.
    pub async fn run(
        &self,
        mut session: ProctorSession,
        mut frames: mpsc::Receiver<FrameResult>,
    ) -> SessionRecord {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = session.process_frame(&frame) {
                            warn!(error = %e, "frame rejected");
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    session.poll_timers();
                }
            }
        }

        session.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScoreAggregator;
    use crate::signals::fixtures::{face, frame};
    use crate::store::InMemoryEventStore;
    use crate::types::{DetectionBox, EventKind};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    struct Fixture {
        clock: ManualClock,
        store: Arc<InMemoryEventStore>,
        session: ProctorSession,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap());
        let store = Arc::new(InMemoryEventStore::new(Arc::new(clock.clone())));
        let session = ProctorSession::new(
            "Ada Lovelace",
            &MonitorConfig::default(),
            store.clone(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        Fixture {
            clock,
            store,
            session,
        }
    }

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_rejects_blank_candidate() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let result = ProctorSession::new(
            "   ",
            &MonitorConfig::default(),
            Arc::new(InMemoryEventStore::default()),
            clock,
        );
        assert!(matches!(result, Err(ProctorError::InvalidCandidate(_))));
    }

    #[tokio::test]
    async fn test_no_face_event_fires_between_frames() {
        let mut f = fixture();
        f.session.process_frame(&frame(vec![])).unwrap();

        f.clock.advance_ms(10_000);
        let events = f.session.poll_timers();

        assert_eq!(kinds(&events), vec![EventKind::NoFace]);
        assert_eq!(events[0].timestamp, f.session.started_at() + chrono::Duration::seconds(10));
        assert_eq!(events[0].candidate_id, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_immediate_events_in_frame() {
        let mut f = fixture();
        let mut two_faces = frame(vec![face(0.5, 0.3), face(0.5, 0.3)]);
        two_faces.detections = vec![
            DetectionBox::new("cell phone", 0.95),
            DetectionBox::new("cup", 0.95),
        ];

        let events = f.session.process_frame(&two_faces).unwrap();
        assert_eq!(
            kinds(&events),
            vec![EventKind::MultipleFaces, EventKind::SuspiciousItem]
        );
        assert_eq!(events[1].message(), "Suspicious Item Detected: cell phone");

        let recent: Vec<_> = f
            .session
            .recent_alerts()
            .into_iter()
            .map(|alert| alert.event)
            .collect();
        assert_eq!(
            recent,
            vec![
                "Suspicious Item Detected: cell phone".to_string(),
                "Multiple Faces Detected".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_short_mesh_still_counts_faces() {
        let mut f = fixture();
        f.session.process_frame(&frame(vec![])).unwrap();

        let short = crate::types::LandmarkSet::new(vec![crate::types::Landmark::new(0.5, 0.5); 50]);
        f.session.process_frame(&frame(vec![short])).unwrap();

        // the face cleared the pending absence
        f.clock.advance_ms(20_000);
        assert!(f.session.poll_timers().is_empty());
    }

    #[tokio::test]
    async fn test_finish_cancels_pending_conditions() {
        let mut f = fixture();
        f.session.process_frame(&frame(vec![face(0.05, 0.05)])).unwrap();
        assert_eq!(f.session.pending_timers(), 2);

        f.clock.advance_ms(1_000);
        let record = f.session.finish().await;

        assert_eq!(record.frames_processed, 1);
        assert_eq!(record.events_emitted, 0);
        assert_eq!(record.duration_seconds(), 1);
        assert_eq!(f.store.len("Ada Lovelace"), 0);
    }

    #[tokio::test]
    async fn test_replay_to_report() {
        let f = fixture();
        let Fixture {
            clock,
            store,
            mut session,
        } = f;
        let start = session.started_at();
        let at = |ms: i64| Some(start + chrono::Duration::milliseconds(ms));

        // 30 fps for 12 seconds: eyes closed for 4 s, then the candidate leaves
        let mut emitted = Vec::new();
        for i in 0..360 {
            let ms = i * 1000 / 30;
            let mut f = if ms < 4_000 {
                frame(vec![face(0.5, 0.1)])
            } else if ms < 5_000 {
                frame(vec![face(0.5, 0.3)])
            } else {
                frame(vec![])
            };
            f.timestamp = at(ms);
            if i == 30 {
                f.detections.push(DetectionBox::new("book", 0.8));
            }
            emitted.extend(session.replay_frame(&clock, &f).unwrap());
        }
        assert_eq!(
            kinds(&emitted),
            vec![EventKind::SuspiciousItem, EventKind::Drowsiness]
        );

        let mut late = frame(vec![]);
        late.timestamp = at(16_000);
        emitted.extend(session.replay_frame(&clock, &late).unwrap());
        assert_eq!(emitted.last().map(|e| e.kind), Some(EventKind::NoFace));

        let record = session.finish().await;
        assert_eq!(record.events_emitted, 3);
        assert_eq!(record.duration_seconds(), 16);

        let report = ScoreAggregator::default()
            .build_report(store.as_ref(), &record)
            .await;
        assert_eq!(report.score, 100 - 20 - 10 - 10);
        assert_eq!(report.duration_seconds, 16);
        assert_eq!(report.log.len(), 3);
        assert_eq!(report.summary["Suspicious Item Detected"], 1);
    }

    #[tokio::test]
    async fn test_replay_requires_timestamps() {
        let mut f = fixture();
        let result = f.session.replay_frame(&f.clock, &frame(vec![]));
        assert!(matches!(result, Err(ProctorError::MissingTimestamp)));
    }

    #[tokio::test]
    async fn test_report_survives_read_failure() {
        let f = fixture();
        let record = f.session.finish().await;
        f.store.set_reject_reads(true);

        let report = ScoreAggregator::default()
            .build_report(f.store.as_ref(), &record)
            .await;
        assert_eq!(report.score, 100);
        assert!(report.summary.is_empty());
        assert!(report.log.is_empty());
    }

    #[tokio::test]
    async fn test_process_after_finish_is_rejected() {
        let mut f = fixture();
        f.session.finished = true;
        assert!(matches!(
            f.session.process_frame(&frame(vec![])),
            Err(ProctorError::SessionFinished(_))
        ));
    }

    #[tokio::test]
    async fn test_runner_consumes_channel() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap());
        let store = Arc::new(InMemoryEventStore::new(Arc::new(clock.clone())));
        let session = ProctorSession::new(
            "grace",
            &MonitorConfig::default(),
            store.clone(),
            Arc::new(clock.clone()),
        )
        .unwrap();

        let (tx, rx) = mpsc::channel(8);
        let runner = tokio::spawn(async move { SessionRunner::default().run(session, rx).await });

        tx.send(frame(vec![face(0.5, 0.3), face(0.5, 0.3)])).await.unwrap();
        tx.send(frame(vec![face(0.5, 0.3)])).await.unwrap();
        drop(tx);

        let record = runner.await.unwrap();
        assert_eq!(record.frames_processed, 2);
        assert_eq!(record.events_emitted, 1);
        assert_eq!(store.len("grace"), 1);
    }
}
