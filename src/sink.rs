//! Alert fan-out
//!
//! Every emitted event goes to a bounded, newest-first "recent alerts" view
//! and is dispatched to the event store on a spawned task. Dispatch is
//! fire-and-forget: a failed append is logged and counted, never retried, and
//! never reaches the frame loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::EventStore;
use crate::types::{Alert, Event};

/// Delivery counters, shared with in-flight dispatch tasks
#[derive(Debug, Default)]
struct Counters {
    emitted: AtomicU64,
    dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
}

/// Snapshot of sink counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkStats {
    /// Events handed to the sink
    pub emitted: u64,
    /// Appends the store acknowledged
    pub dispatched: u64,
    /// Appends that failed or could not be spawned
    pub dispatch_failures: u64,
}

pub struct AlertSink {
    store: Arc<dyn EventStore>,
    recent: VecDeque<Alert>,
    capacity: usize,
    counters: Arc<Counters>,
    in_flight: Vec<JoinHandle<()>>,
}

impl AlertSink {
    pub fn new(store: Arc<dyn EventStore>, capacity: usize) -> Self {
        Self {
            store,
            recent: VecDeque::with_capacity(capacity),
            capacity,
            counters: Arc::new(Counters::default()),
            in_flight: Vec::new(),
        }
    }

    /// Record an event: update the recent view, then dispatch to the store
    pub fn record(&mut self, event: &Event) {
        let message = event.message();
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
        info!(candidate = %event.candidate_id, event = %message, "integrity event");

        self.recent.push_front(Alert {
            event: message.clone(),
            timestamp: event.timestamp,
        });
        self.recent.truncate(self.capacity);

        self.dispatch(event.candidate_id.clone(), message);
    }

    fn dispatch(&mut self, candidate: String, message: String) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.counters.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%candidate, event = %message, "no async runtime; event not persisted");
                return;
            }
        };

        self.in_flight.retain(|task| !task.is_finished());

        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);
        self.in_flight.push(handle.spawn(async move {
            match store.append(&candidate, &message).await {
                Ok(()) => {
                    counters.dispatched.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(%candidate, event = %message, error = %e, "failed to persist event");
                }
            }
        }));
    }

    /// Newest first, at most `capacity` entries
    pub fn recent(&self) -> impl Iterator<Item = &Alert> {
        self.recent.iter()
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.counters.dispatch_failures.load(Ordering::Relaxed),
        }
    }

    /// Wait for every dispatch started so far
    pub async fn flush(&mut self) {
        for task in self.in_flight.drain(..) {
            if let Err(e) = task.await {
                self.counters.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "event dispatch task aborted");
            }
        }
    }
}
