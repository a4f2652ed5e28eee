//! `EventStream`: a per-scheduler set of subscribers plus a non-blocking `emit`.
//!
//! One `EventStream` is created fresh per execution, so subscriptions never accumulate
//! across runs. Subscribers are plain closures; failures inside a subscriber are caught so a
//! buggy consumer cannot poison the run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::envelope::Event;

/// A subscriber: receives every event emitted on the stream it is attached to.
/// Optionally filters by event `type`.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &Event);

    /// Event type names this subscriber wants; `None` means "all types".
    fn type_filter(&self) -> Option<&[&str]> {
        None
    }
}

/// Closure-backed subscriber, for ad-hoc subscriptions (tests, simple consumers).
pub struct FnSubscriber<F: Fn(&Event) + Send + Sync> {
    f: F,
    filter: Option<Vec<String>>,
}

impl<F: Fn(&Event) + Send + Sync> FnSubscriber<F> {
    pub fn new(f: F) -> Self {
        Self { f, filter: None }
    }

    pub fn with_type_filter(mut self, types: Vec<String>) -> Self {
        self.filter = Some(types);
        self
    }
}

impl<F: Fn(&Event) + Send + Sync> Subscriber for FnSubscriber<F> {
    fn on_event(&self, event: &Event) {
        if let Some(filter) = &self.filter {
            if !filter.iter().any(|t| t == event.type_name()) {
                return;
            }
        }
        (self.f)(event);
    }
}

/// Process-wide (but execution-scoped) event stream: a fresh subscriber list per execution.
///
/// `emit` is synchronous and non-blocking by design: subscribers run inline but any panic
/// is caught, so one misbehaving subscriber can't break delivery to the others.
#[derive(Clone, Default)]
pub struct EventStream {
    subscribers: Arc<Mutex<Vec<Arc<dyn Subscriber>>>>,
    history: Arc<Mutex<Vec<Event>>>,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.lock().await.push(subscriber);
    }

    /// Emits an event to every subscriber and appends it to the in-memory history
    /// (the log a `swarm_stop`/aggregate-usage pass and tests read back from).
    pub async fn emit(&self, event: Event) {
        let subs = self.subscribers.lock().await.clone();
        for sub in &subs {
            let sub = sub.clone();
            let event_ref = &event;
            let _ = catch_unwind(AssertUnwindSafe(|| sub.on_event(event_ref)));
        }
        self.history.lock().await.push(event);
    }

    /// Returns a snapshot of every event emitted so far on this stream, sorted by timestamp.
    pub async fn history(&self) -> Vec<Event> {
        let mut events = self.history.lock().await.clone();
        events.sort_by_key(|e| e.timestamp);
        events
    }
}
