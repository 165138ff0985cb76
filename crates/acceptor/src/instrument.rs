//! Instrument — pluggable sink for lifecycle and failure events.
//!
//! The server reports two event classes: informational milestones
//! ("<name> serving at tcp:127.0.0.1:8080") and errors (accept failures,
//! handler failures). Every event is logged through `tracing`; when
//! instrumentation is enabled it is also delivered to the configured
//! [`EventSink`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Receiver of formatted server events.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub level: EventLevel,
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Bounded in-memory log of the most recent events.
///
/// Once `capacity` events are held, the oldest one is evicted.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    events: Mutex<VecDeque<Event>>,
}

impl EventLog {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY))),
        }
    }

    /// Snapshot of the retained events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn errors(&self) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level == EventLevel::Error)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn push(&self, level: EventLevel, message: &str) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(Event {
            level,
            at: Utc::now(),
            message: message.to_string(),
        });
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventSink for EventLog {
    fn info(&self, message: &str) {
        self.push(EventLevel::Info, message);
    }

    fn error(&self, message: &str) {
        self.push(EventLevel::Error, message);
    }
}

/// Server-side front for the sink. Sink writes are serialized by one mutex
/// because the accept loop and connection tasks report concurrently.
pub(crate) struct Instrumentation {
    name: String,
    sink: Option<Arc<dyn EventSink>>,
    lock: Mutex<()>,
}

impl Instrumentation {
    /// `sink` is only consulted when `enabled` is set.
    pub(crate) fn new(name: &str, enabled: bool, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            name: name.to_string(),
            sink: if enabled { sink } else { None },
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn info(&self, args: fmt::Arguments<'_>) {
        let message = args.to_string();
        tracing::info!(server = %self.name, "{}", message);
        if let Some(sink) = &self.sink {
            let _guard = self.lock.lock();
            sink.info(&message);
        }
    }

    pub(crate) fn error(&self, args: fmt::Arguments<'_>) {
        let message = args.to_string();
        tracing::error!(server = %self.name, "{}", message);
        self.deliver_error(&message);
    }

    /// Recoverable failure: logged at warn, reported to the sink as an error.
    pub(crate) fn warn(&self, args: fmt::Arguments<'_>) {
        let message = args.to_string();
        tracing::warn!(server = %self.name, "{}", message);
        self.deliver_error(&message);
    }

    fn deliver_error(&self, message: &str) {
        if let Some(sink) = &self.sink {
            let _guard = self.lock.lock();
            sink.error(message);
        }
    }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation")
            .field("name", &self.name)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
