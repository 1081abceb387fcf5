//! Outbound collaborator interface for presence events and location history

use crate::domain::types::{LocationChange, TagEvent};
use parking_lot::Mutex;

/// Receives everything the tracker emits
///
/// Called while the tracker lock is held, so implementations must not
/// block. Delivery is best-effort: the tracker does not retry or roll
/// back a transition if emission fails.
pub trait EventSink: Send + Sync {
    /// A presence transition (arrival, moved, departed, returned)
    fn emit(&self, event: TagEvent);

    /// An accepted location change. Persisting history is up to the sink.
    fn record_location(&self, _change: LocationChange) {}
}

/// Sink that discards everything
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TagEvent) {}
}

/// Sink that keeps emitted events and location changes in memory
///
/// Used by the replay tool and tests.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TagEvent>>,
    locations: Mutex<Vec<LocationChange>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything emitted so far
    pub fn drain_events(&self) -> Vec<TagEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn drain_locations(&self) -> Vec<LocationChange> {
        std::mem::take(&mut *self.locations.lock())
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: TagEvent) {
        self.events.lock().push(event);
    }

    fn record_location(&self, change: LocationChange) {
        self.locations.lock().push(change);
    }
}
