//! Typed channel for MQTT egress messages
//!
//! Provides a non-blocking way to hand tracker output to the MQTT publisher.
//! Uses a bounded mpsc channel to prevent unbounded memory growth; the
//! tracker calls into this while holding its lock, so a full channel drops
//! the message rather than waiting.

use crate::domain::types::{EventKind, LocationChange, PriorLocation, TagEvent};
use crate::infra::metrics::Metrics;
use crate::services::sink::EventSink;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug)]
pub enum EgressMessage {
    /// Presence transition
    Event(TagEventPayload),
    /// Accepted location change for history
    Location(LocationPayload),
}

/// Payload for presence transitions
#[derive(Debug, Clone, Serialize)]
pub struct TagEventPayload {
    /// Site identifier
    pub site: String,
    /// Unique event id (UUIDv7)
    pub event_id: String,
    pub epc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    pub facility_id: String,
    pub location: String,
    /// Event kind (arrival, moved, departed, returned)
    pub kind: EventKind,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Previous location on a facility change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior: Option<PriorLocation>,
}

impl TagEventPayload {
    pub fn from_event(event: TagEvent, site: String) -> Self {
        Self {
            site,
            event_id: event.event_id,
            epc: event.epc,
            tid: event.tid,
            facility_id: event.facility_id,
            location: event.location,
            kind: event.kind,
            ts: event.timestamp,
            prior: event.prior,
        }
    }
}

/// Payload for location history
#[derive(Debug, Clone, Serialize)]
pub struct LocationPayload {
    pub site: String,
    pub epc: String,
    pub location: String,
    pub device_id: String,
    pub facility_id: String,
    pub ts: u64,
}

impl LocationPayload {
    pub fn from_change(change: LocationChange, site: String) -> Self {
        Self {
            site,
            epc: change.epc,
            location: change.location,
            device_id: change.device_id,
            facility_id: change.facility_id,
            ts: change.timestamp,
        }
    }
}

/// Sender handle for egress messages
///
/// Clone-able and cheap to pass around. Injects the site id into every payload.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    site_id: String,
    metrics: Arc<Metrics>,
}

impl EgressSender {
    /// Create a new sender from an mpsc sender
    pub fn new(tx: mpsc::Sender<EgressMessage>, site_id: String, metrics: Arc<Metrics>) -> Self {
        Self { tx, site_id, metrics }
    }

    fn send(&self, msg: EgressMessage) {
        // Use try_send to avoid blocking - drop if channel full
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.record_egress_dropped();
            }
            Err(TrySendError::Closed(_)) => {
                warn!("egress_channel_closed");
            }
        }
    }
}

impl EventSink for EgressSender {
    fn emit(&self, event: TagEvent) {
        self.send(EgressMessage::Event(TagEventPayload::from_event(event, self.site_id.clone())));
    }

    fn record_location(&self, change: LocationChange) {
        self.send(EgressMessage::Location(LocationPayload::from_change(
            change,
            self.site_id.clone(),
        )));
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) tuple. The sender can be cloned and
/// handed to the tracker as its event sink.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
    metrics: Arc<Metrics>,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id, metrics), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Tag;

    #[test]
    fn test_event_payload_carries_site() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_egress_channel(4, "store-12".to_string(), metrics);

        let mut tag = Tag::new("EPC1");
        tag.facility_id = "store".to_string();
        tag.location = "RSP-1-0".to_string();
        sender.emit(TagEvent::new(&tag, EventKind::Arrival, 1_000));

        let Ok(EgressMessage::Event(payload)) = rx.try_recv() else {
            panic!("expected event payload");
        };
        assert_eq!(payload.site, "store-12");
        assert_eq!(payload.ts, 1_000);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "arrival");
        assert_eq!(json["location"], "RSP-1-0");
        assert!(json.get("prior").is_none());
    }

    #[test]
    fn test_full_channel_drops_and_counts() {
        let metrics = Arc::new(Metrics::new());
        let (sender, _rx) = create_egress_channel(1, "site".to_string(), metrics.clone());

        let tag = Tag::new("EPC1");
        sender.emit(TagEvent::new(&tag, EventKind::Arrival, 1));
        sender.emit(TagEvent::new(&tag, EventKind::Moved, 2));
        sender.record_location(LocationChange {
            epc: "EPC1".to_string(),
            location: "A-0".to_string(),
            device_id: "A".to_string(),
            facility_id: "store".to_string(),
            timestamp: 3,
        });

        assert_eq!(metrics.egress_dropped(), 2);
    }
}
