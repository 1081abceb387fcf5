//! End-to-end tests driving the tracker with JSON sensor reports

use std::sync::Arc;
use tag_tracker::domain::types::{EventKind, SensorConfig, SensorReport, TagState};
use tag_tracker::infra::{Config, Metrics};
use tag_tracker::services::{MemorySink, Tracker, TrackerInput};

fn report(device_id: &str, reads: &[(&str, i32, u64)]) -> SensorReport {
    let data: Vec<serde_json::Value> = reads
        .iter()
        .map(|(epc, rssi, ts)| {
            serde_json::json!({"epc": epc, "antenna_id": 0, "last_read_on": ts, "rssi": rssi})
        })
        .collect();
    let json = serde_json::json!({"sent_on": reads.last().map_or(0, |r| r.2), "device_id": device_id, "data": data});
    serde_json::from_value(json).unwrap()
}

fn setup() -> (Tracker, Arc<MemorySink>) {
    let config = Config::default()
        .with_aggregate_departed_threshold_ms(30_000)
        .with_sensor(SensorConfig::new("FLOOR").with_facility("store"));
    let sink = Arc::new(MemorySink::new());
    let tracker = Tracker::new(config, Arc::new(Metrics::new()), sink.clone());
    (tracker, sink)
}

#[test]
fn test_item_walks_out_the_front_door() {
    let (tracker, sink) = setup();

    // Exit reader comes online mid-day via the config topic
    let exit_config: SensorConfig = serde_json::from_str(
        r#"{"device_id": "DOOR", "facility_id": "store", "personality": "exit"}"#,
    )
    .unwrap();
    tracker.process_input(TrackerInput::SensorConfig(exit_config));

    tracker.process_input(TrackerInput::Report(report("FLOOR", &[("EPC1", -700, 1_000)])));
    tracker.process_input(TrackerInput::Report(report(
        "DOOR",
        &[("EPC1", -400, 5_000), ("EPC1", -400, 5_200), ("EPC1", -400, 5_400), ("EPC1", -400, 5_600)],
    )));

    assert_eq!(tracker.tag("EPC1").unwrap().state, TagState::Exiting);
    assert_eq!(tracker.exiting_count("store"), 1);

    // Not gone long enough yet
    assert_eq!(tracker.aggregate_departed(20_000), 0);
    assert_eq!(tracker.aggregate_departed(40_000), 1);

    let kinds: Vec<EventKind> = sink.drain_events().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Arrival, EventKind::Moved, EventKind::Departed]);
    assert_eq!(tracker.tag("EPC1").unwrap().state, TagState::DepartedExit);
    assert_eq!(tracker.exiting_total(), 0);
}

#[test]
fn test_many_tags_in_one_report() {
    let (tracker, sink) = setup();

    let reads: Vec<(String, i32, u64)> =
        (0..50).map(|i| (format!("EPC{i:03}"), -600, 1_000 + i)).collect();
    let reads: Vec<(&str, i32, u64)> = reads.iter().map(|(e, r, t)| (e.as_str(), *r, *t)).collect();
    tracker.process_input(TrackerInput::Report(report("FLOOR", &reads)));

    assert_eq!(tracker.tag_count(), 50);
    assert_eq!(sink.event_count(), 50);
    assert_eq!(sink.drain_locations().len(), 50);
}

#[test]
fn test_ageout_then_reappearance_is_a_fresh_arrival() {
    let (tracker, sink) = setup();

    tracker.process_input(TrackerInput::Report(report("FLOOR", &[("EPC1", -600, 1_000)])));
    let two_weeks_and_a_bit = 336 * 3_600_000 + 10_000;
    assert_eq!(tracker.ageout(two_weeks_and_a_bit), 1);
    assert!(tracker.tag("EPC1").is_none());
    sink.drain_events();

    tracker.process_input(TrackerInput::Report(report(
        "FLOOR",
        &[("EPC1", -600, two_weeks_and_a_bit + 1)],
    )));

    let events = sink.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Arrival);
}
