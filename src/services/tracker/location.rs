//! Per-read location resolution
//!
//! A tag's location is the antenna alias that hears it best. A challenging
//! antenna only takes over once it has enough samples and its smoothed RSSI
//! beats the incumbent's by the mobility weight.

use crate::domain::mobility::MobilityProfile;
use crate::domain::signal::{SignalStats, MIN_SIGNAL_WINDOW};
use crate::domain::types::{LocationChange, Sensor, Tag, TagRead};
use tracing::debug;

/// Samples a challenger needs (strictly more than this) before its mean is trusted
const MIN_CHALLENGER_SAMPLES: usize = MIN_SIGNAL_WINDOW - 1;

/// Update signal statistics for `read` and move the tag if the evidence
/// supports it. Returns the accepted location change, if any.
pub(crate) fn resolve(
    tag: &mut Tag,
    sensor: &Sensor,
    read: &TagRead,
    profile: &MobilityProfile,
    window: usize,
) -> Option<LocationChange> {
    let src_alias = sensor.antenna_alias(&read.antenna_id);
    let now = read.last_read_on;

    if !read.tid.is_empty() {
        tag.tid = Some(read.tid.clone());
    }

    tag.stats
        .entry(src_alias.clone())
        .or_insert_with(|| SignalStats::new(window))
        .update(read.rssi, now);
    tag.last_read = now;

    if tag.location == src_alias {
        return None;
    }

    if let Some(incumbent) = tag.stats.get(&tag.location) {
        let challenger = tag.stats.get(&src_alias)?;
        if challenger.sample_count() <= MIN_CHALLENGER_SAMPLES {
            return None;
        }

        let weight = profile.weight(incumbent.last_read, now, sensor.is_in_deep_scan);
        let challenger_dbm = challenger.mean_dbm();
        let incumbent_dbm = incumbent.mean_dbm();
        if challenger_dbm <= incumbent_dbm + weight {
            debug!(
                epc = %tag.epc,
                incumbent = %tag.location,
                challenger = %src_alias,
                incumbent_dbm = %format!("{incumbent_dbm:.1}"),
                challenger_dbm = %format!("{challenger_dbm:.1}"),
                weight = %format!("{weight:.2}"),
                "location_challenge_rejected"
            );
            return None;
        }
    }

    debug!(
        epc = %tag.epc,
        from = %tag.location,
        to = %src_alias,
        facility_id = %sensor.facility_id,
        "location_changed"
    );

    tag.location = src_alias;
    tag.device_location = sensor.device_id.clone();
    tag.facility_id = sensor.facility_id.clone();

    Some(LocationChange {
        epc: tag.epc.clone(),
        location: tag.location.clone(),
        device_id: tag.device_location.clone(),
        facility_id: tag.facility_id.clone(),
        timestamp: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SensorConfig;

    const WINDOW: usize = 20;

    fn sensor(device_id: &str, facility: &str) -> Sensor {
        let mut sensor = Sensor::new(device_id);
        sensor.apply(&SensorConfig::new(device_id).with_facility(facility));
        sensor
    }

    fn read(epc: &str, rssi: i32, ts: u64) -> TagRead {
        TagRead::new(epc, "0", rssi, ts)
    }

    #[test]
    fn test_first_read_adopts_location() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");

        let change = resolve(&mut tag, &a, &read("EPC1", -600, 1_000), &MobilityProfile::default(), WINDOW);

        let change = change.unwrap();
        assert_eq!(change.location, "A-0");
        assert_eq!(tag.location, "A-0");
        assert_eq!(tag.device_location, "A");
        assert_eq!(tag.facility_id, "store");
        assert_eq!(tag.last_read, 1_000);
    }

    #[test]
    fn test_same_location_is_not_a_change() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");
        let profile = MobilityProfile::default();

        resolve(&mut tag, &a, &read("EPC1", -600, 1_000), &profile, WINDOW);
        let change = resolve(&mut tag, &a, &read("EPC1", -600, 2_000), &profile, WINDOW);

        assert!(change.is_none());
        assert_eq!(tag.stats["A-0"].sample_count(), 2);
        assert_eq!(tag.last_read, 2_000);
    }

    #[test]
    fn test_challenger_needs_three_samples() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");
        let b = sensor("B", "store");
        let profile = MobilityProfile::default();

        resolve(&mut tag, &a, &read("EPC1", -950, 1_000), &profile, WINDOW);
        assert!(resolve(&mut tag, &b, &read("EPC1", -400, 1_001), &profile, WINDOW).is_none());
        assert!(resolve(&mut tag, &b, &read("EPC1", -400, 1_002), &profile, WINDOW).is_none());
        assert_eq!(tag.device_location, "A");

        let change = resolve(&mut tag, &b, &read("EPC1", -400, 1_003), &profile, WINDOW);
        assert!(change.is_some());
        assert_eq!(tag.location, "B-0");
        assert_eq!(tag.device_location, "B");
    }

    #[test]
    fn test_weaker_challenger_does_not_win() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");
        let b = sensor("B", "store");
        let profile = MobilityProfile::default();

        resolve(&mut tag, &a, &read("EPC1", -500, 1_000), &profile, WINDOW);
        for ts in 1_001..1_010 {
            assert!(resolve(&mut tag, &b, &read("EPC1", -700, ts), &profile, WINDOW).is_none());
        }
        assert_eq!(tag.location, "A-0");
    }

    #[test]
    fn test_fresh_incumbent_resists_small_margin() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");
        let b = sensor("B", "store");
        let profile = MobilityProfile::default();

        // Incumbent read at the same instant: weight is the full 6 dB
        for ts in [1_000, 1_001, 1_002] {
            resolve(&mut tag, &a, &read("EPC1", -600, ts), &profile, WINDOW);
        }
        for _ in 0..3 {
            resolve(&mut tag, &a, &read("EPC1", -600, 1_003), &profile, WINDOW);
            resolve(&mut tag, &b, &read("EPC1", -560, 1_003), &profile, WINDOW);
        }
        assert_eq!(tag.location, "A-0");
    }

    #[test]
    fn test_stale_incumbent_yields_to_small_margin() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");
        let b = sensor("B", "store");
        let profile = MobilityProfile::default();

        resolve(&mut tag, &a, &read("EPC1", -600, 1_000), &profile, WINDOW);
        // One second later the weight has decayed to -2 dB
        for ts in [2_000, 2_001, 2_002] {
            resolve(&mut tag, &b, &read("EPC1", -590, ts), &profile, WINDOW);
        }
        assert_eq!(tag.location, "B-0");
    }

    #[test]
    fn test_deep_scan_keeps_full_threshold() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");
        let mut b = sensor("B", "store");
        b.is_in_deep_scan = true;
        let profile = MobilityProfile::default();

        resolve(&mut tag, &a, &read("EPC1", -600, 1_000), &profile, WINDOW);
        for ts in [60_000, 60_001, 60_002, 60_003] {
            resolve(&mut tag, &b, &read("EPC1", -570, ts), &profile, WINDOW);
        }
        // 3 dB better is not enough against a 6 dB deep-scan threshold
        assert_eq!(tag.location, "A-0");
    }

    #[test]
    fn test_tid_overwritten_only_when_supplied() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");
        let profile = MobilityProfile::default();

        let mut with_tid = read("EPC1", -600, 1_000);
        with_tid.tid = "E2801160".to_string();
        resolve(&mut tag, &a, &with_tid, &profile, WINDOW);
        resolve(&mut tag, &a, &read("EPC1", -600, 1_100), &profile, WINDOW);

        assert_eq!(tag.tid.as_deref(), Some("E2801160"));
    }

    #[test]
    fn test_antenna_change_on_same_sensor_is_a_move() {
        let mut tag = Tag::new("EPC1");
        let a = sensor("A", "store");
        let profile = MobilityProfile::default();

        resolve(&mut tag, &a, &read("EPC1", -800, 1_000), &profile, WINDOW);
        for ts in [1_001, 1_002, 1_003] {
            resolve(&mut tag, &a, &TagRead::new("EPC1", "3", -400, ts), &profile, WINDOW);
        }
        assert_eq!(tag.location, "A-3");
        assert_eq!(tag.device_location, "A");
    }
}
