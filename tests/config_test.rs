//! Integration tests for configuration loading

use std::io::Write;
use tag_tracker::domain::mobility::MobilityProfile;
use tag_tracker::domain::types::Personality;
use tag_tracker::infra::Config;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[site]
id = "test-site"

[mqtt]
host = "test-host"
port = 1884
reads_topic = "test/reads"
control_topic = "test/control"

[tracking]
pos_departed_threshold_ms = 120000
pos_return_threshold_ms = 600000
age_out_hours = 48
aggregate_departed_threshold_ms = 15000
signal_window = 10

[maintenance]
ageout_interval_secs = 60
aggregate_departed_interval_secs = 2

[mobility.default]
slope = -0.01
threshold = 5.0

[mobility.profiles.fast]
slope = -0.05
threshold = 3.0
holdoff = 250.0

[[sensors]]
device_id = "RSP-1"
facility_id = "front"
personality = "EXIT"
antenna_aliases = { "0" = "FRONT_DOOR" }
mobility_profile = "fast"

[[sensors]]
device_id = "RSP-2"
min_rssi_filter = -700

[metrics]
interval_secs = 15

[mqtt_egress]
enabled = false
events_topic = "test/events"
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_reads_topic(), "test/reads");
    assert_eq!(config.mqtt_config_topic(), "rfid/sensors/config");
    assert_eq!(config.mqtt_control_topic(), "test/control");
    assert_eq!(config.pos_departed_threshold_ms(), 120_000);
    assert_eq!(config.pos_return_threshold_ms(), 600_000);
    assert_eq!(config.age_out_hours(), 48);
    assert_eq!(config.aggregate_departed_threshold_ms(), 15_000);
    assert_eq!(config.signal_window(), 10);
    assert_eq!(config.ageout_interval_secs(), 60);
    assert_eq!(config.aggregate_departed_interval_secs(), 2);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert!(!config.mqtt_egress_enabled());
    assert_eq!(config.mqtt_egress_events_topic(), "test/events");
    assert_eq!(config.mqtt_egress_history_topic(), "rfid/history");

    assert_eq!(config.default_mobility(), &MobilityProfile::new(-0.01, 5.0, 0.0));
    assert_eq!(config.mobility_profile(Some("fast")).holdoff_ms(), 250.0);

    let sensors = config.sensors();
    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0].personality, Personality::Exit);
    assert_eq!(sensors[0].antenna_aliases["0"], "FRONT_DOOR");
    assert_eq!(sensors[1].facility_id, "UNKNOWN");
    assert_eq!(sensors[1].min_rssi_filter, Some(-700));

    assert!(config.validate().is_ok());
}

#[test]
fn test_minimal_config_uses_defaults() {
    let temp_file = write_config(
        r#"
[mqtt]
host = "broker"
port = 1883
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.pos_departed_threshold_ms(), 3_600_000);
    assert_eq!(config.age_out_hours(), 336);
    assert_eq!(config.default_mobility(), &MobilityProfile::default());
    assert!(config.sensors().is_empty());
    assert!(config.mqtt_egress_enabled());
}

#[test]
fn test_validate_catches_unknown_profile_reference() {
    let temp_file = write_config(
        r#"
[mqtt]
host = "broker"
port = 1883

[[sensors]]
device_id = "RSP-1"
mobility_profile = "missing"
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_window_that_blocks_location_changes() {
    let temp_file = write_config(
        r#"
[mqtt]
host = "broker"
port = 1883

[tracking]
signal_window = 2
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("signal_window"));
}

#[test]
fn test_parse_error_names_file() {
    let temp_file = write_config("[mqtt\nhost = ");
    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_dev_config_is_valid() {
    let config = Config::from_file("config/dev.toml").unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.sensors().len(), 3);
}
