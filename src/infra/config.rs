//! Configuration loading from TOML files
//!
//! Config file is selected with `--config <path>` (default: config/dev.toml).
//! A missing or unparsable file falls back to built-in defaults.

use crate::domain::mobility::MobilityProfile;
use crate::domain::signal::MIN_SIGNAL_WINDOW;
use crate::domain::types::SensorConfig;
use anyhow::{bail, Context};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Topic carrying sensor read reports
    #[serde(default = "default_reads_topic")]
    pub reads_topic: String,
    /// Topic carrying sensor configuration upserts
    #[serde(default = "default_config_topic")]
    pub config_topic: String,
    /// Topic carrying control commands (e.g. clear_exiting)
    #[serde(default = "default_control_topic")]
    pub control_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_reads_topic() -> String {
    "rfid/reads".to_string()
}

fn default_config_topic() -> String {
    "rfid/sensors/config".to_string()
}

fn default_control_topic() -> String {
    "rfid/control".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_pos_departed_threshold_ms")]
    pub pos_departed_threshold_ms: u64,
    #[serde(default = "default_pos_return_threshold_ms")]
    pub pos_return_threshold_ms: u64,
    #[serde(default = "default_age_out_hours")]
    pub age_out_hours: u64,
    #[serde(default = "default_aggregate_departed_threshold_ms")]
    pub aggregate_departed_threshold_ms: u64,
    /// Window size of the RSSI and interval buffers
    #[serde(default = "default_signal_window")]
    pub signal_window: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            pos_departed_threshold_ms: default_pos_departed_threshold_ms(),
            pos_return_threshold_ms: default_pos_return_threshold_ms(),
            age_out_hours: default_age_out_hours(),
            aggregate_departed_threshold_ms: default_aggregate_departed_threshold_ms(),
            signal_window: default_signal_window(),
        }
    }
}

fn default_pos_departed_threshold_ms() -> u64 {
    3_600_000 // 1 hour
}

fn default_pos_return_threshold_ms() -> u64 {
    86_400_000 // 24 hours
}

fn default_age_out_hours() -> u64 {
    336 // 14 days
}

fn default_aggregate_departed_threshold_ms() -> u64 {
    30_000
}

fn default_signal_window() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_ageout_interval_secs")]
    pub ageout_interval_secs: u64,
    #[serde(default = "default_aggregate_departed_interval_secs")]
    pub aggregate_departed_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            ageout_interval_secs: default_ageout_interval_secs(),
            aggregate_departed_interval_secs: default_aggregate_departed_interval_secs(),
        }
    }
}

fn default_ageout_interval_secs() -> u64 {
    3600
}

fn default_aggregate_departed_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MobilityConfig {
    #[serde(default)]
    pub default: MobilityProfile,
    /// Named profiles, selected per sensor by `mobility_profile`
    #[serde(default)]
    pub profiles: FxHashMap<String, MobilityProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttEgressConfig {
    /// Enable MQTT egress publishing
    #[serde(default = "default_mqtt_egress_enabled")]
    pub enabled: bool,
    /// Topic for presence transitions (QoS 1)
    #[serde(default = "default_events_topic")]
    pub events_topic: String,
    /// Topic for accepted location changes (QoS 0)
    #[serde(default = "default_history_topic")]
    pub history_topic: String,
}

impl Default for MqttEgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_mqtt_egress_enabled(),
            events_topic: default_events_topic(),
            history_topic: default_history_topic(),
        }
    }
}

fn default_mqtt_egress_enabled() -> bool {
    true
}

fn default_events_topic() -> String {
    "rfid/events".to_string()
}

fn default_history_topic() -> String {
    "rfid/history".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site identifier
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "tag-tracker".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub mobility: MobilityConfig,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub mqtt_egress: MqttEgressConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_reads_topic: String,
    mqtt_config_topic: String,
    mqtt_control_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    pos_departed_threshold_ms: u64,
    pos_return_threshold_ms: u64,
    age_out_hours: u64,
    aggregate_departed_threshold_ms: u64,
    signal_window: usize,
    ageout_interval_secs: u64,
    aggregate_departed_interval_secs: u64,
    default_mobility: MobilityProfile,
    mobility_profiles: FxHashMap<String, MobilityProfile>,
    sensors: Vec<SensorConfig>,
    metrics_interval_secs: u64,
    config_file: String,
    // MQTT Egress config
    mqtt_egress_enabled: bool,
    mqtt_egress_events_topic: String,
    mqtt_egress_history_topic: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_reads_topic: default_reads_topic(),
            mqtt_config_topic: default_config_topic(),
            mqtt_control_topic: default_control_topic(),
            mqtt_username: None,
            mqtt_password: None,
            pos_departed_threshold_ms: default_pos_departed_threshold_ms(),
            pos_return_threshold_ms: default_pos_return_threshold_ms(),
            age_out_hours: default_age_out_hours(),
            aggregate_departed_threshold_ms: default_aggregate_departed_threshold_ms(),
            signal_window: default_signal_window(),
            ageout_interval_secs: default_ageout_interval_secs(),
            aggregate_departed_interval_secs: default_aggregate_departed_interval_secs(),
            default_mobility: MobilityProfile::default(),
            mobility_profiles: FxHashMap::default(),
            sensors: Vec::new(),
            metrics_interval_secs: 10,
            config_file: "default".to_string(),
            mqtt_egress_enabled: true,
            mqtt_egress_events_topic: default_events_topic(),
            mqtt_egress_history_topic: default_history_topic(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_reads_topic: toml_config.mqtt.reads_topic,
            mqtt_config_topic: toml_config.mqtt.config_topic,
            mqtt_control_topic: toml_config.mqtt.control_topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            pos_departed_threshold_ms: toml_config.tracking.pos_departed_threshold_ms,
            pos_return_threshold_ms: toml_config.tracking.pos_return_threshold_ms,
            age_out_hours: toml_config.tracking.age_out_hours,
            aggregate_departed_threshold_ms: toml_config.tracking.aggregate_departed_threshold_ms,
            signal_window: toml_config.tracking.signal_window,
            ageout_interval_secs: toml_config.maintenance.ageout_interval_secs,
            aggregate_departed_interval_secs: toml_config
                .maintenance
                .aggregate_departed_interval_secs,
            default_mobility: toml_config.mobility.default,
            mobility_profiles: toml_config.mobility.profiles,
            sensors: toml_config.sensors,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
            mqtt_egress_enabled: toml_config.mqtt_egress.enabled,
            mqtt_egress_events_topic: toml_config.mqtt_egress.events_topic,
            mqtt_egress_history_topic: toml_config.mqtt_egress.history_topic,
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Check startup preconditions the read path relies on
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.signal_window < MIN_SIGNAL_WINDOW {
            bail!(
                "tracking.signal_window must be at least {MIN_SIGNAL_WINDOW}, got {}",
                self.signal_window
            );
        }
        if self.age_out_hours == 0 {
            bail!("tracking.age_out_hours must be greater than 0");
        }
        if self.aggregate_departed_threshold_ms == 0 {
            bail!("tracking.aggregate_departed_threshold_ms must be greater than 0");
        }
        if !self.default_mobility.is_valid() {
            bail!("mobility.default has non-finite parameters");
        }
        for (id, profile) in &self.mobility_profiles {
            if !profile.is_valid() {
                bail!("mobility profile {id:?} has non-finite parameters");
            }
        }
        for sensor in &self.sensors {
            if let Some(id) = &sensor.mobility_profile {
                if !self.mobility_profiles.contains_key(id) {
                    bail!(
                        "sensor {} references unknown mobility profile {id:?}",
                        sensor.device_id
                    );
                }
            }
        }
        Ok(())
    }

    /// Mobility profile for a profile id, falling back to the default
    pub fn mobility_profile(&self, id: Option<&str>) -> &MobilityProfile {
        id.and_then(|id| self.mobility_profiles.get(id)).unwrap_or(&self.default_mobility)
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_reads_topic(&self) -> &str {
        &self.mqtt_reads_topic
    }

    pub fn mqtt_config_topic(&self) -> &str {
        &self.mqtt_config_topic
    }

    pub fn mqtt_control_topic(&self) -> &str {
        &self.mqtt_control_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn pos_departed_threshold_ms(&self) -> u64 {
        self.pos_departed_threshold_ms
    }

    pub fn pos_return_threshold_ms(&self) -> u64 {
        self.pos_return_threshold_ms
    }

    pub fn age_out_hours(&self) -> u64 {
        self.age_out_hours
    }

    pub fn age_out_ms(&self) -> u64 {
        self.age_out_hours.saturating_mul(3_600_000)
    }

    pub fn aggregate_departed_threshold_ms(&self) -> u64 {
        self.aggregate_departed_threshold_ms
    }

    pub fn signal_window(&self) -> usize {
        self.signal_window
    }

    pub fn ageout_interval_secs(&self) -> u64 {
        self.ageout_interval_secs
    }

    pub fn aggregate_departed_interval_secs(&self) -> u64 {
        self.aggregate_departed_interval_secs
    }

    pub fn default_mobility(&self) -> &MobilityProfile {
        &self.default_mobility
    }

    pub fn sensors(&self) -> &[SensorConfig] {
        &self.sensors
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    // MQTT Egress getters
    pub fn mqtt_egress_enabled(&self) -> bool {
        self.mqtt_egress_enabled
    }

    pub fn mqtt_egress_events_topic(&self) -> &str {
        &self.mqtt_egress_events_topic
    }

    pub fn mqtt_egress_history_topic(&self) -> &str {
        &self.mqtt_egress_history_topic
    }

    /// Builder method to override the POS departure threshold
    pub fn with_pos_departed_threshold_ms(mut self, ms: u64) -> Self {
        self.pos_departed_threshold_ms = ms;
        self
    }

    /// Builder method to override the POS return threshold
    pub fn with_pos_return_threshold_ms(mut self, ms: u64) -> Self {
        self.pos_return_threshold_ms = ms;
        self
    }

    /// Builder method to override the signal window size
    pub fn with_signal_window(mut self, window: usize) -> Self {
        self.signal_window = window;
        self
    }

    /// Builder method to override the age-out horizon
    pub fn with_age_out_hours(mut self, hours: u64) -> Self {
        self.age_out_hours = hours;
        self
    }

    /// Builder method to override the exiting finalization threshold
    pub fn with_aggregate_departed_threshold_ms(mut self, ms: u64) -> Self {
        self.aggregate_departed_threshold_ms = ms;
        self
    }

    /// Builder method to add a named mobility profile
    pub fn with_mobility_profile(mut self, id: &str, profile: MobilityProfile) -> Self {
        self.mobility_profiles.insert(id.to_string(), profile);
        self
    }

    /// Builder method to add an initial sensor configuration
    pub fn with_sensor(mut self, sensor: SensorConfig) -> Self {
        self.sensors.push(sensor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.mqtt_reads_topic(), "rfid/reads");
        assert_eq!(config.mqtt_control_topic(), "rfid/control");
        assert_eq!(config.pos_departed_threshold_ms(), 3_600_000);
        assert_eq!(config.pos_return_threshold_ms(), 86_400_000);
        assert_eq!(config.age_out_hours(), 336);
        assert_eq!(config.aggregate_departed_threshold_ms(), 30_000);
        assert_eq!(config.signal_window(), 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_age_out_ms() {
        let config = Config::default().with_age_out_hours(2);
        assert_eq!(config.age_out_ms(), 7_200_000);
    }

    #[test]
    fn test_mobility_profile_fallback() {
        let fast = MobilityProfile::new(-0.05, 3.0, 0.0);
        let config = Config::default().with_mobility_profile("fast", fast);

        assert_eq!(config.mobility_profile(Some("fast")), &fast);
        assert_eq!(config.mobility_profile(Some("missing")), &MobilityProfile::default());
        assert_eq!(config.mobility_profile(None), &MobilityProfile::default());
    }

    #[test]
    fn test_validate_rejects_non_finite_profile() {
        let config = Config::default()
            .with_mobility_profile("broken", MobilityProfile::new(f64::NAN, 6.0, 0.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_sensor_profile() {
        let config =
            Config::default().with_sensor(SensorConfig::new("RSP-1").with_mobility_profile("x"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_window_too_small_to_move() {
        assert!(Config::default().with_signal_window(0).validate().is_err());
        assert!(Config::default().with_signal_window(2).validate().is_err());
        assert!(Config::default().with_signal_window(MIN_SIGNAL_WINDOW).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_thresholds() {
        assert!(Config::default().with_age_out_hours(0).validate().is_err());
        assert!(Config::default().with_aggregate_departed_threshold_ms(0).validate().is_err());
    }
}
