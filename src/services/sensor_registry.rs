//! Sensor registry - per-device configuration
//!
//! Unknown devices are registered on first sight with default settings
//! (no personality, unknown facility) and are reconfigured by upserts.

use crate::domain::types::{Sensor, SensorConfig};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: FxHashMap<String, Sensor>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the sensor for `device_id`, registering a default one if unseen
    pub fn lookup_or_create(&mut self, device_id: &str) -> &Sensor {
        self.sensors.entry(device_id.to_string()).or_insert_with(|| {
            debug!(device_id = %device_id, "sensor_registered");
            Sensor::new(device_id)
        })
    }

    /// Create or overwrite a sensor's configuration
    pub fn upsert(&mut self, config: &SensorConfig) -> &Sensor {
        let sensor = self
            .sensors
            .entry(config.device_id.clone())
            .or_insert_with(|| Sensor::new(&config.device_id));
        sensor.apply(config);

        info!(
            device_id = %sensor.device_id,
            personality = %sensor.personality.as_str(),
            facility_id = %sensor.facility_id,
            deep_scan = %sensor.is_in_deep_scan,
            min_rssi = ?sensor.min_rssi_filter,
            "sensor_configured"
        );
        sensor
    }

    pub fn get(&self, device_id: &str) -> Option<&Sensor> {
        self.sensors.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}
