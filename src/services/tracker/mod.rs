//! Tag location tracking engine
//!
//! The Tracker is the central read processor. For each read in a sensor
//! report it:
//! - updates the tag's per-antenna signal statistics
//! - decides whether the tag's location changes (see `location`)
//! - runs the presence state machine (see `presence`)
//! - hands resulting events to the configured `EventSink`
//!
//! All registries live behind a single mutex, so processing is serialized
//! system-wide and no two reads ever mutate the same tag concurrently.
//! Background maintenance (see `maintenance`) takes the same lock.

mod location;
mod maintenance;
mod presence;

use crate::domain::types::{Sensor, SensorConfig, SensorReport, Tag, TagEvent};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::exiting::ExitingSet;
use crate::services::sensor_registry::SensorRegistry;
use crate::services::sink::EventSink;
use crate::services::tag_registry::TagRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::domain::types::epoch_ms;
use presence::{PresenceThresholds, PreviousLocation};

/// Messages consumed by the tracker run loop
#[derive(Debug, Clone)]
pub enum TrackerInput {
    /// A batch of reads from one sensor
    Report(SensorReport),
    /// Create or overwrite a sensor's configuration
    SensorConfig(SensorConfig),
    /// Return every exiting tag to present (scheduler state change)
    ClearExiting,
}

/// Everything guarded by the tracker lock
#[derive(Default)]
pub(crate) struct TrackerState {
    pub(crate) tags: TagRegistry,
    pub(crate) sensors: SensorRegistry,
    pub(crate) exiting: ExitingSet,
}

/// Central read processor for tag location and presence
pub struct Tracker {
    /// Tag registry, sensor registry and exiting set
    pub(crate) state: Mutex<TrackerState>,
    /// Application configuration
    pub(crate) config: Config,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    /// Receives presence events and location changes
    pub(crate) sink: Arc<dyn EventSink>,
}

impl Tracker {
    /// Create a new Tracker, applying any sensor configurations from `config`
    pub fn new(config: Config, metrics: Arc<Metrics>, sink: Arc<dyn EventSink>) -> Self {
        let mut state = TrackerState::default();
        for sensor in config.sensors() {
            state.sensors.upsert(sensor);
        }
        Self { state: Mutex::new(state), config, metrics, sink }
    }

    /// Run the tracker, consuming inputs until the channel closes or shutdown
    /// is signalled. Maintenance runs on its own configured intervals.
    pub async fn run(
        &self,
        mut input_rx: mpsc::Receiver<TrackerInput>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut aggregate_interval =
            interval(Duration::from_secs(self.config.aggregate_departed_interval_secs().max(1)));
        let mut ageout_interval =
            interval(Duration::from_secs(self.config.ageout_interval_secs().max(1)));

        loop {
            tokio::select! {
                input = input_rx.recv() => {
                    match input {
                        Some(input) => self.process_input(input),
                        None => break, // Channel closed
                    }
                }
                _ = aggregate_interval.tick() => {
                    self.aggregate_departed(epoch_ms());
                }
                _ = ageout_interval.tick() => {
                    self.ageout(epoch_ms());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("tracker_shutdown");
                        break;
                    }
                }
            }
        }
    }

    /// Dispatch a single input to the appropriate handler
    pub fn process_input(&self, input: TrackerInput) {
        match input {
            TrackerInput::Report(report) => self.process_report(&report),
            TrackerInput::SensorConfig(config) => self.upsert_sensor(&config),
            TrackerInput::ClearExiting => {
                self.clear_exiting();
            }
        }
    }

    /// Process every read in a sensor report, in order
    pub fn process_report(&self, report: &SensorReport) {
        let process_start = Instant::now();
        let thresholds = PresenceThresholds::from_config(&self.config);
        let window = self.config.signal_window();
        let mut processed = 0u64;

        {
            let mut state = self.state.lock();
            let TrackerState { tags, sensors, exiting } = &mut *state;
            let sensor = sensors.lookup_or_create(&report.device_id);
            let profile = self.config.mobility_profile(sensor.mobility_profile.as_deref());

            for read in &report.data {
                if sensor.is_filtered(read.rssi) {
                    self.metrics.record_read_filtered();
                    debug!(
                        epc = %read.epc,
                        device_id = %sensor.device_id,
                        rssi = %read.rssi,
                        "read_filtered"
                    );
                    continue;
                }

                let tag = tags.get_or_create(&read.epc);
                let previous = PreviousLocation::of(tag);

                if let Some(change) = location::resolve(tag, sensor, read, profile, window) {
                    self.sink.record_location(change);
                }

                for event in presence::transition(tag, sensor, &previous, exiting, &thresholds) {
                    self.emit(event);
                }
                processed += 1;
            }
        }

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_report(processed, latency_us);
    }

    /// Create or overwrite a sensor's configuration
    pub fn upsert_sensor(&self, config: &SensorConfig) {
        self.state.lock().sensors.upsert(config);
    }

    /// Record and forward one event. Called with the lock held.
    pub(crate) fn emit(&self, event: TagEvent) {
        info!(
            epc = %event.epc,
            kind = %event.kind.as_str(),
            facility_id = %event.facility_id,
            location = %event.location,
            ts = %event.timestamp,
            "tag_event"
        );
        self.metrics.record_event(event.kind);
        self.sink.emit(event);
    }

    /// Snapshot of a tracked tag
    pub fn tag(&self, epc: &str) -> Option<Tag> {
        self.state.lock().tags.get(epc).cloned()
    }

    /// Snapshot of a registered sensor
    pub fn sensor(&self, device_id: &str) -> Option<Sensor> {
        self.state.lock().sensors.get(device_id).cloned()
    }

    /// Number of tracked tags
    pub fn tag_count(&self) -> usize {
        self.state.lock().tags.len()
    }

    /// Number of tags held in a facility's exiting set
    pub fn exiting_count(&self, facility_id: &str) -> usize {
        self.state.lock().exiting.count(facility_id)
    }

    /// Number of tags held in all exiting sets
    pub fn exiting_total(&self) -> usize {
        self.state.lock().exiting.len()
    }
}
