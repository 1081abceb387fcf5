//! MQTT client for receiving sensor reports, sensor configuration and
//! control commands

use crate::domain::types::{SensorConfig, SensorReport};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::tracker::TrackerInput;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Commands accepted on the control topic, e.g. `{"command": "clear_exiting"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Scheduler state changed: return every exiting tag to present
    ClearExiting,
}

impl From<ControlCommand> for TrackerInput {
    fn from(command: ControlCommand) -> Self {
        match command {
            ControlCommand::ClearExiting => TrackerInput::ClearExiting,
        }
    }
}

/// Start the MQTT client and forward parsed inputs to the tracker
///
/// Inputs are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped inputs are counted in metrics and logged (rate-limited).
pub async fn start_mqtt_client(
    config: &Config,
    input_tx: mpsc::Sender<TrackerInput>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("tag-tracker-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    // Reports can carry hundreds of reads
    mqttoptions.set_max_packet_size(1024 * 1024, 1024 * 1024);

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_reads_topic(), QoS::AtMostOnce).await?;
    client.subscribe(config.mqtt_config_topic(), QoS::AtLeastOnce).await?;
    client.subscribe(config.mqtt_control_topic(), QoS::AtLeastOnce).await?;

    info!(
        reads_topic = %config.mqtt_reads_topic(),
        config_topic = %config.mqtt_config_topic(),
        control_topic = %config.mqtt_control_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_subscribed"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let input = if publish.topic == config.mqtt_config_topic() {
                            parse_sensor_config(&publish.payload).map(TrackerInput::SensorConfig)
                        } else if publish.topic == config.mqtt_control_topic() {
                            parse_control_command(&publish.payload).map(TrackerInput::from)
                        } else {
                            parse_sensor_report(&publish.payload).map(TrackerInput::Report)
                        };
                        let Some(input) = input else {
                            continue;
                        };

                        if let Err(e) = input_tx.try_send(input) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_ingress_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!(topic = %publish.topic, "mqtt_input_dropped_channel_full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("tracker_channel_closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Parse a sensor report payload. Malformed payloads are logged and skipped.
pub fn parse_sensor_report(payload: &[u8]) -> Option<SensorReport> {
    match serde_json::from_slice::<SensorReport>(payload) {
        Ok(report) => {
            debug!(device_id = %report.device_id, reads = %report.data.len(), "sensor_report_received");
            Some(report)
        }
        Err(e) => {
            warn!(error = %e, "sensor_report_parse_failed");
            None
        }
    }
}

/// Parse a sensor configuration upsert. Malformed payloads are logged and skipped.
pub fn parse_sensor_config(payload: &[u8]) -> Option<SensorConfig> {
    match serde_json::from_slice::<SensorConfig>(payload) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(error = %e, "sensor_config_parse_failed");
            None
        }
    }
}

/// Parse a control command. Unknown or malformed commands are logged and skipped.
pub fn parse_control_command(payload: &[u8]) -> Option<ControlCommand> {
    match serde_json::from_slice::<ControlCommand>(payload) {
        Ok(command) => {
            info!(command = ?command, "control_command_received");
            Some(command)
        }
        Err(e) => {
            warn!(error = %e, "control_command_parse_failed");
            None
        }
    }
}
