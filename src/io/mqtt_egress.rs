//! MQTT publisher for egress events
//!
//! Publishes tracker output to MQTT topics for downstream consumers:
//! - rfid/events - Presence transitions (QoS 1)
//! - rfid/history - Accepted location changes (QoS 0)

use crate::infra::config::Config;
use crate::io::egress_channel::EgressMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// MQTT publisher actor
///
/// Receives messages from the egress channel and publishes to MQTT topics.
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<EgressMessage>,
    events_topic: String,
    history_topic: String,
}

impl MqttPublisher {
    /// Create a new MQTT publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<EgressMessage>) -> Self {
        let client_id = format!("tag-tracker-egress-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_egress_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_egress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            rx,
            events_topic: config.mqtt_egress_events_topic().to_string(),
            history_topic: config.mqtt_egress_history_topic().to_string(),
        }
    }

    /// Run the publisher loop until shutdown, draining queued messages on exit
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(events = %self.events_topic, history = %self.history_topic, "mqtt_egress_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_egress_shutdown");
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        return;
                    }
                }
                Some(msg) = self.rx.recv() => {
                    self.publish_message(msg).await;
                }
            }
        }
    }

    async fn publish_message(&self, msg: EgressMessage) {
        match msg {
            EgressMessage::Event(payload) => {
                // QoS 1 for transitions (at-least-once; consumers dedupe on event_id)
                match serde_json::to_string(&payload) {
                    Ok(json) => {
                        if let Err(e) = self
                            .client
                            .publish(&self.events_topic, QoS::AtLeastOnce, false, json.as_bytes())
                            .await
                        {
                            error!(error = %e, epc = %payload.epc, "mqtt_egress_event_failed");
                        }
                    }
                    Err(e) => error!(error = %e, "mqtt_egress_serialize_failed"),
                }
            }
            EgressMessage::Location(payload) => {
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.history_topic, QoS::AtMostOnce, false, json.as_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_egress_history_failed");
                    }
                }
            }
        }
    }
}
