//! Tag tracker - RFID item location and presence service
//!
//! Consumes sensor read reports from MQTT, resolves each tag's location and
//! presence state, and publishes transitions back to MQTT.
//!
//! Module structure:
//! - `domain/` - Core types (Tag, Sensor, reads, events, signal math)
//! - `io/` - External interfaces (MQTT ingress, MQTT egress)
//! - `services/` - Business logic (Tracker, registries)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use std::sync::Arc;
use tag_tracker::infra::{Config, Metrics};
use tag_tracker::io::{create_egress_channel, MqttPublisher};
use tag_tracker::services::{EventSink, NullSink, Tracker};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Tag tracker - RFID item location and presence service
#[derive(Parser, Debug)]
#[command(name = "tag-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: INFO, use RUST_LOG=debug for per-read visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "tag-tracker starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    config.validate()?;

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        reads_topic = %config.mqtt_reads_topic(),
        config_topic = %config.mqtt_config_topic(),
        control_topic = %config.mqtt_control_topic(),
        pos_departed_threshold_ms = %config.pos_departed_threshold_ms(),
        pos_return_threshold_ms = %config.pos_return_threshold_ms(),
        age_out_hours = %config.age_out_hours(),
        aggregate_departed_threshold_ms = %config.aggregate_departed_threshold_ms(),
        sensors = %config.sensors().len(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Create MQTT egress channel and publisher (if enabled)
    let sink: Arc<dyn EventSink> = if config.mqtt_egress_enabled() {
        let (egress_sender, egress_rx) =
            create_egress_channel(1000, config.site_id().to_string(), metrics.clone());

        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });

        Arc::new(egress_sender)
    } else {
        Arc::new(NullSink)
    };

    // Input channel (bounded for backpressure)
    let (input_tx, input_rx) = mpsc::channel(1000);

    // Start MQTT client
    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            tag_tracker::io::mqtt::start_mqtt_client(&mqtt_config, input_tx, mqtt_metrics, mqtt_shutdown)
                .await
        {
            error!(error = %e, "mqtt_client_error");
        }
    });

    let tracker = Arc::new(Tracker::new(config.clone(), metrics.clone(), sink));

    // Start metrics reporter
    let reporter_tracker = tracker.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let summary =
                metrics.report(reporter_tracker.tag_count(), reporter_tracker.exiting_total());
            summary.log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    info!("tracker_started");
    tracker.run(input_rx, shutdown_rx).await;

    info!("tag-tracker shutdown complete");
    Ok(())
}
