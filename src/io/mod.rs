//! IO modules - external system interfaces
//!
//! - `mqtt` - MQTT client for receiving sensor reports and sensor configuration
//! - `mqtt_egress` - MQTT publisher for presence events and location history
//! - `egress_channel` - Typed channel for MQTT egress messages

pub mod egress_channel;
pub mod mqtt;
pub mod mqtt_egress;

// Re-export commonly used types
pub use egress_channel::{create_egress_channel, EgressMessage, EgressSender};
pub use mqtt_egress::MqttPublisher;
