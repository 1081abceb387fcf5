//! Domain models - core tracking types and numerics
//!
//! This module contains the canonical data types used throughout the system:
//! - `Tag` - a tracked item and its presence state
//! - `Sensor` - a reader and its personality
//! - `SensorReport` / `TagRead` - inbound read batches
//! - `TagEvent` - outbound presence transitions
//! - `signal` - power-domain RSSI smoothing
//! - `mobility` - time-decayed location hysteresis

pub mod mobility;
pub mod signal;
pub mod types;

// Re-export commonly used types at module level
pub use mobility::MobilityProfile;
pub use signal::{CircularBuffer, SignalStats};
pub use types::{
    EventKind, LocationChange, Personality, Sensor, SensorConfig, SensorReport, Tag, TagEvent,
    TagRead, TagState,
};
