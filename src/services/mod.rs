//! Services - business logic and state management
//!
//! - `tracker` - Central read processor: location resolution, presence state, maintenance
//! - `tag_registry` - Tracked tags keyed by EPC
//! - `sensor_registry` - Known readers keyed by device id
//! - `exiting` - Per-facility set of tags pending exit departure
//! - `sink` - Outbound interface for events and location history

pub mod exiting;
pub mod sensor_registry;
pub mod sink;
pub mod tag_registry;
pub mod tracker;

// Re-export commonly used types
pub use sink::{EventSink, MemorySink, NullSink};
pub use tracker::{Tracker, TrackerInput};
