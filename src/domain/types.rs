//! Shared types for the tag tracker

use crate::domain::signal::SignalStats;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Facility assigned to sensors that have not been configured yet
pub const UNKNOWN_FACILITY: &str = "UNKNOWN";

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Role of a sensor, governing which presence transitions it may trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    #[default]
    #[serde(alias = "NONE")]
    None,
    #[serde(alias = "EXIT")]
    Exit,
    #[serde(alias = "POS")]
    Pos,
    #[serde(alias = "FITTING_ROOM")]
    FittingRoom,
}

impl Personality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Personality::None => "none",
            Personality::Exit => "exit",
            Personality::Pos => "pos",
            Personality::FittingRoom => "fitting_room",
        }
    }
}

/// Presence state of a tracked tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagState {
    #[default]
    Unknown,
    Present,
    Exiting,
    DepartedExit,
    DepartedPos,
}

impl TagState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagState::Unknown => "unknown",
            TagState::Present => "present",
            TagState::Exiting => "exiting",
            TagState::DepartedExit => "departed_exit",
            TagState::DepartedPos => "departed_pos",
        }
    }
}

impl std::fmt::Display for TagState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of travel. Never computed; always `Stationary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Stationary,
}

/// A tracked item, keyed by EPC
#[derive(Debug, Clone)]
pub struct Tag {
    pub epc: String,
    pub tid: Option<String>,
    /// Antenna alias of the current location ("" until first placement)
    pub location: String,
    /// Device id of the current location
    pub device_location: String,
    pub facility_id: String,
    pub last_read: u64,
    pub last_arrived: u64,
    pub last_departed: u64,
    pub state: TagState,
    pub direction: Direction,
    /// Signal history per antenna alias
    pub stats: FxHashMap<String, SignalStats>,
}

impl Tag {
    pub fn new(epc: &str) -> Self {
        Self {
            epc: epc.to_string(),
            tid: None,
            location: String::new(),
            device_location: String::new(),
            facility_id: String::new(),
            last_read: 0,
            last_arrived: 0,
            last_departed: 0,
            state: TagState::Unknown,
            direction: Direction::Stationary,
            stats: FxHashMap::default(),
        }
    }

    /// Change state, stamping the arrival or departure time it implies
    pub fn set_state(&mut self, state: TagState, timestamp: u64) {
        match state {
            TagState::Present => self.last_arrived = timestamp,
            TagState::DepartedExit | TagState::DepartedPos => self.last_departed = timestamp,
            TagState::Unknown | TagState::Exiting => {}
        }
        self.state = state;
    }
}

/// A physical reader, keyed by device id
#[derive(Debug, Clone)]
pub struct Sensor {
    pub device_id: String,
    pub facility_id: String,
    pub personality: Personality,
    pub is_in_deep_scan: bool,
    /// Reads below this RSSI (tenths of a dBm) are dropped
    pub min_rssi_filter: Option<i32>,
    /// Antenna id -> configured alias
    pub antenna_aliases: FxHashMap<String, String>,
    /// Mobility profile id; None uses the default profile
    pub mobility_profile: Option<String>,
}

impl Sensor {
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            facility_id: UNKNOWN_FACILITY.to_string(),
            personality: Personality::None,
            is_in_deep_scan: false,
            min_rssi_filter: None,
            antenna_aliases: FxHashMap::default(),
            mobility_profile: None,
        }
    }

    /// Location key for an antenna: the configured alias, or "{device_id}-{antenna_id}"
    pub fn antenna_alias(&self, antenna_id: &str) -> String {
        self.antenna_aliases
            .get(antenna_id)
            .cloned()
            .unwrap_or_else(|| format!("{}-{}", self.device_id, antenna_id))
    }

    #[inline]
    pub fn is_filtered(&self, rssi: i32) -> bool {
        self.min_rssi_filter.is_some_and(|min| rssi < min)
    }

    /// Overwrite the configurable fields from an upsert
    pub fn apply(&mut self, config: &SensorConfig) {
        self.personality = config.personality;
        self.facility_id = config.facility_id.clone();
        self.is_in_deep_scan = config.is_in_deep_scan;
        self.min_rssi_filter = config.min_rssi_filter;
        self.antenna_aliases = config.antenna_aliases.clone();
        self.mobility_profile = config.mobility_profile.clone();
    }
}

fn default_facility() -> String {
    UNKNOWN_FACILITY.to_string()
}

/// Sensor configuration upsert, from the config file or the config topic
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub device_id: String,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default = "default_facility")]
    pub facility_id: String,
    #[serde(default)]
    pub is_in_deep_scan: bool,
    #[serde(default)]
    pub min_rssi_filter: Option<i32>,
    #[serde(default)]
    pub antenna_aliases: FxHashMap<String, String>,
    #[serde(default)]
    pub mobility_profile: Option<String>,
}

impl SensorConfig {
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            personality: Personality::None,
            facility_id: default_facility(),
            is_in_deep_scan: false,
            min_rssi_filter: None,
            antenna_aliases: FxHashMap::default(),
            mobility_profile: None,
        }
    }

    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = personality;
        self
    }

    pub fn with_facility(mut self, facility_id: &str) -> Self {
        self.facility_id = facility_id.to_string();
        self
    }

    pub fn with_deep_scan(mut self, deep_scan: bool) -> Self {
        self.is_in_deep_scan = deep_scan;
        self
    }

    pub fn with_min_rssi(mut self, min_rssi: i32) -> Self {
        self.min_rssi_filter = Some(min_rssi);
        self
    }

    pub fn with_antenna_alias(mut self, antenna_id: &str, alias: &str) -> Self {
        self.antenna_aliases.insert(antenna_id.to_string(), alias.to_string());
        self
    }

    pub fn with_mobility_profile(mut self, profile_id: &str) -> Self {
        self.mobility_profile = Some(profile_id.to_string());
        self
    }
}

/// One batch of reads from a single sensor
#[derive(Debug, Clone, Deserialize)]
pub struct SensorReport {
    /// Can be ISO 8601 string or epoch milliseconds
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub sent_on: u64,
    #[serde(default)]
    pub period: u64,
    pub device_id: String,
    #[serde(default)]
    pub facility_id: String,
    #[serde(default)]
    pub motion_detected: bool,
    #[serde(default)]
    pub data: Vec<TagRead>,
}

/// A single tag read within a report
#[derive(Debug, Clone, Deserialize)]
pub struct TagRead {
    pub epc: String,
    #[serde(default)]
    pub tid: String,
    /// Opaque; numeric ids are accepted and stringified
    #[serde(deserialize_with = "deserialize_antenna_id")]
    pub antenna_id: String,
    /// Epoch milliseconds
    pub last_read_on: u64,
    /// Tenths of a dBm
    pub rssi: i32,
    #[serde(default)]
    pub phase: i32,
    #[serde(default)]
    pub frequency: i32,
}

impl TagRead {
    pub fn new(epc: &str, antenna_id: &str, rssi: i32, last_read_on: u64) -> Self {
        Self {
            epc: epc.to_string(),
            tid: String::new(),
            antenna_id: antenna_id.to_string(),
            last_read_on,
            rssi,
            phase: 0,
            frequency: 0,
        }
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an RFC 3339 string or integer epoch milliseconds")
        }

        fn visit_str<E>(self, value: &str) -> Result<u64, E>
        where
            E: de::Error,
        {
            OffsetDateTime::parse(value, &Rfc3339)
                .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as u64)
                .map_err(|e| E::custom(format!("invalid timestamp {value:?}: {e}")))
        }

        fn visit_u64<E>(self, value: u64) -> Result<u64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<u64, E>
        where
            E: de::Error,
        {
            u64::try_from(value).map_err(|_| E::custom(format!("negative timestamp {value}")))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

fn deserialize_antenna_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct AntennaVisitor;

    impl<'de> Visitor<'de> for AntennaVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer antenna id")
        }

        fn visit_str<E>(self, value: &str) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(AntennaVisitor)
}

/// Kind of presence transition reported to the event sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Arrival,
    Moved,
    Departed,
    Returned,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Arrival => "arrival",
            EventKind::Moved => "moved",
            EventKind::Departed => "departed",
            EventKind::Returned => "returned",
        }
    }
}

/// Where a tag was before a facility change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorLocation {
    pub location: String,
    pub facility_id: String,
    pub timestamp: u64,
}

/// A presence transition
#[derive(Debug, Clone, Serialize)]
pub struct TagEvent {
    /// UUIDv7, for downstream de-duplication
    pub event_id: String,
    pub epc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    pub facility_id: String,
    pub location: String,
    pub kind: EventKind,
    pub timestamp: u64,
    /// Set on departures caused by a facility change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior: Option<PriorLocation>,
}

impl TagEvent {
    pub fn new(tag: &Tag, kind: EventKind, timestamp: u64) -> Self {
        Self {
            event_id: new_uuid_v7(),
            epc: tag.epc.clone(),
            tid: tag.tid.clone(),
            facility_id: tag.facility_id.clone(),
            location: tag.location.clone(),
            kind,
            timestamp,
            prior: None,
        }
    }

    pub fn with_prior(mut self, prior: PriorLocation) -> Self {
        self.prior = Some(prior);
        self
    }
}

/// An accepted location change, handed to the history hook
#[derive(Debug, Clone, Serialize)]
pub struct LocationChange {
    pub epc: String,
    pub location: String,
    pub device_id: String,
    pub facility_id: String,
    pub timestamp: u64,
}
