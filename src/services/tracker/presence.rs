//! Presence state machine
//!
//! Evaluated once per read, after location resolution, from the tag's
//! state before the read and the reading sensor's personality:
//!
//! | State        | POS sensor                      | Other sensor                           |
//! |--------------|---------------------------------|----------------------------------------|
//! | Unknown      | -                               | -> Present, Arrival                    |
//! | Present      | depart via POS, else movement   | exiting check, movement                |
//! | Exiting      | depart via POS                  | -> Present if non-exit at same device, movement |
//! | DepartedExit | -                               | return, exiting check                  |
//! | DepartedPos  | -                               | after return threshold: return, exiting check |

use crate::domain::types::{
    EventKind, Personality, PriorLocation, Sensor, Tag, TagEvent, TagState,
};
use crate::infra::config::Config;
use crate::services::exiting::ExitingSet;
use smallvec::SmallVec;
use tracing::info;

/// At most two events per read (departure + arrival on a facility change)
pub(crate) type Events = SmallVec<[TagEvent; 2]>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct PresenceThresholds {
    pub(crate) pos_departed_ms: u64,
    pub(crate) pos_return_ms: u64,
}

impl PresenceThresholds {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            pos_departed_ms: config.pos_departed_threshold_ms(),
            pos_return_ms: config.pos_return_threshold_ms(),
        }
    }
}

/// Where the tag was before the current read was applied
#[derive(Debug, Clone)]
pub(crate) struct PreviousLocation {
    pub(crate) location: String,
    pub(crate) facility_id: String,
    pub(crate) last_read: u64,
}

impl PreviousLocation {
    pub(crate) fn of(tag: &Tag) -> Self {
        Self {
            location: tag.location.clone(),
            facility_id: tag.facility_id.clone(),
            last_read: tag.last_read,
        }
    }
}

/// Apply the transition for one read. `tag` already reflects the read's
/// location resolution; its `state` is still the pre-read state.
pub(crate) fn transition(
    tag: &mut Tag,
    sensor: &Sensor,
    previous: &PreviousLocation,
    exiting: &mut ExitingSet,
    thresholds: &PresenceThresholds,
) -> Events {
    let mut events = Events::new();
    let is_pos = sensor.personality == Personality::Pos;
    let now = tag.last_read;

    match (tag.state, is_pos) {
        // POS sensors never create presence
        (TagState::Unknown, true) => {}
        (TagState::Unknown, false) => {
            set_state(tag, TagState::Present, now);
            events.push(TagEvent::new(tag, EventKind::Arrival, now));
        }
        (TagState::Present, true) => {
            if !check_depart_pos(tag, thresholds, &mut events) {
                check_movement(tag, previous, &mut events);
            }
        }
        (TagState::Present, false) => {
            check_exiting(tag, sensor, exiting);
            check_movement(tag, previous, &mut events);
        }
        (TagState::Exiting, true) => {
            check_depart_pos(tag, thresholds, &mut events);
        }
        (TagState::Exiting, false) => {
            if sensor.personality != Personality::Exit && sensor.device_id == tag.device_location {
                set_state(tag, TagState::Present, now);
            }
            check_movement(tag, previous, &mut events);
        }
        (TagState::DepartedExit, true) | (TagState::DepartedPos, true) => {}
        (TagState::DepartedExit, false) => {
            do_tag_return(tag, previous, &mut events);
            check_exiting(tag, sensor, exiting);
        }
        (TagState::DepartedPos, false) => {
            if tag.last_departed < tag.last_read.saturating_sub(thresholds.pos_return_ms) {
                do_tag_return(tag, previous, &mut events);
                check_exiting(tag, sensor, exiting);
            }
        }
    }

    events
}

fn set_state(tag: &mut Tag, state: TagState, timestamp: u64) {
    if tag.state != state {
        info!(
            epc = %tag.epc,
            from = %tag.state,
            to = %state,
            location = %tag.location,
            facility_id = %tag.facility_id,
            "tag_state_changed"
        );
    }
    tag.set_state(state, timestamp);
}

/// Depart through a point of sale once the tag has been present long enough
fn check_depart_pos(tag: &mut Tag, thresholds: &PresenceThresholds, events: &mut Events) -> bool {
    if tag.last_arrived < tag.last_read.saturating_sub(thresholds.pos_departed_ms) {
        let now = tag.last_read;
        set_state(tag, TagState::DepartedPos, now);
        events.push(TagEvent::new(tag, EventKind::Departed, now));
        return true;
    }
    false
}

/// Start exiting when seen by the exit sensor that currently holds the tag
fn check_exiting(tag: &mut Tag, sensor: &Sensor, exiting: &mut ExitingSet) {
    if sensor.personality == Personality::Exit && sensor.device_id == tag.device_location {
        let now = tag.last_read;
        set_state(tag, TagState::Exiting, now);
        exiting.insert(&sensor.facility_id, &tag.epc);
    }
}

/// Report a location change: Moved within a facility, Departed + Arrival across facilities
fn check_movement(tag: &Tag, previous: &PreviousLocation, events: &mut Events) {
    if previous.location.is_empty() || previous.location == tag.location {
        return;
    }

    if previous.facility_id != tag.facility_id {
        let prior = PriorLocation {
            location: previous.location.clone(),
            facility_id: previous.facility_id.clone(),
            timestamp: previous.last_read,
        };
        let mut departed = TagEvent::new(tag, EventKind::Departed, previous.last_read);
        departed.location = previous.location.clone();
        departed.facility_id = previous.facility_id.clone();
        events.push(departed.with_prior(prior));
        events.push(TagEvent::new(tag, EventKind::Arrival, tag.last_read));
    } else {
        events.push(TagEvent::new(tag, EventKind::Moved, tag.last_read));
    }
}

/// Bring a departed tag back: Returned to the same facility, otherwise Arrival
fn do_tag_return(tag: &mut Tag, previous: &PreviousLocation, events: &mut Events) {
    let now = tag.last_read;
    let kind = if !previous.facility_id.is_empty() && previous.facility_id == tag.facility_id {
        EventKind::Returned
    } else {
        EventKind::Arrival
    };
    set_state(tag, TagState::Present, now);
    events.push(TagEvent::new(tag, kind, now));
}
