//! Background maintenance sweeps
//!
//! Each sweep takes the tracker lock for its whole duration. The run loop
//! drives them on intervals; `now` is a parameter so tests can replay time.

use super::Tracker;
use crate::domain::types::{EventKind, TagEvent, TagState};
use tracing::{debug, info};

impl Tracker {
    /// Evict tags not read within the age-out horizon. Returns the number evicted.
    pub fn ageout(&self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.config.age_out_ms());
        let (removed, remaining) = {
            let mut state = self.state.lock();
            let removed = state.tags.remove_read_before(cutoff);
            (removed, state.tags.len())
        };

        if removed > 0 {
            self.metrics.record_aged_out(removed as u64);
            info!(removed = %removed, remaining = %remaining, cutoff = %cutoff, "tags_aged_out");
        }
        removed
    }

    /// Finalize exiting tags that have gone quiet into DepartedExit.
    /// Returns the number of departures emitted.
    pub fn aggregate_departed(&self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.config.aggregate_departed_threshold_ms());
        let mut departed = Vec::new();

        {
            let mut state = self.state.lock();
            let super::TrackerState { tags, exiting, .. } = &mut *state;

            exiting.retain(|facility_id, epc| {
                let Some(tag) = tags.get_mut(epc) else {
                    debug!(epc = %epc, facility_id = %facility_id, "exiting_tag_missing");
                    return false;
                };
                if tag.state != TagState::Exiting {
                    debug!(epc = %epc, state = %tag.state, "exiting_tag_state_changed");
                    return false;
                }
                if tag.last_read >= cutoff {
                    return true;
                }

                let ts = tag.last_read;
                tag.set_state(TagState::DepartedExit, ts);
                info!(
                    epc = %epc,
                    facility_id = %facility_id,
                    location = %tag.location,
                    last_read = %ts,
                    "tag_departed_exit"
                );
                departed.push(TagEvent::new(tag, EventKind::Departed, ts));
                false
            });

            for event in departed.iter().cloned() {
                self.emit(event);
            }
        }

        if !departed.is_empty() {
            self.metrics.record_exit_departures(departed.len() as u64);
        }
        departed.len()
    }

    /// Return every exiting tag to Present and empty all exiting sets.
    /// Returns the number of tags restored.
    pub fn clear_exiting(&self) -> usize {
        let mut state = self.state.lock();
        let super::TrackerState { tags, exiting, .. } = &mut *state;

        let mut restored = 0usize;
        for epc in exiting.clear() {
            if let Some(tag) = tags.get_mut(&epc) {
                if tag.state == TagState::Exiting {
                    let ts = tag.last_arrived;
                    tag.set_state(TagState::Present, ts);
                    restored += 1;
                }
            }
        }
        // Exiting tags are always in a set, but sweep the registry too
        for tag in tags.iter_mut().filter(|t| t.state == TagState::Exiting) {
            let ts = tag.last_arrived;
            tag.set_state(TagState::Present, ts);
            restored += 1;
        }

        info!(restored = %restored, "exiting_cleared");
        restored
    }
}
