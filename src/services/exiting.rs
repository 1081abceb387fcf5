//! Exiting set - per-facility holding area for tags pending departure
//!
//! Holds EPCs (not tags) in insertion order; the tag registry stays the
//! single owner of tag state.

use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct ExitingSet {
    facilities: FxHashMap<String, Vec<String>>,
}

impl ExitingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an EPC to a facility's set. Returns false if it was already there.
    pub fn insert(&mut self, facility_id: &str, epc: &str) -> bool {
        let epcs = self.facilities.entry(facility_id.to_string()).or_default();
        if epcs.iter().any(|e| e == epc) {
            return false;
        }
        epcs.push(epc.to_string());
        true
    }

    pub fn contains(&self, facility_id: &str, epc: &str) -> bool {
        self.facilities.get(facility_id).is_some_and(|epcs| epcs.iter().any(|e| e == epc))
    }

    /// Keep only the EPCs for which `keep(facility_id, epc)` returns true,
    /// dropping facilities left empty
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &str) -> bool,
    {
        for (facility_id, epcs) in self.facilities.iter_mut() {
            epcs.retain(|epc| keep(facility_id, epc));
        }
        self.facilities.retain(|_, epcs| !epcs.is_empty());
    }

    /// Empty every facility's set, returning all EPCs that were held
    pub fn clear(&mut self) -> Vec<String> {
        self.facilities.drain().flat_map(|(_, epcs)| epcs).collect()
    }

    /// Number of EPCs held for one facility
    pub fn count(&self, facility_id: &str) -> usize {
        self.facilities.get(facility_id).map_or(0, Vec::len)
    }

    /// Number of EPCs held across all facilities
    pub fn len(&self) -> usize {
        self.facilities.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = ExitingSet::new();
        assert!(set.insert("store", "EPC1"));
        assert!(!set.insert("store", "EPC1"));
        assert!(set.insert("dc", "EPC1"));

        assert_eq!(set.count("store"), 1);
        assert_eq!(set.len(), 2);
        assert!(set.contains("dc", "EPC1"));
    }

    #[test]
    fn test_retain_preserves_order_and_drops_empty() {
        let mut set = ExitingSet::new();
        set.insert("store", "A");
        set.insert("store", "B");
        set.insert("store", "C");
        set.insert("dc", "D");

        let mut seen = Vec::new();
        set.retain(|facility, epc| {
            seen.push(format!("{facility}/{epc}"));
            epc != "B" && epc != "D"
        });

        assert!(seen.contains(&"store/A".to_string()));
        assert_eq!(set.count("store"), 2);
        assert_eq!(set.count("dc"), 0);
        assert!(!set.contains("store", "B"));
    }

    #[test]
    fn test_clear_returns_everything() {
        let mut set = ExitingSet::new();
        set.insert("store", "A");
        set.insert("dc", "B");

        let mut drained = set.clear();
        drained.sort();
        assert_eq!(drained, vec!["A".to_string(), "B".to_string()]);
        assert!(set.is_empty());
    }
}
