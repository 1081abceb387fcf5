//! Tag registry - the live set of tracked items, keyed by EPC

use crate::domain::types::Tag;
use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: FxHashMap<String, Tag>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the tag for `epc`, creating it in state Unknown if unseen
    pub fn get_or_create(&mut self, epc: &str) -> &mut Tag {
        self.tags.entry(epc.to_string()).or_insert_with(|| {
            debug!(epc = %epc, "tag_created");
            Tag::new(epc)
        })
    }

    pub fn get(&self, epc: &str) -> Option<&Tag> {
        self.tags.get(epc)
    }

    pub fn get_mut(&mut self, epc: &str) -> Option<&mut Tag> {
        self.tags.get_mut(epc)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tag> {
        self.tags.values_mut()
    }

    /// Evict every tag whose last read is older than `cutoff` (epoch ms).
    /// Returns the number removed.
    pub fn remove_read_before(&mut self, cutoff: u64) -> usize {
        let before = self.tags.len();
        self.tags.retain(|_, tag| tag.last_read >= cutoff);
        before - self.tags.len()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
