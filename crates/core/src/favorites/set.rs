use std::collections::HashSet;

use crate::models::{CatalogEntry, EntryId};

/// Favorited entries in insertion order, with no two sharing an id.
#[derive(Debug, Clone, Default)]
pub struct FavoritesSet {
    entries: Vec<CatalogEntry>,
    ids: HashSet<EntryId>,
}

impl FavoritesSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a stored snapshot, keeping the first copy of any repeated id.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            if !set.contains(&entry.id) {
                set.ids.insert(entry.id.clone());
                set.entries.push(entry);
            }
        }
        set
    }

    /// Parse a serialized snapshot.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(raw)?;
        Ok(Self::from_entries(entries))
    }

    /// Serialize the full snapshot.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.entries)
    }

    /// Membership by id.
    pub fn contains(&self, id: &EntryId) -> bool {
        self.ids.contains(id)
    }

    /// Add `entry` if its id is absent, otherwise remove the stored copy.
    /// Returns `true` when the entry is a favorite afterwards.
    pub fn toggle(&mut self, entry: CatalogEntry) -> bool {
        if self.remove(&entry.id) {
            false
        } else {
            self.ids.insert(entry.id.clone());
            self.entries.push(entry);
            true
        }
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub fn remove(&mut self, id: &EntryId) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.entries.retain(|entry| &entry.id != id);
        true
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of favorites.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is favorited.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
