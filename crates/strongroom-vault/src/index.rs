//! In-memory secret index

use std::collections::HashMap;

/// Content state of one indexed secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretEntry {
    /// Present in storage, content not read yet
    Unloaded,
    /// Content cached in memory
    Loaded(Vec<u8>),
}

/// Secret name to entry mapping.
///
/// `generation` moves on every change so a reader that hydrated an entry
/// from storage can tell whether the index changed underneath it.
#[derive(Debug, Default)]
pub struct SecretIndex {
    entries: HashMap<String, SecretEntry>,
    generation: u64,
}

impl SecretIndex {
    /// Index of names found in storage, none of them loaded
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: names
                .into_iter()
                .map(|name| (name, SecretEntry::Unloaded))
                .collect(),
            generation: 0,
        }
    }

    /// Entry for `name`, if indexed
    pub fn get(&self, name: &str) -> Option<&SecretEntry> {
        self.entries.get(name)
    }

    /// Whether `name` is indexed
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Indexed names in no particular order
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of indexed secrets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no secrets are indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Change counter observed before an unlocked storage read
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Insert or overwrite an entry with loaded content
    pub fn store(&mut self, name: &str, content: Vec<u8>) {
        self.entries
            .insert(name.to_string(), SecretEntry::Loaded(content));
        self.generation += 1;
    }

    /// Drop an entry
    pub fn remove(&mut self, name: &str) -> Option<SecretEntry> {
        let removed = self.entries.remove(name);
        self.generation += 1;
        removed
    }

    /// Cache content read from storage, unless the index changed since
    /// `generation` was observed
    pub fn hydrate(&mut self, name: &str, content: Vec<u8>, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        match self.entries.get_mut(name) {
            Some(entry @ SecretEntry::Unloaded) => {
                *entry = SecretEntry::Loaded(content);
                true
            }
            _ => false,
        }
    }

    /// Swap in a freshly scanned index
    pub fn replace(&mut self, other: SecretIndex) {
        self.entries = other.entries;
        self.generation += 1;
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }
}
