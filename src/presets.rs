use std::collections::BTreeMap;

/// Bidirectional preset name/id registry
///
/// Entries accumulate for the lifetime of the session and are never removed,
/// so a renamed preset keeps its old name as a stale alias. Callers only use
/// `observe`, `id_for` and `name_for`, so an eviction policy can live here.
#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    by_name: BTreeMap<String, String>,
    by_id: BTreeMap<String, String>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a preset reported by the speaker
    pub fn observe(&mut self, id: &str, name: &str) {
        self.by_name.insert(name.to_string(), id.to_string());
        self.by_id.insert(id.to_string(), name.to_string());
    }

    /// Preset id for a name
    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// Preset name for an id
    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    /// All known names, sorted
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
