use crate::store::JsonStore;
use anyhow::Result;
use std::collections::HashMap;

/// Operator-assigned display names keyed by node id.
#[derive(Clone)]
pub struct AliasService {
    store: JsonStore<HashMap<String, String>>,
}

impl AliasService {
    pub fn new(store: JsonStore<HashMap<String, String>>) -> Self {
        Self { store }
    }

    /// Stores the trimmed name for `id`. A name that trims to nothing
    /// removes the alias instead.
    pub fn set(&self, id: &str, name: &str) -> Result<()> {
        let trimmed = name.trim().to_string();
        self.store.update(|aliases| {
            if trimmed.is_empty() {
                aliases.remove(id);
            } else {
                aliases.insert(id.to_string(), trimmed);
            }
        })
    }

    /// The display name for `id`: its alias when one exists, the id itself
    /// otherwise. Resolution never fails.
    pub fn resolve(&self, id: &str) -> String {
        self.store
            .read(|aliases| aliases.get(id).cloned())
            .ok()
            .flatten()
            .unwrap_or_else(|| id.to_string())
    }
}
