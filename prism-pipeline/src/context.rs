//! Shared run context
//!
//! A run's context maps output names to object lists. It is owned
//! exclusively by the runner; handlers read slices and return fresh
//! output maps that the runner commits after validation.

use std::collections::BTreeMap;

use prism_core::IntelObject;

/// Outputs a handler proposes for commit, keyed by context name.
pub type StageOutputs = BTreeMap<String, Vec<IntelObject>>;

#[derive(Debug, Default)]
pub struct Context {
    entries: BTreeMap<String, Vec<IntelObject>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[IntelObject]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn insert(&mut self, name: impl Into<String>, objects: Vec<IntelObject>) {
        self.entries.insert(name.into(), objects);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Objects from the named entries, cloned in order.
    pub fn gather(&self, names: &[String]) -> Vec<IntelObject> {
        let mut merged = Vec::new();
        for name in names {
            if let Some(objects) = self.entries.get(name) {
                merged.extend(objects.iter().cloned());
            }
        }
        merged
    }

    /// Objects from the named entries whose name starts with `prefix`.
    pub fn gather_prefixed(&self, names: &[String], prefix: &str) -> Vec<IntelObject> {
        let mut merged = Vec::new();
        for name in names {
            if !name.starts_with(prefix) {
                continue;
            }
            if let Some(objects) = self.entries.get(name) {
                merged.extend(objects.iter().cloned());
            }
        }
        merged
    }

    /// Objects from every context entry whose name starts with `prefix`.
    pub fn gather_all_prefixed(&self, prefix: &str) -> Vec<IntelObject> {
        let mut merged = Vec::new();
        for (name, objects) in &self.entries {
            if name.starts_with(prefix) {
                merged.extend(objects.iter().cloned());
            }
        }
        merged
    }

    pub fn entry_counts(&self) -> BTreeMap<String, usize> {
        self.entries
            .iter()
            .map(|(name, objects)| (name.clone(), objects.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use prism_core::{Entity, EntityType, Envelope};

    fn entity(id: &str) -> IntelObject {
        IntelObject::Entity(Entity {
            envelope: Envelope::new(id, Utc::now()),
            entity_type: EntityType::Topic,
            name: id.to_string(),
            aliases: Vec::new(),
            evidence: Vec::new(),
        })
    }

    #[test]
    fn test_gather_prefixed_filters_names() {
        let mut ctx = Context::new();
        ctx.insert("artifacts_visible", vec![entity("a1")]);
        ctx.insert("artifacts_infra", vec![entity("a2")]);
        ctx.insert("signals_uv", vec![entity("s1")]);

        let names = vec![
            "artifacts_visible".to_string(),
            "artifacts_infra".to_string(),
            "signals_uv".to_string(),
        ];
        assert_eq!(ctx.gather_prefixed(&names, "artifacts").len(), 2);
        assert_eq!(ctx.gather_all_prefixed("signals").len(), 1);
        assert_eq!(ctx.gather(&names).len(), 3);
    }
}
