use std::collections::HashMap;

use crate::model::CosmeticRender;

/// Saved renders grouped by owning base id, each group in load order.
/// A base with no renders has no group at all.
#[derive(Debug, Default)]
pub struct RenderCollection {
    groups: HashMap<String, Vec<CosmeticRender>>,
}

impl RenderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a base's group with freshly fetched renders.
    pub fn replace_group(&mut self, base_id: &str, renders: Vec<CosmeticRender>) {
        if renders.is_empty() {
            self.groups.remove(base_id);
        } else {
            self.groups.insert(base_id.to_string(), renders);
        }
    }

    pub fn renders_for(&self, base_id: &str) -> &[CosmeticRender] {
        self.groups.get(base_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count_for(&self, base_id: &str) -> usize {
        self.renders_for(base_id).len()
    }

    pub fn has_renders(&self, base_id: &str) -> bool {
        self.groups.contains_key(base_id)
    }

    pub fn find(&self, render_id: &str) -> Option<&CosmeticRender> {
        self.groups
            .values()
            .flatten()
            .find(|r| r.id.as_deref() == Some(render_id))
    }

    /// Append a newly persisted render to its base's group.
    pub fn push(&mut self, render: CosmeticRender) {
        self.groups
            .entry(render.base_structure_id.clone())
            .or_default()
            .push(render);
    }

    /// Remove a render from whichever group holds it. Empty groups are dropped.
    pub fn remove(&mut self, render_id: &str) -> Option<CosmeticRender> {
        let (base_id, idx) = self.groups.iter().find_map(|(base_id, group)| {
            group
                .iter()
                .position(|r| r.id.as_deref() == Some(render_id))
                .map(|idx| (base_id.clone(), idx))
        })?;
        let group = self.groups.get_mut(&base_id)?;
        let removed = group.remove(idx);
        if group.is_empty() {
            self.groups.remove(&base_id);
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
