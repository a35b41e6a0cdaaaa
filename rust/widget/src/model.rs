// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model handles and selection maps.
//!
//! Loaded models live in a [`ModelSet`] keyed by generational [`ModelKey`]s,
//! so a key held by a stale selection never aliases a model loaded later into
//! the same slot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};

use crate::engine::LoadedModel;

new_key_type! {
    /// Key of one model attached to the scene.
    pub struct ModelKey;
}

/// Element-local id inside one model (the STEP express id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl From<u32> for ElementId {
    fn from(id: u32) -> Self {
        ElementId(id)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Models currently attached to the scene, in insertion order.
#[derive(Default)]
pub struct ModelSet {
    models: SlotMap<ModelKey, Rc<dyn LoadedModel>>,
    order: Vec<ModelKey>,
}

impl ModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: Rc<dyn LoadedModel>) -> ModelKey {
        let key = self.models.insert(model);
        self.order.push(key);
        key
    }

    pub fn remove(&mut self, key: ModelKey) -> Option<Rc<dyn LoadedModel>> {
        let model = self.models.remove(key)?;
        self.order.retain(|k| *k != key);
        Some(model)
    }

    pub fn get(&self, key: ModelKey) -> Option<&Rc<dyn LoadedModel>> {
        self.models.get(key)
    }

    pub fn contains(&self, key: ModelKey) -> bool {
        self.models.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[ModelKey] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelKey, &Rc<dyn LoadedModel>)> {
        self.order
            .iter()
            .filter_map(move |key| self.models.get(*key).map(|model| (*key, model)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove every model, returning them in insertion order.
    pub fn drain(&mut self) -> Vec<(ModelKey, Rc<dyn LoadedModel>)> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|key| self.models.remove(key).map(|model| (key, model)))
            .collect()
    }
}

impl fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(key, model)| (key, model.name().to_string())))
            .finish()
    }
}

/// Highlighted element ids per model.
///
/// Entries never hold an empty id set, so [`SelectionMap::is_empty`] is true
/// exactly when nothing is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionMap {
    entries: BTreeMap<ModelKey, BTreeSet<ElementId>>,
}

impl SelectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`SelectionMap::insert`].
    pub fn with(mut self, key: ModelKey, ids: impl IntoIterator<Item = ElementId>) -> Self {
        self.insert(key, ids);
        self
    }

    /// Add ids to a model's entry.
    pub fn insert(&mut self, key: ModelKey, ids: impl IntoIterator<Item = ElementId>) {
        let ids: BTreeSet<ElementId> = ids.into_iter().collect();
        if ids.is_empty() {
            return;
        }
        self.entries.entry(key).or_default().extend(ids);
    }

    pub fn get(&self, key: ModelKey) -> Option<&BTreeSet<ElementId>> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: ModelKey, id: ElementId) -> bool {
        self.entries.get(&key).is_some_and(|ids| ids.contains(&id))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn element_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn models(&self) -> impl Iterator<Item = ModelKey> + '_ {
        self.entries.keys().copied()
    }

    /// Entries ordered like the model set; entries for models outside the
    /// set come last, in key order.
    pub fn ordered<'a>(&'a self, models: &ModelSet) -> Vec<(ModelKey, &'a BTreeSet<ElementId>)> {
        let mut out: Vec<_> = models
            .keys()
            .iter()
            .filter_map(|key| self.entries.get(key).map(|ids| (*key, ids)))
            .collect();
        out.extend(
            self.entries
                .iter()
                .filter(|(key, _)| !models.contains(**key))
                .map(|(key, ids)| (*key, ids)),
        );
        out
    }

    /// Drop entries for models that are no longer loaded. Returns how many were dropped.
    pub fn retain_models(&mut self, models: &ModelSet) -> usize {
        self.retain_keys(|key| models.contains(key))
    }

    /// Keep only entries whose key passes `keep`. Returns how many were dropped.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(ModelKey) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep(*key));
        before - self.entries.len()
    }
}
