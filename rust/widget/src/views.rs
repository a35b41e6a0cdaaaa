// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data-bound side panel views and their binder.
//!
//! Views never read the model set directly. The [`ViewBinder`] hands each
//! view a [`ViewBinding`] whose selection is pruned to the bound models, so a
//! view cannot render rows for a model that left the scene.
//!
//! View state changes go through [`ViewCommand`]s; every command re-renders
//! the affected view.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::engine::LoadedModel;
use crate::model::{ElementId, ModelKey, ModelSet, SelectionMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewId {
    Properties,
    SpatialTree,
}

impl ViewId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewId::Properties => "properties",
            ViewId::SpatialTree => "spatialTree",
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit view state mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    /// Client-side text filter; `None` removes it.
    SetQuery(Option<String>),
    ToggleExpanded,
    SetExpanded(bool),
    SetPreserveStructureOnFilter(bool),
}

impl ViewCommand {
    /// Query command from raw search input. Empty input clears the filter.
    pub fn query(input: &str) -> Self {
        if input.is_empty() {
            ViewCommand::SetQuery(None)
        } else {
            ViewCommand::SetQuery(Some(input.to_string()))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub query_string: Option<String>,
    pub expanded: bool,
    pub preserve_structure_on_filter: bool,
}

impl ViewState {
    fn apply(&mut self, command: &ViewCommand) {
        match command {
            ViewCommand::SetQuery(query) => self.query_string = query.clone().filter(|q| !q.is_empty()),
            ViewCommand::ToggleExpanded => self.expanded = !self.expanded,
            ViewCommand::SetExpanded(expanded) => self.expanded = *expanded,
            ViewCommand::SetPreserveStructureOnFilter(preserve) => self.preserve_structure_on_filter = *preserve,
        }
    }
}

/// Models and selection a view renders.
#[derive(Clone, Default)]
pub struct ViewBinding {
    models: Vec<(ModelKey, Rc<dyn LoadedModel>)>,
    selection: SelectionMap,
}

impl ViewBinding {
    pub fn models(&self) -> &[(ModelKey, Rc<dyn LoadedModel>)] {
        &self.models
    }

    pub fn selection(&self) -> &SelectionMap {
        &self.selection
    }

    pub fn contains(&self, key: ModelKey) -> bool {
        self.models.iter().any(|(k, _)| *k == key)
    }

    pub fn keys(&self) -> Vec<ModelKey> {
        self.models.iter().map(|(key, _)| *key).collect()
    }
}

impl fmt::Debug for ViewBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewBinding")
            .field("models", &self.keys())
            .field("selection", &self.selection)
            .finish()
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewRow {
    pub depth: usize,
    pub label: String,
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub selected: bool,
}

impl ViewRow {
    fn group(depth: usize, label: impl Into<String>) -> Self {
        Self {
            depth,
            label: label.into(),
            value: None,
            guid: None,
            selected: false,
        }
    }

    fn field(depth: usize, label: impl Into<String>, value: Option<String>) -> Self {
        Self {
            value,
            ..Self::group(depth, label)
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.label.to_lowercase().contains(needle)
            || self.value.as_deref().is_some_and(|v| v.to_lowercase().contains(needle))
    }
}

/// A table or tree driven by a [`ViewBinding`].
pub trait DataBoundView {
    fn id(&self) -> ViewId;

    /// Replace the bound data.
    fn bind(&mut self, binding: &ViewBinding);

    fn apply(&mut self, command: &ViewCommand);

    fn state(&self) -> &ViewState;

    /// Rows after filtering and collapsing.
    fn rows(&self) -> Vec<ViewRow>;

    fn bound_models(&self) -> &[ModelKey];
}

/// Render target for view rows, implemented by the host adapters.
pub trait ViewSink {
    fn render(&self, view: ViewId, rows: &[ViewRow], state: &ViewState);
}

/// Filter then collapse.
fn visible_rows(rows: &[ViewRow], state: &ViewState) -> Vec<ViewRow> {
    let filtered: Vec<&ViewRow> = match state.query_string.as_deref() {
        None => rows.iter().collect(),
        Some(query) => {
            let needle = query.to_lowercase();
            if state.preserve_structure_on_filter {
                keep_with_ancestors(rows, &needle)
            } else {
                rows.iter().filter(|row| row.matches(&needle)).collect()
            }
        }
    };

    filtered
        .into_iter()
        .filter(|row| state.expanded || row.depth == 0)
        .cloned()
        .collect()
}

/// Matching rows plus the group rows above them, in original order.
fn keep_with_ancestors<'a>(rows: &'a [ViewRow], needle: &str) -> Vec<&'a ViewRow> {
    let mut keep = vec![false; rows.len()];
    // Index of the nearest open row at each depth.
    let mut stack: Vec<usize> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        stack.truncate(row.depth);
        if row.matches(needle) {
            keep[i] = true;
            for &ancestor in &stack {
                keep[ancestor] = true;
            }
        }
        stack.push(i);
    }
    rows.iter().zip(keep).filter(|(_, k)| *k).map(|(row, _)| row).collect()
}

/// Attributes and property sets of the selected elements.
#[derive(Debug)]
pub struct PropertyTable {
    state: ViewState,
    rows: Vec<ViewRow>,
    bound: Vec<ModelKey>,
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self {
            state: ViewState {
                query_string: None,
                expanded: false,
                preserve_structure_on_filter: true,
            },
            rows: Vec::new(),
            bound: Vec::new(),
        }
    }
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn element_rows(model: &dyn LoadedModel, id: ElementId, rows: &mut Vec<ViewRow>) {
        let Some(record) = model.element(id) else {
            tracing::debug!(model = model.name(), element = %id, "Selected id has no element record");
            return;
        };
        rows.push(ViewRow {
            depth: 0,
            label: record.ifc_type.clone(),
            value: record.name.clone(),
            guid: Some(record.guid.clone()),
            selected: true,
        });
        rows.push(ViewRow::field(1, "GlobalId", Some(record.guid)));
        rows.push(ViewRow::field(1, "Entity", Some(record.ifc_type)));
        for (label, value) in [
            ("Name", record.name),
            ("Description", record.description),
            ("ObjectType", record.object_type),
        ] {
            if value.is_some() {
                rows.push(ViewRow::field(1, label, value));
            }
        }
        for pset in model.property_sets(id) {
            rows.push(ViewRow::group(1, pset.name));
            rows.extend(pset.properties.into_iter().map(|p| ViewRow::field(2, p.name, p.value)));
        }
    }
}

impl DataBoundView for PropertyTable {
    fn id(&self) -> ViewId {
        ViewId::Properties
    }

    fn bind(&mut self, binding: &ViewBinding) {
        self.rows.clear();
        self.bound = binding.keys();
        for (key, model) in binding.models() {
            let Some(ids) = binding.selection().get(*key) else {
                continue;
            };
            for id in ids {
                Self::element_rows(model.as_ref(), *id, &mut self.rows);
            }
        }
    }

    fn apply(&mut self, command: &ViewCommand) {
        self.state.apply(command);
    }

    fn state(&self) -> &ViewState {
        &self.state
    }

    fn rows(&self) -> Vec<ViewRow> {
        visible_rows(&self.rows, &self.state)
    }

    fn bound_models(&self) -> &[ModelKey] {
        &self.bound
    }
}

/// Spatial breakdown of every bound model.
#[derive(Debug, Default)]
pub struct SpatialTree {
    state: ViewState,
    rows: Vec<ViewRow>,
    bound: Vec<ModelKey>,
}

impl SpatialTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn walk(
        key: ModelKey,
        model: &dyn LoadedModel,
        selection: &SelectionMap,
        id: ElementId,
        depth: usize,
        seen: &mut FxHashSet<ElementId>,
        rows: &mut Vec<ViewRow>,
    ) {
        if !seen.insert(id) {
            return;
        }
        let Some(record) = model.element(id) else {
            return;
        };
        rows.push(ViewRow {
            depth,
            label: record.ifc_type,
            value: record.name,
            guid: Some(record.guid),
            selected: selection.contains(key, id),
        });
        for child in model.children(id) {
            Self::walk(key, model, selection, child, depth + 1, seen, rows);
        }
    }
}

impl DataBoundView for SpatialTree {
    fn id(&self) -> ViewId {
        ViewId::SpatialTree
    }

    fn bind(&mut self, binding: &ViewBinding) {
        self.rows.clear();
        self.bound = binding.keys();
        for (key, model) in binding.models() {
            let mut seen = FxHashSet::default();
            for root in model.spatial_roots() {
                Self::walk(*key, model.as_ref(), binding.selection(), root, 0, &mut seen, &mut self.rows);
            }
        }
    }

    fn apply(&mut self, command: &ViewCommand) {
        self.state.apply(command);
    }

    fn state(&self) -> &ViewState {
        &self.state
    }

    fn rows(&self) -> Vec<ViewRow> {
        visible_rows(&self.rows, &self.state)
    }

    fn bound_models(&self) -> &[ModelKey] {
        &self.bound
    }
}

/// Keeps every managed view bound to the current models and selection.
pub struct ViewBinder {
    binding: ViewBinding,
    views: Vec<Box<dyn DataBoundView>>,
    sink: Option<Rc<dyn ViewSink>>,
}

impl ViewBinder {
    pub fn new(sink: Option<Rc<dyn ViewSink>>) -> Self {
        Self {
            binding: ViewBinding::default(),
            views: Vec::new(),
            sink,
        }
    }

    /// Register a view. It is bound and rendered immediately.
    pub fn add_view(&mut self, mut view: Box<dyn DataBoundView>) {
        view.bind(&self.binding);
        self.render(view.as_ref());
        self.views.push(view);
    }

    /// Rebind after the model set changed; selection entries for departed models are dropped.
    pub fn on_models_changed(&mut self, models: &ModelSet) {
        self.binding.models = models.iter().map(|(key, model)| (key, Rc::clone(model))).collect();
        let dropped = self.binding.selection.retain_models(models);
        if dropped > 0 {
            tracing::debug!(dropped, "Pruned selection entries for unloaded models");
        }
        self.refresh();
    }

    /// Rebind after the selection changed.
    pub fn on_selection_changed(&mut self, selection: &SelectionMap) {
        let mut selection = selection.clone();
        let binding = &self.binding;
        selection.retain_keys(|key| binding.contains(key));
        self.binding.selection = selection;
        self.refresh();
    }

    /// Apply a command to one view. Returns false when the view is not managed.
    pub fn apply(&mut self, id: ViewId, command: ViewCommand) -> bool {
        let Some(index) = self.views.iter().position(|v| v.id() == id) else {
            return false;
        };
        self.views[index].apply(&command);
        self.render(self.views[index].as_ref());
        true
    }

    pub fn view(&self, id: ViewId) -> Option<&dyn DataBoundView> {
        self.views.iter().find(|v| v.id() == id).map(|v| v.as_ref())
    }

    pub fn view_ids(&self) -> Vec<ViewId> {
        self.views.iter().map(|v| v.id()).collect()
    }

    pub fn binding(&self) -> &ViewBinding {
        &self.binding
    }

    pub fn selection(&self) -> &SelectionMap {
        &self.binding.selection
    }

    fn refresh(&mut self) {
        for view in self.views.iter_mut() {
            view.bind(&self.binding);
        }
        for view in &self.views {
            self.render(view.as_ref());
        }
    }

    fn render(&self, view: &dyn DataBoundView) {
        if let Some(sink) = &self.sink {
            sink.render(view.id(), &view.rows(), view.state());
        }
    }
}

impl fmt::Debug for ViewBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewBinder")
            .field("binding", &self.binding)
            .field("views", &self.view_ids())
            .finish()
    }
}
