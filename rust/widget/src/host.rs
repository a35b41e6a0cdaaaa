// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host attribute store.
//!
//! The host keeps widget state as synchronized attributes. Writes stay local
//! until `save_changes` is called, so every logical event stages its writes on
//! a [`HostTransaction`] and commits them together.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// Key/value store with explicit commit, implemented by the notebook model.
pub trait HostLink {
    fn get(&self, name: &str) -> Option<Value>;

    /// Stage a write. Invisible to the host until [`HostLink::save_changes`].
    fn set(&self, name: &str, value: Value);

    fn save_changes(&self);
}

/// Attributes the widget reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostAttribute {
    /// `{ contents: string }` written by the host.
    IfcModel,
    /// Ordered GlobalIds or null, written by the widget.
    SelectedGuids,
    /// Last load failure or null, written by the widget.
    LoadError,
    ViewerConfig,
}

impl HostAttribute {
    pub const ALL: [HostAttribute; 4] = [
        HostAttribute::IfcModel,
        HostAttribute::SelectedGuids,
        HostAttribute::LoadError,
        HostAttribute::ViewerConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostAttribute::IfcModel => "ifc_model",
            HostAttribute::SelectedGuids => "selected_guids",
            HostAttribute::LoadError => "load_error",
            HostAttribute::ViewerConfig => "viewer_config",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }

    /// Name of the change event the host raises for this attribute.
    pub fn change_event(&self) -> String {
        format!("change:{}", self.as_str())
    }
}

impl fmt::Display for HostAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed access to the host attributes.
#[derive(Clone)]
pub struct HostBridge {
    link: Rc<dyn HostLink>,
}

impl HostBridge {
    pub fn new(link: Rc<dyn HostLink>) -> Self {
        Self { link }
    }

    /// `ifc_model.contents`; a bare string is accepted as well.
    pub fn model_contents(&self) -> Option<String> {
        match self.link.get(HostAttribute::IfcModel.as_str())? {
            Value::String(contents) => Some(contents),
            Value::Object(mut fields) => match fields.remove("contents")? {
                Value::String(contents) => Some(contents),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn selected_guids(&self) -> Option<Vec<String>> {
        let value = self.link.get(HostAttribute::SelectedGuids.as_str())?;
        serde_json::from_value(value).ok().flatten()
    }

    pub fn load_error(&self) -> Option<String> {
        match self.link.get(HostAttribute::LoadError.as_str())? {
            Value::String(message) => Some(message),
            _ => None,
        }
    }

    pub fn viewer_config(&self) -> Value {
        self.link
            .get(HostAttribute::ViewerConfig.as_str())
            .unwrap_or(Value::Null)
    }

    pub fn transaction(&self) -> HostTransaction {
        HostTransaction {
            link: self.link.clone(),
            writes: Vec::new(),
        }
    }
}

/// Writes staged for one logical event.
///
/// Dropping an uncommitted transaction discards its writes.
#[must_use = "a transaction does nothing until committed"]
pub struct HostTransaction {
    link: Rc<dyn HostLink>,
    writes: Vec<(HostAttribute, Value)>,
}

impl HostTransaction {
    fn stage(&mut self, attribute: HostAttribute, value: Value) -> &mut Self {
        match self.writes.iter_mut().find(|(a, _)| *a == attribute) {
            Some(slot) => slot.1 = value,
            None => self.writes.push((attribute, value)),
        }
        self
    }

    /// `None` writes null: nothing is selected.
    pub fn set_selected_guids(&mut self, guids: Option<Vec<String>>) -> &mut Self {
        let value = match guids {
            Some(guids) => Value::from(guids),
            None => Value::Null,
        };
        self.stage(HostAttribute::SelectedGuids, value)
    }

    pub fn set_load_error(&mut self, message: Option<String>) -> &mut Self {
        let value = message.map(Value::String).unwrap_or(Value::Null);
        self.stage(HostAttribute::LoadError, value)
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every staged write, then save once. Returns the number of writes.
    pub fn commit(self) -> usize {
        if self.writes.is_empty() {
            return 0;
        }
        for (attribute, value) in &self.writes {
            self.link.set(attribute.as_str(), value.clone());
        }
        self.link.save_changes();
        tracing::trace!(writes = self.writes.len(), "Committed host attributes");
        self.writes.len()
    }
}

/// In-process host, for native embedding and tests.
///
/// Keeps the widget-side values, the host-visible values, and a log of every
/// commit.
#[derive(Default)]
pub struct MemoryHost {
    local: RefCell<BTreeMap<String, Value>>,
    committed: RefCell<BTreeMap<String, Value>>,
    pending: RefCell<BTreeMap<String, Value>>,
    commits: RefCell<Vec<BTreeMap<String, Value>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-side write (already visible to the host).
    pub fn host_set(&self, name: &str, value: Value) {
        self.local.borrow_mut().insert(name.to_string(), value.clone());
        self.committed.borrow_mut().insert(name.to_string(), value);
    }

    /// Host-side write of `ifc_model`.
    pub fn set_model_contents(&self, contents: &str) {
        self.host_set(
            HostAttribute::IfcModel.as_str(),
            serde_json::json!({ "contents": contents }),
        );
    }

    /// Value the host currently observes.
    pub fn committed(&self, name: &str) -> Option<Value> {
        self.committed.borrow().get(name).cloned()
    }

    /// Committed `selected_guids`; `None` when absent or null.
    pub fn committed_guids(&self) -> Option<Vec<String>> {
        self.committed(HostAttribute::SelectedGuids.as_str())
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.borrow().len()
    }

    /// Attributes written by each commit, oldest first.
    pub fn commits(&self) -> Vec<BTreeMap<String, Value>> {
        self.commits.borrow().clone()
    }
}

impl HostLink for MemoryHost {
    fn get(&self, name: &str) -> Option<Value> {
        self.local.borrow().get(name).cloned()
    }

    fn set(&self, name: &str, value: Value) {
        self.local.borrow_mut().insert(name.to_string(), value.clone());
        self.pending.borrow_mut().insert(name.to_string(), value);
    }

    fn save_changes(&self) {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        self.committed.borrow_mut().extend(pending.clone());
        self.commits.borrow_mut().push(pending);
    }
}
