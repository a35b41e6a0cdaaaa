// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host link over the anywidget `model` object.

use ifc_anywidget::HostLink;
use js_sys::Function;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    /// The anywidget model handed to `render`.
    #[derive(Debug, Clone)]
    pub type AnyModel;

    #[wasm_bindgen(method)]
    fn get(this: &AnyModel, name: &str) -> JsValue;

    #[wasm_bindgen(method)]
    fn set(this: &AnyModel, name: &str, value: &JsValue);

    #[wasm_bindgen(method)]
    fn save_changes(this: &AnyModel);

    #[wasm_bindgen(method)]
    pub fn on(this: &AnyModel, event: &str, callback: &Function);

    #[wasm_bindgen(method)]
    pub fn off(this: &AnyModel, event: &str, callback: &Function);
}

/// [`HostLink`] backed by an anywidget model.
///
/// Values cross the boundary as JSON-compatible JS values, so objects arrive
/// as plain objects on the Python side rather than `Map`s.
pub struct AnywidgetHost {
    model: AnyModel,
}

impl AnywidgetHost {
    pub fn new(model: AnyModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &AnyModel {
        &self.model
    }
}

impl HostLink for AnywidgetHost {
    fn get(&self, name: &str) -> Option<Value> {
        let value = self.model.get(name);
        if value.is_undefined() {
            return None;
        }
        match serde_wasm_bindgen::from_value(value) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(attribute = name, error = %err, "Unreadable host attribute");
                None
            }
        }
    }

    fn set(&self, name: &str, value: Value) {
        match value.serialize(&serde_wasm_bindgen::Serializer::json_compatible()) {
            Ok(js) => self.model.set(name, &js),
            Err(err) => tracing::error!(attribute = name, error = %err, "Failed to convert host value"),
        }
    }

    fn save_changes(&self) {
        self.model.save_changes();
    }
}
