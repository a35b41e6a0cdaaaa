// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC anywidget WebAssembly bindings
//!
//! Browser side of the notebook widget. The host model and the rendering
//! engine are JavaScript objects; everything between them runs in
//! `ifc-anywidget`.

use wasm_bindgen::prelude::*;

mod engine;
mod host;
mod table;
mod utils;
mod widget;

pub use engine::{selection_from_js, JsHighlighter, JsLoader, JsModel, JsRenderer, ViewerEngine};
pub use host::{AnyModel, AnywidgetHost};
pub use table::{table_data, BimTableSink, TableCells, TableRow};
pub use utils::{set_panic_hook as init_panic_hook, WasmSpawner};
pub use widget::render;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    utils::set_panic_hook();
    tracing_wasm::set_as_global_default();
}

/// Get the version of the widget bindings
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
