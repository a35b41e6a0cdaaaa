// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collaborator traits implemented over the JavaScript 3D engine.
//!
//! The ESM shim builds one `engine` object around the scene, renderer,
//! camera, fragments loader and highlighter, and passes it to `render`.
//! Element data for the side panel comes from the Rust element index; the
//! engine only owns geometry and picking.

use std::any::Any;
use std::rc::Rc;

use futures_util::future::{FutureExt, LocalBoxFuture};
use ifc_anywidget::{
    CameraControl, ElementId, Highlighter, HighlighterSettings, InitializationError, LoadError, LoadFlags,
    LoadedModel, LoaderSettings, LookAt, ModelKey, ModelLoader, ModelSet, Payload, SelectionEvents, SelectionMap,
    StepModel, TranslationError, ViewportRenderer, ViewportSize,
};
use ifc_anywidget_core::{ElementIndex, ElementIndexBuilder, ElementRecord, PropertySet};
use js_sys::{Array, Function, Object, Promise, Uint8Array};
use rustc_hash::FxHashMap;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::utils::{get_js_prop, js_error_message, set_js_prop};

#[wasm_bindgen]
extern "C" {
    /// Engine facade built by the ESM shim.
    #[derive(Debug, Clone)]
    pub type ViewerEngine;

    #[wasm_bindgen(method, catch, js_name = setupLoader)]
    fn setup_loader(this: &ViewerEngine, options: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = loadModel)]
    fn load_model(this: &ViewerEngine, bytes: &Uint8Array, options: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, js_name = disposeModel)]
    fn dispose_model(this: &ViewerEngine, handle: &JsValue);

    #[wasm_bindgen(method, js_name = useCamera)]
    fn use_camera(this: &ViewerEngine, handle: &JsValue);

    #[wasm_bindgen(method, js_name = addModel)]
    fn add_model(this: &ViewerEngine, handle: &JsValue);

    #[wasm_bindgen(method, js_name = removeModel)]
    fn remove_model(this: &ViewerEngine, handle: &JsValue);

    #[wasm_bindgen(method, js_name = requestRender)]
    fn request_render(this: &ViewerEngine);

    #[wasm_bindgen(method)]
    fn resize(this: &ViewerEngine, width: u32, height: u32);

    #[wasm_bindgen(method, js_name = setLookAt)]
    fn set_look_at(this: &ViewerEngine, px: f64, py: f64, pz: f64, tx: f64, ty: f64, tz: f64);

    #[wasm_bindgen(method, js_name = updateAspect)]
    fn update_aspect(this: &ViewerEngine, width: u32, height: u32);

    #[wasm_bindgen(method, js_name = setGridVisible)]
    fn set_grid_visible(this: &ViewerEngine, visible: bool);

    #[wasm_bindgen(method, js_name = setupHighlighter)]
    fn setup_highlighter(this: &ViewerEngine, options: &JsValue);

    #[wasm_bindgen(method, js_name = clearHighlight)]
    fn clear_highlight(this: &ViewerEngine);

    /// `callback(selection)` where selection maps model names to local ids.
    #[wasm_bindgen(method, js_name = onHighlight)]
    pub fn on_highlight(this: &ViewerEngine, callback: &Function);

    #[wasm_bindgen(method, js_name = onClear)]
    pub fn on_clear(this: &ViewerEngine, callback: &Function);

    #[wasm_bindgen(method, js_name = onCameraRest)]
    pub fn on_camera_rest(this: &ViewerEngine, callback: &Function);

    /// The `bim-viewport` element the renderer draws into.
    #[wasm_bindgen(method, getter)]
    pub fn viewport(this: &ViewerEngine) -> web_sys::HtmlElement;
}

/// Instances indexed between yields to the browser.
const INDEX_BATCH: usize = 20_000;

/// Build the element index without holding the UI thread for the whole file.
async fn index_in_batches(bytes: &[u8]) -> Result<ElementIndex, LoadError> {
    let mut builder = ElementIndexBuilder::new(bytes)?;
    while !builder.step(INDEX_BATCH)? {
        // Yield to browser
        gloo_timers::future::TimeoutFuture::new(0).await;
    }
    tracing::debug!(instances = builder.scanned(), "Element index scanned");
    Ok(builder.finish()?)
}

/// Loader that pairs engine geometry with a Rust element index.
pub struct JsLoader {
    engine: ViewerEngine,
}

impl JsLoader {
    pub fn new(engine: ViewerEngine) -> Self {
        Self { engine }
    }
}

impl ModelLoader for JsLoader {
    fn setup(&self, settings: &LoaderSettings) -> LocalBoxFuture<'static, Result<(), InitializationError>> {
        let options = Object::new();
        set_js_prop(&options, "coordinateToOrigin", &settings.coordinate_to_origin.into());
        if let Some(url) = &settings.worker_url {
            set_js_prop(&options, "workerUrl", &JsValue::from_str(url));
        }
        let url = settings.worker_url.clone().unwrap_or_else(|| "bundled worker".to_string());
        let setup = self.engine.setup_loader(&options);

        async move {
            let promise = setup.map_err(|err| InitializationError::Engine(js_error_message(&err)))?;
            JsFuture::from(promise).await.map_err(|err| InitializationError::WorkerFetch {
                url,
                reason: js_error_message(&err),
            })?;
            Ok(())
        }
        .boxed_local()
    }

    fn load(&self, bytes: Payload, flags: LoadFlags) -> LocalBoxFuture<'static, Result<Rc<dyn LoadedModel>, LoadError>> {
        let engine = self.engine.clone();
        async move {
            if bytes.is_empty() {
                return Err(LoadError::EmptyPayload);
            }
            // Reject undecodable files before the engine spends time on geometry.
            let index = index_in_batches(&bytes).await?;

            let options = Object::new();
            set_js_prop(&options, "name", &JsValue::from_str(&flags.name));
            set_js_prop(&options, "coordinateToOrigin", &flags.coordinate_to_origin.into());
            let promise = engine
                .load_model(&Uint8Array::from(&bytes[..]), &options)
                .map_err(|err| LoadError::Engine(js_error_message(&err)))?;
            let handle = JsFuture::from(promise)
                .await
                .map_err(|err| LoadError::Engine(js_error_message(&err)))?;

            Ok(Rc::new(JsModel {
                engine,
                handle,
                data: StepModel::new(flags.name, index),
            }) as Rc<dyn LoadedModel>)
        }
        .boxed_local()
    }
}

/// One engine model plus its element index.
pub struct JsModel {
    engine: ViewerEngine,
    handle: JsValue,
    data: StepModel,
}

impl JsModel {
    pub fn handle(&self) -> &JsValue {
        &self.handle
    }
}

impl LoadedModel for JsModel {
    fn name(&self) -> &str {
        self.data.name()
    }

    fn element(&self, id: ElementId) -> Option<ElementRecord> {
        self.data.element(id)
    }

    fn property_sets(&self, id: ElementId) -> Vec<PropertySet> {
        self.data.property_sets(id)
    }

    fn spatial_roots(&self) -> Vec<ElementId> {
        self.data.spatial_roots()
    }

    fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.data.children(id)
    }

    /// Engine local ids are express ids, so the element index answers directly.
    fn translate(&self, ids: Vec<ElementId>) -> LocalBoxFuture<'static, Result<Vec<String>, TranslationError>> {
        self.data.translate(ids)
    }

    fn use_camera(&self, camera: &dyn CameraControl) {
        self.data.use_camera(camera);
        self.engine.use_camera(&self.handle);
    }

    fn dispose(&self) {
        if !self.data.is_disposed() {
            self.engine.dispose_model(&self.handle);
            self.data.dispose();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scene, renderer and camera of the engine.
pub struct JsRenderer {
    engine: ViewerEngine,
}

impl JsRenderer {
    pub fn new(engine: ViewerEngine) -> Self {
        Self { engine }
    }

    fn handle_of<'a>(model: &'a dyn LoadedModel) -> Option<&'a JsValue> {
        let handle = model.as_any().downcast_ref::<JsModel>().map(JsModel::handle);
        if handle.is_none() {
            tracing::warn!(model = model.name(), "Model has no engine handle");
        }
        handle
    }
}

impl ViewportRenderer for JsRenderer {
    fn add_model(&self, _key: ModelKey, model: &dyn LoadedModel) {
        if let Some(handle) = Self::handle_of(model) {
            self.engine.add_model(handle);
        }
    }

    fn remove_model(&self, _key: ModelKey, model: &dyn LoadedModel) {
        if let Some(handle) = Self::handle_of(model) {
            self.engine.remove_model(handle);
        }
    }

    fn request_render(&self) {
        self.engine.request_render();
    }

    fn resize(&self, size: ViewportSize) {
        self.engine.resize(size.width, size.height);
    }

    fn camera(&self) -> &dyn CameraControl {
        self
    }

    fn set_grid_visible(&self, visible: bool) {
        self.engine.set_grid_visible(visible);
    }
}

impl CameraControl for JsRenderer {
    fn set_look_at(&self, look_at: &LookAt) {
        let [px, py, pz] = look_at.position;
        let [tx, ty, tz] = look_at.target;
        self.engine.set_look_at(px, py, pz, tx, ty, tz);
    }

    fn update_aspect(&self, size: ViewportSize) {
        self.engine.update_aspect(size.width, size.height);
    }
}

/// Highlighter whose events are fed from engine callbacks.
pub struct JsHighlighter {
    engine: ViewerEngine,
    events: SelectionEvents,
}

impl JsHighlighter {
    pub fn new(engine: ViewerEngine) -> Self {
        Self {
            engine,
            events: SelectionEvents::default(),
        }
    }
}

impl Highlighter for JsHighlighter {
    fn setup(&self, settings: &HighlighterSettings) {
        let options = Object::new();
        set_js_prop(&options, "zoomToSelection", &settings.zoom_to_selection.into());
        self.engine.setup_highlighter(&options);
    }

    fn events(&self) -> &SelectionEvents {
        &self.events
    }

    fn clear(&self) {
        self.engine.clear_highlight();
    }
}

/// Convert an engine selection (`{ [modelName]: Iterable<localId> }`) to a
/// [`SelectionMap`]. Names of models that are not loaded are dropped.
pub fn selection_from_js(selection: &JsValue, models: &ModelSet) -> SelectionMap {
    let keys: FxHashMap<&str, ModelKey> = models.iter().map(|(key, model)| (model.name(), key)).collect();
    let mut map = SelectionMap::new();
    if !selection.is_object() {
        return map;
    }

    for name in Object::keys(selection.unchecked_ref::<Object>()).iter() {
        let Some(name) = name.as_string() else { continue };
        let Some(key) = keys.get(name.as_str()) else {
            tracing::debug!(model = %name, "Highlight for unknown model ignored");
            continue;
        };
        let ids = Array::from(&get_js_prop(selection, &name));
        map.insert(
            *key,
            ids.iter().filter_map(|id| id.as_f64()).map(|id| ElementId(id as u32)),
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    const MODEL: &str = "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC4'));\nENDSEC;\nDATA;\n\
#5=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'Wall',$,$,$,$,$,$);\n\
#6=IFCDOOR('1hOSvn6df7F8_7GcBWlRGQ',$,'Door',$,$,$,$,$,$,$,$,$,$);\n\
ENDSEC;\nEND-ISO-10303-21;\n";

    #[wasm_bindgen_test]
    async fn engine_selection_translates_to_guids() {
        let index = index_in_batches(MODEL.as_bytes()).await.unwrap();
        let model: Rc<dyn LoadedModel> = Rc::new(JsModel {
            engine: Object::new().unchecked_into(),
            handle: JsValue::NULL,
            data: StepModel::new("model-1", index),
        });
        let mut models = ModelSet::new();
        let key = models.insert(Rc::clone(&model));

        // `{ "model-1": [6, 5], "model-9": [5] }` as raised by the engine.
        let selection = Object::new();
        let ids = Array::of2(&JsValue::from(6), &JsValue::from(5));
        set_js_prop(&selection, "model-1", &ids);
        set_js_prop(&selection, "model-9", &Array::of1(&JsValue::from(5)));

        let map = selection_from_js(&selection, &models);
        assert_eq!(map.element_count(), 2);
        let picked: Vec<ElementId> = map.get(key).unwrap().iter().copied().collect();

        let guids = model.translate(picked).await.unwrap();
        assert_eq!(guids, vec!["2O2Fr$t4X7Zf8NOew3FLOH", "1hOSvn6df7F8_7GcBWlRGQ"]);
    }

    #[wasm_bindgen_test]
    async fn undecodable_payload_is_rejected() {
        let err = index_in_batches(b"not a model").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to decode model"));
    }
}
