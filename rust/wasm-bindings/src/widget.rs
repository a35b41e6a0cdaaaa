// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The anywidget `render` entry point.

use std::rc::Rc;

use ifc_anywidget::{
    ConfigError, ContainerMetrics, HostAttribute, InitializationError, HostBridge, IfcViewer, SectionSpec, ViewCommand, ViewId, ViewerConfig,
    ViewerEvent, ViewerParts, WidgetRoot,
};
use js_sys::{Function, Object, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, Element, HtmlElement};

use crate::engine::{selection_from_js, JsHighlighter, JsLoader, JsRenderer, ViewerEngine};
use crate::host::{AnyModel, AnywidgetHost};
use crate::table::BimTableSink;
use crate::utils::{get_js_prop, set_js_prop, WasmSpawner};

const MODEL_CHANGE: &str = "change:ifc_model";

/// Reasons `render` rejects.
#[derive(Debug, thiserror::Error)]
enum MountError {
    #[error("Document is not available")]
    NoDocument,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Initialization(#[from] InitializationError),
}

impl From<MountError> for JsValue {
    fn from(err: MountError) -> Self {
        JsError::new(&err.to_string()).into()
    }
}

/// Render the viewer into `el`.
///
/// Resolves to a cleanup function once the initial model is loaded. Rejects
/// when the engine cannot be set up.
///
/// ```javascript
/// import init, { render } from "./ifc_anywidget_wasm.js";
///
/// export default {
///   async render({ model, el }) {
///     await init();
///     return await render(model, el, createEngine());
///   },
/// };
/// ```
#[wasm_bindgen]
pub fn render(model: AnyModel, el: HtmlElement, engine: ViewerEngine) -> Promise {
    Promise::new(&mut |resolve, reject| {
        let model = model.clone();
        let el = el.clone();
        let engine = engine.clone();
        spawn_local(async move {
            match mount(model, el, engine).await {
                Ok(cleanup) => {
                    let _ = resolve.call1(&JsValue::NULL, &cleanup);
                }
                Err(err) => {
                    let _ = reject.call1(&JsValue::NULL, &err);
                }
            }
        });
    })
}

struct Panels {
    tables: Vec<(ViewId, Element)>,
    buttons: Vec<(ViewId, Element)>,
}

async fn mount(model: AnyModel, el: HtmlElement, engine: ViewerEngine) -> Result<JsValue, JsValue> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or(MountError::NoDocument)?;

    let host = Rc::new(AnywidgetHost::new(model.clone()));
    let config = ViewerConfig::from_json(HostBridge::new(host.clone()).viewer_config()).map_err(MountError::from)?;

    let panels = create_panels(&document, &config)?;
    let mut sink = BimTableSink::new();
    for (view, table) in &panels.tables {
        let button = panels.buttons.iter().find(|(v, _)| v == view).map(|(_, b)| b.clone());
        sink.attach(*view, table.clone(), button);
    }

    let highlighter = Rc::new(JsHighlighter::new(engine.clone()));
    let parts = ViewerParts {
        host,
        loader: Rc::new(JsLoader::new(engine.clone())),
        renderer: Rc::new(JsRenderer::new(engine.clone())),
        highlighter: highlighter.clone(),
        spawner: Rc::new(WasmSpawner),
        view_sink: Some(Rc::new(sink)),
    };
    let viewer = IfcViewer::initialize(parts, config).await.map_err(MountError::from)?;

    let grid = compose(&document, viewer.root(), &engine.viewport(), &panels)?;
    el.class_list().add_1(&viewer.root().class)?;
    el.append_child(&grid)?;

    wire_panels(&viewer, &panels);
    wire_engine(&viewer, &engine, &highlighter);
    Ok(wire_container(viewer, model, el, document)?)
}

fn create_panels(document: &Document, config: &ViewerConfig) -> Result<Panels, JsValue> {
    let mut views = vec![ViewId::Properties];
    if config.show_spatial_tree {
        views.push(ViewId::SpatialTree);
    }
    let mut tables = Vec::new();
    let mut buttons = Vec::new();
    for view in views {
        tables.push((view, document.create_element("bim-table")?));
        buttons.push((view, document.create_element("bim-button")?));
    }
    Ok(Panels { tables, buttons })
}

fn find(list: &[(ViewId, Element)], view: ViewId) -> Option<&Element> {
    list.iter().find(|(v, _)| *v == view).map(|(_, e)| e)
}

/// Build the `bim-grid` from the widget description.
fn compose(document: &Document, root: &WidgetRoot, viewport: &HtmlElement, panels: &Panels) -> Result<Element, JsValue> {
    let layouts = Object::new();
    for (name, layout) in &root.layouts {
        let elements = Object::new();
        for area in &layout.elements {
            if *area == root.viewport_area {
                set_js_prop(&elements, area, viewport);
            }
        }
        for panel in root.panels.iter().filter(|panel| layout.elements.contains(&panel.area)) {
            let panel_el = document.create_element("bim-panel")?;
            panel_el.set_attribute("label", &panel.label)?;
            for section in &panel.sections {
                let section_el = compose_section(document, section, panels)?;
                panel_el.append_child(&section_el)?;
            }
            set_js_prop(&elements, &panel.area, &panel_el);
        }

        let spec = Object::new();
        set_js_prop(&spec, "template", &JsValue::from_str(&layout.template));
        set_js_prop(&spec, "elements", &elements);
        set_js_prop(&layouts, name, &spec);
    }

    let grid = document.create_element("bim-grid")?;
    set_js_prop(&grid, "layouts", &layouts);
    set_js_prop(&grid, "layout", &JsValue::from_str(&root.layout));
    grid.set_attribute("style", &format!("height: {}px", root.height))?;
    Ok(grid)
}

fn compose_section(document: &Document, section: &SectionSpec, panels: &Panels) -> Result<Element, JsValue> {
    let section_el = document.create_element("bim-panel-section")?;
    section_el.set_attribute("label", &section.label)?;
    section_el.set_attribute("icon", &section.icon)?;

    let toolbar = document.create_element("div")?;
    toolbar.set_attribute("style", "display: flex; gap: 0.5rem;")?;
    if let Some(button) = find(&panels.buttons, section.view) {
        button.set_attribute("label", &section.expand_label)?;
        toolbar.append_child(button)?;
    }
    section_el.append_child(&toolbar)?;

    let input = document.create_element("bim-text-input")?;
    input.set_attribute("placeholder", &section.search_placeholder)?;
    input.set_attribute("debounce", &section.search_debounce_ms.to_string())?;
    input.set_attribute("data-view", section.view.as_str())?;
    section_el.append_child(&input)?;

    if let Some(table) = find(&panels.tables, section.view) {
        section_el.append_child(table)?;
    }
    Ok(section_el)
}

/// Search inputs and expand buttons become view commands.
fn wire_panels(viewer: &IfcViewer, panels: &Panels) {
    for (view, button) in &panels.buttons {
        let (viewer, view) = (viewer.clone(), *view);
        let on_click = Closure::<dyn FnMut(JsValue)>::new(move |_event: JsValue| {
            viewer.apply_view_command(view, ViewCommand::ToggleExpanded);
        });
        let _ = button.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref());
        on_click.forget();
    }

    for (view, table) in &panels.tables {
        let Some(input) = table.previous_element_sibling() else { continue };
        let (viewer, view) = (viewer.clone(), *view);
        let on_input = Closure::<dyn FnMut(JsValue)>::new(move |event: JsValue| {
            let value = get_js_prop(&get_js_prop(&event, "target"), "value")
                .as_string()
                .unwrap_or_default();
            viewer.apply_view_command(view, ViewCommand::query(&value));
        });
        let _ = input.add_event_listener_with_callback("input", on_input.as_ref().unchecked_ref());
        on_input.forget();
    }
}

/// Engine callbacks feed the highlighter channels. The engine offers no way
/// to unregister, so these live as long as the page and check for disposal.
fn wire_engine(viewer: &IfcViewer, engine: &ViewerEngine, highlighter: &Rc<JsHighlighter>) {
    use ifc_anywidget::Highlighter;

    let (v, h) = (viewer.clone(), highlighter.clone());
    let on_highlight = Closure::<dyn FnMut(JsValue)>::new(move |selection: JsValue| {
        if v.is_disposed() {
            return;
        }
        let map = selection_from_js(&selection, &v.pipeline().models());
        h.events().on_highlight.trigger(map);
    });
    engine.on_highlight(on_highlight.as_ref().unchecked_ref());
    on_highlight.forget();

    let (v, h) = (viewer.clone(), highlighter.clone());
    let on_clear = Closure::<dyn FnMut(JsValue)>::new(move |_: JsValue| {
        if !v.is_disposed() {
            h.events().on_clear.trigger(());
        }
    });
    engine.on_clear(on_clear.as_ref().unchecked_ref());
    on_clear.forget();

    let v = viewer.clone();
    let on_rest = Closure::<dyn FnMut(JsValue)>::new(move |_: JsValue| v.dispatch(ViewerEvent::CameraRest));
    engine.on_camera_rest(on_rest.as_ref().unchecked_ref());
    on_rest.forget();
}

fn container_metrics(el: &HtmlElement, document: &Document) -> ContainerMetrics {
    let window_height = web_sys::window()
        .and_then(|window| window.inner_height().ok())
        .and_then(|height| height.as_f64());
    ContainerMetrics::new(
        el.client_width() as f64,
        window_height,
        document.fullscreen_element().is_some(),
    )
}

/// Host changes, container resizes and fullscreen toggles. Returns the
/// cleanup function handed back to anywidget.
fn wire_container(viewer: IfcViewer, model: AnyModel, el: HtmlElement, document: Document) -> Result<JsValue, JsValue> {
    let v = viewer.clone();
    let on_model = Closure::<dyn FnMut(JsValue)>::new(move |_: JsValue| {
        v.dispatch(ViewerEvent::AttributeChanged(HostAttribute::IfcModel));
    });
    model.on(MODEL_CHANGE, on_model.as_ref().unchecked_ref());

    let (v, target, doc) = (viewer.clone(), el.clone(), document.clone());
    let on_resize = Closure::<dyn FnMut(JsValue)>::new(move |_: JsValue| {
        v.dispatch(ViewerEvent::Resize(container_metrics(&target, &doc)));
    });
    let observer = web_sys::ResizeObserver::new(on_resize.as_ref().unchecked_ref())?;
    observer.observe(&el);

    let (v, doc) = (viewer.clone(), document.clone());
    let on_fullscreen = Closure::<dyn FnMut(JsValue)>::new(move |_: JsValue| {
        v.dispatch(ViewerEvent::FullscreenChanged(doc.fullscreen_element().is_some()));
    });
    document.add_event_listener_with_callback("fullscreenchange", on_fullscreen.as_ref().unchecked_ref())?;

    viewer.dispatch(ViewerEvent::Resize(container_metrics(&el, &document)));

    let cleanup = Closure::once_into_js(move || {
        let on_model_fn: &Function = on_model.as_ref().unchecked_ref();
        model.off(MODEL_CHANGE, on_model_fn);
        observer.disconnect();
        let _ = document
            .remove_event_listener_with_callback("fullscreenchange", on_fullscreen.as_ref().unchecked_ref());
        viewer.dispose();
        drop((on_model, on_resize, on_fullscreen));
        tracing::debug!("Widget cleaned up");
    });
    Ok(cleanup)
}
