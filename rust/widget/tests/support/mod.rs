// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory collaborators for driving `IfcViewer` on a `LocalPool`.

#![allow(dead_code)]

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::LocalPool;
use futures::future::{self, FutureExt, LocalBoxFuture};
use ifc_anywidget::{
    CameraControl, ElementId, Highlighter, HighlighterSettings, IfcViewer, InitializationError, LoadError,
    LoadFlags, LoadedModel, LoaderSettings, LookAt, MemoryHost, ModelKey, ModelLoader, Payload, SelectionEvents,
    SelectionMap, StepModel, TranslationError, ViewId, ViewRow, ViewSink, ViewState, ViewerConfig, ViewerEvent,
    ViewerParts, ViewportRenderer, ViewportSize, HostAttribute,
};
use ifc_anywidget_core::{ElementIndex, ElementRecord, PropertySet};

pub const WALL_GUID: &str = "2O2Fr$t4X7Zf8NOew3FLOH";
pub const DOOR_GUID: &str = "1hOSvn6df7F8_7GcBWlRGQ";
pub const SLAB_GUID: &str = "3cUkl32yn9qRSPvBJVyWw5";

pub const MODEL_A: &str = "ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('0YvctVUKr0kugbFTf53O9L',$,'Project A',$,$,$,$,$,$);
#2=IFCBUILDINGSTOREY('0C87kaqBXF$xpGmTZ7zxN$',$,'Level 1',$,$,$,$,$,.ELEMENT.,0.);
#3=IFCRELAGGREGATES('2GNbVUDpH5WhiCvpqw1ymq',$,$,$,#1,(#2));
#5=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'Wall',$,$,$,$,$,$);
#6=IFCDOOR('1hOSvn6df7F8_7GcBWlRGQ',$,'Door',$,$,$,$,$,$,$,$,$,$);
#7=IFCRELCONTAINEDINSPATIALSTRUCTURE('3Xh9dw8Ab1Ov1ewTKTFcj2',$,$,$,(#5,#6),#2);
#8=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('REI 90'),$);
#9=IFCPROPERTYSET('1RfK2hEWX0ef00Y3ngcG3T',$,'Pset_WallCommon',$,(#8));
#10=IFCRELDEFINESBYPROPERTIES('0dBBfKXsn8Ahu8_qyWHHk8',$,$,$,(#5),#9);
ENDSEC;
END-ISO-10303-21;
";

pub const MODEL_B: &str = "ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('2nxdWvGMX0ZBmtNhyQb7Fa',$,'Project B',$,$,$,$,$,$);
#5=IFCSLAB('3cUkl32yn9qRSPvBJVyWw5',$,'Slab',$,$,$,$,$,.FLOOR.);
#7=IFCRELCONTAINEDINSPATIALSTRUCTURE('1Mb0F_cZ5Bl8dl6GmtCMAQ',$,$,$,(#5),#1);
ENDSEC;
END-ISO-10303-21;
";

/// Holds futures until the test releases them, by call index.
#[derive(Default)]
pub struct Gate {
    closed: Cell<bool>,
    waiting: RefCell<Vec<Option<oneshot::Sender<()>>>>,
}

impl Gate {
    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn open(&self) {
        self.closed.set(false);
    }

    /// Ticket for one call; resolves immediately while the gate is open.
    pub fn pass(&self) -> LocalBoxFuture<'static, ()> {
        if !self.closed.get() {
            return future::ready(()).boxed_local();
        }
        let (tx, rx) = oneshot::channel();
        self.waiting.borrow_mut().push(Some(tx));
        async move {
            let _ = rx.await;
        }
        .boxed_local()
    }

    pub fn release(&self, index: usize) {
        let sender = self.waiting.borrow_mut().get_mut(index).and_then(Option::take);
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    pub fn pending(&self) -> usize {
        self.waiting.borrow().iter().filter(|s| s.is_some()).count()
    }
}

/// Model whose id translation can be held by a gate.
pub struct FakeModel {
    inner: StepModel,
    translate_gate: Rc<Gate>,
}

impl FakeModel {
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn is_camera_bound(&self) -> bool {
        self.inner.is_camera_bound()
    }
}

impl LoadedModel for FakeModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn element(&self, id: ElementId) -> Option<ElementRecord> {
        self.inner.element(id)
    }

    fn property_sets(&self, id: ElementId) -> Vec<PropertySet> {
        self.inner.property_sets(id)
    }

    fn spatial_roots(&self) -> Vec<ElementId> {
        self.inner.spatial_roots()
    }

    fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.inner.children(id)
    }

    fn translate(&self, ids: Vec<ElementId>) -> LocalBoxFuture<'static, Result<Vec<String>, TranslationError>> {
        let gate = self.translate_gate.pass();
        let translated = self.inner.translate(ids);
        async move {
            gate.await;
            translated.await
        }
        .boxed_local()
    }

    fn use_camera(&self, camera: &dyn CameraControl) {
        self.inner.use_camera(camera);
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Loader whose decodes can be held by a gate.
#[derive(Default)]
pub struct GatedLoader {
    pub gate: Rc<Gate>,
    pub translate_gate: Rc<Gate>,
    pub setup_error: Option<String>,
    pub loaded: Rc<RefCell<Vec<Rc<FakeModel>>>>,
}

impl GatedLoader {
    pub fn model(&self, index: usize) -> Rc<FakeModel> {
        Rc::clone(&self.loaded.borrow()[index])
    }
}

impl ModelLoader for GatedLoader {
    fn setup(&self, settings: &LoaderSettings) -> LocalBoxFuture<'static, Result<(), InitializationError>> {
        let result = match &self.setup_error {
            Some(reason) => Err(InitializationError::WorkerFetch {
                url: settings.worker_url.clone().unwrap_or_else(|| "worker.mjs".into()),
                reason: reason.clone(),
            }),
            None => Ok(()),
        };
        future::ready(result).boxed_local()
    }

    fn load(&self, bytes: Payload, flags: LoadFlags) -> LocalBoxFuture<'static, Result<Rc<dyn LoadedModel>, LoadError>> {
        let gate = self.gate.pass();
        let translate_gate = Rc::clone(&self.translate_gate);
        let loaded = Rc::clone(&self.loaded);
        async move {
            gate.await;
            let index = ElementIndex::parse(&bytes)?;
            let model = Rc::new(FakeModel {
                inner: StepModel::new(flags.name, index),
                translate_gate,
            });
            loaded.borrow_mut().push(Rc::clone(&model));
            Ok(model as Rc<dyn LoadedModel>)
        }
        .boxed_local()
    }
}

#[derive(Default)]
pub struct FakeCamera {
    pub look_at: Cell<Option<LookAt>>,
    pub aspects: RefCell<Vec<ViewportSize>>,
}

impl CameraControl for FakeCamera {
    fn set_look_at(&self, look_at: &LookAt) {
        self.look_at.set(Some(*look_at));
    }

    fn update_aspect(&self, size: ViewportSize) {
        self.aspects.borrow_mut().push(size);
    }
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub camera: FakeCamera,
    pub scene: RefCell<Vec<(ModelKey, String)>>,
    pub resizes: RefCell<Vec<ViewportSize>>,
    pub renders: Cell<usize>,
    pub grid: Cell<Option<bool>>,
}

impl RecordingRenderer {
    pub fn scene_names(&self) -> Vec<String> {
        self.scene.borrow().iter().map(|(_, name)| name.clone()).collect()
    }
}

impl ViewportRenderer for RecordingRenderer {
    fn add_model(&self, key: ModelKey, model: &dyn LoadedModel) {
        self.scene.borrow_mut().push((key, model.name().to_string()));
    }

    fn remove_model(&self, key: ModelKey, _model: &dyn LoadedModel) {
        self.scene.borrow_mut().retain(|(k, _)| *k != key);
    }

    fn request_render(&self) {
        self.renders.set(self.renders.get() + 1);
    }

    fn resize(&self, size: ViewportSize) {
        self.resizes.borrow_mut().push(size);
    }

    fn camera(&self) -> &dyn CameraControl {
        &self.camera
    }

    fn set_grid_visible(&self, visible: bool) {
        self.grid.set(Some(visible));
    }
}

#[derive(Default)]
pub struct FakeHighlighter {
    pub events: SelectionEvents,
    pub settings: Cell<Option<HighlighterSettings>>,
    pub clears: Cell<usize>,
}

impl Highlighter for FakeHighlighter {
    fn setup(&self, settings: &HighlighterSettings) {
        self.settings.set(Some(*settings));
    }

    fn events(&self) -> &SelectionEvents {
        &self.events
    }

    fn clear(&self) {
        self.clears.set(self.clears.get() + 1);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub frames: RefCell<Vec<(ViewId, Vec<ViewRow>, ViewState)>>,
}

impl RecordingSink {
    /// Rows of the latest frame rendered for `view`.
    pub fn last_rows(&self, view: ViewId) -> Option<Vec<ViewRow>> {
        self.frames
            .borrow()
            .iter()
            .rev()
            .find(|(id, _, _)| *id == view)
            .map(|(_, rows, _)| rows.clone())
    }
}

impl ViewSink for RecordingSink {
    fn render(&self, view: ViewId, rows: &[ViewRow], state: &ViewState) {
        self.frames.borrow_mut().push((view, rows.to_vec(), state.clone()));
    }
}

/// Shared fakes, kept by the test after the viewer takes its copies.
#[derive(Default)]
pub struct Fakes {
    pub host: Rc<MemoryHost>,
    pub loader: Rc<GatedLoader>,
    pub renderer: Rc<RecordingRenderer>,
    pub highlighter: Rc<FakeHighlighter>,
    pub sink: Rc<RecordingSink>,
}

impl Fakes {
    pub fn parts(&self, pool: &LocalPool) -> ViewerParts {
        ViewerParts {
            host: self.host.clone(),
            loader: self.loader.clone(),
            renderer: self.renderer.clone(),
            highlighter: self.highlighter.clone(),
            spawner: Rc::new(pool.spawner()),
            view_sink: Some(self.sink.clone()),
        }
    }
}

pub struct Rig {
    pub pool: LocalPool,
    pub fakes: Fakes,
    pub viewer: IfcViewer,
}

impl Rig {
    /// Initialize a viewer, optionally with a model already on the host.
    pub fn start(config: ViewerConfig, initial: Option<&str>) -> Self {
        let mut pool = LocalPool::new();
        let fakes = Fakes::default();
        if let Some(contents) = initial {
            fakes.host.set_model_contents(contents);
        }
        let parts = fakes.parts(&pool);
        let viewer = pool
            .run_until(IfcViewer::initialize(parts, config))
            .expect("viewer should initialize");
        Rig { pool, fakes, viewer }
    }

    pub fn settle(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Host-side change of `ifc_model`, without running spawned work.
    pub fn change_model(&self, contents: &str) {
        self.fakes.host.set_model_contents(contents);
        self.viewer
            .dispatch(ViewerEvent::AttributeChanged(HostAttribute::IfcModel));
    }

    pub fn set_model(&mut self, contents: &str) {
        self.change_model(contents);
        self.settle();
    }

    pub fn highlight(&self, selection: SelectionMap) {
        self.fakes.highlighter.events.on_highlight.trigger(selection);
    }

    pub fn clear(&self) {
        self.fakes.highlighter.events.on_clear.trigger(());
    }

    pub fn key(&self, index: usize) -> ModelKey {
        self.viewer.pipeline().models().keys()[index]
    }

    pub fn committed_guids(&self) -> Option<Vec<String>> {
        self.fakes.host.committed_guids()
    }

    pub fn committed(&self, name: &str) -> Option<serde_json::Value> {
        self.fakes.host.committed(name)
    }
}
