// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Composition root.
//!
//! [`IfcViewer::initialize`] builds the loader pipeline, view binder,
//! selection bridge and layout composer from explicitly passed
//! collaborators. Adapters feed every host, highlighter and container event
//! through [`IfcViewer::dispatch`].

use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::config::ViewerConfig;
use crate::engine::{Highlighter, HighlighterSettings, LoaderSettings, ModelLoader, Payload, ViewportRenderer};
use crate::error::{InitializationError, LoadError};
use crate::events::{ListenerId, ViewerEvent};
use crate::host::{HostAttribute, HostBridge, HostLink, HostTransaction};
use crate::layout::{LayoutComposer, WidgetRoot};
use crate::loader::{LoadOutcome, LoaderPipeline};
use crate::model::{ModelKey, SelectionMap};
use crate::selection::SelectionBridge;
use crate::views::{PropertyTable, SpatialTree, ViewBinder, ViewCommand, ViewId, ViewSink};

/// Collaborators handed to [`IfcViewer::initialize`].
pub struct ViewerParts {
    pub host: Rc<dyn HostLink>,
    pub loader: Rc<dyn ModelLoader>,
    pub renderer: Rc<dyn ViewportRenderer>,
    pub highlighter: Rc<dyn Highlighter>,
    /// Runs reloads and selection translations.
    pub spawner: Rc<dyn LocalSpawn>,
    pub view_sink: Option<Rc<dyn ViewSink>>,
}

struct ViewerInner {
    config: ViewerConfig,
    host: HostBridge,
    renderer: Rc<dyn ViewportRenderer>,
    highlighter: Rc<dyn Highlighter>,
    spawner: Rc<dyn LocalSpawn>,
    pipeline: Rc<LoaderPipeline>,
    views: Rc<RefCell<ViewBinder>>,
    selection: Rc<SelectionBridge>,
    layout: RefCell<LayoutComposer>,
    root: WidgetRoot,
    listeners: RefCell<Vec<(Channel, ListenerId)>>,
    disposed: Cell<bool>,
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Highlight,
    Clear,
}

/// A running viewer widget. Cheap to clone.
#[derive(Clone)]
pub struct IfcViewer {
    inner: Rc<ViewerInner>,
}

impl IfcViewer {
    /// Bootstrap the viewer and load the current `ifc_model`.
    ///
    /// Fails only on configuration or engine setup errors. A model that
    /// cannot be decoded is reported through `load_error` instead.
    pub async fn initialize(parts: ViewerParts, config: ViewerConfig) -> Result<Self, InitializationError> {
        config.validate()?;

        let ViewerParts {
            host,
            loader,
            renderer,
            highlighter,
            spawner,
            view_sink,
        } = parts;

        let settings = LoaderSettings {
            worker_url: config.worker_url.clone(),
            coordinate_to_origin: config.coordinate_to_origin,
        };
        let pipeline = Rc::new(
            LoaderPipeline::initialize(loader, Rc::clone(&renderer), &settings, config.retention).await?,
        );

        renderer.camera().set_look_at(&config.camera);
        renderer.set_grid_visible(config.show_grid);
        highlighter.setup(&HighlighterSettings {
            zoom_to_selection: config.zoom_to_selection,
        });

        let mut binder = ViewBinder::new(view_sink);
        binder.add_view(Box::new(PropertyTable::new()));
        if config.show_spatial_tree {
            binder.add_view(Box::new(SpatialTree::new()));
        }
        let views = Rc::new(RefCell::new(binder));

        let host = HostBridge::new(host);
        let selection = Rc::new(SelectionBridge::new(
            host.clone(),
            Rc::clone(&pipeline),
            Rc::clone(&views),
            Rc::clone(&highlighter),
        ));

        let layout = LayoutComposer::new(Rc::clone(&renderer), &config);
        let root = layout.build();

        let viewer = IfcViewer {
            inner: Rc::new(ViewerInner {
                config,
                host,
                renderer,
                highlighter,
                spawner,
                pipeline,
                views,
                selection,
                layout: RefCell::new(layout),
                root,
                listeners: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
            }),
        };
        viewer.subscribe();

        if viewer.inner.host.model_contents().is_some() {
            // Outcome is already reported to the host.
            let _ = viewer.reload().await;
        } else {
            tracing::debug!("No initial model");
        }
        tracing::info!("Viewer initialized");
        Ok(viewer)
    }

    fn subscribe(&self) {
        let events = self.inner.highlighter.events();

        let weak: Weak<ViewerInner> = Rc::downgrade(&self.inner);
        let highlight = events.on_highlight.add(move |selection: &SelectionMap| {
            if let Some(inner) = weak.upgrade() {
                IfcViewer { inner }.dispatch(ViewerEvent::Highlight(selection.clone()));
            }
        });

        let weak: Weak<ViewerInner> = Rc::downgrade(&self.inner);
        let clear = events.on_clear.add(move |_: &()| {
            if let Some(inner) = weak.upgrade() {
                IfcViewer { inner }.dispatch(ViewerEvent::Clear);
            }
        });

        self.inner
            .listeners
            .borrow_mut()
            .extend([(Channel::Highlight, highlight), (Channel::Clear, clear)]);
    }

    /// Single entry point for adapter events.
    pub fn dispatch(&self, event: ViewerEvent) {
        if self.inner.disposed.get() {
            tracing::debug!(?event, "Event after dispose ignored");
            return;
        }
        match event {
            ViewerEvent::AttributeChanged(HostAttribute::IfcModel) => {
                let reload = self.reload();
                self.spawn(async move {
                    let _ = reload.await;
                });
            }
            ViewerEvent::AttributeChanged(attribute) => {
                tracing::debug!(%attribute, "Attribute change needs no action");
            }
            ViewerEvent::Highlight(selection) => {
                let publish = self.inner.selection.on_highlight(selection);
                self.spawn(async move {
                    publish.await;
                });
            }
            ViewerEvent::Clear => {
                self.inner.selection.on_clear();
            }
            ViewerEvent::Resize(metrics) => {
                self.inner.layout.borrow_mut().on_resize(metrics);
            }
            ViewerEvent::FullscreenChanged(fullscreen) => {
                self.inner.layout.borrow_mut().set_fullscreen(fullscreen);
            }
            ViewerEvent::CameraRest => self.inner.renderer.request_render(),
        }
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + 'static) {
        if let Err(err) = self.inner.spawner.spawn_local(task) {
            tracing::error!(error = %err, "Failed to spawn viewer task");
        }
    }

    /// Reload from the `ifc_model` host attribute.
    pub fn reload(&self) -> LocalBoxFuture<'static, Result<LoadOutcome, LoadError>> {
        match self.inner.host.model_contents() {
            Some(contents) => self.load_bytes(Rc::from(contents.into_bytes())),
            None => {
                // Loads still in flight are older than this request.
                self.inner.pipeline.supersede();
                let err = LoadError::MissingModel;
                self.inner.report_load_error(&err);
                futures::future::ready(Err(err)).boxed_local()
            }
        }
    }

    /// Load a payload and publish the outcome to host and views.
    ///
    /// The load is ordered against other loads when this is called.
    pub fn load_bytes(&self, bytes: Payload) -> LocalBoxFuture<'static, Result<LoadOutcome, LoadError>> {
        let load = self.inner.pipeline.load(bytes);
        let inner = Rc::clone(&self.inner);
        async move {
            let result = load.await;
            if inner.disposed.get() {
                return result;
            }
            match &result {
                Ok(LoadOutcome::Attached { key, .. }) => inner.finish_reload(*key),
                Ok(LoadOutcome::Superseded) => tracing::debug!("Superseded load finished"),
                Err(err) => inner.report_load_error(err),
            }
            result
        }
        .boxed_local()
    }

    /// Remove one model from the scene.
    ///
    /// Views are rebound to the remaining models and the selection is reset
    /// in one host commit.
    pub fn unload(&self, key: ModelKey) -> bool {
        if self.inner.disposed.get() || !self.inner.pipeline.unload(key) {
            return false;
        }
        self.inner.models_changed().commit();
        tracing::info!(model = ?key, "Model unloaded; selection reset");
        true
    }

    /// Remove every model. Returns how many were removed.
    pub fn clear_models(&self) -> usize {
        if self.inner.disposed.get() {
            return 0;
        }
        let removed = self.inner.pipeline.clear();
        if removed > 0 {
            self.inner.models_changed().commit();
        }
        removed
    }

    /// Apply a view command to a managed view.
    pub fn apply_view_command(&self, view: ViewId, command: ViewCommand) -> bool {
        self.inner.views.borrow_mut().apply(view, command)
    }

    pub fn root(&self) -> &WidgetRoot {
        &self.inner.root
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.inner.config
    }

    pub fn pipeline(&self) -> &LoaderPipeline {
        &self.inner.pipeline
    }

    pub fn views(&self) -> Ref<'_, ViewBinder> {
        self.inner.views.borrow()
    }

    pub fn layout(&self) -> Ref<'_, LayoutComposer> {
        self.inner.layout.borrow()
    }

    /// Selection of the last published selection event.
    pub fn selection(&self) -> SelectionMap {
        self.inner.selection.current()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Unsubscribe from the highlighter and release every model.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let events = self.inner.highlighter.events();
        for (channel, id) in self.inner.listeners.borrow_mut().drain(..) {
            match channel {
                Channel::Highlight => events.on_highlight.remove(id),
                Channel::Clear => events.on_clear.remove(id),
            };
        }
        let released = self.inner.pipeline.clear();
        tracing::info!(released, "Viewer disposed");
    }
}

impl ViewerInner {
    /// Rebind views to the current models and stage a selection reset.
    fn models_changed(&self) -> HostTransaction {
        self.highlighter.clear();
        self.views.borrow_mut().on_models_changed(&self.pipeline.models());

        let mut tx = self.host.transaction();
        self.selection.reset(&mut tx);
        tx
    }

    fn finish_reload(&self, key: ModelKey) {
        let mut tx = self.models_changed();
        tx.set_load_error(None);
        tx.commit();
        tracing::info!(model = ?key, "Reload complete; selection reset");
    }

    fn report_load_error(&self, err: &LoadError) {
        tracing::warn!(error = %err, "Model load failed");
        let mut tx = self.host.transaction();
        tx.set_load_error(Some(err.to_string()));
        tx.commit();
    }
}
