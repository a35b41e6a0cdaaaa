// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collaborator surfaces consumed by the viewer.
//!
//! The renderer, the geometry loader and the highlighter are external
//! engines. The viewer only talks to them through these traits, which the
//! wasm bindings implement on top of the JavaScript engine and the tests
//! implement with in-memory fakes.
//!
//! All methods take `&self`: engines are shared between the pipeline, the
//! selection bridge and the layout composer, and every call happens on the
//! one UI thread.

use std::any::Any;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use ifc_anywidget_core::{ElementRecord, PropertySet};

use crate::config::LookAt;
use crate::error::{InitializationError, LoadError, TranslationError};
use crate::events::SelectionEvents;
use crate::model::{ElementId, ModelKey};

/// Raw model file contents, passed through unchanged.
pub type Payload = Rc<[u8]>;

/// Pixel size of the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height; 1.0 for a degenerate size.
    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

/// Options for one-time loader setup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderSettings {
    pub worker_url: Option<String>,
    pub coordinate_to_origin: bool,
}

/// Per-load options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadFlags {
    pub name: String,
    pub coordinate_to_origin: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HighlighterSettings {
    pub zoom_to_selection: bool,
}

/// Turns raw bytes into renderable models.
pub trait ModelLoader {
    /// Acquire the worker and build the geometry engine. Runs once.
    fn setup(&self, settings: &LoaderSettings) -> LocalBoxFuture<'static, Result<(), InitializationError>>;

    /// Decode one payload. Must not touch the scene.
    fn load(&self, bytes: Payload, flags: LoadFlags) -> LocalBoxFuture<'static, Result<Rc<dyn LoadedModel>, LoadError>>;
}

/// One decoded model.
pub trait LoadedModel {
    fn name(&self) -> &str;

    fn element(&self, id: ElementId) -> Option<ElementRecord>;

    fn property_sets(&self, id: ElementId) -> Vec<PropertySet>;

    /// Top level of the spatial breakdown.
    fn spatial_roots(&self) -> Vec<ElementId>;

    fn children(&self, id: ElementId) -> Vec<ElementId>;

    /// Map local ids to GlobalIds, in input order. Ids without a GlobalId are skipped.
    fn translate(&self, ids: Vec<ElementId>) -> LocalBoxFuture<'static, Result<Vec<String>, TranslationError>>;

    /// Bind the model to the scene camera (culling, LOD).
    fn use_camera(&self, camera: &dyn CameraControl);

    /// Release engine resources. Called once the model leaves the scene or is discarded.
    fn dispose(&self);

    fn as_any(&self) -> &dyn Any;
}

pub trait CameraControl {
    fn set_look_at(&self, look_at: &LookAt);

    fn update_aspect(&self, size: ViewportSize);
}

/// The 3D scene and its render loop.
pub trait ViewportRenderer {
    fn add_model(&self, key: ModelKey, model: &dyn LoadedModel);

    fn remove_model(&self, key: ModelKey, model: &dyn LoadedModel);

    /// Schedule a frame.
    fn request_render(&self);

    fn resize(&self, size: ViewportSize);

    fn camera(&self) -> &dyn CameraControl;

    fn set_grid_visible(&self, visible: bool);
}

/// Picking and highlight state inside the viewport.
pub trait Highlighter {
    fn setup(&self, settings: &HighlighterSettings);

    fn events(&self) -> &SelectionEvents;

    /// Drop the viewer-side selection without raising `on_clear`.
    fn clear(&self);
}
