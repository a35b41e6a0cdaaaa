// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model loader backed by the STEP element index.
//!
//! Carries no geometry. Native hosts use it directly; the wasm bindings pair
//! its index with the JavaScript geometry engine.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use futures::future::{self, FutureExt, LocalBoxFuture};
use ifc_anywidget_core::{ElementIndex, ElementRecord, PropertySet};

use crate::engine::{CameraControl, LoadFlags, LoadedModel, LoaderSettings, ModelLoader, Payload};
use crate::error::{InitializationError, LoadError, TranslationError};
use crate::model::ElementId;

/// Loader that decodes payloads into an [`ElementIndex`].
#[derive(Debug, Default)]
pub struct StepModelLoader {
    ready: Rc<Cell<bool>>,
}

impl StepModelLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }
}

impl ModelLoader for StepModelLoader {
    fn setup(&self, _settings: &LoaderSettings) -> LocalBoxFuture<'static, Result<(), InitializationError>> {
        self.ready.set(true);
        future::ready(Ok(())).boxed_local()
    }

    fn load(&self, bytes: Payload, flags: LoadFlags) -> LocalBoxFuture<'static, Result<Rc<dyn LoadedModel>, LoadError>> {
        let ready = self.ready.clone();
        async move {
            if !ready.get() {
                return Err(LoadError::Engine("loader used before setup".into()));
            }
            if bytes.is_empty() {
                return Err(LoadError::EmptyPayload);
            }
            let index = ElementIndex::parse(&bytes)?;
            tracing::debug!(
                model = %flags.name,
                elements = index.len(),
                schema = index.schema().unwrap_or("unknown"),
                "Decoded element index"
            );
            Ok(Rc::new(StepModel::new(flags.name, index)) as Rc<dyn LoadedModel>)
        }
        .boxed_local()
    }
}

/// A model decoded by [`StepModelLoader`].
#[derive(Debug)]
pub struct StepModel {
    name: String,
    index: Rc<ElementIndex>,
    disposed: Cell<bool>,
    camera_bound: Cell<bool>,
}

impl StepModel {
    pub fn new(name: impl Into<String>, index: ElementIndex) -> Self {
        Self {
            name: name.into(),
            index: Rc::new(index),
            disposed: Cell::new(false),
            camera_bound: Cell::new(false),
        }
    }

    pub fn index(&self) -> &ElementIndex {
        &self.index
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn is_camera_bound(&self) -> bool {
        self.camera_bound.get()
    }
}

impl LoadedModel for StepModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn element(&self, id: ElementId) -> Option<ElementRecord> {
        self.index.get(id.0).cloned()
    }

    fn property_sets(&self, id: ElementId) -> Vec<PropertySet> {
        self.index.property_sets(id.0).into_iter().cloned().collect()
    }

    fn spatial_roots(&self) -> Vec<ElementId> {
        self.index.spatial_roots().into_iter().map(ElementId).collect()
    }

    fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.index.children(id.0).iter().copied().map(ElementId).collect()
    }

    fn translate(&self, ids: Vec<ElementId>) -> LocalBoxFuture<'static, Result<Vec<String>, TranslationError>> {
        if self.disposed.get() {
            return future::ready(Err(TranslationError::Disposed(self.name.clone()))).boxed_local();
        }
        let (guids, missing) = self.index.guids(ids.iter().map(|id| id.0));
        if !missing.is_empty() {
            tracing::debug!(model = %self.name, missing = ?missing, "Ids without GlobalId skipped");
        }
        future::ready(Ok(guids)).boxed_local()
    }

    fn use_camera(&self, _camera: &dyn CameraControl) {
        self.camera_bound.set(true);
    }

    fn dispose(&self) {
        self.disposed.set(true);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    const MODEL: &str = "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC2X3'));\nENDSEC;\nDATA;\n\
#1=IFCPROJECT('0YvctVUKr0kugbFTf53O9L',$,'P',$,$,$,$,$,$);\n\
#5=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'Wall',$,$,$,$,$);\n\
#6=IFCSPACE('3vB2YO$MX4xv5uCqZZG05x',$,$,$,$,$,$,$,.ELEMENT.,.INTERNAL.,$);\n\
ENDSEC;\nEND-ISO-10303-21;\n";

    fn flags() -> LoadFlags {
        LoadFlags {
            name: "model-1".into(),
            coordinate_to_origin: true,
        }
    }

    #[test]
    fn load_requires_setup() {
        let loader = StepModelLoader::new();
        let result = block_on(loader.load(Rc::from(MODEL.as_bytes()), flags()));
        assert!(matches!(result, Err(LoadError::Engine(_))));

        block_on(loader.setup(&LoaderSettings::default())).unwrap();
        assert!(loader.is_ready());
        let model = block_on(loader.load(Rc::from(MODEL.as_bytes()), flags())).unwrap();
        assert_eq!(model.name(), "model-1");
        assert_eq!(model.element(ElementId(5)).unwrap().ifc_type, "IFCWALL");
    }

    #[test]
    fn load_rejects_empty_and_malformed_payloads() {
        let loader = StepModelLoader::new();
        block_on(loader.setup(&LoaderSettings::default())).unwrap();

        let empty = block_on(loader.load(Rc::from(&b""[..]), flags()));
        assert!(matches!(empty, Err(LoadError::EmptyPayload)));

        let garbage = block_on(loader.load(Rc::from(&b"<html>"[..]), flags()));
        assert!(matches!(garbage, Err(LoadError::Decode(_))));
    }

    #[test]
    fn translate_keeps_order_and_skips_unknown_ids() {
        let model = StepModel::new("m", ElementIndex::parse(MODEL.as_bytes()).unwrap());
        let guids = block_on(model.translate(vec![ElementId(6), ElementId(42), ElementId(5)])).unwrap();
        assert_eq!(guids, vec!["3vB2YO$MX4xv5uCqZZG05x", "2O2Fr$t4X7Zf8NOew3FLOH"]);

        model.dispose();
        assert!(model.is_disposed());
        let result = block_on(model.translate(vec![ElementId(5)]));
        assert!(matches!(result, Err(TranslationError::Disposed(_))));
    }
}
