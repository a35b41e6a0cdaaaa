// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loader pipeline: engine bootstrap, decode, scene attachment.
//!
//! Every [`LoaderPipeline::load`] call takes a generation ticket before it
//! suspends. When the decode finishes, the result is only attached if no
//! newer load has started since; otherwise the decoded model is disposed and
//! the call reports [`LoadOutcome::Superseded`]. Scene mutation happens in one
//! synchronous step after the last suspension point, so two loads never
//! interleave their writes.

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use futures::future::{self, FutureExt, LocalBoxFuture};

use crate::config::RetentionMode;
use crate::engine::{LoadFlags, LoadedModel, LoaderSettings, ModelLoader, Payload, ViewportRenderer};
use crate::error::{InitializationError, LoadError};
use crate::model::{ModelKey, ModelSet};

/// Result of a load that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The model is in the scene. `replaced` lists the keys it displaced.
    Attached { key: ModelKey, replaced: Vec<ModelKey> },
    /// A newer load started first; the decoded model was discarded.
    Superseded,
}

pub struct LoaderPipeline {
    loader: Rc<dyn ModelLoader>,
    renderer: Rc<dyn ViewportRenderer>,
    retention: RetentionMode,
    coordinate_to_origin: bool,
    models: RefCell<ModelSet>,
    generation: Cell<u64>,
    in_flight: Cell<usize>,
}

impl LoaderPipeline {
    /// Run the one-time loader setup. Failure is fatal for the widget.
    pub async fn initialize(
        loader: Rc<dyn ModelLoader>,
        renderer: Rc<dyn ViewportRenderer>,
        settings: &LoaderSettings,
        retention: RetentionMode,
    ) -> Result<Self, InitializationError> {
        tracing::debug!(worker = ?settings.worker_url, "Setting up model loader");
        loader.setup(settings).await?;
        tracing::info!(?retention, "Loader pipeline ready");

        Ok(Self {
            loader,
            renderer,
            retention,
            coordinate_to_origin: settings.coordinate_to_origin,
            models: RefCell::new(ModelSet::new()),
            generation: Cell::new(0),
            in_flight: Cell::new(0),
        })
    }

    /// Decode `bytes` and attach the result to the scene.
    ///
    /// The generation ticket is taken when this is called, not when the
    /// returned future is first polled.
    pub fn load(self: &Rc<Self>, bytes: Payload) -> LocalBoxFuture<'static, Result<LoadOutcome, LoadError>> {
        if bytes.is_empty() {
            self.supersede();
            return future::ready(Err(LoadError::EmptyPayload)).boxed_local();
        }

        let generation = self.supersede();
        self.in_flight.set(self.in_flight.get() + 1);

        let flags = LoadFlags {
            name: format!("model-{}", generation),
            coordinate_to_origin: self.coordinate_to_origin,
        };
        tracing::debug!(generation, bytes = bytes.len(), "Load started");
        let decode = self.loader.load(bytes, flags);

        let this = Rc::clone(self);
        async move {
            let result = decode.await;
            this.in_flight.set(this.in_flight.get().saturating_sub(1));

            if this.generation.get() != generation {
                match result {
                    Ok(model) => {
                        tracing::debug!(generation, model = model.name(), "Discarding superseded model");
                        model.dispose();
                    }
                    Err(err) => tracing::debug!(generation, error = %err, "Superseded load failed"),
                }
                return Ok(LoadOutcome::Superseded);
            }

            match result {
                Ok(model) => Ok(this.attach(model)),
                Err(err) => {
                    tracing::warn!(generation, error = %err, "Load failed; scene left unchanged");
                    Err(err)
                }
            }
        }
        .boxed_local()
    }

    /// Take a generation ticket without loading anything.
    ///
    /// Loads still in flight finish as [`LoadOutcome::Superseded`]. Used when
    /// the latest request cannot be loaded at all.
    pub fn supersede(&self) -> u64 {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        generation
    }

    fn attach(&self, model: Rc<dyn LoadedModel>) -> LoadOutcome {
        let replaced = match self.retention {
            RetentionMode::Replace => self.models.borrow_mut().drain(),
            RetentionMode::Accumulate => Vec::new(),
        };
        for (key, old) in &replaced {
            self.renderer.remove_model(*key, old.as_ref());
            old.dispose();
        }

        model.use_camera(self.renderer.camera());
        let key = self.models.borrow_mut().insert(Rc::clone(&model));
        self.renderer.add_model(key, model.as_ref());
        self.renderer.request_render();

        tracing::info!(
            model = ?key,
            name = model.name(),
            replaced = replaced.len(),
            loaded = self.models.borrow().len(),
            "Model attached"
        );
        LoadOutcome::Attached {
            key,
            replaced: replaced.into_iter().map(|(key, _)| key).collect(),
        }
    }

    /// Remove one model from the scene and dispose it.
    ///
    /// Views and selection are not updated here; go through
    /// [`IfcViewer::unload`](crate::IfcViewer::unload).
    pub(crate) fn unload(&self, key: ModelKey) -> bool {
        let removed = self.models.borrow_mut().remove(key);
        match removed {
            Some(model) => {
                self.renderer.remove_model(key, model.as_ref());
                model.dispose();
                self.renderer.request_render();
                true
            }
            None => false,
        }
    }

    /// Remove and dispose every model. Returns how many were removed.
    pub(crate) fn clear(&self) -> usize {
        let drained = self.models.borrow_mut().drain();
        for (key, model) in &drained {
            self.renderer.remove_model(*key, model.as_ref());
            model.dispose();
        }
        if !drained.is_empty() {
            self.renderer.request_render();
        }
        drained.len()
    }

    pub fn models(&self) -> Ref<'_, ModelSet> {
        self.models.borrow()
    }

    pub fn model(&self, key: ModelKey) -> Option<Rc<dyn LoadedModel>> {
        self.models.borrow().get(key).cloned()
    }

    pub fn retention(&self) -> RetentionMode {
        self.retention
    }

    /// Ticket of the most recently started load.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.get() > 0
    }
}
