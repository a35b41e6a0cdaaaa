// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error taxonomy for the viewer.
//!
//! Only [`InitializationError`] is fatal. Load, translation and layout
//! failures are caught at their boundary and leave the viewer usable.

use thiserror::Error;

use crate::model::ModelKey;

/// Bootstrap failed; no further operation is meaningful.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to fetch geometry worker from {url}: {reason}")]
    WorkerFetch { url: String, reason: String },

    #[error("Geometry engine setup failed: {0}")]
    Engine(String),

    #[error("Invalid viewer configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Raw bytes could not be turned into a model. The scene is left untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Model payload is empty")]
    EmptyPayload,

    #[error("Host attribute `ifc_model` has no contents")]
    MissingModel,

    #[error("Failed to decode model: {0}")]
    Decode(#[from] ifc_anywidget_core::Error),

    #[error("Geometry engine rejected model: {0}")]
    Engine(String),
}

/// Selection could not be mapped to GlobalIds. Treated as an empty selection.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Selection references a model that is not loaded: {0:?}")]
    StaleHandle(ModelKey),

    #[error("Model `{0}` has been disposed")]
    Disposed(String),

    #[error("Id translation failed: {0}")]
    Engine(String),
}

/// Viewport metrics were unusable. Resize falls back instead of failing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Container has no usable width ({0})")]
    CollapsedContainer(f64),

    #[error("Fullscreen viewport height is unavailable")]
    MissingViewportHeight,
}

/// Configuration rejected during validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Malformed configuration: {0}")]
    Malformed(String),

    #[error("`{field}` {reason}")]
    OutOfRange { field: &'static str, reason: String },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Malformed(err.to_string())
    }
}

/// Any viewer error, for callers that do not need to distinguish.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
