// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Anywidget
//!
//! Keeps a notebook host's attributes and a live 3D IFC viewer in sync.
//!
//! The host owns `ifc_model` (raw file contents) and observes
//! `selected_guids`. The viewer loads whatever the host provides, and every
//! pick in the viewport is translated to GlobalIds and committed back.
//!
//! ## Components
//!
//! - [`LoaderPipeline`]: engine bootstrap, decode, scene attachment; later
//!   loads supersede earlier ones
//! - [`SelectionBridge`]: highlighter events to committed `selected_guids`,
//!   last raised event wins
//! - [`ViewBinder`]: property table and spatial tree, always bound to the
//!   loaded models
//! - [`LayoutComposer`]: two-region layout and viewport sizing
//! - [`IfcViewer`]: composition root and event dispatch
//!
//! Rendering, geometry decoding, picking and the host channel are external
//! collaborators behind the traits in [`engine`] and [`host`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifc_anywidget::{IfcViewer, ViewerConfig, ViewerEvent, HostAttribute};
//!
//! let viewer = IfcViewer::initialize(parts, ViewerConfig::default()).await?;
//! viewer.dispatch(ViewerEvent::AttributeChanged(HostAttribute::IfcModel));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod layout;
pub mod loader;
pub mod model;
pub mod selection;
pub mod step_loader;
pub mod views;
pub mod viewer;

pub use config::{LookAt, RetentionMode, ViewerConfig};
pub use engine::{
    CameraControl, Highlighter, HighlighterSettings, LoadFlags, LoadedModel, LoaderSettings, ModelLoader,
    Payload, ViewportRenderer, ViewportSize,
};
pub use error::{ConfigError, InitializationError, LayoutError, LoadError, TranslationError, ViewerError};
pub use events::{EventChannel, ListenerId, SelectionEvents, ViewerEvent};
pub use host::{HostAttribute, HostBridge, HostLink, HostTransaction, MemoryHost};
pub use layout::{ContainerMetrics, GridLayout, LayoutComposer, PanelSpec, SectionSpec, WidgetRoot};
pub use loader::{LoadOutcome, LoaderPipeline};
pub use model::{ElementId, ModelKey, ModelSet, SelectionMap};
pub use selection::{SelectionBridge, SelectionOutcome};
pub use step_loader::{StepModel, StepModelLoader};
pub use viewer::{IfcViewer, ViewerParts};
pub use views::{
    DataBoundView, PropertyTable, SpatialTree, ViewBinder, ViewBinding, ViewCommand, ViewId, ViewRow, ViewSink,
    ViewState,
};
