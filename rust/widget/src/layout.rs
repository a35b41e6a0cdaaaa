// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Widget layout and viewport sizing.
//!
//! The host never reports the cell height, so outside fullscreen the
//! viewport uses a fixed fallback height. In fullscreen the window height
//! minus the host chrome is available.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;

use crate::config::ViewerConfig;
use crate::engine::{ViewportRenderer, ViewportSize};
use crate::error::LayoutError;
use crate::views::ViewId;

/// Container measurements reported by the resize observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerMetrics {
    /// Container width in CSS pixels.
    pub width: f64,
    /// Window inner height; only consulted in fullscreen.
    pub window_height: Option<f64>,
    pub fullscreen: bool,
}

impl ContainerMetrics {
    pub fn new(width: f64, window_height: Option<f64>, fullscreen: bool) -> Self {
        Self {
            width,
            window_height,
            fullscreen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    pub template: String,
    pub elements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSpec {
    pub view: ViewId,
    pub label: String,
    pub icon: String,
    /// Label of the expand/collapse toggle for the current view state.
    pub expand_label: String,
    pub search_placeholder: String,
    pub search_debounce_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSpec {
    /// Grid area the panel occupies.
    pub area: String,
    pub label: String,
    pub sections: Vec<SectionSpec>,
}

/// Declarative description of the composed widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetRoot {
    pub class: String,
    pub layouts: BTreeMap<String, GridLayout>,
    pub layout: String,
    pub viewport_area: String,
    pub panels: Vec<PanelSpec>,
    pub height: u32,
}

pub const MAIN_LAYOUT: &str = "main";
pub const PANEL_AREA: &str = "propertiesPanel";
pub const VIEWPORT_AREA: &str = "viewport";

/// Builds the widget description and keeps the viewport sized.
pub struct LayoutComposer {
    renderer: Rc<dyn ViewportRenderer>,
    fallback_height: u32,
    chrome_padding: u32,
    side_panel_width: u32,
    search_debounce_ms: u32,
    show_spatial_tree: bool,
    metrics: Option<ContainerMetrics>,
    applied: Option<ViewportSize>,
}

impl LayoutComposer {
    pub fn new(renderer: Rc<dyn ViewportRenderer>, config: &ViewerConfig) -> Self {
        Self {
            renderer,
            fallback_height: config.fallback_height,
            chrome_padding: config.fullscreen_chrome_padding,
            side_panel_width: config.side_panel_width,
            search_debounce_ms: config.search_debounce_ms,
            show_spatial_tree: config.show_spatial_tree,
            metrics: None,
            applied: None,
        }
    }

    pub fn build(&self) -> WidgetRoot {
        let template = format!(
            "\"{} {}\" /{}px 1fr",
            PANEL_AREA, VIEWPORT_AREA, self.side_panel_width
        );
        let mut layouts = BTreeMap::new();
        layouts.insert(
            MAIN_LAYOUT.to_string(),
            GridLayout {
                template,
                elements: vec![PANEL_AREA.to_string(), VIEWPORT_AREA.to_string()],
            },
        );

        let mut sections = vec![self.section(ViewId::Properties, "Element Data", "ic:round-table-rows")];
        if self.show_spatial_tree {
            sections.push(self.section(ViewId::SpatialTree, "Spatial Structure", "ph:tree-structure-fill"));
        }

        WidgetRoot {
            class: "bim-viewer".to_string(),
            layouts,
            layout: MAIN_LAYOUT.to_string(),
            viewport_area: VIEWPORT_AREA.to_string(),
            panels: vec![PanelSpec {
                area: PANEL_AREA.to_string(),
                label: "Properties".to_string(),
                sections,
            }],
            height: self.fallback_height,
        }
    }

    fn section(&self, view: ViewId, label: &str, icon: &str) -> SectionSpec {
        SectionSpec {
            view,
            label: label.to_string(),
            icon: icon.to_string(),
            expand_label: expand_label(false).to_string(),
            search_placeholder: "Search Property".to_string(),
            search_debounce_ms: self.search_debounce_ms,
        }
    }

    /// Viewport size for the given container, without touching the renderer.
    ///
    /// A missing fullscreen height is reported as an error alongside the
    /// fallback size so the caller can log it.
    pub fn compute(&self, metrics: &ContainerMetrics) -> Result<(ViewportSize, Option<LayoutError>), LayoutError> {
        if !metrics.width.is_finite() || metrics.width <= 0.0 {
            return Err(LayoutError::CollapsedContainer(metrics.width));
        }
        let width = (metrics.width - self.side_panel_width as f64).max(1.0).round() as u32;

        if !metrics.fullscreen {
            return Ok((ViewportSize::new(width, self.fallback_height), None));
        }
        match metrics.window_height.filter(|h| h.is_finite() && *h > 0.0) {
            Some(window) => {
                let height = (window - self.chrome_padding as f64).max(1.0).round() as u32;
                Ok((ViewportSize::new(width, height), None))
            }
            None => Ok((
                ViewportSize::new(width, self.fallback_height),
                Some(LayoutError::MissingViewportHeight),
            )),
        }
    }

    /// Recompute on container resize. Returns the applied size, or `None`
    /// when nothing changed.
    ///
    /// A container without usable width keeps the last applied width (1 px
    /// before the first resize) at the fallback height.
    pub fn on_resize(&mut self, metrics: ContainerMetrics) -> Option<ViewportSize> {
        self.metrics = Some(metrics);
        let size = match self.compute(&metrics) {
            Ok((size, None)) => size,
            Ok((size, Some(err))) => {
                tracing::warn!(error = %err, fallback = self.fallback_height, "Using fallback viewport height");
                size
            }
            Err(err) => {
                tracing::warn!(error = %err, fallback = self.fallback_height, "Using fallback viewport size");
                ViewportSize::new(self.applied.map_or(1, |size| size.width), self.fallback_height)
            }
        };

        if self.applied == Some(size) {
            return None;
        }
        tracing::debug!(width = size.width, height = size.height, "Viewport resized");
        self.renderer.resize(size);
        self.renderer.camera().update_aspect(size);
        self.applied = Some(size);
        Some(size)
    }

    /// Fullscreen toggled; recompute from the last known metrics.
    pub fn set_fullscreen(&mut self, fullscreen: bool) -> Option<ViewportSize> {
        let metrics = self.metrics?;
        self.on_resize(ContainerMetrics { fullscreen, ..metrics })
    }

    /// Size last pushed to the renderer.
    pub fn applied(&self) -> Option<ViewportSize> {
        self.applied
    }
}

/// Label of the table expand toggle.
pub fn expand_label(expanded: bool) -> &'static str {
    if expanded {
        "Collapse"
    } else {
        "Expand"
    }
}
