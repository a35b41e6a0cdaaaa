// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Viewer configuration.
//!
//! Read from the optional `viewer_config` host attribute. Every field has a
//! default so an absent or partial object is valid.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What happens to already loaded models when a new one attaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionMode {
    /// Dispose every loaded model, then attach the new one.
    #[default]
    Replace,
    /// Keep loaded models; the new one is added next to them.
    Accumulate,
}

/// Camera placement applied once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookAt {
    pub position: [f64; 3],
    pub target: [f64; 3],
}

impl Default for LookAt {
    fn default() -> Self {
        Self {
            position: [10.0, 5.5, 5.0],
            target: [-4.0, -1.0, -6.5],
        }
    }
}

/// Widget configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    /// Model retention policy of the loader pipeline.
    pub retention: RetentionMode,
    /// Viewport height (px) outside fullscreen; the host does not expose cell height.
    pub fallback_height: u32,
    /// Space (px) reserved for host chrome in fullscreen mode.
    pub fullscreen_chrome_padding: u32,
    /// Width (px) of the side panel column.
    pub side_panel_width: u32,
    /// Fly the camera to highlighted elements.
    pub zoom_to_selection: bool,
    /// Shift model coordinates to the origin while decoding.
    pub coordinate_to_origin: bool,
    pub camera: LookAt,
    /// Geometry worker bundle; `None` uses the engine's bundled default.
    pub worker_url: Option<String>,
    /// Debounce (ms) for panel search inputs.
    pub search_debounce_ms: u32,
    pub show_grid: bool,
    /// Add the spatial tree section to the side panel.
    pub show_spatial_tree: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            retention: RetentionMode::Replace,
            fallback_height: 600,
            fullscreen_chrome_padding: 48,
            side_panel_width: 320,
            zoom_to_selection: true,
            coordinate_to_origin: true,
            camera: LookAt::default(),
            worker_url: None,
            search_debounce_ms: 250,
            show_grid: true,
            show_spatial_tree: false,
        }
    }
}

impl ViewerConfig {
    /// Parse and validate a JSON object; `null` yields the defaults.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: ViewerConfig = if value.is_null() {
            ViewerConfig::default()
        } else {
            serde_json::from_value(value)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback_height == 0 {
            return Err(ConfigError::OutOfRange {
                field: "fallbackHeight",
                reason: "must be greater than zero".into(),
            });
        }
        if self.side_panel_width == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sidePanelWidth",
                reason: "must be greater than zero".into(),
            });
        }
        if self.search_debounce_ms > 10_000 {
            return Err(ConfigError::OutOfRange {
                field: "searchDebounceMs",
                reason: format!("{} exceeds 10000", self.search_debounce_ms),
            });
        }
        if self.camera.position == self.camera.target {
            return Err(ConfigError::OutOfRange {
                field: "camera",
                reason: "position and target coincide".into(),
            });
        }
        if self.camera.position.iter().chain(&self.camera.target).any(|v| !v.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "camera",
                reason: "coordinates must be finite".into(),
            });
        }
        if matches!(&self.worker_url, Some(url) if url.trim().is_empty()) {
            return Err(ConfigError::OutOfRange {
                field: "workerUrl",
                reason: "must not be blank".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_and_partial_configs_use_defaults() {
        assert_eq!(ViewerConfig::from_json(json!(null)).unwrap(), ViewerConfig::default());

        let config = ViewerConfig::from_json(json!({
            "retention": "accumulate",
            "fallbackHeight": 480,
            "showSpatialTree": true
        }))
        .unwrap();
        assert_eq!(config.retention, RetentionMode::Accumulate);
        assert_eq!(config.fallback_height, 480);
        assert!(config.show_spatial_tree);
        assert_eq!(config.search_debounce_ms, 250);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let err = ViewerConfig::from_json(json!({ "fallbackHeight": 0 })).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "fallbackHeight", .. }));

        let err = ViewerConfig::from_json(json!({
            "camera": { "position": [1.0, 1.0, 1.0], "target": [1.0, 1.0, 1.0] }
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "camera", .. }));

        let err = ViewerConfig::from_json(json!({ "workerUrl": "  " })).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "workerUrl", .. }));
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = ViewerConfig::from_json(json!({ "retention": "sometimes" })).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }
}
