//! Map configuration, loadable from TOML.
//!
//! Every section and field has a default, so an empty document is a valid
//! configuration.

use std::fmt;
use std::time::Duration;

use frame_scheduler::FrameSchedulerConfig;
use renderer::RenderOptions;
use serde::Deserialize;
use tiles::ClipOverflowPolicy;

#[derive(Debug)]
pub enum ConfigError {
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(formatter, "invalid map config: {error}"),
            Self::Invalid(message) => write!(formatter, "invalid map config: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(error) => Some(error),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        Self::Parse(error)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub fade_duration_ms: u64,
    pub trace_render_tree: bool,
    pub debug_tiles: bool,
    pub clip_overflow: ClipOverflowPolicy,
    /// Style property transitions that do not name a duration of their own.
    pub style_transition_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fade_duration_ms: 300,
            trace_render_tree: false,
            debug_tiles: false,
            clip_overflow: ClipOverflowPolicy::default(),
            style_transition_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Used by camera operations that are animated without an explicit
    /// duration.
    pub default_transition_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.0,
            max_zoom: 18.0,
            default_transition_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub thread_name: String,
    pub initial_frame: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let defaults = FrameSchedulerConfig::default();
        Self {
            thread_name: defaults.thread_name,
            initial_frame: defaults.initial_frame,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub render: RenderConfig,
    pub camera: CameraConfig,
    pub scheduler: SchedulerConfig,
}

impl MapConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        if !camera.min_zoom.is_finite() || !camera.max_zoom.is_finite() {
            return Err(ConfigError::Invalid(
                "camera zoom bounds must be finite".to_owned(),
            ));
        }
        if camera.min_zoom < 0.0 || camera.min_zoom > camera.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "camera zoom range {}..{} is empty or negative",
                camera.min_zoom, camera.max_zoom
            )));
        }
        if f64::from(tiles::MAX_ZOOM_LEVEL) < camera.min_zoom {
            return Err(ConfigError::Invalid(format!(
                "camera.min_zoom exceeds the deepest tile level {}",
                tiles::MAX_ZOOM_LEVEL
            )));
        }
        if self.scheduler.thread_name.is_empty() {
            return Err(ConfigError::Invalid(
                "scheduler.thread_name must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            fade_duration: Duration::from_millis(self.render.fade_duration_ms),
            trace_render_tree: self.render.trace_render_tree,
            debug_tiles: self.render.debug_tiles,
        }
    }

    pub fn scheduler_config(&self) -> FrameSchedulerConfig {
        FrameSchedulerConfig {
            thread_name: self.scheduler.thread_name.clone(),
            initial_frame: self.scheduler.initial_frame,
        }
    }

    pub fn default_transition(&self) -> Duration {
        Duration::from_millis(self.camera.default_transition_ms)
    }

    pub fn style_transition(&self) -> Duration {
        Duration::from_millis(self.render.style_transition_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = MapConfig::from_toml_str("").expect("empty config");
        assert_eq!(config, MapConfig::default());
        assert_eq!(
            config.render_options().fade_duration,
            Duration::from_millis(300)
        );
        assert_eq!(config.scheduler_config().thread_name, "map-render");
    }

    #[test]
    fn sections_override_only_named_fields() {
        let config = MapConfig::from_toml_str(
            r#"
            [render]
            trace_render_tree = true
            clip_overflow = "drop_coarsest_levels"

            style_transition_ms = 0

            [camera]
            max_zoom = 20.0
            "#,
        )
        .expect("partial config");
        assert_eq!(config.style_transition(), Duration::ZERO);
        assert!(config.render.trace_render_tree);
        assert_eq!(config.render.fade_duration_ms, 300);
        assert_eq!(
            config.render.clip_overflow,
            ClipOverflowPolicy::DropCoarsestLevels
        );
        assert_eq!(config.camera.max_zoom, 20.0);
        assert_eq!(config.camera.min_zoom, 0.0);
        assert!(config.scheduler.initial_frame);
    }

    #[test]
    fn rejects_inverted_zoom_range() {
        let error = MapConfig::from_toml_str(
            r#"
            [camera]
            min_zoom = 10.0
            max_zoom = 4.0
            "#,
        )
        .expect_err("inverted range");
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn reports_type_errors_as_parse_errors() {
        let error = MapConfig::from_toml_str("[render]\nfade_duration_ms = \"slow\"\n")
            .expect_err("wrong type");
        assert!(matches!(error, ConfigError::Parse(_)));
        assert!(error.to_string().starts_with("invalid map config"));
    }
}
