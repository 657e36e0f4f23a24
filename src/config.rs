use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration, loaded from a single TOML file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub projects: ProjectsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CameraConfig {
    #[serde(default = "default_camera_index")]
    pub camera_index: u32,
    #[serde(default = "default_width")]
    pub camera_width: u32,
    #[serde(default = "default_height")]
    pub camera_height: u32,
    #[serde(default = "default_fps")]
    pub target_fps: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            camera_index: default_camera_index(),
            camera_width: default_width(),
            camera_height: default_height(),
            target_fps: default_fps(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            auto_reconnect: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtractorConfig {
    #[serde(default = "default_max_hands")]
    pub max_hands: usize,
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_min_tracking_confidence")]
    pub min_tracking_confidence: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            max_hands: default_max_hands(),
            min_detection_confidence: default_min_detection_confidence(),
            min_tracking_confidence: default_min_tracking_confidence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    #[serde(default = "default_buffer_size")]
    pub pipeline_buffer_size: usize,
    #[serde(default = "default_true")]
    pub pipeline_drop_frames: bool,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default = "default_error_cooldown_seconds")]
    pub error_cooldown_seconds: f64,
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            pipeline_buffer_size: default_buffer_size(),
            pipeline_drop_frames: true,
            max_consecutive_errors: default_max_consecutive_errors(),
            error_cooldown_seconds: default_error_cooldown_seconds(),
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HubConfig {
    #[serde(default = "default_max_websocket_connections")]
    pub max_websocket_connections: usize,
    #[serde(default = "default_gesture_update_interval")]
    pub gesture_update_interval: f64,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            max_websocket_connections: default_max_websocket_connections(),
            gesture_update_interval: default_gesture_update_interval(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ProjectsConfig {
    #[serde(default = "default_project")]
    pub default_project: String,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        ProjectsConfig {
            default_project: default_project(),
        }
    }
}

fn default_camera_index() -> u32 {
    0
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_max_hands() -> usize {
    2
}
fn default_min_detection_confidence() -> f32 {
    0.7
}
fn default_min_tracking_confidence() -> f32 {
    0.5
}
fn default_buffer_size() -> usize {
    5
}
fn default_max_consecutive_errors() -> u32 {
    10
}
fn default_error_cooldown_seconds() -> f64 {
    1.0
}
fn default_dequeue_timeout_ms() -> u64 {
    100
}
fn default_max_websocket_connections() -> usize {
    10
}
fn default_gesture_update_interval() -> f64 {
    0.033
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}
fn default_project() -> String {
    "finger_count".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            camera: CameraConfig::default(),
            extractor: ExtractorConfig::default(),
            pipeline: PipelineConfig::default(),
            hub: HubConfig::default(),
            projects: ProjectsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any table or key that is absent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed to read config file {}", path.as_ref().display())
        })?;
        let config: Config = toml::from_str(&content).context("failed to parse config file")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.camera.target_fps, 30);
        assert_eq!(config.pipeline.pipeline_buffer_size, 5);
        assert_eq!(config.hub.max_websocket_connections, 10);
        assert_eq!(config.projects.default_project, "finger_count");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml_str = r#"
            [camera]
            camera_index = 1
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.camera.camera_index, 1);
        assert_eq!(config.camera.target_fps, 30);
    }
}
