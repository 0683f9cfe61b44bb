//! Configuration loader for the appliance runner
//!
//! Loads and parses TOML configuration files, one section per device.

use anyhow::{anyhow, Result};
use overlay_render::BoxMapper;
use person_detect::DetectorConfig;
use serde::Deserialize;
use std::fs;

use frame_transform::Rotation;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub record: RecordConfig,
    #[serde(default)]
    pub detect: DetectConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_device")]
    pub device: String,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_buffers")]
    pub buffers: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_lib")]
    pub lib_path: String,
    #[serde(default = "default_display_width")]
    pub width: u32,
    #[serde(default = "default_display_height")]
    pub height: u32,
    /// Physical mount rotation in degrees. Only 0 and 90 have a verified
    /// box-plane remap.
    #[serde(default = "default_display_rotation")]
    pub rotation: u32,
    #[serde(default = "default_overlay_enabled")]
    pub overlay: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    #[serde(default = "default_record_output")]
    pub output: String,
    #[serde(default = "default_record_fps")]
    pub fps: u32,
    #[serde(default = "default_record_bit_rate")]
    pub bit_rate: u32,
    #[serde(default = "default_record_max_rate")]
    pub max_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectConfig {
    #[serde(default = "default_detect_lib")]
    pub lib_path: String,
    #[serde(default = "default_detect_model")]
    pub model: String,
    #[serde(default)]
    pub variant: i32,
    #[serde(default = "default_net_size")]
    pub net_size: u32,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
    #[serde(default = "default_anchors")]
    pub anchors: [[[f32; 2]; 3]; 3],
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,
    /// Where detection-hit JPEGs land; empty string disables archiving.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// Period of the one-line stats print, in seconds. Zero silences it.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            width: default_camera_width(),
            height: default_camera_height(),
            buffers: default_camera_buffers(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            lib_path: default_display_lib(),
            width: default_display_width(),
            height: default_display_height(),
            rotation: default_display_rotation(),
            overlay: default_overlay_enabled(),
        }
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            output: default_record_output(),
            fps: default_record_fps(),
            bit_rate: default_record_bit_rate(),
            max_rate: default_record_max_rate(),
        }
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            lib_path: default_detect_lib(),
            model: default_detect_model(),
            variant: 0,
            net_size: default_net_size(),
            score_threshold: default_score_threshold(),
            nms_threshold: default_nms_threshold(),
            anchors: default_anchors(),
            class_names: default_class_names(),
            archive_dir: default_archive_dir(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl DetectConfig {
    pub fn to_detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            lib_path: self.lib_path.clone(),
            model_path: self.model.clone(),
            variant: self.variant,
            net_size: self.net_size,
            num_classes: self.class_names.len() as u32,
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
            anchors: self.anchors,
            class_names: self.class_names.clone(),
            archive_dir: if self.archive_dir.is_empty() {
                None
            } else {
                Some(self.archive_dir.clone())
            },
        }
    }
}

fn default_camera_device() -> String {
    "/dev/video1".to_string()
}

fn default_camera_width() -> u32 {
    800
}

fn default_camera_height() -> u32 {
    480
}

fn default_camera_buffers() -> u32 {
    4
}

fn default_display_lib() -> String {
    "libpaneldisp.so".to_string()
}

fn default_display_width() -> u32 {
    480
}

fn default_display_height() -> u32 {
    800
}

fn default_display_rotation() -> u32 {
    90
}

fn default_overlay_enabled() -> bool {
    true
}

fn default_record_output() -> String {
    "./video/output.mp4".to_string()
}

fn default_record_fps() -> u32 {
    10
}

fn default_record_bit_rate() -> u32 {
    200_000
}

fn default_record_max_rate() -> u32 {
    4_000_000
}

fn default_detect_lib() -> String {
    "libnpu_runtime.so".to_string()
}

fn default_detect_model() -> String {
    "model/person_detect_yolov5n.kmodel".to_string()
}

fn default_net_size() -> u32 {
    640
}

fn default_score_threshold() -> f32 {
    0.5
}

fn default_nms_threshold() -> f32 {
    0.3
}

fn default_anchors() -> [[[f32; 2]; 3]; 3] {
    [
        [[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
        [[30.0, 61.0], [62.0, 45.0], [59.0, 119.0]],
        [[116.0, 90.0], [156.0, 198.0], [373.0, 326.0]],
    ]
}

fn default_class_names() -> Vec<String> {
    vec!["person".to_string()]
}

fn default_archive_dir() -> String {
    "./pic".to_string()
}

fn default_target_fps() -> u32 {
    10
}

fn default_stats_interval_secs() -> u64 {
    10
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig =
        toml::from_str(content).map_err(|e| anyhow!("Failed to parse config: {}", e))?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &str) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read config file '{}': {}", path, e))?;
    parse_config(&content).map_err(|e| anyhow!("{}: {}", path, e))
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.camera.width == 0 || config.camera.height == 0 {
        return Err(anyhow!("Camera resolution must be non-zero"));
    }
    if config.camera.buffers < 2 {
        return Err(anyhow!("Camera needs at least 2 buffers to stream"));
    }
    let rotation = Rotation::from_degrees(config.display.rotation)
        .ok_or_else(|| anyhow!("Unsupported panel rotation: {} degrees", config.display.rotation))?;
    if BoxMapper::for_rotation(rotation, config.display.width).is_none() {
        return Err(anyhow!(
            "No box remap formula for a {}-degree panel mount",
            config.display.rotation
        ));
    }
    if config.record.fps == 0 {
        return Err(anyhow!("Recorder frame rate must be non-zero"));
    }
    if config.detect.net_size == 0 || config.detect.net_size % 32 != 0 {
        return Err(anyhow!(
            "Detector input size must be a multiple of 32, got {}",
            config.detect.net_size
        ));
    }
    if config.detect.class_names.is_empty() {
        return Err(anyhow!("Detector needs at least one class name"));
    }
    Ok(())
}
