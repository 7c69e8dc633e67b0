use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::Result;
use log::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalonConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_capture_delay_ms")]
    pub capture_delay_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,
    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,
    #[serde(default)]
    pub device_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,
    #[serde(default = "default_render_model")]
    pub render_model: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_progress_initial")]
    pub initial: f32,
    #[serde(default = "default_progress_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_progress_fast_step")]
    pub fast_step: f32,
    #[serde(default = "default_progress_slow_step")]
    pub slow_step: f32,
    #[serde(default = "default_progress_slow_above")]
    pub slow_above: f32,
    #[serde(default = "default_progress_ceiling")]
    pub ceiling: f32,
}

fn default_capture_delay_ms() -> u64 { 2000 }
fn default_jpeg_quality() -> u8 { 80 }
fn default_ideal_width() -> u32 { 720 }
fn default_ideal_height() -> u32 { 1280 }
fn default_endpoint() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_analysis_model() -> String { "gemini-3-flash-preview".to_string() }
fn default_render_model() -> String { "gemini-3-pro-image-preview".to_string() }
fn default_aspect_ratio() -> String { "9:16".to_string() }
fn default_image_size() -> String { "1K".to_string() }
fn default_timeout_secs() -> u64 { 120 }
fn default_api_key_env() -> String { "GEMINI_API_KEY".to_string() }
fn default_progress_initial() -> f32 { 10.0 }
fn default_progress_tick_ms() -> u64 { 150 }
fn default_progress_fast_step() -> f32 { 5.0 }
fn default_progress_slow_step() -> f32 { 0.5 }
fn default_progress_slow_above() -> f32 { 80.0 }
fn default_progress_ceiling() -> f32 { 95.0 }

impl Default for SalonConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            remote: RemoteConfig::default(),
            progress: ProgressConfig::default(),
            version: 1,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            capture_delay_ms: default_capture_delay_ms(),
            jpeg_quality: default_jpeg_quality(),
            ideal_width: default_ideal_width(),
            ideal_height: default_ideal_height(),
            device_index: 0,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            analysis_model: default_analysis_model(),
            render_model: default_render_model(),
            aspect_ratio: default_aspect_ratio(),
            image_size: default_image_size(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
            api_key: None,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            initial: default_progress_initial(),
            tick_ms: default_progress_tick_ms(),
            fast_step: default_progress_fast_step(),
            slow_step: default_progress_slow_step(),
            slow_above: default_progress_slow_above(),
            ceiling: default_progress_ceiling(),
        }
    }
}

impl CameraConfig {
    pub fn capture_delay(&self) -> Duration {
        Duration::from_millis(self.capture_delay_ms)
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ProgressConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl SalonConfig {
    /// Reads a JSON config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str::<SalonConfig>(&content)?
        } else {
            debug!("No config at {:?}, using defaults", path);
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// User config first, then the system one, then defaults.
    pub fn discover() -> Self {
        for path in Self::search_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => return config,
                Err(e) => warn!("Ignoring config {:?}: {}", path, e),
            }
        }
        Self::default()
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("raza-salon").join("config.json"));
        }
        paths.push(PathBuf::from("/etc/raza-salon/config.json"));
        paths
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.progress;
        if !(p.ceiling < 100.0) {
            anyhow::bail!("progress ceiling must stay below 100 (got {})", p.ceiling);
        }
        if p.initial < 0.0 || p.initial > p.ceiling {
            anyhow::bail!("progress initial value {} outside 0..={}", p.initial, p.ceiling);
        }
        if p.fast_step < 0.0 || p.slow_step < 0.0 {
            anyhow::bail!("progress steps must not be negative");
        }
        if p.tick_ms == 0 {
            anyhow::bail!("progress tick must be non-zero");
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            anyhow::bail!("jpeg quality must be within 1..=100 (got {})", self.camera.jpeg_quality);
        }
        Ok(())
    }
}
