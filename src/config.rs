//! Configuration management for the booth.
//!
//! Provides configuration loading, saving, and validation for camera
//! settings, detection backend endpoints, orchestration timing, and strip
//! layout options.

use crate::errors::BoothError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BoothConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub timing: TimingSettings,
    pub strip: StripSettings,
}

/// Camera-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Camera device index
    pub device_index: u32,
    /// Preferred capture resolution [width, height]
    pub resolution: [u32; 2],
    /// Preferred frames per second
    pub fps: u32,
    /// Frames discarded after stream open while exposure settles
    pub warmup_frames: u32,
    /// JPEG quality for stored photos (1-100)
    pub jpeg_quality: u8,
}

/// Detection backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    /// Base URL of the smile detection service
    pub base_url: String,
    /// Timeout for a single /predict request, in milliseconds
    pub predict_timeout_ms: u64,
    /// Interval between /health probes, in seconds
    pub health_interval_secs: u64,
    /// Timeout for a single /health probe, in seconds
    pub health_timeout_secs: u64,
}

/// Orchestration timing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Base detection poll interval, in milliseconds
    pub poll_interval_ms: u64,
    /// Re-check delay while a countdown is running, in milliseconds
    pub countdown_hold_ms: u64,
    /// Re-check delay while inside the post-capture cooldown, in milliseconds
    pub cooldown_recheck_ms: u64,
    /// Minimum gap between two capture triggers, in milliseconds
    pub min_trigger_gap_ms: u64,
    /// Countdown start value (ticks from here down to zero)
    pub countdown_from: u32,
    /// Length of one countdown tick, in milliseconds
    pub countdown_tick_ms: u64,
    /// Delay before polling resumes after a retake re-acquires the camera
    pub retake_resume_delay_ms: u64,
}

/// Strip layout and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripSettings {
    /// Width of each photo region on the strip
    pub frame_width: u32,
    /// Height of each photo region on the strip
    pub frame_height: u32,
    /// Border around and between photo regions
    pub border: u32,
    /// Extra canvas height reserved for the caption band
    pub caption_height: u32,
    /// Caption font size in pixels
    pub caption_px: f32,
    /// Path to a TTF/OTF font for the caption; falls back to common
    /// system locations when unset
    pub caption_font: Option<String>,
    /// JPEG quality of the composed strip (1-100)
    pub jpeg_quality: u8,
    /// Filename prefix for the composed strip
    pub filename_prefix: String,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            resolution: [640, 480],
            fps: 30,
            warmup_frames: 5,
            jpeg_quality: 90,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            predict_timeout_ms: 5000,
            health_interval_secs: 15,
            health_timeout_secs: 3,
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 900,
            countdown_hold_ms: 1400,
            cooldown_recheck_ms: 1000,
            min_trigger_gap_ms: 4800,
            countdown_from: 3,
            countdown_tick_ms: 1000,
            retake_resume_delay_ms: 500,
        }
    }
}

impl Default for StripSettings {
    fn default() -> Self {
        Self {
            frame_width: 480,
            frame_height: 360,
            border: 12,
            caption_height: 56,
            caption_px: 28.0,
            caption_font: None,
            jpeg_quality: 90,
            filename_prefix: "smilebooth".to_string(),
        }
    }
}

impl TimingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn countdown_hold(&self) -> Duration {
        Duration::from_millis(self.countdown_hold_ms)
    }

    pub fn cooldown_recheck(&self) -> Duration {
        Duration::from_millis(self.cooldown_recheck_ms)
    }

    pub fn min_trigger_gap(&self) -> Duration {
        Duration::from_millis(self.min_trigger_gap_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn retake_resume_delay(&self) -> Duration {
        Duration::from_millis(self.retake_resume_delay_ms)
    }
}

impl BoothConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, BoothError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| BoothError::Config(format!("Failed to read config file: {}", e)))?;

        let config: BoothConfig = toml::from_str(&contents)
            .map_err(|e| BoothError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), BoothError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BoothError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| BoothError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| BoothError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("smilebooth.toml")
    }

    /// Load from default location or create with defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.camera.resolution[0] == 0 || self.camera.resolution[1] == 0 {
            return Err("Invalid camera resolution".to_string());
        }
        if self.camera.fps == 0 || self.camera.fps > 240 {
            return Err("Invalid FPS (must be 1-240)".to_string());
        }
        if self.camera.jpeg_quality == 0 || self.camera.jpeg_quality > 100 {
            return Err("Photo JPEG quality must be between 1 and 100".to_string());
        }

        if self.detector.base_url.is_empty() {
            return Err("Detector base URL must not be empty".to_string());
        }
        if self.detector.predict_timeout_ms == 0 {
            return Err("Predict timeout must be positive".to_string());
        }
        if self.detector.health_interval_secs == 0 {
            return Err("Health interval must be positive".to_string());
        }

        if self.timing.poll_interval_ms == 0 {
            return Err("Poll interval must be positive".to_string());
        }
        if self.timing.countdown_tick_ms == 0 {
            return Err("Countdown tick must be positive".to_string());
        }
        if self.timing.min_trigger_gap_ms < self.timing.poll_interval_ms {
            return Err("Trigger gap must be at least one poll interval".to_string());
        }

        if self.strip.frame_width == 0 || self.strip.frame_height == 0 {
            return Err("Invalid strip frame dimensions".to_string());
        }
        if self.strip.jpeg_quality == 0 || self.strip.jpeg_quality > 100 {
            return Err("Strip JPEG quality must be between 1 and 100".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BoothConfig::default();
        assert_eq!(config.camera.resolution, [640, 480]);
        assert_eq!(config.detector.base_url, "http://localhost:5000");
        assert_eq!(config.timing.min_trigger_gap_ms, 4800);
        assert_eq!(config.timing.countdown_from, 3);
    }

    #[test]
    fn test_config_validation() {
        let config = BoothConfig::default();
        assert!(config.validate().is_ok());

        let mut bad_camera = config.clone();
        bad_camera.camera.resolution = [0, 0];
        assert!(bad_camera.validate().is_err());

        let mut bad_gap = BoothConfig::default();
        bad_gap.timing.min_trigger_gap_ms = 100;
        assert!(bad_gap.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("smilebooth.toml");

        let mut config = BoothConfig::default();
        config.detector.base_url = "http://10.0.0.7:5000".to_string();
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = BoothConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.detector.base_url, "http://10.0.0.7:5000");
        assert_eq!(loaded.timing.poll_interval_ms, config.timing.poll_interval_ms);
    }

    #[test]
    fn test_config_toml_format() {
        let config = BoothConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[camera]"));
        assert!(toml_string.contains("[detector]"));
        assert!(toml_string.contains("[timing]"));
        assert!(toml_string.contains("[strip]"));
        assert!(toml_string.contains("min_trigger_gap_ms"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = BoothConfig::load_from_file("nonexistent_file.toml");
        assert!(result.is_ok()); // Should return default
        assert_eq!(result.unwrap().timing.poll_interval_ms, 900);
    }

    #[test]
    fn test_duration_accessors() {
        let timing = TimingSettings::default();
        assert_eq!(timing.poll_interval(), Duration::from_millis(900));
        assert_eq!(timing.min_trigger_gap(), Duration::from_millis(4800));
    }
}
