// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Configuration module

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated sensors)
    pub demo_mode: bool,

    /// Detection configuration
    pub detection: DetectionConfig,

    /// Scheduler configuration
    pub scheduler: SchedulerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "MotionGate".to_string(),
            log_level: "info".to_string(),
            demo_mode: true,
            detection: DetectionConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("motiongate"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject configurations the engine cannot run with. The movement
    /// thresholds are deliberately tunable, so only structural nonsense is
    /// rejected here.
    pub fn validate(&self) -> Result<()> {
        if self.detection.window_size == 0 {
            bail!("detection.window_size must be at least 1");
        }
        if self.detection.min_variance_samples > self.detection.window_size {
            bail!(
                "detection.min_variance_samples ({}) exceeds window_size ({})",
                self.detection.min_variance_samples,
                self.detection.window_size
            );
        }
        if self.detection.variance_threshold < 0.0 {
            bail!("detection.variance_threshold must be non-negative");
        }
        if self.scheduler.foreground_sample_hz <= 0.0 {
            bail!("scheduler.foreground_sample_hz must be positive");
        }
        if self.scheduler.background_probe_interval_secs == 0 {
            bail!("scheduler.background_probe_interval_secs must be at least 1");
        }
        Ok(())
    }
}

/// Decision engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Acceleration window capacity (samples)
    pub window_size: usize,

    /// Minimum samples before the window yields statistics
    pub min_variance_samples: usize,

    /// Population variance above which an unknown-label signal counts as
    /// movement. Chosen to reject hand jitter while catching locomotion;
    /// plausibly mistuned for some devices, hence configurable.
    pub variance_threshold: f64,

    /// Trailing grace window after a step pulse, in seconds
    pub grace_period_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_variance_samples: 5,
            variance_threshold: 0.02,
            grace_period_secs: 10,
        }
    }
}

/// Power-aware scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Foreground accelerometer sampling rate in Hz
    pub foreground_sample_hz: f64,

    /// Foreground housekeeping tick interval (grace expiry), in seconds
    pub tick_interval_secs: u64,

    /// Background wake timer interval, in seconds
    pub background_probe_interval_secs: u64,

    /// Trailing window a probe queries for activity classifications, in seconds
    pub activity_probe_window_secs: u64,

    /// Trailing window a probe queries for step counts, in seconds
    pub step_probe_window_secs: u64,

    /// Capacity of the engine mailbox and broadcast channels
    pub channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            foreground_sample_hz: 10.0,
            tick_interval_secs: 1,
            background_probe_interval_secs: 30,
            activity_probe_window_secs: 5,
            step_probe_window_secs: 10,
            channel_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_default_thresholds() {
        let config = Config::default();
        assert_eq!(config.detection.window_size, 10);
        assert_eq!(config.detection.min_variance_samples, 5);
        assert_eq!(config.detection.variance_threshold, 0.02);
        assert_eq!(config.detection.grace_period_secs, 10);
        assert_eq!(config.scheduler.foreground_sample_hz, 10.0);
        assert_eq!(config.scheduler.background_probe_interval_secs, 30);
        assert_eq!(config.scheduler.activity_probe_window_secs, 5);
        assert_eq!(config.scheduler.step_probe_window_secs, 10);
    }

    #[test]
    fn test_validate_rejects_bad_window() {
        let mut config = Config::default();
        config.detection.min_variance_samples = 20;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.detection.variance_threshold, 0.02);
        assert_eq!(parsed.scheduler.channel_capacity, 256);
    }
}
