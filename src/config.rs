use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::audio::frame::{FRAME_LEN, SAMPLE_RATE};
use crate::gesture::ClassifierConfig;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("threshold must be a finite, non-negative number (got {0})")]
    Threshold(f32),
    #[error("{name} window must be a finite, non-negative number of seconds (got {value})")]
    Window { name: &'static str, value: f64 },
    #[error("debounce window ({debounce:?}) must be shorter than isolation window ({isolation:?})")]
    WindowOrder { debounce: Duration, isolation: Duration },
    #[error("sample rate must be non-zero")]
    SampleRate,
    #[error("frame length must be non-zero")]
    FrameLen,
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
}

#[derive(Debug, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Seconds after an accepted trigger during which crossings are echoes.
    #[serde(default = "default_debounce")]
    pub debounce: f64,
    /// Seconds after which a crossing starts a fresh gesture.
    #[serde(default = "default_isolation")]
    pub isolation: f64,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_frame_len")]
    pub frame_len: usize,
    /// Input device name; the host default when absent.
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default)]
    pub forward: Vec<String>,
    #[serde(default)]
    pub backward: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            debounce: default_debounce(),
            isolation: default_isolation(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_len: default_frame_len(),
            device: None,
        }
    }
}

fn default_threshold() -> f32 { 15.0 }
fn default_debounce() -> f64 { 0.25 }
fn default_isolation() -> f64 { 2.5 }
fn default_sample_rate() -> u32 { SAMPLE_RATE }
fn default_frame_len() -> usize { FRAME_LEN }

impl DetectorConfig {
    /// Convert to the classifier's typed configuration, rejecting bad values.
    pub fn to_classifier(&self) -> Result<ClassifierConfig, ConfigError> {
        let debounce = window("debounce", self.debounce)?;
        let isolation = window("isolation", self.isolation)?;
        ClassifierConfig::new(self.threshold, debounce, isolation)
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::SampleRate);
        }
        if self.frame_len == 0 {
            return Err(ConfigError::FrameLen);
        }
        Ok(())
    }
}

fn window(name: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Window { name, value: secs })
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
