// Trainer configuration - Device choices, click volume, highway and detection settings
//
// Stored as RON. Every field has a default, so a partial file (or none at all)
// is a valid configuration.

use crate::pitch::params::{DetectionParameters, ParameterError};
use crate::pitch::spectrum::SpectrumBand;
use crate::sequencer::session::SequencerSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("Invalid detection parameters: {0}")]
    Parameters(#[from] ParameterError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// `None` follows the host default input
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub preferred_sample_rate: Option<u32>,
    /// Click gain, 0.0..=1.0
    pub click_volume: f32,
    /// Keep clicking after the count-off of an exercise
    pub metronome_enabled: bool,
    pub spectrum_band: SpectrumBand,
    pub sequencer: SequencerSettings,
    /// Period of the highway render/judge tick
    pub render_interval_ms: u64,
    /// How often the device watcher polls the host
    pub device_poll_interval_ms: u64,
    pub detection: DetectionParameters,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            preferred_sample_rate: None,
            click_volume: 0.8,
            metronome_enabled: false,
            spectrum_band: SpectrumBand::default(),
            sequencer: SequencerSettings::default(),
            render_interval_ms: 16,
            device_poll_interval_ms: 2000,
            detection: DetectionParameters::default(),
        }
    }
}

impl TrainerConfig {
    /// Clamp scalar fields, sanitise the highway and judge settings and
    /// validate the embedded detection parameters
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.click_volume = if self.click_volume.is_finite() {
            self.click_volume.clamp(0.0, 1.0)
        } else {
            0.8
        };
        self.render_interval_ms = self.render_interval_ms.clamp(1, 1000);
        self.device_poll_interval_ms = self.device_poll_interval_ms.max(100);
        self.sequencer = self.sequencer.validated();
        self.detection = self.detection.validated()?;
        Ok(self)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validated()
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::new().depth_limit(3);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Load from disk; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => {
                log::info!("Loaded configuration from {}", path.display());
                Self::from_ron(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_ron()?)?;
        log::debug!("Saved configuration to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::params::FftSize;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trainer.ron");

        let mut config = TrainerConfig::default();
        config.input_device = Some("USB Interface".to_string());
        config.click_volume = 0.5;
        config.metronome_enabled = true;
        config.sequencer.judge.require_string_match = false;
        config.detection.fft_size = FftSize::S4096;
        config.save(&path).unwrap();

        let loaded = TrainerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = TrainerConfig::load(&dir.path().join("absent.ron")).unwrap();
        assert_eq!(loaded, TrainerConfig::default());
    }

    #[test]
    fn test_partial_file_is_filled_with_defaults() {
        let config = TrainerConfig::from_ron("(click_volume: 3.0, render_interval_ms: 0)").unwrap();
        assert_eq!(config.click_volume, 1.0);
        assert_eq!(config.render_interval_ms, 1);
        assert_eq!(config.detection, DetectionParameters::default());
    }

    #[test]
    fn test_degenerate_highway_falls_back_to_defaults() {
        let text = "(sequencer: (geometry: (spawn_position: 15.0, lead_in_beats: 0.0), \
                    judge: (entrance_tolerance: 4.0, exit_tolerance: 10.0)))";
        let config = TrainerConfig::from_ron(text).unwrap();
        let geometry = config.sequencer.geometry;
        assert_eq!(geometry.spawn_position, 110.0);
        assert_eq!(geometry.lead_in_beats, 8.0);
        assert!(geometry.units_per_beat().is_finite() && geometry.units_per_beat() > 0.0);
        assert_eq!(config.sequencer.judge.exit_tolerance, 4.0);
    }

    #[test]
    fn test_inverted_frequency_range_rejected() {
        let text = "(detection: (minFrequency: 500.0, maxFrequency: 100.0))";
        assert!(matches!(
            TrainerConfig::from_ron(text),
            Err(ConfigError::Parameters(ParameterError::InvertedFrequencyRange { .. }))
        ));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            TrainerConfig::from_ron("not ron at all ("),
            Err(ConfigError::Parse(_))
        ));
    }
}
