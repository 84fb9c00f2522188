// Detection parameters - The tunable contract between the pitch engine and its settings UI
//
// The JSON field names are the ones the settings screen exports, so a saved
// parameter file can be fed straight back in.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Parameter {0} is not a finite number")]
    NotFinite(&'static str),

    #[error("Frequency range is inverted: min {min} Hz >= max {max} Hz")]
    InvertedFrequencyRange { min: f32, max: f32 },

    #[error("Unsupported transform size {0} (expected 2048, 4096 or 8192)")]
    UnsupportedFftSize(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transform / analysis window size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FftSize {
    S2048,
    S4096,
    S8192,
}

impl FftSize {
    pub fn len(self) -> usize {
        match self {
            FftSize::S2048 => 2048,
            FftSize::S4096 => 4096,
            FftSize::S8192 => 8192,
        }
    }
}

impl TryFrom<u32> for FftSize {
    type Error = ParameterError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2048 => Ok(FftSize::S2048),
            4096 => Ok(FftSize::S4096),
            8192 => Ok(FftSize::S8192),
            other => Err(ParameterError::UnsupportedFftSize(other)),
        }
    }
}

impl From<FftSize> for u32 {
    fn from(size: FftSize) -> Self {
        size.len() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionParameters {
    /// RMS below this is treated as silence
    pub rms_threshold: f32,
    /// YIN cumulative-mean-normalized-difference threshold
    pub yin_threshold: f32,
    /// Onset when RMS jumps by more than this factor over the previous tick
    pub attack_multiplier: f32,
    /// Onset also requires at least this much RMS
    pub attack_min_rms: f32,
    /// Ticks skipped after an onset
    pub attack_skip_frames: u32,
    /// Median filter window (ticks)
    pub median_size: usize,
    /// Analysis tick interval in milliseconds
    pub update_interval: u64,
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub fft_size: FftSize,
}

impl DetectionParameters {
    pub const RMS_THRESHOLD_RANGE: (f32, f32) = (1e-6, 1.0);
    pub const YIN_THRESHOLD_RANGE: (f32, f32) = (0.01, 0.99);
    pub const ATTACK_MULTIPLIER_RANGE: (f32, f32) = (1.0, 100.0);
    pub const ATTACK_MIN_RMS_RANGE: (f32, f32) = (0.0, 1.0);
    pub const MAX_ATTACK_SKIP_FRAMES: u32 = 100;
    pub const MEDIAN_SIZE_RANGE: (usize, usize) = (1, 31);
    pub const UPDATE_INTERVAL_RANGE_MS: (u64, u64) = (1, 1000);
    pub const FREQUENCY_RANGE: (f32, f32) = (20.0, 5000.0);

    /// Clamp every scalar to its valid range
    ///
    /// Non-finite values and an inverted frequency range cannot be clamped
    /// meaningfully and are rejected.
    pub fn validated(mut self) -> Result<Self, ParameterError> {
        let finite = [
            ("rmsThreshold", self.rms_threshold),
            ("yinThreshold", self.yin_threshold),
            ("attackMultiplier", self.attack_multiplier),
            ("attackMinRms", self.attack_min_rms),
            ("minFrequency", self.min_frequency),
            ("maxFrequency", self.max_frequency),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, value)| !value.is_finite()) {
            return Err(ParameterError::NotFinite(*name));
        }

        let clamp = |value: f32, (lo, hi): (f32, f32)| value.clamp(lo, hi);
        self.rms_threshold = clamp(self.rms_threshold, Self::RMS_THRESHOLD_RANGE);
        self.yin_threshold = clamp(self.yin_threshold, Self::YIN_THRESHOLD_RANGE);
        self.attack_multiplier = clamp(self.attack_multiplier, Self::ATTACK_MULTIPLIER_RANGE);
        self.attack_min_rms = clamp(self.attack_min_rms, Self::ATTACK_MIN_RMS_RANGE);
        self.attack_skip_frames = self.attack_skip_frames.min(Self::MAX_ATTACK_SKIP_FRAMES);
        self.median_size = self
            .median_size
            .clamp(Self::MEDIAN_SIZE_RANGE.0, Self::MEDIAN_SIZE_RANGE.1);
        self.update_interval = self.update_interval.clamp(
            Self::UPDATE_INTERVAL_RANGE_MS.0,
            Self::UPDATE_INTERVAL_RANGE_MS.1,
        );
        self.min_frequency = clamp(self.min_frequency, Self::FREQUENCY_RANGE);
        self.max_frequency = clamp(self.max_frequency, Self::FREQUENCY_RANGE);

        if self.min_frequency >= self.max_frequency {
            return Err(ParameterError::InvertedFrequencyRange {
                min: self.min_frequency,
                max: self.max_frequency,
            });
        }
        Ok(self)
    }

    pub fn from_json(json: &str) -> Result<Self, ParameterError> {
        let params: Self = serde_json::from_str(json)?;
        params.validated()
    }

    pub fn to_json(&self) -> Result<String, ParameterError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_json(path: &Path) -> Result<Self, ParameterError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            rms_threshold: 0.005,
            yin_threshold: 0.15,
            attack_multiplier: 2.0,
            attack_min_rms: 0.02,
            attack_skip_frames: 3,
            median_size: 5,
            update_interval: 20,
            // Low E is 41.2 Hz; the ceiling leaves room for upper-fret G-string notes
            min_frequency: 38.0,
            max_frequency: 400.0,
            fft_size: FftSize::S8192,
        }
    }
}

#[derive(Debug)]
struct VersionedParameters {
    version: u64,
    params: DetectionParameters,
}

/// Hot-swappable parameter set shared by the settings path and the analysis thread
///
/// Writers replace the whole set under the lock; the analysis thread takes a
/// snapshot at the start of a tick and reconfigures before analysing, so a
/// change is never observed half-applied.
#[derive(Debug, Clone)]
pub struct SharedParameters {
    inner: Arc<RwLock<VersionedParameters>>,
}

impl SharedParameters {
    pub fn new(params: DetectionParameters) -> Result<Self, ParameterError> {
        Ok(Self {
            inner: Arc::new(RwLock::new(VersionedParameters {
                version: 0,
                params: params.validated()?,
            })),
        })
    }

    pub fn get(&self) -> DetectionParameters {
        self.snapshot().1
    }

    /// Current version number together with the parameters it tags
    pub fn snapshot(&self) -> (u64, DetectionParameters) {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        (guard.version, guard.params.clone())
    }

    pub fn version(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// Replace the set; returns what was actually applied after clamping
    pub fn set(&self, params: DetectionParameters) -> Result<DetectionParameters, ParameterError> {
        let params = params.validated()?;
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.params = params.clone();
        guard.version += 1;
        Ok(params)
    }

    /// Edit a copy of the current set and apply it atomically
    pub fn update<F>(&self, edit: F) -> Result<DetectionParameters, ParameterError>
    where
        F: FnOnce(&mut DetectionParameters),
    {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = guard.params.clone();
        edit(&mut candidate);
        let applied = candidate.validated()?;
        guard.params = applied.clone();
        guard.version += 1;
        Ok(applied)
    }

    pub fn reset_defaults(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.params = DetectionParameters::default();
        guard.version += 1;
    }
}

impl Default for SharedParameters {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(VersionedParameters {
                version: 0,
                params: DetectionParameters::default(),
            })),
        }
    }
}
