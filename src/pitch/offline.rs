// Offline analysis - Run a recording through the same engine the live input uses

use super::engine::{FrameOutcome, PitchEngine, PitchEstimate};
use super::params::DetectionParameters;
use super::spectrum::SpectrumBand;
use hound::{SampleFormat, WavReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OfflineError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Recording has no samples")]
    Empty,
}

/// One analysis tick of a recording
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineDetection {
    /// Seconds from the start of the recording to the end of the window
    pub time: f64,
    pub outcome: FrameOutcome,
    pub estimate: Option<PitchEstimate>,
}

/// Mono samples and their rate
#[derive(Debug, Clone)]
pub struct Recording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Recording {
    /// Read a WAV file, mixing all channels down to mono
    pub fn load_wav(path: &Path) -> Result<Self, OfflineError> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };
        if interleaved.is_empty() {
            return Err(OfflineError::Empty);
        }

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }
}

/// Step through `recording` one tick interval at a time
pub fn analyze_recording(
    recording: &Recording,
    params: DetectionParameters,
    band: SpectrumBand,
) -> Vec<OfflineDetection> {
    let sample_rate = recording.sample_rate as f32;
    let hop = ((params.update_interval as f32 / 1000.0) * sample_rate).max(1.0) as usize;
    let mut engine = PitchEngine::new(params, sample_rate, band);

    let mut detections = Vec::new();
    let mut end = hop.min(recording.samples.len());
    while end <= recording.samples.len() && end > 0 {
        let frame = engine.analyze(&recording.samples[..end]);
        detections.push(OfflineDetection {
            time: end as f64 / sample_rate as f64,
            outcome: frame.diagnostics.outcome,
            estimate: frame.estimate,
        });
        end += hop;
    }
    detections
}
