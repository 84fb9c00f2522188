// Pitch engine - One analysis tick: gate, onset suppression, YIN, median, note mapping
//
// The engine is single-threaded and allocation-free per tick once configured;
// the analyzer thread owns it and calls `configure` between ticks.

use super::median::MedianFilter;
use super::notes::{BassString, NoteName, frequency_to_note};
use super::params::DetectionParameters;
use super::spectrum::{SpectrumAnalyzer, SpectrumBand, SpectrumBars};
use super::yin::{Yin, lag_range};
use serde::Serialize;

/// A smoothed frequency estimate mapped onto the bass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency: f32,
    /// YIN clarity of the frame that produced this estimate (0..1)
    pub clarity: f32,
    pub note: NoteName,
    /// Signed deviation from `note`, -50..=50
    pub cents: i32,
    /// Open string whose fundamental is nearest in Hz
    pub string: BassString,
}

impl PitchEstimate {
    pub fn from_frequency(frequency: f32, clarity: f32) -> Self {
        let (note, cents) = frequency_to_note(frequency);
        Self {
            frequency,
            clarity,
            note,
            cents,
            string: BassString::nearest(frequency),
        }
    }
}

/// Why a tick did or did not produce a pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameOutcome {
    Silent,
    AttackOnset,
    Suppressed,
    NoPitch,
    Pitched,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineDiagnostics {
    pub rms: f32,
    pub outcome: FrameOutcome,
    /// Ticks still to be skipped after the last onset
    pub suppression_remaining: u32,
    /// Median history, oldest first
    pub median_history: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFrame {
    pub estimate: Option<PitchEstimate>,
    pub spectrum: SpectrumBars,
    pub diagnostics: EngineDiagnostics,
}

pub struct PitchEngine {
    params: DetectionParameters,
    sample_rate: f32,
    yin: Yin,
    median: MedianFilter,
    spectrum: SpectrumAnalyzer,
    previous_rms: f32,
    suppression_remaining: u32,
}

impl PitchEngine {
    pub fn new(params: DetectionParameters, sample_rate: f32, band: SpectrumBand) -> Self {
        Self {
            yin: Yin::new(),
            median: MedianFilter::new(params.median_size),
            spectrum: SpectrumAnalyzer::new(params.fft_size.len(), band),
            params,
            sample_rate,
            previous_rms: 0.0,
            suppression_remaining: 0,
        }
    }

    pub fn params(&self) -> &DetectionParameters {
        &self.params
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Number of most recent samples each tick analyses
    pub fn window_len(&self) -> usize {
        self.params.fft_size.len()
    }

    /// Apply a new parameter set between ticks
    ///
    /// A new transform size rebuilds the spectrum buffers; a new median size
    /// discards the median history.
    pub fn configure(&mut self, params: DetectionParameters) {
        if params.fft_size != self.params.fft_size {
            log::debug!("Analysis window -> {} samples", params.fft_size.len());
            self.spectrum = SpectrumAnalyzer::new(params.fft_size.len(), self.spectrum.band());
        }
        if params.median_size != self.params.median_size {
            self.median.resize(params.median_size);
        }
        self.params = params;
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.reset();
        }
    }

    pub fn set_band(&mut self, band: SpectrumBand) {
        self.spectrum.set_band(band);
    }

    /// Forget onset and smoothing state
    pub fn reset(&mut self) {
        self.median.reset();
        self.previous_rms = 0.0;
        self.suppression_remaining = 0;
    }

    /// Run one tick over the most recent `window_len()` samples of `samples`
    pub fn analyze(&mut self, samples: &[f32]) -> AnalysisFrame {
        let window = &samples[samples.len().saturating_sub(self.window_len())..];
        let spectrum = self.spectrum.bars(window, self.sample_rate);
        let rms = rms(window);
        let (estimate, outcome) = self.estimate(window, rms);

        AnalysisFrame {
            estimate,
            spectrum,
            diagnostics: EngineDiagnostics {
                rms,
                outcome,
                suppression_remaining: self.suppression_remaining,
                median_history: self.median.values(),
            },
        }
    }

    fn estimate(&mut self, window: &[f32], rms: f32) -> (Option<PitchEstimate>, FrameOutcome) {
        let previous_rms = self.previous_rms;
        self.previous_rms = rms;

        if rms < self.params.rms_threshold {
            return (None, FrameOutcome::Silent);
        }

        if rms > self.params.attack_multiplier * previous_rms && rms > self.params.attack_min_rms {
            log::trace!("Onset: rms {:.4} after {:.4}", rms, previous_rms);
            self.median.reset();
            self.suppression_remaining = self.params.attack_skip_frames;
            return (None, FrameOutcome::AttackOnset);
        }

        if self.suppression_remaining > 0 {
            self.suppression_remaining -= 1;
            return (None, FrameOutcome::Suppressed);
        }

        let found = lag_range(
            self.sample_rate,
            self.params.min_frequency,
            self.params.max_frequency,
            window.len(),
        )
        .and_then(|(tau_min, tau_max)| {
            self.yin
                .detect(window, tau_min, tau_max, self.params.yin_threshold)
        });

        let Some(result) = found else {
            self.median.reset();
            return (None, FrameOutcome::NoPitch);
        };

        let frequency = self.median.push(self.sample_rate / result.period);
        (
            Some(PitchEstimate::from_frequency(frequency, result.clarity)),
            FrameOutcome::Pitched,
        )
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
