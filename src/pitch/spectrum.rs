// Spectrum - Coarse low-band energy histogram for the tuner display

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;

pub const SPECTRUM_BARS: usize = 20;

/// Bar heights, each 0..=100
pub type SpectrumBars = [f32; SPECTRUM_BARS];

// Display range in dBFS, mapped linearly onto 0..100
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Frequency band split into the bars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumBand {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl Default for SpectrumBand {
    fn default() -> Self {
        Self {
            low_hz: 30.0,
            high_hz: 400.0,
        }
    }
}

pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    band: SpectrumBand,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize, band: SpectrumBand) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self {
            fft,
            window: hann_window(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
            band,
        }
    }

    pub fn size(&self) -> usize {
        self.window.len()
    }

    pub fn band(&self) -> SpectrumBand {
        self.band
    }

    pub fn set_band(&mut self, band: SpectrumBand) {
        self.band = band;
    }

    /// Bar heights for the last `size()` samples of `samples`
    ///
    /// Shorter input is zero-padded at the front.
    pub fn bars(&mut self, samples: &[f32], sample_rate: f32) -> SpectrumBars {
        let size = self.size();
        let offset = size.saturating_sub(samples.len());
        let tail = &samples[samples.len().saturating_sub(size)..];

        for slot in self.buffer.iter_mut().take(offset) {
            *slot = Complex::new(0.0, 0.0);
        }
        for ((slot, &sample), &weight) in self.buffer[offset..]
            .iter_mut()
            .zip(tail)
            .zip(&self.window[offset..])
        {
            *slot = Complex::new(sample * weight, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let bin_width = sample_rate / size as f32;
        let nyquist_bin = size / 2;
        let bar_width = (self.band.high_hz - self.band.low_hz) / SPECTRUM_BARS as f32;

        let mut bars = [0.0; SPECTRUM_BARS];
        for (index, bar) in bars.iter_mut().enumerate() {
            let low = self.band.low_hz + index as f32 * bar_width;
            let high = low + bar_width;
            let first = (low / bin_width).ceil() as usize;
            let last = ((high / bin_width).ceil() as usize).min(nyquist_bin);

            *bar = if first < last {
                let sum: f32 = (first..last).map(|bin| self.level(bin)).sum();
                sum / (last - first) as f32
            } else {
                // Band narrower than a bin
                let center = ((low + high) * 0.5 / bin_width).round() as usize;
                self.level(center.min(nyquist_bin))
            };
        }
        bars
    }

    fn level(&self, bin: usize) -> f32 {
        let magnitude = self.buffer[bin].norm() / self.size() as f32;
        let decibels = 20.0 * magnitude.max(1e-12).log10();
        ((decibels - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS) * 100.0).clamp(0.0, 100.0)
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denominator = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denominator).cos()))
        .collect()
}
