// Audio timing - The one time base every other component reads
// The output stream's sample counter is the hardware clock; nothing else ticks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of "now" in seconds on the audio-hardware timeline
pub trait AudioClock: Send + Sync {
    /// Current time in seconds since the clock started
    fn now(&self) -> f64;
}

/// Shared audio timing state driven by the output callback
#[derive(Clone)]
pub struct AudioTiming {
    /// Current sample position (incremented by audio callback)
    sample_position: Arc<AtomicU64>,
    /// Sample rate (for timestamp conversions)
    sample_rate: f64,
}

impl AudioTiming {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate as f64,
        }
    }

    /// Get current sample position
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance sample position (called from audio callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Release);
    }

    /// Convert an absolute clock time to a sample index on this timeline
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        if seconds <= 0.0 {
            return 0;
        }
        (seconds * self.sample_rate).round() as u64
    }

    /// Convert a sample index to clock seconds
    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    /// Get sample rate
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }
}

impl AudioClock for AudioTiming {
    fn now(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }
}

/// Clock whose time is set explicitly
///
/// Used for offline analysis and for driving the sequencer deterministically.
#[derive(Clone, Default)]
pub struct ManualClock {
    seconds_bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_seconds: f64) -> Self {
        Self {
            seconds_bits: Arc::new(AtomicU64::new(start_seconds.to_bits())),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds_bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds_bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_creation() {
        let timing = AudioTiming::new(48000.0);
        assert_eq!(timing.current_sample(), 0);
        assert_eq!(timing.sample_rate(), 48000.0);
        assert_eq!(timing.now(), 0.0);
    }

    #[test]
    fn test_advance_samples() {
        let timing = AudioTiming::new(48000.0);
        timing.advance(480);
        assert_eq!(timing.current_sample(), 480);
        timing.advance(480);
        assert_eq!(timing.current_sample(), 960);
        assert!((timing.now() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_seconds_to_samples() {
        let timing = AudioTiming::new(48000.0);

        assert_eq!(timing.seconds_to_samples(1.0), 48000);
        assert_eq!(timing.seconds_to_samples(0.01), 480);
        // Times before the stream started map to the first sample
        assert_eq!(timing.seconds_to_samples(-0.5), 0);
    }

    #[test]
    fn test_clones_share_position() {
        let timing = AudioTiming::new(44100.0);
        let reader = timing.clone();
        timing.advance(44100);
        assert_eq!(reader.now(), 1.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(2.0);
        assert_eq!(clock.now(), 2.0);
        clock.advance(0.5);
        assert_eq!(clock.now(), 2.5);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }
}
