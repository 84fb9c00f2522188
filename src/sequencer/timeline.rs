// Timeline - Tempo and beat/second arithmetic shared by the clock and the click track

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every exercise is in 4/4
pub const BEATS_PER_MEASURE: i64 = 4;

/// Tempo in BPM (Beats Per Minute), always within [`Tempo::MIN_BPM`, `Tempo::MAX_BPM`]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 40.0;
    pub const MAX_BPM: f64 = 240.0;
    pub const DEFAULT_BPM: f64 = 100.0;

    /// Creates a new tempo, clamped to the supported range
    pub fn new(bpm: f64) -> Self {
        let bpm = if bpm.is_finite() {
            bpm.clamp(Self::MIN_BPM, Self::MAX_BPM)
        } else {
            Self::DEFAULT_BPM
        };
        Self { bpm }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one beat in samples at given sample rate
    pub fn beat_duration_samples(&self, sample_rate: f64) -> f64 {
        self.beat_duration_seconds() * sample_rate
    }

    /// Seconds covered by `beats` (signed)
    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * self.beat_duration_seconds()
    }

    /// Beats covered by `seconds` (signed)
    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds * self.bpm / 60.0
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BPM)
    }
}

impl From<f64> for Tempo {
    fn from(bpm: f64) -> Self {
        Self::new(bpm)
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Position of a beat inside its measure, 1..=4; works for negative beats
pub fn beat_in_measure(beat: i64) -> u8 {
    (beat.rem_euclid(BEATS_PER_MEASURE) + 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_is_clamped() {
        assert_eq!(Tempo::new(10.0).bpm(), 40.0);
        assert_eq!(Tempo::new(300.0).bpm(), 240.0);
        assert_eq!(Tempo::new(f64::NAN).bpm(), 100.0);
        assert_eq!(Tempo::default().bpm(), 100.0);
    }

    #[test]
    fn test_beat_duration() {
        let tempo = Tempo::new(120.0);
        assert_eq!(tempo.beat_duration_seconds(), 0.5);
        assert_eq!(tempo.beat_duration_samples(48000.0), 24000.0);
    }

    #[test]
    fn test_beats_seconds_conversion() {
        let tempo = Tempo::new(60.0);
        assert_eq!(tempo.beats_to_seconds(-8.0), -8.0);
        assert_eq!(tempo.seconds_to_beats(2.5), 2.5);
    }

    #[test]
    fn test_beat_in_measure() {
        assert_eq!(beat_in_measure(0), 1);
        assert_eq!(beat_in_measure(3), 4);
        assert_eq!(beat_in_measure(4), 1);
        assert_eq!(beat_in_measure(-1), 4);
        assert_eq!(beat_in_measure(-8), 1);
    }

    #[test]
    fn test_tempo_deserializes_clamped() {
        let tempo: Tempo = serde_json::from_str("500.0").unwrap();
        assert_eq!(tempo.bpm(), 240.0);
    }
}
