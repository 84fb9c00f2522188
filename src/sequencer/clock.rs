// Beat clock - Signed beats elapsed since an origin on the audio clock
//
// Readers on any thread get `current_beat()` from three atomics and the audio
// clock; no locks, no accumulated state, so the click track and the note
// highway can never drift apart.

use super::timeline::Tempo;
use crate::audio::parameters::AtomicF64;
use crate::audio::timing::AudioClock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct BeatClock {
    clock: Arc<dyn AudioClock>,
    origin: AtomicF64,
    bpm: AtomicF64,
    running: AtomicBool,
}

impl BeatClock {
    pub fn new(clock: Arc<dyn AudioClock>) -> Self {
        Self {
            clock,
            origin: AtomicF64::new(0.0),
            bpm: AtomicF64::new(Tempo::DEFAULT_BPM),
            running: AtomicBool::new(false),
        }
    }

    /// Audio-clock time in seconds
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn audio_clock(&self) -> Arc<dyn AudioClock> {
        Arc::clone(&self.clock)
    }

    /// Set the tempo; the applied value is clamped to [40, 240]
    pub fn set_tempo(&self, bpm: f64) -> Tempo {
        let tempo = Tempo::new(bpm);
        self.bpm.store(tempo.bpm());
        tempo
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.bpm.load())
    }

    /// Start counting with beat 0 at audio-clock time `origin`
    pub fn start(&self, origin: f64) {
        self.origin.store(origin);
        self.running.store(true, Ordering::Release);
    }

    /// Halt and reset the origin; `current_beat()` reads 0.0 afterwards
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.origin.store(0.0);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn origin(&self) -> f64 {
        self.origin.load()
    }

    /// `(now - origin) * bpm / 60`, negative before the origin
    pub fn current_beat(&self) -> f64 {
        if !self.is_running() {
            return 0.0;
        }
        self.beat_at(self.now())
    }

    /// Beat position at audio-clock time `seconds`
    pub fn beat_at(&self, seconds: f64) -> f64 {
        self.tempo().seconds_to_beats(seconds - self.origin())
    }

    /// Audio-clock time of `beat`
    pub fn beat_time(&self, beat: f64) -> f64 {
        self.origin() + self.tempo().beats_to_seconds(beat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::ManualClock;

    fn clock_at(seconds: f64) -> (ManualClock, BeatClock) {
        let manual = ManualClock::new(seconds);
        let beat_clock = BeatClock::new(Arc::new(manual.clone()));
        (manual, beat_clock)
    }

    #[test]
    fn test_reads_zero_when_stopped() {
        let (_, clock) = clock_at(12.0);
        assert_eq!(clock.current_beat(), 0.0);
    }

    #[test]
    fn test_negative_before_origin() {
        let (manual, clock) = clock_at(10.0);
        clock.set_tempo(120.0);
        clock.start(14.0);
        assert_eq!(clock.current_beat(), -8.0);

        manual.set(14.5);
        assert_eq!(clock.current_beat(), 1.0);
    }

    #[test]
    fn test_stop_resets() {
        let (manual, clock) = clock_at(0.0);
        clock.start(0.0);
        manual.advance(3.0);
        assert!(clock.current_beat() > 0.0);

        clock.stop();
        assert_eq!(clock.current_beat(), 0.0);
        assert_eq!(clock.origin(), 0.0);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_tempo_clamped_on_set() {
        let (_, clock) = clock_at(0.0);
        assert_eq!(clock.set_tempo(20.0).bpm(), 40.0);
        assert_eq!(clock.tempo().bpm(), 40.0);
    }

    #[test]
    fn test_beat_time_inverts_beat_at() {
        let (_, clock) = clock_at(0.0);
        clock.set_tempo(90.0);
        clock.start(2.0);
        let t = clock.beat_time(-3.0);
        assert!((clock.beat_at(t) + 3.0).abs() < 1e-9);
    }
}
