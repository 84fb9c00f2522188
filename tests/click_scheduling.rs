//! Look-ahead click scheduling against a manual clock

use bass_trainer::audio::ManualClock;
use bass_trainer::sequencer::{ClickPattern, ClickScheduler, ClickSink, ClickType};
use bass_trainer::{AudioClock, BeatClock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    clicks: Mutex<Vec<(f64, ClickType)>>,
}

impl RecordingSink {
    fn clicks(&self) -> Vec<(f64, ClickType)> {
        self.clicks.lock().unwrap().clone()
    }
}

impl ClickSink for RecordingSink {
    fn schedule(&self, time: f64, click_type: ClickType) -> bool {
        self.clicks.lock().unwrap().push((time, click_type));
        true
    }

    fn cancel_all(&self) {
        self.clicks.lock().unwrap().clear();
    }
}

fn clock_at(seconds: f64, bpm: f64) -> (ManualClock, BeatClock) {
    let manual = ManualClock::new(seconds);
    let clock = BeatClock::new(Arc::new(manual.clone()));
    clock.set_tempo(bpm);
    (manual, clock)
}

#[test]
fn test_no_beat_scheduled_twice_with_jittery_wakeups() {
    let mut rng = StdRng::seed_from_u64(7);
    for bpm in [40.0, 100.0, 240.0] {
        let (manual, clock) = clock_at(1.0, bpm);
        clock.start(1.0);
        let sink = RecordingSink::default();
        let mut scheduler = ClickScheduler::new(ClickPattern::Continuous, 0.1);

        for _ in 0..2000 {
            scheduler.pump(&clock, &sink);
            // Wake-ups between 0 and 40 ms apart, sometimes repeated at the same instant
            if rng.gen_bool(0.8) {
                manual.advance(rng.gen_range(0.0..0.04));
            }
        }

        let clicks = sink.clicks();
        assert!(!clicks.is_empty());
        let beats: Vec<i64> = clicks
            .iter()
            .map(|(time, _)| clock.beat_at(*time).round() as i64)
            .collect();
        let unique: HashSet<i64> = beats.iter().copied().collect();
        assert_eq!(unique.len(), beats.len(), "duplicate beat at {} BPM", bpm);
        assert!(beats.windows(2).all(|pair| pair[1] == pair[0] + 1));
    }
}

#[test]
fn test_clicks_never_scheduled_beyond_horizon() {
    let (manual, clock) = clock_at(0.0, 120.0);
    clock.start(0.0);
    let sink = RecordingSink::default();
    let mut scheduler = ClickScheduler::new(ClickPattern::Continuous, 0.1);

    for _ in 0..100 {
        scheduler.pump(&clock, &sink);
        let horizon = manual.now() + 0.1;
        assert!(sink.clicks().iter().all(|(time, _)| *time < horizon));
        manual.advance(0.025);
    }
}

#[test]
fn test_exercise_count_off_then_silence() {
    // Beat 0 at 4.1 s: the count-off starts at 0.1 s
    let (manual, clock) = clock_at(0.0, 120.0);
    clock.start(4.1);
    let sink = RecordingSink::default();
    let mut scheduler = ClickScheduler::new(ClickPattern::Exercise { metronome: false }, 0.1);

    while manual.now() < 8.0 {
        scheduler.pump(&clock, &sink);
        manual.advance(0.025);
    }

    let clicks = sink.clicks();
    assert_eq!(clicks.len(), 8);
    for (index, (time, click_type)) in clicks.iter().enumerate() {
        let beat = clock.beat_at(*time).round() as i64;
        assert_eq!(beat, index as i64 - 8);
        let expected = if beat % 2 == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        };
        assert_eq!(*click_type, expected);
    }
}

#[test]
fn test_exercise_with_metronome_keeps_measure_accents() {
    let (manual, clock) = clock_at(0.0, 120.0);
    clock.start(4.1);
    let sink = RecordingSink::default();
    let mut scheduler = ClickScheduler::new(ClickPattern::Exercise { metronome: true }, 0.1);

    while manual.now() < 8.0 {
        scheduler.pump(&clock, &sink);
        manual.advance(0.025);
    }

    let after_zero: Vec<(i64, ClickType)> = sink
        .clicks()
        .iter()
        .map(|(time, click_type)| (clock.beat_at(*time).round() as i64, *click_type))
        .filter(|(beat, _)| *beat >= 0)
        .collect();
    assert!(after_zero.len() >= 7);
    for (beat, click_type) in after_zero {
        let expected = if beat % 4 == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        };
        assert_eq!(click_type, expected);
    }
}

#[test]
fn test_late_wakeup_skips_instead_of_bunching() {
    let (manual, clock) = clock_at(0.0, 120.0);
    clock.start(0.0);
    let sink = RecordingSink::default();
    let mut scheduler = ClickScheduler::new(ClickPattern::Continuous, 0.1);

    scheduler.pump(&clock, &sink);
    assert_eq!(sink.clicks().len(), 1);

    // The scheduler thread stalled for two seconds
    manual.set(2.02);
    scheduler.pump(&clock, &sink);
    let clicks = sink.clicks();
    assert_eq!(clicks.len(), 2);
    assert!((clicks[1].0 - 2.0).abs() < 1e-9);
    assert_eq!(scheduler.last_scheduled_beat(), Some(4));
}
