// Metronome - Look-ahead click scheduling against the beat clock
//
// A scheduler thread wakes every ~25 ms and queues every click that falls
// inside the next ~100 ms of audio-clock time. Click times are computed from
// the clock origin and the beat index, never accumulated, so a late wake-up
// cannot shift later clicks.

use super::click::{ClickSink, ClickType};
use super::clock::BeatClock;
use super::timeline::{BEATS_PER_MEASURE, Tempo};
use crate::audio::timing::AudioClock;
use crossbeam_channel::{Sender, select};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_LOOK_AHEAD_S: f64 = 0.1;
pub const DEFAULT_SCHEDULE_INTERVAL: Duration = Duration::from_millis(25);

/// Beats of count-off before beat 0
pub const COUNT_OFF_BEATS: i64 = 8;

/// Which clicks a scheduler produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickPattern {
    /// Every beat, accent on the first beat of each measure
    Continuous,
    /// Count-off clicks before beat 0; continuous clicks after it only when
    /// `metronome` is set
    Exercise { metronome: bool },
}

/// Count-off beats -8..-1 accent on every other beat starting at -8
fn count_off_click(beat: i64) -> ClickType {
    if beat.rem_euclid(2) == 0 {
        ClickType::Accent
    } else {
        ClickType::Regular
    }
}

fn measure_click(beat: i64) -> ClickType {
    if beat.rem_euclid(BEATS_PER_MEASURE) == 0 {
        ClickType::Accent
    } else {
        ClickType::Regular
    }
}

/// Stateful part of the look-ahead loop; `pump` is one wake-up
#[derive(Debug, Clone)]
pub struct ClickScheduler {
    pattern: ClickPattern,
    look_ahead: f64,
    last_scheduled_beat: Option<i64>,
}

impl ClickScheduler {
    pub fn new(pattern: ClickPattern, look_ahead: f64) -> Self {
        Self {
            pattern,
            look_ahead: look_ahead.max(0.0),
            last_scheduled_beat: None,
        }
    }

    pub fn pattern(&self) -> ClickPattern {
        self.pattern
    }

    /// Highest beat index handed to the sink so far
    pub fn last_scheduled_beat(&self) -> Option<i64> {
        self.last_scheduled_beat
    }

    pub fn reset(&mut self) {
        self.last_scheduled_beat = None;
    }

    /// Click for `beat`, or `None` for a silent beat
    pub fn click_for(&self, beat: i64) -> Option<ClickType> {
        match self.pattern {
            ClickPattern::Continuous => Some(measure_click(beat)),
            ClickPattern::Exercise { .. } if beat < -COUNT_OFF_BEATS => None,
            ClickPattern::Exercise { .. } if beat < 0 => Some(count_off_click(beat)),
            ClickPattern::Exercise { metronome } => metronome.then(|| measure_click(beat)),
        }
    }

    /// Queue every not-yet-scheduled beat whose time is before `now + look_ahead`
    ///
    /// Only beat indices strictly above the last scheduled one are considered,
    /// so repeated or overlapping wake-ups never queue a beat twice. Returns
    /// the number of clicks queued.
    pub fn pump(&mut self, clock: &BeatClock, sink: &dyn ClickSink) -> usize {
        if !clock.is_running() {
            return 0;
        }
        let now = clock.now();
        let horizon = now + self.look_ahead;
        let mut beat = match self.last_scheduled_beat {
            Some(last) => last + 1,
            None => clock.beat_at(now).ceil() as i64,
        };

        let mut queued = 0;
        loop {
            let time = clock.beat_time(beat as f64);
            if time >= horizon {
                break;
            }
            if let Some(click_type) = self.click_for(beat) {
                // A wake-up far behind the clock skips instead of bunching clicks
                if time >= now - self.look_ahead {
                    if sink.schedule(time, click_type) {
                        queued += 1;
                    } else {
                        log::warn!("Click queue full, beat {} dropped", beat);
                    }
                }
            }
            self.last_scheduled_beat = Some(beat);
            beat += 1;
        }
        queued
    }
}

/// Scheduler thread: pumps until the handle is dropped
pub struct MetronomeRunner {
    shutdown_tx: Sender<()>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MetronomeRunner {
    pub fn spawn(
        mut scheduler: ClickScheduler,
        clock: Arc<BeatClock>,
        sink: Arc<dyn ClickSink>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_handle = thread::Builder::new()
            .name("click-scheduler".into())
            .spawn(move || {
                loop {
                    scheduler.pump(&clock, sink.as_ref());
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        default(interval) => {}
                    }
                }
                log::debug!("Click scheduler stopped");
            })
            .ok();

        if thread_handle.is_none() {
            log::error!("Could not spawn click scheduler thread");
        }

        Self {
            shutdown_tx,
            thread_handle,
        }
    }

    /// Stop the thread and wait for it; no click is queued after this returns
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MetronomeRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Free-running practice metronome, independent of any exercise
pub struct Metronome {
    clock: Arc<BeatClock>,
    sink: Arc<dyn ClickSink>,
    look_ahead: f64,
    interval: Duration,
    active: bool,
    runner: Option<MetronomeRunner>,
}

impl Metronome {
    pub fn new(audio_clock: Arc<dyn AudioClock>, sink: Arc<dyn ClickSink>) -> Self {
        Self {
            clock: Arc::new(BeatClock::new(audio_clock)),
            sink,
            look_ahead: DEFAULT_LOOK_AHEAD_S,
            interval: DEFAULT_SCHEDULE_INTERVAL,
            active: false,
            runner: None,
        }
    }

    pub fn with_timing(mut self, look_ahead: f64, interval: Duration) -> Self {
        self.look_ahead = look_ahead;
        self.interval = interval;
        self
    }

    /// Arm or disarm; disarming stops playback
    pub fn toggle(&mut self) -> bool {
        self.active = !self.active;
        if !self.active {
            self.stop();
        }
        self.active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_playing(&self) -> bool {
        self.runner.is_some()
    }

    /// Start clicking from now; no-op when already playing or not armed
    pub fn start(&mut self) {
        if self.is_playing() || !self.active {
            return;
        }
        self.clock.start(self.clock.now());
        let scheduler = ClickScheduler::new(ClickPattern::Continuous, self.look_ahead);
        self.runner = Some(MetronomeRunner::spawn(
            scheduler,
            Arc::clone(&self.clock),
            Arc::clone(&self.sink),
            self.interval,
        ));
        log::info!("Metronome started at {}", self.clock.tempo());
    }

    pub fn stop(&mut self) {
        if let Some(runner) = self.runner.take() {
            runner.stop();
            self.sink.cancel_all();
            log::info!("Metronome stopped");
        }
        self.clock.stop();
    }

    /// Change tempo, restarting playback so the new grid starts on a downbeat
    pub fn set_bpm(&mut self, bpm: f64) -> Tempo {
        let was_playing = self.is_playing();
        if was_playing {
            self.stop();
        }
        let tempo = self.clock.set_tempo(bpm);
        if was_playing {
            self.start();
        }
        tempo
    }

    pub fn tempo(&self) -> Tempo {
        self.clock.tempo()
    }

    /// 1..=4 while playing, 0 when stopped
    pub fn beat_in_measure(&self) -> u8 {
        if !self.clock.is_running() {
            return 0;
        }
        super::timeline::beat_in_measure(self.clock.current_beat().floor() as i64)
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::ManualClock;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        clicks: Mutex<Vec<(f64, ClickType)>>,
        cancels: Mutex<usize>,
    }

    impl ClickSink for RecordingSink {
        fn schedule(&self, time: f64, click_type: ClickType) -> bool {
            self.clicks.lock().unwrap().push((time, click_type));
            true
        }

        fn cancel_all(&self) {
            *self.cancels.lock().unwrap() += 1;
        }
    }

    fn running_clock(now: f64, bpm: f64, origin: f64) -> (ManualClock, BeatClock) {
        let manual = ManualClock::new(now);
        let clock = BeatClock::new(Arc::new(manual.clone()));
        clock.set_tempo(bpm);
        clock.start(origin);
        (manual, clock)
    }

    #[test]
    fn test_continuous_accents_downbeats() {
        let (_, clock) = running_clock(0.0, 60.0, 0.0);
        let sink = RecordingSink::default();
        let mut scheduler = ClickScheduler::new(ClickPattern::Continuous, 4.5);

        assert_eq!(scheduler.pump(&clock, &sink), 5);
        let clicks = sink.clicks.lock().unwrap();
        let types: Vec<ClickType> = clicks.iter().map(|c| c.1).collect();
        assert_eq!(
            types,
            vec![
                ClickType::Accent,
                ClickType::Regular,
                ClickType::Regular,
                ClickType::Regular,
                ClickType::Accent
            ]
        );
        assert_eq!(clicks[4].0, 4.0);
    }

    #[test]
    fn test_overlapping_pumps_never_repeat_a_beat() {
        let (manual, clock) = running_clock(0.0, 240.0, 0.0);
        let sink = RecordingSink::default();
        let mut scheduler = ClickScheduler::new(ClickPattern::Continuous, 0.1);

        for _ in 0..400 {
            scheduler.pump(&clock, &sink);
            scheduler.pump(&clock, &sink);
            manual.advance(0.007);
        }

        let clicks = sink.clicks.lock().unwrap();
        let mut beats: Vec<i64> = clicks
            .iter()
            .map(|(time, _)| (clock.beat_at(*time)).round() as i64)
            .collect();
        let scheduled = beats.len();
        beats.dedup();
        assert_eq!(beats.len(), scheduled);
        assert!(scheduled >= 11);
    }

    #[test]
    fn test_count_off_pattern() {
        // Count-off starts 8 beats (plus margin) in the future
        let (_, clock) = running_clock(0.0, 120.0, 4.1);
        let sink = RecordingSink::default();
        let mut scheduler =
            ClickScheduler::new(ClickPattern::Exercise { metronome: false }, 10.0);
        scheduler.pump(&clock, &sink);

        let clicks = sink.clicks.lock().unwrap();
        let types: Vec<ClickType> = clicks.iter().map(|c| c.1).collect();
        assert_eq!(types.len(), 8);
        assert_eq!(
            types,
            vec![
                ClickType::Accent,
                ClickType::Regular,
                ClickType::Accent,
                ClickType::Regular,
                ClickType::Accent,
                ClickType::Regular,
                ClickType::Accent,
                ClickType::Regular
            ]
        );
        assert!((clicks[0].0 - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_exercise_with_metronome_continues_after_beat_zero() {
        let scheduler = ClickScheduler::new(ClickPattern::Exercise { metronome: true }, 0.1);
        assert_eq!(scheduler.click_for(-9), None);
        assert_eq!(scheduler.click_for(-7), Some(ClickType::Regular));
        assert_eq!(scheduler.click_for(0), Some(ClickType::Accent));
        assert_eq!(scheduler.click_for(5), Some(ClickType::Regular));

        let silent = ClickScheduler::new(ClickPattern::Exercise { metronome: false }, 0.1);
        assert_eq!(silent.click_for(0), None);
    }

    #[test]
    fn test_stopped_clock_schedules_nothing() {
        let manual = ManualClock::new(0.0);
        let clock = BeatClock::new(Arc::new(manual));
        let sink = RecordingSink::default();
        let mut scheduler = ClickScheduler::new(ClickPattern::Continuous, 1.0);
        assert_eq!(scheduler.pump(&clock, &sink), 0);
        assert_eq!(scheduler.last_scheduled_beat(), None);
    }

    #[test]
    fn test_metronome_toggle_and_restart() {
        let manual = ManualClock::new(1.0);
        let sink = Arc::new(RecordingSink::default());
        let mut metronome = Metronome::new(Arc::new(manual), sink.clone());

        metronome.start();
        assert!(!metronome.is_playing(), "not armed yet");

        assert!(metronome.toggle());
        metronome.start();
        assert!(metronome.is_playing());
        assert_eq!(metronome.set_bpm(300.0).bpm(), 240.0);
        assert!(metronome.is_playing());

        assert!(!metronome.toggle());
        assert!(!metronome.is_playing());
        assert_eq!(metronome.beat_in_measure(), 0);
        assert!(*sink.cancels.lock().unwrap() >= 2);
    }
}
