// Sequencer session - Runs one exercise: count-off, note highway, judging, auto-stop
//
// All note and marker state sits behind one mutex. Render ticks, detections
// and `stop()` each take it for the whole step, and every step first checks
// that the session it was started for is still the current one, so nothing
// can act on state that `stop()` already cleared.

use super::click::ClickSink;
use super::clock::BeatClock;
use super::exercise::{Exercise, ExerciseNote};
use super::highway::{BeatMarker, Countdown, HighwayGeometry, Note, NoteId, beat_markers};
use super::judge::{JudgeSettings, Judgment, judge_detection, judge_tick};
use super::metronome::{
    COUNT_OFF_BEATS, ClickPattern, ClickScheduler, DEFAULT_LOOK_AHEAD_S,
    DEFAULT_SCHEDULE_INTERVAL, MetronomeRunner,
};
use super::timeline::Tempo;
use crate::audio::AudioError;
use crate::audio::output::OutputControl;
use crate::pitch::engine::PitchEstimate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    pub geometry: HighwayGeometry,
    pub judge: JudgeSettings,
    /// Extra audio-clock time before the count-off starts
    pub start_margin_s: f64,
    /// How long the hit line stays lit after a successful judgment
    pub flash_duration_s: f64,
    /// Beats after the last note before an emptied highway stops itself
    pub tail_beats: f64,
    pub look_ahead_s: f64,
    pub schedule_interval_ms: u64,
}

impl SequencerSettings {
    /// Sanitise the highway and judge settings and the timing scalars
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        let non_negative = |value: f64, default: f64| {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                default
            }
        };
        self.geometry = self.geometry.validated();
        self.judge = self.judge.validated();
        self.start_margin_s = non_negative(self.start_margin_s, defaults.start_margin_s);
        self.flash_duration_s = non_negative(self.flash_duration_s, defaults.flash_duration_s);
        self.tail_beats = non_negative(self.tail_beats, defaults.tail_beats);
        if !self.look_ahead_s.is_finite() || self.look_ahead_s <= 0.0 {
            self.look_ahead_s = defaults.look_ahead_s;
        }
        self.schedule_interval_ms = self.schedule_interval_ms.max(1);
        self
    }
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            geometry: HighwayGeometry::default(),
            judge: JudgeSettings::default(),
            start_margin_s: 0.1,
            flash_duration_s: 0.1,
            tail_beats: 2.0,
            look_ahead_s: DEFAULT_LOOK_AHEAD_S,
            schedule_interval_ms: DEFAULT_SCHEDULE_INTERVAL.as_millis() as u64,
        }
    }
}

/// Perfect/miss counts for the current or last exercise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub perfect: u32,
    pub miss: u32,
}

impl Score {
    fn record(&mut self, judgment: Judgment) {
        match judgment {
            Judgment::Perfect => self.perfect += 1,
            Judgment::Miss => self.miss += 1,
            Judgment::SustainStarted | Judgment::Unchanged => {}
        }
    }
}

/// Read-only view for whatever renders the highway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighwaySnapshot {
    pub running: bool,
    pub current_beat: f64,
    pub countdown: Option<Countdown>,
    pub hit_line: f64,
    pub flash: bool,
    pub notes: Vec<Note>,
    pub markers: Vec<BeatMarker>,
    pub score: Score,
}

#[derive(Default)]
struct SessionState {
    session: u64,
    running: bool,
    geometry: HighwayGeometry,
    pending: Option<Vec<ExerciseNote>>,
    last_note_beat: f64,
    /// Where the last hold ends; the exercise may stop once past it
    last_end_beat: f64,
    notes: Vec<Note>,
    markers: Vec<BeatMarker>,
    next_note_id: NoteId,
    flash_until: Option<f64>,
    score: Score,
}

impl SessionState {
    fn clear(&mut self) {
        self.running = false;
        self.pending = None;
        self.last_note_beat = 0.0;
        self.last_end_beat = 0.0;
        self.notes.clear();
        self.markers.clear();
        self.flash_until = None;
    }
}

pub struct Sequencer {
    clock: Arc<BeatClock>,
    sink: Arc<dyn ClickSink>,
    output: Option<Arc<dyn OutputControl>>,
    settings: SequencerSettings,
    metronome_enabled: AtomicBool,
    state: Mutex<SessionState>,
    runner: Mutex<Option<MetronomeRunner>>,
}

impl Sequencer {
    pub fn new(clock: Arc<BeatClock>, sink: Arc<dyn ClickSink>, settings: SequencerSettings) -> Self {
        let settings = settings.validated();
        Self {
            clock,
            sink,
            output: None,
            state: Mutex::new(SessionState {
                geometry: settings.geometry,
                ..Default::default()
            }),
            settings,
            metronome_enabled: AtomicBool::new(false),
            runner: Mutex::new(None),
        }
    }

    /// Resume this output before every exercise
    pub fn with_output(mut self, output: Arc<dyn OutputControl>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn clock(&self) -> &Arc<BeatClock> {
        &self.clock
    }

    pub fn settings(&self) -> &SequencerSettings {
        &self.settings
    }

    /// Keep clicking after the count-off (takes effect on the next exercise)
    pub fn set_metronome_enabled(&self, enabled: bool) {
        self.metronome_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn metronome_enabled(&self) -> bool {
        self.metronome_enabled.load(Ordering::Relaxed)
    }

    /// Change tempo between exercises; ignored while one is running
    pub fn set_tempo(&self, bpm: f64) -> Tempo {
        if self.is_running() {
            log::warn!("Tempo change ignored while an exercise is running");
            return self.clock.tempo();
        }
        self.clock.set_tempo(bpm)
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    /// Start `exercise` with the hit line at `hit_line` (0..=100)
    ///
    /// Any running exercise is stopped first. Beat 0 is placed eight beats
    /// plus the start margin after now; the count-off clicks start at once.
    pub fn start_exercise(&self, exercise: &Exercise, hit_line: f64) -> Result<(), AudioError> {
        self.stop();

        if let Some(output) = &self.output {
            output.resume()?;
        }

        let tempo = self.clock.tempo();
        let origin = self.clock.now()
            + tempo.beats_to_seconds(COUNT_OFF_BEATS as f64)
            + self.settings.start_margin_s;

        {
            let mut state = self.lock_state();
            state.session += 1;
            state.geometry = self.settings.geometry.with_hit_line(hit_line);
            state.last_note_beat = exercise.last_note_beat();
            state.last_end_beat = exercise.last_note_end_beat();
            state.pending = Some(exercise.notes.clone());
            state.score = Score::default();
            state.running = true;
            self.clock.start(origin);
        }

        let pattern = ClickPattern::Exercise {
            metronome: self.metronome_enabled(),
        };
        let runner = MetronomeRunner::spawn(
            ClickScheduler::new(pattern, self.settings.look_ahead_s),
            Arc::clone(&self.clock),
            Arc::clone(&self.sink),
            Duration::from_millis(self.settings.schedule_interval_ms.max(1)),
        );
        *self.lock_runner() = Some(runner);

        log::info!(
            "Exercise started: {} notes at {}, beat 0 at {:.3}s",
            exercise.notes.len(),
            tempo,
            origin
        );
        Ok(())
    }

    /// Halt the clock and the click track and clear every note; safe to repeat
    pub fn stop(&self) {
        let mut state = self.lock_state();
        self.halt(&mut state);
    }

    /// Stop only if `session` is still the current one
    ///
    /// The check and the teardown happen under one lock, so a stale caller
    /// cannot stop an exercise started after it read its session id.
    pub fn stop_if_session(&self, session: u64) -> bool {
        let mut state = self.lock_state();
        if state.session != session {
            return false;
        }
        self.halt(&mut state);
        true
    }

    /// Id of the current (or last) exercise
    pub fn session(&self) -> u64 {
        self.lock_state().session
    }

    // Lock order is always state, then runner
    fn halt(&self, state: &mut SessionState) {
        let runner = self.lock_runner().take();
        if let Some(runner) = runner {
            runner.stop();
            self.sink.cancel_all();
        }

        let was_running = state.running;
        self.clock.stop();
        state.clear();
        if was_running {
            log::info!(
                "Exercise stopped: {} perfect, {} missed",
                state.score.perfect,
                state.score.miss
            );
        }
    }

    /// One render step; returns whether the exercise is still running
    ///
    /// Materialises the notes once beat 0 is reached, moves everything,
    /// misses crossed notes, completes held ones, purges what left the
    /// highway and stops once the exercise is over.
    pub fn tick(&self) -> bool {
        let finished_session = {
            let mut state = self.lock_state();
            if !state.running {
                return false;
            }
            let beat = self.clock.current_beat();
            let geometry = state.geometry;
            let judge = self.settings.judge;

            if beat >= 0.0 {
                if let Some(pending) = state.pending.take() {
                    self.materialize(&mut state, &pending, beat);
                }
            }

            let mut score = state.score;
            for note in state.notes.iter_mut() {
                note.update_position(&geometry, beat);
                score.record(judge_tick(note, &geometry, &judge, beat));
            }
            state.score = score;
            state.notes.retain(|note| !note.is_purged(&geometry));

            for marker in state.markers.iter_mut() {
                marker.update_position(&geometry, beat);
            }
            state.markers.retain(|marker| !geometry.is_purged(marker.position));

            if state
                .flash_until
                .is_some_and(|until| self.clock.now() >= until)
            {
                state.flash_until = None;
            }

            let over = state.notes.is_empty()
                && state.pending.is_none()
                && beat > state.last_end_beat + self.settings.tail_beats;
            over.then_some(state.session)
        };

        match finished_session {
            Some(session) => {
                if self.stop_if_session(session) {
                    log::info!("Exercise complete");
                    false
                } else {
                    self.is_running()
                }
            }
            None => true,
        }
    }

    /// Judge every open note against a detection; `None` judges nothing
    pub fn on_detection(&self, detected: Option<&PitchEstimate>) {
        let Some(detected) = detected else {
            return;
        };
        let mut state = self.lock_state();
        if !state.running || state.notes.is_empty() {
            return;
        }

        let beat = self.clock.current_beat();
        let geometry = state.geometry;
        let judge = self.settings.judge;
        let mut score = state.score;
        let mut success = false;

        for note in state.notes.iter_mut().filter(|n| !n.state.is_final()) {
            note.update_position(&geometry, beat);
            let judgment = judge_detection(note, detected, &geometry, &judge, beat);
            if judgment != Judgment::Unchanged {
                log::debug!(
                    "Note {} ({} on {}) -> {:?} at beat {:.2}",
                    note.id,
                    note.expected_note(),
                    note.string,
                    note.state,
                    beat
                );
            }
            success |= judgment.is_success();
            score.record(judgment);
        }
        state.score = score;

        if success {
            state.flash_until = Some(self.clock.now() + self.settings.flash_duration_s);
        }
    }

    /// Whether the hit line is lit
    pub fn hit_flash(&self) -> bool {
        self.lock_state()
            .flash_until
            .is_some_and(|until| self.clock.now() < until)
    }

    /// Signed current beat, 0.0 when idle
    pub fn current_beat(&self) -> f64 {
        self.clock.current_beat()
    }

    /// Count-off label for the current beat
    pub fn countdown(&self) -> Option<Countdown> {
        if !self.is_running() {
            return None;
        }
        Countdown::from_beat(self.clock.current_beat())
    }

    pub fn score(&self) -> Score {
        self.lock_state().score
    }

    /// Consistent copy of the highway, positions computed at one beat
    pub fn snapshot(&self) -> HighwaySnapshot {
        let state = self.lock_state();
        let beat = self.clock.current_beat();
        let geometry = state.geometry;

        let mut notes = state.notes.clone();
        for note in &mut notes {
            note.update_position(&geometry, beat);
        }
        let mut markers = state.markers.clone();
        for marker in &mut markers {
            marker.update_position(&geometry, beat);
        }

        HighwaySnapshot {
            running: state.running,
            current_beat: beat,
            countdown: if state.running {
                Countdown::from_beat(beat)
            } else {
                None
            },
            hit_line: geometry.hit_line,
            flash: state
                .flash_until
                .is_some_and(|until| self.clock.now() < until),
            notes,
            markers,
            score: state.score,
        }
    }

    fn materialize(&self, state: &mut SessionState, pending: &[ExerciseNote], beat: f64) {
        let geometry = state.geometry;
        let mut notes = Vec::with_capacity(pending.len());
        for exercise_note in pending {
            state.next_note_id += 1;
            notes.push(Note::from_exercise(
                state.next_note_id,
                exercise_note,
                &geometry,
                beat,
            ));
        }
        state.notes = notes;
        state.markers = beat_markers(COUNT_OFF_BEATS, state.last_note_beat, &geometry, beat);
        log::debug!(
            "Materialised {} notes and {} markers at beat {:.2}",
            state.notes.len(),
            state.markers.len(),
            beat
        );
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_runner(&self) -> MutexGuard<'_, Option<MetronomeRunner>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.stop();
    }
}
