// Hit judge - Note state transitions driven by detections and render ticks

use super::highway::{HighwayGeometry, Note, NoteState};
use crate::pitch::engine::PitchEstimate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeSettings {
    /// Max distance from the hit line (display units) to hit a note or start a sustain
    pub entrance_tolerance: f64,
    /// How early (display units) before its end a sustain counts as complete
    pub exit_tolerance: f64,
    /// Also require the detected nearest string to match the note's string
    pub require_string_match: bool,
}

impl JudgeSettings {
    /// Non-finite or negative tolerances fall back to the defaults; the exit
    /// tolerance never exceeds the entrance tolerance
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if !self.entrance_tolerance.is_finite() || self.entrance_tolerance <= 0.0 {
            self.entrance_tolerance = defaults.entrance_tolerance;
        }
        if !self.exit_tolerance.is_finite() || self.exit_tolerance < 0.0 {
            self.exit_tolerance = defaults.exit_tolerance;
        }
        self.exit_tolerance = self.exit_tolerance.min(self.entrance_tolerance);
        self
    }
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            entrance_tolerance: 5.0,
            exit_tolerance: 3.0,
            require_string_match: true,
        }
    }
}

/// What a judging step did to a note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Unchanged,
    SustainStarted,
    Perfect,
    Miss,
}

impl Judgment {
    /// Successful judgments light the hit line
    pub fn is_success(self) -> bool {
        matches!(self, Judgment::SustainStarted | Judgment::Perfect)
    }
}

pub fn is_correct(note: &Note, detected: &PitchEstimate, settings: &JudgeSettings) -> bool {
    detected.note == note.expected_note()
        && (!settings.require_string_match || detected.string == note.string)
}

/// Beat from which a held note counts as complete
pub fn sustain_exit_beat(note: &Note, geometry: &HighwayGeometry, settings: &JudgeSettings) -> f64 {
    note.end_beat(geometry) - geometry.units_to_beats(settings.exit_tolerance)
}

/// Earliest correct detection that still lets a render tick complete a hold
///
/// One exit tolerance before the exit window opens: a note released earlier
/// than that was not held to the end.
fn hold_fresh_beat(note: &Note, geometry: &HighwayGeometry, settings: &JudgeSettings) -> f64 {
    sustain_exit_beat(note, geometry, settings) - geometry.units_to_beats(settings.exit_tolerance)
}

/// React to one detection; `note.position` must be current for `current_beat`
pub fn judge_detection(
    note: &mut Note,
    detected: &PitchEstimate,
    geometry: &HighwayGeometry,
    settings: &JudgeSettings,
    current_beat: f64,
) -> Judgment {
    let correct = is_correct(note, detected, settings);
    let in_window = (note.position - geometry.hit_line).abs() < settings.entrance_tolerance;

    match note.state {
        NoteState::Approaching if in_window && correct => {
            if note.is_sustained() {
                note.state = NoteState::Sustaining;
                note.sustain_started = true;
                note.sustain_hitting = true;
                note.last_correct_beat = Some(current_beat);
                Judgment::SustainStarted
            } else {
                note.state = NoteState::Perfect;
                Judgment::Perfect
            }
        }
        NoteState::Sustaining => {
            if current_beat >= sustain_exit_beat(note, geometry, settings) {
                note.state = NoteState::Perfect;
                note.sustain_hitting = false;
                Judgment::Perfect
            } else if !correct {
                note.state = NoteState::Miss;
                note.sustain_hitting = false;
                Judgment::Miss
            } else {
                note.sustain_hitting = true;
                note.last_correct_beat = Some(current_beat);
                Judgment::Unchanged
            }
        }
        _ => Judgment::Unchanged,
    }
}

/// Time-driven transitions: missing a crossed note, settling a held one
///
/// A hold whose exit window is open completes only if it was still heard
/// recently; one that went quiet is missed once its end has passed.
pub fn judge_tick(
    note: &mut Note,
    geometry: &HighwayGeometry,
    settings: &JudgeSettings,
    current_beat: f64,
) -> Judgment {
    match note.state {
        NoteState::Approaching if geometry.is_past_miss_line(note.position) => {
            note.state = NoteState::Miss;
            Judgment::Miss
        }
        NoteState::Sustaining if current_beat >= sustain_exit_beat(note, geometry, settings) => {
            let held = note
                .last_correct_beat
                .is_some_and(|beat| beat >= hold_fresh_beat(note, geometry, settings));
            if held {
                note.state = NoteState::Perfect;
                note.sustain_hitting = false;
                Judgment::Perfect
            } else if current_beat >= note.end_beat(geometry) {
                note.state = NoteState::Miss;
                note.sustain_hitting = false;
                Judgment::Miss
            } else {
                Judgment::Unchanged
            }
        }
        _ => Judgment::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::notes::BassString;
    use crate::sequencer::exercise::ExerciseNote;

    fn geometry() -> HighwayGeometry {
        HighwayGeometry::new(15.0)
    }

    fn note_at(exercise: ExerciseNote, beat: f64) -> Note {
        Note::from_exercise(1, &exercise, &geometry(), beat)
    }

    fn detection(string: BassString, fret: u8) -> PitchEstimate {
        PitchEstimate::from_frequency(string.fretted(fret).frequency(), 0.95)
    }

    #[test]
    fn test_plain_hit_in_window() {
        // Hits the line at beat 8
        let mut note = note_at(ExerciseNote::new(BassString::E, 0, 0.0), 8.1);
        let judgment = judge_detection(
            &mut note,
            &detection(BassString::E, 0),
            &geometry(),
            &JudgeSettings::default(),
            8.1,
        );
        assert_eq!(judgment, Judgment::Perfect);
        assert_eq!(note.state, NoteState::Perfect);
    }

    #[test]
    fn test_wrong_note_leaves_plain_note_approaching() {
        let mut note = note_at(ExerciseNote::new(BassString::E, 0, 0.0), 8.0);
        let judgment = judge_detection(
            &mut note,
            &detection(BassString::A, 0),
            &geometry(),
            &JudgeSettings::default(),
            8.0,
        );
        assert_eq!(judgment, Judgment::Unchanged);
        assert_eq!(note.state, NoteState::Approaching);
    }

    #[test]
    fn test_out_of_window_detection_ignored() {
        let mut note = note_at(ExerciseNote::new(BassString::E, 0, 0.0), 7.0);
        judge_detection(
            &mut note,
            &detection(BassString::E, 0),
            &geometry(),
            &JudgeSettings::default(),
            7.0,
        );
        assert_eq!(note.state, NoteState::Approaching);
    }

    #[test]
    fn test_string_match_policy() {
        // A1 played as E string fret 5 is reported on the A string by frequency
        let mut note = note_at(ExerciseNote::new(BassString::E, 5, 0.0), 8.0);
        let played = detection(BassString::E, 5);
        assert_eq!(played.string, BassString::A);

        let strict = JudgeSettings::default();
        assert!(!is_correct(&note, &played, &strict));

        let lenient = JudgeSettings {
            require_string_match: false,
            ..Default::default()
        };
        assert_eq!(
            judge_detection(&mut note, &played, &geometry(), &lenient, 8.0),
            Judgment::Perfect
        );
    }

    #[test]
    fn test_crossing_misses_unjudged_note() {
        let geometry = geometry();
        let settings = JudgeSettings::default();
        let mut note = note_at(ExerciseNote::new(BassString::D, 0, 0.0), 8.3);
        assert!(note.position < 13.0);
        assert_eq!(judge_tick(&mut note, &geometry, &settings, 8.3), Judgment::Miss);
    }

    #[test]
    fn test_perfect_note_never_missed() {
        let geometry = geometry();
        let settings = JudgeSettings::default();
        let mut note = note_at(ExerciseNote::new(BassString::D, 0, 0.0), 8.0);
        judge_detection(&mut note, &detection(BassString::D, 0), &geometry, &settings, 8.0);

        note.update_position(&geometry, 9.0);
        assert_eq!(judge_tick(&mut note, &geometry, &settings, 9.0), Judgment::Unchanged);
        assert_eq!(note.state, NoteState::Perfect);
    }

    #[test]
    fn test_sustain_held_to_end_is_perfect() {
        let geometry = geometry();
        let settings = JudgeSettings::default();
        let played = detection(BassString::G, 0);
        let mut note = note_at(ExerciseNote::sustained(BassString::G, 0, 0.0, 2.0), 8.0);

        assert_eq!(
            judge_detection(&mut note, &played, &geometry, &settings, 8.0),
            Judgment::SustainStarted
        );
        assert!(note.sustain_started && note.sustain_hitting);

        // Still held, past the hit line: the crossing does not miss a started sustain
        note.update_position(&geometry, 9.0);
        assert_eq!(judge_tick(&mut note, &geometry, &settings, 9.0), Judgment::Unchanged);
        assert_eq!(
            judge_detection(&mut note, &played, &geometry, &settings, 9.0),
            Judgment::Unchanged
        );

        // End is beat 10; exit window opens 3 / 11.875 beats before it
        note.update_position(&geometry, 9.9);
        assert_eq!(
            judge_detection(&mut note, &played, &geometry, &settings, 9.9),
            Judgment::Perfect
        );
    }

    #[test]
    fn test_sustain_wrong_note_before_exit_is_permanent_miss() {
        let geometry = geometry();
        let settings = JudgeSettings::default();
        let mut note = note_at(ExerciseNote::sustained(BassString::G, 0, 0.0, 2.0), 8.0);
        judge_detection(&mut note, &detection(BassString::G, 0), &geometry, &settings, 8.0);

        note.update_position(&geometry, 9.0);
        assert_eq!(
            judge_detection(&mut note, &detection(BassString::D, 0), &geometry, &settings, 9.0),
            Judgment::Miss
        );

        note.update_position(&geometry, 9.9);
        judge_detection(&mut note, &detection(BassString::G, 0), &geometry, &settings, 9.9);
        judge_tick(&mut note, &geometry, &settings, 10.5);
        assert_eq!(note.state, NoteState::Miss);
    }

    #[test]
    fn test_sustain_completed_by_tick() {
        let geometry = geometry();
        let settings = JudgeSettings::default();
        let played = detection(BassString::A, 0);
        let mut note = note_at(ExerciseNote::sustained(BassString::A, 0, 0.0, 1.0), 8.0);
        judge_detection(&mut note, &played, &geometry, &settings, 8.0);

        assert_eq!(judge_tick(&mut note, &geometry, &settings, 8.5), Judgment::Unchanged);
        judge_detection(&mut note, &played, &geometry, &settings, 8.6);
        assert_eq!(note.last_correct_beat, Some(8.6));
        assert_eq!(judge_tick(&mut note, &geometry, &settings, 9.0), Judgment::Perfect);
    }

    #[test]
    fn test_released_sustain_is_missed_at_its_end() {
        let geometry = geometry();
        let settings = JudgeSettings::default();
        let mut note = note_at(ExerciseNote::sustained(BassString::E, 0, 0.0, 2.0), 8.0);
        judge_detection(&mut note, &detection(BassString::E, 0), &geometry, &settings, 8.0);
        assert_eq!(note.state, NoteState::Sustaining);

        // Plucked and muted: nothing heard after the entrance
        for beat in [8.5, 9.0, 9.5, 9.8] {
            note.update_position(&geometry, beat);
            assert_eq!(judge_tick(&mut note, &geometry, &settings, beat), Judgment::Unchanged);
        }
        note.update_position(&geometry, 10.0);
        assert_eq!(judge_tick(&mut note, &geometry, &settings, 10.0), Judgment::Miss);
        assert_eq!(note.state, NoteState::Miss);
        assert!(!note.sustain_hitting);
    }

    #[test]
    fn test_tolerances_sanitised() {
        let settings = JudgeSettings {
            entrance_tolerance: 2.0,
            exit_tolerance: 6.0,
            require_string_match: true,
        }
        .validated();
        assert_eq!(settings.exit_tolerance, 2.0);

        let settings = JudgeSettings {
            entrance_tolerance: f64::NAN,
            exit_tolerance: -1.0,
            require_string_match: false,
        }
        .validated();
        assert_eq!(settings.entrance_tolerance, 5.0);
        assert_eq!(settings.exit_tolerance, 3.0);
        assert!(!settings.require_string_match);
    }
}
