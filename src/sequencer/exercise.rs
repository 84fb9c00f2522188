// Exercise definitions - Ordered (string, fret, beat, duration?) tuples supplied by the lesson layer

use crate::pitch::notes::{BassString, NoteName};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const MAX_FRET: u8 = 24;

#[derive(Debug, Error)]
pub enum ExerciseError {
    #[error("Exercise has no notes")]
    Empty,

    #[error("Note {index}: {reason}")]
    InvalidNote { index: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseNote {
    pub string: BassString,
    pub fret: u8,
    /// Beat the note enters at the spawn edge; it reaches the hit line one
    /// lead-in later
    pub beat: f64,
    /// Sustain length in beats; absent for a plain hit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl ExerciseNote {
    pub fn new(string: BassString, fret: u8, beat: f64) -> Self {
        Self {
            string,
            fret,
            beat,
            duration: None,
        }
    }

    pub fn sustained(string: BassString, fret: u8, beat: f64, duration: f64) -> Self {
        Self {
            duration: Some(duration),
            ..Self::new(string, fret, beat)
        }
    }

    pub fn expected_note(&self) -> NoteName {
        self.string.fretted(self.fret)
    }

    pub fn is_sustained(&self) -> bool {
        self.duration.is_some_and(|d| d > 0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default)]
    pub name: String,
    /// Suggested tempo; the caller's tempo wins when both are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    pub notes: Vec<ExerciseNote>,
}

impl Exercise {
    pub fn new(notes: Vec<ExerciseNote>) -> Self {
        Self {
            notes,
            ..Default::default()
        }
    }

    /// Reject unusable notes; zero or negative durations become plain hits
    pub fn validated(mut self) -> Result<Self, ExerciseError> {
        if self.notes.is_empty() {
            return Err(ExerciseError::Empty);
        }
        for (index, note) in self.notes.iter_mut().enumerate() {
            if !note.beat.is_finite() {
                return Err(ExerciseError::InvalidNote {
                    index,
                    reason: "beat is not a finite number".into(),
                });
            }
            if note.fret > MAX_FRET {
                return Err(ExerciseError::InvalidNote {
                    index,
                    reason: format!("fret {} is above {}", note.fret, MAX_FRET),
                });
            }
            if let Some(duration) = note.duration {
                if !duration.is_finite() || duration <= 0.0 {
                    note.duration = None;
                }
            }
        }
        Ok(self)
    }

    pub fn from_json(json: &str) -> Result<Self, ExerciseError> {
        let exercise: Self = serde_json::from_str(json)?;
        exercise.validated()
    }

    pub fn load(path: &Path) -> Result<Self, ExerciseError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, ExerciseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Highest note beat, 0.0 for an empty exercise
    pub fn last_note_beat(&self) -> f64 {
        self.notes
            .iter()
            .map(|note| note.beat)
            .fold(None, |max: Option<f64>, beat| Some(max.map_or(beat, |m| m.max(beat))))
            .unwrap_or(0.0)
    }

    /// Highest `beat + duration`, so a long hold ends after the last onset
    pub fn last_note_end_beat(&self) -> f64 {
        self.notes
            .iter()
            .map(|note| note.beat + note.duration.filter(|d| *d > 0.0).unwrap_or(0.0))
            .fold(None, |max: Option<f64>, end| Some(max.map_or(end, |m| m.max(end))))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exercise() {
        let exercise = Exercise::from_json(
            r#"{
                "name": "Root-fifth",
                "notes": [
                    { "string": "E", "fret": 3, "beat": 0 },
                    { "string": "A", "fret": 5, "beat": 2, "duration": 2 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(exercise.notes.len(), 2);
        assert_eq!(exercise.notes[0].expected_note().to_string(), "G1");
        assert!(exercise.notes[1].is_sustained());
        assert_eq!(exercise.last_note_beat(), 2.0);
        assert_eq!(exercise.last_note_end_beat(), 4.0);
    }

    #[test]
    fn test_zero_duration_is_plain_note() {
        let exercise = Exercise::new(vec![ExerciseNote::sustained(BassString::D, 0, 1.0, 0.0)])
            .validated()
            .unwrap();
        assert_eq!(exercise.notes[0].duration, None);
    }

    #[test]
    fn test_rejects_empty_and_bad_frets() {
        assert!(matches!(Exercise::default().validated(), Err(ExerciseError::Empty)));
        let result = Exercise::new(vec![ExerciseNote::new(BassString::G, 30, 0.0)]).validated();
        assert!(matches!(result, Err(ExerciseError::InvalidNote { index: 0, .. })));
    }

    #[test]
    fn test_last_note_beat_with_negative_beats() {
        let exercise = Exercise::new(vec![
            ExerciseNote::new(BassString::E, 0, -3.0),
            ExerciseNote::new(BassString::E, 0, -1.5),
        ]);
        assert_eq!(exercise.last_note_beat(), -1.5);
    }

    #[test]
    fn test_long_hold_ends_after_later_onset() {
        let exercise = Exercise::new(vec![
            ExerciseNote::sustained(BassString::E, 0, 0.0, 6.0),
            ExerciseNote::new(BassString::A, 0, 2.0),
        ]);
        assert_eq!(exercise.last_note_beat(), 2.0);
        assert_eq!(exercise.last_note_end_beat(), 6.0);
    }
}
