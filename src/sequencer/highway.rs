// Note highway - Beat-derived positions of notes and beat markers
//
// Positions are in display units (0 = left edge, 100 = right edge). Nothing
// here integrates frame deltas: every position is recomputed from the
// current beat, so a dropped render tick cannot desynchronise the highway
// from the click track.

use super::exercise::ExerciseNote;
use super::timeline::beat_in_measure;
use crate::pitch::notes::{BassString, NoteName};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighwayGeometry {
    /// Where notes appear, just off the right edge
    pub spawn_position: f64,
    /// Reference position notes are judged against
    pub hit_line: f64,
    /// Beats a note takes from spawn edge to hit line
    pub lead_in_beats: f64,
    /// How far past the hit line an unjudged note may go before it is missed
    pub miss_margin: f64,
    /// Notes and markers left of this are dropped
    pub purge_position: f64,
}

impl HighwayGeometry {
    pub const DEFAULT_HIT_LINE: f64 = 15.0;
    pub const MAX_HIT_LINE: f64 = 100.0;

    /// Replace fields that would make `units_per_beat` zero, negative or not
    /// finite with their defaults
    ///
    /// The spawn edge must stay right of any hit line an exercise may pick,
    /// and the purge line left of the miss line.
    pub fn validated(self) -> Self {
        let defaults = Self::default();
        let mut geometry = self.with_hit_line(self.hit_line);

        if !geometry.spawn_position.is_finite() || geometry.spawn_position <= Self::MAX_HIT_LINE {
            geometry.spawn_position = defaults.spawn_position;
        }
        if !geometry.lead_in_beats.is_finite() || geometry.lead_in_beats <= 0.0 {
            geometry.lead_in_beats = defaults.lead_in_beats;
        }
        if !geometry.miss_margin.is_finite() || geometry.miss_margin < 0.0 {
            geometry.miss_margin = defaults.miss_margin;
        }
        if !geometry.purge_position.is_finite() {
            geometry.purge_position = defaults.purge_position;
        }
        geometry.purge_position = geometry.purge_position.min(-geometry.miss_margin);
        geometry
    }

    pub fn new(hit_line: f64) -> Self {
        Self::default().with_hit_line(hit_line)
    }

    /// Same geometry with the hit line moved (clamped to 0..=100)
    pub fn with_hit_line(mut self, hit_line: f64) -> Self {
        self.hit_line = if hit_line.is_finite() {
            hit_line.clamp(0.0, Self::MAX_HIT_LINE)
        } else {
            Self::DEFAULT_HIT_LINE
        };
        self
    }

    /// Display units travelled per beat
    pub fn units_per_beat(&self) -> f64 {
        (self.spawn_position - self.hit_line) / self.lead_in_beats
    }

    /// Position of something that sits on the spawn edge at `spawn_beat`
    pub fn position(&self, spawn_beat: f64, current_beat: f64) -> f64 {
        self.spawn_position + (spawn_beat - current_beat) * self.units_per_beat()
    }

    /// Beat at which something spawned at `spawn_beat` reaches the hit line
    pub fn hit_beat(&self, spawn_beat: f64) -> f64 {
        spawn_beat + self.lead_in_beats
    }

    /// Display distance expressed in beats
    pub fn units_to_beats(&self, units: f64) -> f64 {
        units / self.units_per_beat()
    }

    pub fn is_past_miss_line(&self, position: f64) -> bool {
        position < self.hit_line - self.miss_margin
    }

    pub fn is_purged(&self, position: f64) -> bool {
        position < self.purge_position
    }
}

impl Default for HighwayGeometry {
    fn default() -> Self {
        Self {
            spawn_position: 110.0,
            hit_line: Self::DEFAULT_HIT_LINE,
            lead_in_beats: 8.0,
            miss_margin: 2.0,
            purge_position: -10.0,
        }
    }
}

pub type NoteId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NoteState {
    Approaching,
    Sustaining,
    Perfect,
    Miss,
}

impl NoteState {
    /// Perfect and miss are final
    pub fn is_final(self) -> bool {
        matches!(self, NoteState::Perfect | NoteState::Miss)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: NoteId,
    pub string: BassString,
    pub fret: u8,
    pub spawn_beat: f64,
    /// Sustain length in beats
    pub duration: Option<f64>,
    pub state: NoteState,
    pub sustain_started: bool,
    pub sustain_hitting: bool,
    /// Beat of the latest correct detection while held
    pub last_correct_beat: Option<f64>,
    pub position: f64,
}

impl Note {
    pub fn from_exercise(
        id: NoteId,
        note: &ExerciseNote,
        geometry: &HighwayGeometry,
        current_beat: f64,
    ) -> Self {
        Self {
            id,
            string: note.string,
            fret: note.fret,
            spawn_beat: note.beat,
            duration: note.duration.filter(|d| *d > 0.0),
            state: NoteState::Approaching,
            sustain_started: false,
            sustain_hitting: false,
            last_correct_beat: None,
            position: geometry.position(note.beat, current_beat),
        }
    }

    pub fn expected_note(&self) -> NoteName {
        self.string.fretted(self.fret)
    }

    pub fn is_sustained(&self) -> bool {
        self.duration.is_some()
    }

    /// Beat at which the held part ends (the hit beat for plain notes)
    pub fn end_beat(&self, geometry: &HighwayGeometry) -> f64 {
        geometry.hit_beat(self.spawn_beat) + self.duration.unwrap_or(0.0)
    }

    pub fn update_position(&mut self, geometry: &HighwayGeometry, current_beat: f64) {
        self.position = geometry.position(self.spawn_beat, current_beat);
    }

    /// Position of the end of the held part (the head for plain notes)
    pub fn tail_position(&self, geometry: &HighwayGeometry) -> f64 {
        self.position + self.duration.unwrap_or(0.0) * geometry.units_per_beat()
    }

    /// Off the highway once the whole note, tail included, is left of the cutoff
    pub fn is_purged(&self, geometry: &HighwayGeometry) -> bool {
        geometry.is_purged(self.tail_position(geometry))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeatMarker {
    pub beat: i64,
    /// 1..=4 within the measure
    pub beat_number: u8,
    pub position: f64,
}

impl BeatMarker {
    pub fn new(beat: i64, geometry: &HighwayGeometry, current_beat: f64) -> Self {
        Self {
            beat,
            beat_number: beat_in_measure(beat),
            position: geometry.position(beat as f64, current_beat),
        }
    }

    pub fn update_position(&mut self, geometry: &HighwayGeometry, current_beat: f64) {
        self.position = geometry.position(self.beat as f64, current_beat);
    }
}

/// One marker per beat from the start of the count-off until the last note
/// has crossed the hit line
pub fn beat_markers(
    count_off_beats: i64,
    last_note_beat: f64,
    geometry: &HighwayGeometry,
    current_beat: f64,
) -> Vec<BeatMarker> {
    let end = (last_note_beat + geometry.lead_in_beats).ceil() as i64;
    (-count_off_beats..end)
        .map(|beat| BeatMarker::new(beat, geometry, current_beat))
        .collect()
}

/// Count-off display over the last eight beats before beat 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Countdown {
    Three,
    Two,
    One,
    Go,
}

impl Countdown {
    pub fn from_beat(beat: f64) -> Option<Self> {
        if (-8.0..-6.0).contains(&beat) {
            Some(Countdown::Three)
        } else if (-6.0..-4.0).contains(&beat) {
            Some(Countdown::Two)
        } else if (-4.0..-2.0).contains(&beat) {
            Some(Countdown::One)
        } else if (-2.0..0.0).contains(&beat) {
            Some(Countdown::Go)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Countdown::Three => "3",
            Countdown::Two => "2",
            Countdown::One => "1",
            Countdown::Go => "Go!",
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
