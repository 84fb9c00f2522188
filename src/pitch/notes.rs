// Note mapping - Frequency to equal-tempered note name/cents, and the four open bass strings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Concert pitch reference (A4)
pub const A4_FREQUENCY: f32 = 440.0;
const A4_MIDI: i32 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// An equal-tempered note, stored as its MIDI number (60 = C4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteName {
    midi: i32,
}

impl NoteName {
    pub fn from_midi(midi: i32) -> Self {
        Self { midi }
    }

    pub fn midi(&self) -> i32 {
        self.midi
    }

    /// Pitch class name without octave ("C#")
    pub fn pitch_class(&self) -> &'static str {
        NOTE_NAMES[self.midi.rem_euclid(12) as usize]
    }

    pub fn octave(&self) -> i32 {
        self.midi.div_euclid(12) - 1
    }

    /// Equal-tempered frequency of this note
    pub fn frequency(&self) -> f32 {
        A4_FREQUENCY * 2.0_f32.powf((self.midi - A4_MIDI) as f32 / 12.0)
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class(), self.octave())
    }
}

/// Nearest semitone to `frequency` and the signed deviation from it in cents
///
/// Cents are rounded to whole values and stay within [-50, 50].
pub fn frequency_to_note(frequency: f32) -> (NoteName, i32) {
    let half_steps = 12.0 * (frequency / A4_FREQUENCY).log2();
    let rounded = half_steps.round();
    let cents = ((half_steps - rounded) * 100.0).round() as i32;
    (NoteName::from_midi(A4_MIDI + rounded as i32), cents)
}

/// Open strings of a four-string bass in standard tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BassString {
    E = 0,
    A = 1,
    D = 2,
    G = 3,
}

impl BassString {
    pub const ALL: [BassString; 4] = [BassString::E, BassString::A, BassString::D, BassString::G];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Nominal open-string fundamental used for the coarse string guess
    pub fn open_frequency(self) -> f32 {
        match self {
            BassString::E => 41.2,
            BassString::A => 55.0,
            BassString::D => 73.4,
            BassString::G => 98.0,
        }
    }

    /// E1, A1, D2, G2
    pub fn open_note(self) -> NoteName {
        let midi = match self {
            BassString::E => 28,
            BassString::A => 33,
            BassString::D => 38,
            BassString::G => 43,
        };
        NoteName::from_midi(midi)
    }

    /// Note sounded at `fret` on this string
    pub fn fretted(self, fret: u8) -> NoteName {
        NoteName::from_midi(self.open_note().midi() + fret as i32)
    }

    /// Open string whose nominal fundamental is closest in Hz
    ///
    /// Deliberately independent of the note name: a fretted note is reported
    /// against whichever open string it sits nearest to.
    pub fn nearest(frequency: f32) -> Self {
        let mut best = BassString::E;
        for candidate in Self::ALL {
            if (candidate.open_frequency() - frequency).abs()
                < (best.open_frequency() - frequency).abs()
            {
                best = candidate;
            }
        }
        best
    }
}

impl fmt::Display for BassString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BassString::E => "E",
            BassString::A => "A",
            BassString::D => "D",
            BassString::G => "G",
        };
        f.write_str(label)
    }
}
