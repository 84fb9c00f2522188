// Sequencer module - Beat clock, click track, note highway and hit judging

pub mod click;
pub mod clock;
pub mod exercise;
pub mod highway;
pub mod judge;
pub mod metronome;
pub mod session;
pub mod timeline;

pub use click::{ClickQueue, ClickRenderer, ClickSink, ClickSound, ClickType, create_click_channel};
pub use clock::BeatClock;
pub use exercise::{Exercise, ExerciseError, ExerciseNote};
pub use highway::{BeatMarker, Countdown, HighwayGeometry, Note, NoteId, NoteState};
pub use judge::{JudgeSettings, Judgment};
pub use metronome::{ClickPattern, ClickScheduler, Metronome, MetronomeRunner};
pub use session::{HighwaySnapshot, Score, Sequencer, SequencerSettings};
pub use timeline::Tempo;
