// Bass Trainer - Library exports for the binary, integration tests and benchmarks

pub mod audio;
pub mod config;
pub mod connection;
pub mod messaging;
pub mod pitch;
pub mod sequencer;
pub mod trainer;

// Re-export commonly used types for convenience
pub use audio::{AudioClock, AudioError, AudioTiming, ManualClock};
pub use config::{ConfigError, TrainerConfig};
pub use messaging::channels::create_notification_channel;
pub use pitch::{
    BassString, DetectionParameters, FftSize, NoteName, PitchEngine, PitchEstimate,
    SharedParameters,
};
pub use sequencer::{
    BeatClock, ClickSink, ClickType, Exercise, ExerciseNote, HighwaySnapshot, Metronome,
    NoteState, Sequencer, SequencerSettings, Tempo,
};
pub use trainer::{Trainer, TrainerError};
