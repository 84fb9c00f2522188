// Pitch engine - Fundamental frequency tracking for bass guitar input

pub mod analyzer;
pub mod engine;
pub mod history;
pub mod median;
pub mod notes;
pub mod offline;
pub mod params;
pub mod spectrum;
pub mod yin;

pub use analyzer::{
    Analyzer, AnalyzerHandle, DetectionBus, DetectionEvent, DetectionSnapshot, SampleConsumer,
    SampleProducer, create_sample_channel,
};
pub use engine::{AnalysisFrame, EngineDiagnostics, FrameOutcome, PitchEngine, PitchEstimate};
pub use history::{DetectionLog, DetectionRecord};
pub use notes::{BassString, NoteName, frequency_to_note};
pub use params::{DetectionParameters, FftSize, ParameterError, SharedParameters};
pub use spectrum::{SPECTRUM_BARS, SpectrumBand, SpectrumBars};
