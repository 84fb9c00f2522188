// Audio module - CPAL capture and playback workers, and the audio-clock time base

pub mod device;
pub mod format_conversion;
pub mod input;
pub mod output;
pub mod parameters;
pub mod timing;

use thiserror::Error;

pub use device::{AudioDeviceInfo, AudioDeviceManager};
pub use input::{AudioInput, InputConfig};
pub use output::{AudioOutput, OutputConfig, OutputControl};
pub use timing::{AudioClock, AudioTiming, ManualClock};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No {0} device available")]
    NoDevice(&'static str),

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device configuration error: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Supported configuration query failed: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Stream creation error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Stream start error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio worker unavailable: {0}")]
    Worker(String),
}
