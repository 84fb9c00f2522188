// Audio output - Playback worker that renders the click track and drives the audio clock
//
// The output callback is the only place time advances: every buffer it
// renders moves the shared sample counter forward, and every other component
// reads "now" from that counter.

use super::AudioError;
use super::device::{AudioDeviceManager, output_config};
use super::format_conversion::write_mono_to_interleaved_frame;
use super::parameters::AtomicF32;
use super::timing::AudioTiming;
use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use crate::messaging::channels::SharedNotifier;
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::sequencer::click::{ClickQueue, ClickRenderer, create_click_channel};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use std::thread;

/// Something that can make sure the output stream is running
pub trait OutputControl: Send + Sync {
    fn resume(&self) -> Result<(), AudioError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub device_name: Option<String>,
    pub preferred_sample_rate: Option<u32>,
    /// Clicks that can be queued ahead of the callback
    pub click_queue_capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            preferred_sample_rate: None,
            click_queue_capacity: 64,
        }
    }
}

enum OutputCommand {
    Resume(Sender<Result<(), AudioError>>),
    Shutdown,
}

/// What the worker hands back once the stream is running
struct Opened {
    timing: AudioTiming,
    clicks: ClickQueue,
}

/// Handle to the playback worker
pub struct AudioOutput {
    command_tx: Sender<OutputCommand>,
    status: AtomicDeviceStatus,
    timing: AudioTiming,
    clicks: ClickQueue,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl AudioOutput {
    /// Open the output device and start rendering
    ///
    /// Blocks until the stream is playing; the returned handle exposes the
    /// audio clock and the click queue bound to this stream.
    pub fn open(
        config: OutputConfig,
        volume: AtomicF32,
        notifier: SharedNotifier,
    ) -> Result<Self, AudioError> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (opened_tx, opened_rx) = crossbeam_channel::bounded(1);
        let status = AtomicDeviceStatus::new(DeviceStatus::Connecting);
        let worker_status = status.clone();

        let thread_handle = thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                run_worker(config, volume, notifier, worker_status, opened_tx, command_rx)
            })
            .map_err(|e| AudioError::Worker(e.to_string()))?;

        let opened = match opened_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(AudioError::Worker("output worker exited".into()));
            }
        };

        Ok(Self {
            command_tx,
            status,
            timing: opened.timing,
            clicks: opened.clicks,
            thread_handle: Some(thread_handle),
        })
    }

    /// The audio clock driven by this stream
    pub fn timing(&self) -> AudioTiming {
        self.timing.clone()
    }

    pub fn click_queue(&self) -> ClickQueue {
        self.clicks.clone()
    }

    pub fn sample_rate(&self) -> f32 {
        self.timing.sample_rate()
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }
}

impl OutputControl for AudioOutput {
    /// Make sure the stream is playing; hosts may pause it after a device hiccup
    fn resume(&self) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.command_tx
            .send(OutputCommand::Resume(reply_tx))
            .map_err(|_| AudioError::Worker("output worker stopped".into()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::Worker("output worker stopped".into()))?
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        let _ = self.command_tx.send(OutputCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    config: OutputConfig,
    volume: AtomicF32,
    notifier: SharedNotifier,
    status: AtomicDeviceStatus,
    opened_tx: Sender<Result<Opened, AudioError>>,
    commands: Receiver<OutputCommand>,
) {
    let (stream, opened) = match build(&config, volume, &notifier, &status) {
        Ok(built) => built,
        Err(e) => {
            status.set(DeviceStatus::Error);
            log::warn!("Audio output unavailable: {}", e);
            notifier.notify(Notification::error(
                NotificationCategory::Output,
                format!("No audio output available: {}", e),
            ));
            let _ = opened_tx.send(Err(e));
            return;
        }
    };

    status.set(DeviceStatus::Connected);
    log::info!("Audio output started: {} Hz", opened.timing.sample_rate());
    if opened_tx.send(Ok(opened)).is_err() {
        return;
    }

    while let Ok(command) = commands.recv() {
        match command {
            OutputCommand::Resume(reply) => {
                let _ = reply.send(stream.play().map_err(AudioError::from));
            }
            OutputCommand::Shutdown => break,
        }
    }
    drop(stream);
    status.set(DeviceStatus::Disconnected);
    log::debug!("Audio output worker stopped");
}

fn build(
    config: &OutputConfig,
    volume: AtomicF32,
    notifier: &SharedNotifier,
    status: &AtomicDeviceStatus,
) -> Result<(Stream, Opened), AudioError> {
    let manager = AudioDeviceManager::new();
    let device = match &config.device_name {
        None => manager.output_device(None).ok_or(AudioError::NoDevice("output"))?,
        Some(name) => manager
            .output_device(Some(name))
            .ok_or_else(|| AudioError::DeviceNotFound(name.clone()))?,
    };

    let supported = output_config(&device, config.preferred_sample_rate)?;
    let sample_format = supported.sample_format();
    let sample_rate = supported.sample_rate().0 as f32;
    let stream_config: StreamConfig = supported.into();

    let timing = AudioTiming::new(sample_rate);
    let (clicks, renderer) = create_click_channel(config.click_queue_capacity, sample_rate, volume);

    let stream = match sample_format {
        SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, renderer, timing.clone(), notifier, status)?
        }
        SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, renderer, timing.clone(), notifier, status)?
        }
        SampleFormat::U16 => {
            build_stream::<u16>(&device, &stream_config, renderer, timing.clone(), notifier, status)?
        }
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };
    stream.play()?;

    Ok((stream, Opened { timing, clicks }))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut renderer: ClickRenderer,
    timing: AudioTiming,
    notifier: &SharedNotifier,
    status: &AtomicDeviceStatus,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    let notifier = notifier.clone();
    let status = status.clone();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // No allocations, no I/O, no blocking locks
            let mut mono = [0.0f32; 256];
            let mut position = timing.current_sample();
            for chunk in data.chunks_mut(channels * mono.len()) {
                let frames = chunk.len() / channels;
                renderer.render(&mut mono[..frames], position);
                for (frame, &sample) in chunk.chunks_mut(channels).zip(&mono[..frames]) {
                    write_mono_to_interleaved_frame(sample, frame);
                }
                position += frames as u64;
            }
            timing.advance(data.len() / channels);
        },
        move |err| {
            status.set(DeviceStatus::Error);
            notifier.notify(Notification::error(
                NotificationCategory::Output,
                format!("Audio output stream error: {}", err),
            ));
        },
        None,
    )?;
    Ok(stream)
}
