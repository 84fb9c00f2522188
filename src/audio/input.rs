// Audio input - Capture worker feeding the pitch analyzer
//
// A CPAL `Stream` is not `Send` on every host, so one worker thread owns it
// for its whole life and is driven by commands. The capture callback mixes
// each frame to mono and pushes it into the analyzer ring without blocking.
//
// Device loss is reported through the stream error callback (status +
// notification). The device watcher's change events give the worker one
// automatic retry per change; `start()` can always be called again by hand.

use super::AudioError;
use super::device::{AudioDeviceManager, input_config};
use super::format_conversion::mix_frame_to_mono;
use super::parameters::AtomicF32;
use crate::connection::reconnect::ReconnectionStrategy;
use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use crate::connection::watcher::DeviceChange;
use crate::messaging::channels::SharedNotifier;
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::pitch::analyzer::SampleProducer;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use ringbuf::traits::Producer;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputConfig {
    /// `None` follows the host default input
    pub device_name: Option<String>,
    pub preferred_sample_rate: Option<u32>,
}

enum InputCommand {
    Start(Sender<Result<f32, AudioError>>),
    Stop(Sender<()>),
    DeviceChanged(DeviceChange),
    Shutdown,
}

/// Handle to the capture worker
pub struct AudioInput {
    command_tx: Sender<InputCommand>,
    status: AtomicDeviceStatus,
    sample_rate: AtomicF32,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl AudioInput {
    /// Spawn the worker; capture starts with [`AudioInput::start`]
    pub fn spawn(
        producer: SampleProducer,
        notifier: SharedNotifier,
        config: InputConfig,
    ) -> Result<Self, AudioError> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let status = AtomicDeviceStatus::new(DeviceStatus::Disconnected);
        let sample_rate = AtomicF32::new(48000.0);

        let worker_status = status.clone();
        let worker_rate = sample_rate.clone();
        let thread_handle = thread::Builder::new()
            .name("audio-input".into())
            .spawn(move || {
                // Built on the worker thread: the stream it will own is not Send
                let worker = InputWorker {
                    config,
                    producer: Arc::new(Mutex::new(producer)),
                    notifier,
                    status: worker_status,
                    sample_rate: worker_rate,
                    stream: None,
                    wanted: false,
                };
                worker.run(command_rx)
            })
            .map_err(|e| AudioError::Worker(e.to_string()))?;

        Ok(Self {
            command_tx,
            status,
            sample_rate,
            thread_handle: Some(thread_handle),
        })
    }

    /// Open and start the capture stream; returns the device sample rate
    ///
    /// Blocks until the device has been acquired or has failed. A failure
    /// leaves the input armed, so the next device change retries it.
    pub fn start(&self) -> Result<f32, AudioError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.command_tx
            .send(InputCommand::Start(reply_tx))
            .map_err(|_| AudioError::Worker("input worker stopped".into()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::Worker("input worker stopped".into()))?
    }

    /// Close the capture stream; a no-op when not capturing
    pub fn stop(&self) {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        if self.command_tx.send(InputCommand::Stop(reply_tx)).is_ok() {
            let _ = reply_rx.recv();
        }
    }

    /// Forward a device watcher event to the worker
    pub fn notify_device_change(&self, change: DeviceChange) {
        let _ = self.command_tx.send(InputCommand::DeviceChanged(change));
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    pub fn is_connected(&self) -> bool {
        self.status.get().is_connected()
    }

    /// Shared sample rate of the current stream, read by the analyzer every tick
    pub fn sample_rate(&self) -> AtomicF32 {
        self.sample_rate.clone()
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        let _ = self.command_tx.send(InputCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

struct InputWorker {
    config: InputConfig,
    producer: Arc<Mutex<SampleProducer>>,
    notifier: SharedNotifier,
    status: AtomicDeviceStatus,
    sample_rate: AtomicF32,
    stream: Option<Stream>,
    /// Capture was requested and not stopped since
    wanted: bool,
}

impl InputWorker {
    fn run(mut self, commands: Receiver<InputCommand>) {
        while let Ok(command) = commands.recv() {
            match command {
                InputCommand::Start(reply) => {
                    self.wanted = true;
                    let _ = reply.send(self.open());
                }
                InputCommand::Stop(reply) => {
                    self.wanted = false;
                    self.close();
                    let _ = reply.send(());
                }
                InputCommand::DeviceChanged(change) => self.on_device_change(change),
                InputCommand::Shutdown => break,
            }
        }
        self.close();
        log::debug!("Audio input worker stopped");
    }

    fn open(&mut self) -> Result<f32, AudioError> {
        self.stream = None;
        self.status.set(DeviceStatus::Connecting);

        match self.build() {
            Ok((stream, sample_rate)) => {
                self.stream = Some(stream);
                self.sample_rate.set(sample_rate);
                self.status.set(DeviceStatus::Connected);
                log::info!("Audio input connected: {} Hz", sample_rate);
                self.notifier.notify(Notification::info(
                    NotificationCategory::Input,
                    format!("Audio input connected: {} Hz", sample_rate),
                ));
                Ok(sample_rate)
            }
            Err(e) => {
                self.status.set(DeviceStatus::Error);
                log::warn!("Audio input unavailable: {}", e);
                self.notifier.notify(Notification::error(
                    NotificationCategory::Input,
                    format!("No audio input available: {}", e),
                ));
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Audio input closed");
        }
        self.status.set(DeviceStatus::Disconnected);
    }

    fn on_device_change(&mut self, change: DeviceChange) {
        if !self.wanted {
            return;
        }
        let follows_default = self.config.device_name.is_none()
            && matches!(change, DeviceChange::DefaultChanged(_));
        if !self.status.get().needs_reconnect() && !follows_default {
            return;
        }

        log::info!("Retrying audio input after {:?}", change);
        let mut strategy = ReconnectionStrategy::once();
        while let Some(delay) = strategy.next_delay() {
            // Give the host a moment to finish enumerating the new device
            thread::sleep(delay);
            if self.open().is_ok() {
                strategy.reset();
                break;
            }
        }
    }

    fn build(&self) -> Result<(Stream, f32), AudioError> {
        let manager = AudioDeviceManager::new();
        let device = match &self.config.device_name {
            None => manager.input_device(None).ok_or(AudioError::NoDevice("input"))?,
            Some(name) => manager
                .input_device(Some(name))
                .ok_or_else(|| AudioError::DeviceNotFound(name.clone()))?,
        };

        let supported = input_config(&device, self.config.preferred_sample_rate)?;
        let sample_format = supported.sample_format();
        let sample_rate = supported.sample_rate().0 as f32;
        let config: StreamConfig = supported.into();

        let stream = match sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(&device, &config)?,
            SampleFormat::I16 => self.build_stream::<i16>(&device, &config)?,
            SampleFormat::U16 => self.build_stream::<u16>(&device, &config)?,
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        };
        stream.play()?;
        Ok((stream, sample_rate))
    }

    fn build_stream<T>(&self, device: &Device, config: &StreamConfig) -> Result<Stream, AudioError>
    where
        T: SizedSample + Send + 'static,
        f32: FromSample<T>,
    {
        let channels = config.channels.max(1) as usize;
        let producer = Arc::clone(&self.producer);
        let status = self.status.clone();
        let notifier = self.notifier.clone();

        let stream = device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // No allocations, no blocking: a contended ring drops this buffer
                let Ok(mut producer) = producer.try_lock() else {
                    return;
                };
                let mut mono = [0.0f32; 256];
                for chunk in data.chunks(channels * mono.len()) {
                    let mut frames = 0;
                    for (slot, frame) in mono.iter_mut().zip(chunk.chunks(channels)) {
                        *slot = mix_frame_to_mono(frame);
                        frames += 1;
                    }
                    producer.push_slice(&mono[..frames]);
                }
            },
            move |err| {
                status.set(DeviceStatus::Error);
                notifier.notify(Notification::error(
                    NotificationCategory::Input,
                    format!("Audio input stream error: {}", err),
                ));
            },
            None,
        )?;
        Ok(stream)
    }
}
