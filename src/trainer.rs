// Trainer - Owns the audio workers, the analyzer and the sequencer, and wires them together
//
// Start-up order matters: the output stream comes first because its sample
// counter is the clock every other part reads. Capture is opened afterwards
// and may fail without taking the trainer down; the device watcher gives it
// another chance on the next device change.

use crate::audio::parameters::AtomicF32;
use crate::audio::{AudioClock, AudioError, AudioInput, AudioOutput, InputConfig, OutputConfig};
use crate::config::TrainerConfig;
use crate::connection::status::DeviceStatus;
use crate::connection::watcher::{DeviceChange, DeviceWatcher};
use crate::messaging::channels::{NotificationConsumer, SharedNotifier, create_notification_channel};
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::pitch::analyzer::{
    Analyzer, AnalyzerHandle, DetectionBus, DetectionEvent, DetectionSnapshot,
    create_sample_channel,
};
use crate::pitch::engine::PitchEstimate;
use crate::pitch::params::{DetectionParameters, ParameterError, SharedParameters};
use crate::pitch::spectrum::SpectrumBars;
use crate::sequencer::click::ClickSink;
use crate::sequencer::clock::BeatClock;
use crate::sequencer::exercise::Exercise;
use crate::sequencer::metronome::Metronome;
use crate::sequencer::session::{HighwaySnapshot, Sequencer};
use crate::sequencer::timeline::Tempo;
use crossbeam_channel::{Receiver, Sender, select};
use ringbuf::traits::Consumer;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const NOTIFICATION_CAPACITY: usize = 256;
/// About 1.4 s of mono audio at 48 kHz; the analyzer drains it every tick
const SAMPLE_RING_CAPACITY: usize = 65536;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Parameters(#[from] ParameterError),
}

pub struct Trainer {
    config: TrainerConfig,
    params: SharedParameters,
    bus: DetectionBus,
    sequencer: Arc<Sequencer>,
    metronome: Mutex<Metronome>,
    notifications: Mutex<NotificationConsumer>,
    notifier: SharedNotifier,
    // Dropped in this order: loops first, then the workers they use
    render: Option<RenderLoop>,
    devices: Option<DeviceForwarder>,
    analyzer: Option<AnalyzerHandle>,
    input: Option<Arc<AudioInput>>,
    output: Option<Arc<AudioOutput>>,
}

impl Trainer {
    /// Open the audio devices and start every background loop
    pub fn start(config: TrainerConfig) -> Result<Self, TrainerError> {
        let (notification_tx, notification_rx) = create_notification_channel(NOTIFICATION_CAPACITY);
        let notifier = SharedNotifier::new(notification_tx);

        let output = Arc::new(AudioOutput::open(
            OutputConfig {
                device_name: config.output_device.clone(),
                preferred_sample_rate: config.preferred_sample_rate,
                ..OutputConfig::default()
            },
            AtomicF32::new(config.click_volume),
            notifier.clone(),
        )?);
        let audio_clock: Arc<dyn AudioClock> = Arc::new(output.timing());
        let sink: Arc<dyn ClickSink> = Arc::new(output.click_queue());

        let clock = Arc::new(BeatClock::new(Arc::clone(&audio_clock)));
        let sequencer = Sequencer::new(clock, Arc::clone(&sink), config.sequencer.clone())
            .with_output(output.clone());
        sequencer.set_metronome_enabled(config.metronome_enabled);
        let sequencer = Arc::new(sequencer);

        let metronome = Metronome::new(audio_clock, sink).with_timing(
            config.sequencer.look_ahead_s,
            Duration::from_millis(config.sequencer.schedule_interval_ms.max(1)),
        );

        let params = SharedParameters::new(config.detection.clone())?;
        let bus = DetectionBus::new();

        let (producer, consumer) = create_sample_channel(SAMPLE_RING_CAPACITY);
        let input = Arc::new(AudioInput::spawn(
            producer,
            notifier.clone(),
            InputConfig {
                device_name: config.input_device.clone(),
                preferred_sample_rate: config.preferred_sample_rate,
            },
        )?);
        if let Err(e) = input.start() {
            log::warn!("Starting without audio input: {}", e);
        }

        let analyzer = Analyzer::new(
            params.clone(),
            input.sample_rate(),
            config.spectrum_band,
            bus.clone(),
        )
        .spawn(consumer);

        let devices = DeviceForwarder::spawn(
            Duration::from_millis(config.device_poll_interval_ms),
            Arc::downgrade(&input),
        );
        let render = RenderLoop::spawn(
            Arc::clone(&sequencer),
            bus.subscribe(),
            Duration::from_millis(config.render_interval_ms.max(1)),
        );

        log::info!("Trainer started at {} Hz", output.sample_rate());
        Ok(Self {
            config,
            params,
            bus,
            sequencer,
            metronome: Mutex::new(metronome),
            notifications: Mutex::new(notification_rx),
            notifier,
            render: Some(render),
            devices: Some(devices),
            analyzer: Some(analyzer),
            input: Some(input),
            output: Some(output),
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &Arc<Sequencer> {
        &self.sequencer
    }

    // Exercise

    /// Start an exercise; `bpm` overrides the exercise's own tempo
    pub fn play(
        &self,
        exercise: &Exercise,
        bpm: Option<f64>,
        hit_line: Option<f64>,
    ) -> Result<Tempo, AudioError> {
        self.lock_metronome().stop();
        self.sequencer.stop();

        if let Some(bpm) = bpm.or(exercise.bpm) {
            self.sequencer.set_tempo(bpm);
        }
        let hit_line = hit_line.unwrap_or(self.config.sequencer.geometry.hit_line);
        self.sequencer.start_exercise(exercise, hit_line)?;
        Ok(self.sequencer.clock().tempo())
    }

    pub fn stop(&self) {
        self.sequencer.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_running()
    }

    pub fn set_metronome_enabled(&self, enabled: bool) {
        self.sequencer.set_metronome_enabled(enabled);
    }

    pub fn snapshot(&self) -> HighwaySnapshot {
        self.sequencer.snapshot()
    }

    // Standalone metronome

    /// Arm and start the practice metronome at `bpm`
    pub fn start_metronome(&self, bpm: f64) -> Tempo {
        self.sequencer.stop();
        let mut metronome = self.lock_metronome();
        let tempo = metronome.set_bpm(bpm);
        if !metronome.is_active() {
            metronome.toggle();
        }
        metronome.start();
        tempo
    }

    pub fn stop_metronome(&self) {
        let mut metronome = self.lock_metronome();
        if metronome.is_active() {
            metronome.toggle();
        }
    }

    pub fn set_metronome_bpm(&self, bpm: f64) -> Tempo {
        self.lock_metronome().set_bpm(bpm)
    }

    pub fn metronome_beat(&self) -> u8 {
        self.lock_metronome().beat_in_measure()
    }

    // Detection

    pub fn latest(&self) -> DetectionSnapshot {
        self.bus.latest()
    }

    pub fn latest_estimate(&self) -> Option<PitchEstimate> {
        self.bus.latest_estimate()
    }

    pub fn spectrum(&self) -> SpectrumBars {
        self.bus.spectrum()
    }

    /// Extra detection listener, e.g. a tuner display
    pub fn subscribe(&self) -> Receiver<DetectionEvent> {
        self.bus.subscribe()
    }

    pub fn parameters(&self) -> DetectionParameters {
        self.params.get()
    }

    /// Swap the detection parameters; the analyzer picks them up on its next tick
    pub fn set_parameters(
        &self,
        params: DetectionParameters,
    ) -> Result<DetectionParameters, ParameterError> {
        match self.params.set(params) {
            Ok(applied) => Ok(applied),
            Err(e) => {
                self.notifier.notify(Notification::warning(
                    NotificationCategory::Parameters,
                    format!("Detection parameters rejected: {}", e),
                ));
                Err(e)
            }
        }
    }

    pub fn reset_parameters(&self) {
        self.params.reset_defaults();
        self.notifier.notify(Notification::info(
            NotificationCategory::Parameters,
            "Detection parameters reset to defaults".to_string(),
        ));
    }

    pub fn set_history_paused(&self, paused: bool) {
        self.bus.set_history_paused(paused);
    }

    pub fn clear_history(&self) {
        self.bus.clear_history();
    }

    pub fn history_json(&self) -> Result<String, serde_json::Error> {
        self.bus.history_json()
    }

    // Devices

    pub fn input_status(&self) -> DeviceStatus {
        self.input
            .as_ref()
            .map_or(DeviceStatus::Disconnected, |input| input.status())
    }

    pub fn output_status(&self) -> DeviceStatus {
        self.output
            .as_ref()
            .map_or(DeviceStatus::Disconnected, |output| output.status())
    }

    /// Manual retry after the input was lost or refused
    pub fn retry_input(&self) -> Result<f32, AudioError> {
        match &self.input {
            Some(input) => input.start(),
            None => Err(AudioError::Worker("input worker stopped".into())),
        }
    }

    /// Notifications raised by the audio workers since the last call
    pub fn drain_notifications(&self) -> Vec<Notification> {
        let mut rx = self
            .notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut drained = Vec::new();
        while let Some(notification) = rx.try_pop() {
            drained.push(notification);
        }
        drained
    }

    fn lock_metronome(&self) -> std::sync::MutexGuard<'_, Metronome> {
        self.metronome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Trainer {
    fn drop(&mut self) {
        self.render.take();
        self.sequencer.stop();
        self.lock_metronome().stop();
        self.devices.take();
        self.analyzer.take();
        self.input.take();
        self.output.take();
        log::info!("Trainer stopped");
    }
}

/// Drives the highway: a render tick at a fixed period, plus an immediate
/// judgment for every detection the analyzer publishes
struct RenderLoop {
    shutdown_tx: Sender<()>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl RenderLoop {
    fn spawn(
        sequencer: Arc<Sequencer>,
        detections: Receiver<DetectionEvent>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_handle = thread::Builder::new()
            .name("highway-render".into())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(interval);
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(detections) -> event => match event {
                            Ok(event) => sequencer.on_detection(event.estimate.as_ref()),
                            Err(_) => break,
                        },
                        recv(ticker) -> _ => {
                            sequencer.tick();
                        }
                    }
                }
                log::debug!("Highway render loop stopped");
            })
            .ok();

        if thread_handle.is_none() {
            log::error!("Could not spawn highway render thread");
        }
        Self {
            shutdown_tx,
            thread_handle,
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Passes device watcher events on to the capture worker
struct DeviceForwarder {
    watcher: Option<DeviceWatcher>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl DeviceForwarder {
    fn spawn(poll_interval: Duration, input: Weak<AudioInput>) -> Self {
        let (changes_tx, changes_rx) = crossbeam_channel::unbounded::<DeviceChange>();
        let watcher = DeviceWatcher::spawn(poll_interval, changes_tx);
        let thread_handle = thread::Builder::new()
            .name("device-forwarder".into())
            .spawn(move || {
                // Ends when the watcher drops its sender
                for change in changes_rx {
                    log::info!("Audio device change: {:?}", change);
                    match input.upgrade() {
                        Some(input) => input.notify_device_change(change),
                        None => break,
                    }
                }
            })
            .ok();

        Self {
            watcher: Some(watcher),
            thread_handle,
        }
    }
}

impl Drop for DeviceForwarder {
    fn drop(&mut self) {
        self.watcher.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
