// Analyzer - Dedicated analysis tick thread
//
// Samples arrive from the capture callback through a lock-free ring. Every
// tick the thread drains the ring into a rolling window, picks up any new
// parameter set, runs the engine and publishes the frame before sleeping.

use super::engine::{AnalysisFrame, EngineDiagnostics, PitchEngine, PitchEstimate};
use super::history::DetectionLog;
use super::params::SharedParameters;
use super::spectrum::{SPECTRUM_BARS, SpectrumBand, SpectrumBars};
use crate::audio::parameters::AtomicF32;
use crossbeam_channel::{Receiver, Sender, select};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Split};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

pub type SampleProducer = ringbuf::HeapProd<f32>;
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Ring between the capture callback and the analysis thread
///
/// Sized for a little over one second at 48 kHz so a slow tick never loses
/// the current window.
pub fn create_sample_channel(capacity: usize) -> (SampleProducer, SampleConsumer) {
    HeapRb::<f32>::new(capacity).split()
}

/// Fixed-length window holding the most recent samples
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    samples: Vec<f32>,
}

impl AnalysisWindow {
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Shift in `chunk`, keeping the newest `len()` samples
    pub fn push(&mut self, chunk: &[f32]) {
        let len = self.samples.len();
        if chunk.len() >= len {
            self.samples
                .copy_from_slice(&chunk[chunk.len() - len..]);
            return;
        }
        self.samples.copy_within(chunk.len().., 0);
        self.samples[len - chunk.len()..].copy_from_slice(chunk);
    }

    /// Change the length; the window restarts from silence
    pub fn resize(&mut self, len: usize) {
        self.samples.clear();
        self.samples.resize(len, 0.0);
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }
}

/// Latest published analysis result
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSnapshot {
    /// Analysis ticks completed so far
    pub tick: u64,
    pub estimate: Option<PitchEstimate>,
    pub spectrum: SpectrumBars,
    pub diagnostics: Option<EngineDiagnostics>,
}

impl Default for DetectionSnapshot {
    fn default() -> Self {
        Self {
            tick: 0,
            estimate: None,
            spectrum: [0.0; SPECTRUM_BARS],
            diagnostics: None,
        }
    }
}

/// Pushed to subscribers once per tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionEvent {
    pub tick: u64,
    pub estimate: Option<PitchEstimate>,
}

/// Where analysis results go: a pull slot, a subscriber list and the history
#[derive(Clone, Default)]
pub struct DetectionBus {
    latest: Arc<Mutex<DetectionSnapshot>>,
    subscribers: Arc<Mutex<Vec<Sender<DetectionEvent>>>>,
    history: Arc<Mutex<DetectionLog>>,
}

impl DetectionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every tick's estimate from now on
    pub fn subscribe(&self) -> Receiver<DetectionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn latest(&self) -> DetectionSnapshot {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest_estimate(&self) -> Option<PitchEstimate> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .estimate
    }

    pub fn spectrum(&self) -> SpectrumBars {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spectrum
    }

    /// Store the frame, log it and fan it out; dropped subscribers are pruned
    pub fn publish(&self, frame: AnalysisFrame) {
        let tick = {
            let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
            latest.tick += 1;
            latest.estimate = frame.estimate;
            latest.spectrum = frame.spectrum;
            latest.diagnostics = Some(frame.diagnostics);
            latest.tick
        };

        if let Some(estimate) = &frame.estimate {
            self.history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(estimate);
        }

        let event = DetectionEvent {
            tick,
            estimate: frame.estimate,
        };
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event).is_ok());
    }

    pub fn set_history_paused(&self, paused: bool) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_paused(paused);
    }

    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn history(&self) -> DetectionLog {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn history_json(&self) -> Result<String, serde_json::Error> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_json()
    }
}

/// Tick loop state; owned by the analysis thread
pub struct Analyzer {
    engine: PitchEngine,
    window: AnalysisWindow,
    scratch: Vec<f32>,
    params: SharedParameters,
    applied_version: u64,
    sample_rate: AtomicF32,
    bus: DetectionBus,
}

impl Analyzer {
    pub fn new(
        params: SharedParameters,
        sample_rate: AtomicF32,
        band: SpectrumBand,
        bus: DetectionBus,
    ) -> Self {
        let (version, current) = params.snapshot();
        let window = AnalysisWindow::new(current.fft_size.len());
        Self {
            engine: PitchEngine::new(current, sample_rate.get(), band),
            window,
            scratch: vec![0.0; 4096],
            params,
            applied_version: version,
            sample_rate,
            bus,
        }
    }

    /// Current tick interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.engine.params().update_interval)
    }

    /// Apply pending parameters, drain new samples, analyse and publish
    pub fn tick(&mut self, samples: &mut SampleConsumer) {
        let (version, params) = self.params.snapshot();
        if version != self.applied_version {
            if params.fft_size != self.engine.params().fft_size {
                self.window.resize(params.fft_size.len());
            }
            self.engine.configure(params);
            self.applied_version = version;
        }
        self.engine.set_sample_rate(self.sample_rate.get());

        loop {
            let read = samples.pop_slice(&mut self.scratch);
            if read == 0 {
                break;
            }
            self.window.push(&self.scratch[..read]);
        }

        let frame = self.engine.analyze(self.window.as_slice());
        self.bus.publish(frame);
    }

    /// Run on a named thread until the handle is dropped
    pub fn spawn(mut self, mut samples: SampleConsumer) -> AnalyzerHandle {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_handle = thread::Builder::new()
            .name("pitch-analyzer".into())
            .spawn(move || {
                log::info!("Pitch analyzer started");
                loop {
                    self.tick(&mut samples);
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        default(self.interval()) => {}
                    }
                }
                log::info!("Pitch analyzer stopped");
            })
            .ok();

        if thread_handle.is_none() {
            log::error!("Could not spawn pitch analyzer thread");
        }

        AnalyzerHandle {
            shutdown_tx,
            thread_handle,
        }
    }
}

pub struct AnalyzerHandle {
    shutdown_tx: Sender<()>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl AnalyzerHandle {
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for AnalyzerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::params::{DetectionParameters, FftSize};
    use ringbuf::traits::Producer;
    use std::f32::consts::PI;

    #[test]
    fn test_window_keeps_newest_samples() {
        let mut window = AnalysisWindow::new(4);
        window.push(&[1.0, 2.0]);
        assert_eq!(window.as_slice(), &[0.0, 0.0, 1.0, 2.0]);
        window.push(&[3.0, 4.0, 5.0]);
        assert_eq!(window.as_slice(), &[2.0, 3.0, 4.0, 5.0]);
        window.push(&[6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(window.as_slice(), &[7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_bus_fans_out_and_prunes() {
        let bus = DetectionBus::new();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        let frame = PitchEngine::new(
            DetectionParameters::default(),
            48000.0,
            SpectrumBand::default(),
        )
        .analyze(&[0.0; 8192]);
        bus.publish(frame);

        let event = kept.try_recv().unwrap();
        assert_eq!(event.tick, 1);
        assert!(event.estimate.is_none());
        assert_eq!(bus.subscribers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_tick_applies_new_transform_size() {
        let params = SharedParameters::new(DetectionParameters {
            fft_size: FftSize::S2048,
            ..Default::default()
        })
        .unwrap();
        let bus = DetectionBus::new();
        let mut analyzer = Analyzer::new(
            params.clone(),
            AtomicF32::new(48000.0),
            SpectrumBand::default(),
            bus.clone(),
        );
        let (mut tx, mut rx) = create_sample_channel(48000);

        let signal: Vec<f32> = (0..8192)
            .map(|i| 0.5 * (2.0 * PI * 55.0 * i as f32 / 48000.0).sin())
            .collect();
        tx.push_slice(&signal);
        analyzer.tick(&mut rx);
        assert_eq!(analyzer.window.len(), 2048);

        params.update(|p| p.fft_size = FftSize::S8192).unwrap();
        tx.push_slice(&signal);
        analyzer.tick(&mut rx);
        assert_eq!(analyzer.window.len(), 8192);
        assert_eq!(bus.latest().tick, 2);
    }
}
