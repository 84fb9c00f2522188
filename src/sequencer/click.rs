// Click track - Synthesized clicks, the queue that carries them to the output
// callback, and the renderer that mixes them at their exact sample

use crate::audio::parameters::AtomicF32;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Downbeat, or an accented count-off beat
    Accent,
    /// Click on other beats
    Regular,
}

/// Pre-generated click waveforms
#[derive(Debug, Clone)]
pub struct ClickSound {
    accent_samples: Vec<f32>,
    regular_samples: Vec<f32>,
}

impl ClickSound {
    const CLICK_DURATION_S: f32 = 0.05;
    const FADE_IN_S: f32 = 0.001;
    /// Gain the exponential decay ends on
    const DECAY_FLOOR: f32 = 0.01;

    pub fn new(sample_rate: f32) -> Self {
        Self {
            accent_samples: Self::generate_click(sample_rate, 1000.0, 0.3),
            regular_samples: Self::generate_click(sample_rate, 800.0, 0.15),
        }
    }

    /// Sine burst: linear fade-in to `amplitude`, then exponential decay to the floor
    fn generate_click(sample_rate: f32, frequency: f32, amplitude: f32) -> Vec<f32> {
        let num_samples = (Self::CLICK_DURATION_S * sample_rate) as usize;
        let fade_in = (Self::FADE_IN_S * sample_rate).max(1.0);
        let decay_len = (num_samples as f32 - fade_in).max(1.0);
        let phase_increment = 2.0 * PI * frequency / sample_rate;

        (0..num_samples)
            .map(|i| {
                let i = i as f32;
                let envelope = if i < fade_in {
                    amplitude * i / fade_in
                } else {
                    let progress = (i - fade_in) / decay_len;
                    amplitude * (Self::DECAY_FLOOR / amplitude).powf(progress)
                };
                (i * phase_increment).sin() * envelope
            })
            .collect()
    }

    pub fn get_click(&self, click_type: ClickType) -> &[f32] {
        match click_type {
            ClickType::Accent => &self.accent_samples,
            ClickType::Regular => &self.regular_samples,
        }
    }

    /// Get duration of click in samples
    pub fn click_duration(&self) -> usize {
        self.accent_samples.len()
    }
}

/// A click placed on the audio timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledClick {
    /// Audio-clock seconds
    pub time: f64,
    pub click_type: ClickType,
    /// Cancellation epoch the click was scheduled in
    pub generation: u64,
}

/// Where the scheduler sends clicks
pub trait ClickSink: Send + Sync {
    /// Queue a click at audio-clock `time`; false if it had to be dropped
    fn schedule(&self, time: f64, click_type: ClickType) -> bool;

    /// Silence everything already queued or sounding
    fn cancel_all(&self);
}

/// Producer side of the click ring, shared by every scheduler
#[derive(Clone)]
pub struct ClickQueue {
    producer: Arc<Mutex<HeapProd<ScheduledClick>>>,
    generation: Arc<AtomicU64>,
}

/// Queue/renderer pair sharing one ring and one cancellation counter
pub fn create_click_channel(
    capacity: usize,
    sample_rate: f32,
    volume: AtomicF32,
) -> (ClickQueue, ClickRenderer) {
    let (producer, consumer) = HeapRb::<ScheduledClick>::new(capacity).split();
    let generation = Arc::new(AtomicU64::new(0));
    (
        ClickQueue {
            producer: Arc::new(Mutex::new(producer)),
            generation: Arc::clone(&generation),
        },
        ClickRenderer::new(consumer, generation, sample_rate, volume),
    )
}

impl ClickQueue {
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl ClickSink for ClickQueue {
    fn schedule(&self, time: f64, click_type: ClickType) -> bool {
        let click = ScheduledClick {
            time,
            click_type,
            generation: self.generation(),
        };
        match self.producer.lock() {
            Ok(mut producer) => producer.try_push(click).is_ok(),
            Err(_) => false,
        }
    }

    fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveClick {
    click_type: ClickType,
    start_sample: u64,
    generation: u64,
}

/// Mixes queued clicks into the output buffer; lives in the output callback
pub struct ClickRenderer {
    sound: ClickSound,
    sample_rate: f64,
    consumer: HeapCons<ScheduledClick>,
    generation: Arc<AtomicU64>,
    // Fixed capacity so the callback never reallocates
    active: Vec<ActiveClick>,
    volume: AtomicF32,
}

impl ClickRenderer {
    const MAX_ACTIVE: usize = 16;

    fn new(
        consumer: HeapCons<ScheduledClick>,
        generation: Arc<AtomicU64>,
        sample_rate: f32,
        volume: AtomicF32,
    ) -> Self {
        Self {
            sound: ClickSound::new(sample_rate),
            sample_rate: sample_rate as f64,
            consumer,
            generation,
            active: Vec::with_capacity(Self::MAX_ACTIVE),
            volume,
        }
    }

    /// Fill `output` (mono) with clicks; `first_sample` is the timeline index of `output[0]`
    pub fn render(&mut self, output: &mut [f32], first_sample: u64) {
        output.fill(0.0);

        let current = self.generation.load(Ordering::Acquire);
        self.active.retain(|click| click.generation == current);

        while let Some(click) = self.consumer.try_pop() {
            if click.generation != current || self.active.len() == Self::MAX_ACTIVE {
                continue;
            }
            let start = (click.time.max(0.0) * self.sample_rate).round() as u64;
            self.active.push(ActiveClick {
                click_type: click.click_type,
                // Late clicks sound immediately
                start_sample: start.max(first_sample),
                generation: click.generation,
            });
        }

        let volume = self.volume.get();
        let end_sample = first_sample + output.len() as u64;
        for click in &self.active {
            if click.start_sample >= end_sample {
                continue;
            }
            let samples = self.sound.get_click(click.click_type);
            let offset = click.start_sample.saturating_sub(first_sample) as usize;
            let played = first_sample.saturating_sub(click.start_sample) as usize;
            if played >= samples.len() {
                continue;
            }
            for (out, &sample) in output[offset..].iter_mut().zip(&samples[played..]) {
                *out += sample * volume;
            }
        }

        let click_len = self.sound.click_duration() as u64;
        self.active
            .retain(|click| click.start_sample + click_len > end_sample);
    }

    /// Number of clicks queued or sounding
    pub fn active_clicks(&self) -> usize {
        self.active.len()
    }
}
