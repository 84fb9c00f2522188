use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use bass_trainer::pitch::median::MedianFilter;
use bass_trainer::pitch::spectrum::SpectrumAnalyzer;
use bass_trainer::pitch::yin::{Yin, lag_range};
use bass_trainer::pitch::{DetectionParameters, FftSize, PitchEngine, SpectrumBand};
use std::f32::consts::TAU;

const SAMPLE_RATE: f32 = 48000.0;

fn low_e(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.5 * (TAU * 41.2 * n as f32 / SAMPLE_RATE).sin())
        .collect()
}

/// Full tick: spectrum, RMS gate, YIN and median (must fit well inside the 20 ms interval)
fn bench_engine_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_tick");

    for size in [FftSize::S2048, FftSize::S4096, FftSize::S8192] {
        let params = DetectionParameters {
            fft_size: size,
            attack_skip_frames: 0,
            ..DetectionParameters::default()
        };
        let mut engine = PitchEngine::new(params, SAMPLE_RATE, SpectrumBand::default());
        let signal = low_e(size.len());

        group.bench_with_input(BenchmarkId::from_parameter(size.len()), &signal, |b, signal| {
            b.iter(|| black_box(engine.analyze(black_box(signal))));
        });
    }
    group.finish();
}

/// YIN alone over the bass lag range
fn bench_yin(c: &mut Criterion) {
    let mut group = c.benchmark_group("yin");

    for len in [2048, 4096, 8192] {
        let signal = low_e(len);
        let Some((tau_min, tau_max)) = lag_range(SAMPLE_RATE, 38.0, 400.0, len) else {
            continue;
        };
        let mut yin = Yin::new();

        group.bench_with_input(BenchmarkId::from_parameter(len), &signal, |b, signal| {
            b.iter(|| black_box(yin.detect(black_box(signal), tau_min, tau_max, 0.15)));
        });
    }
    group.finish();
}

fn bench_spectrum(c: &mut Criterion) {
    let signal = low_e(8192);
    let mut analyzer = SpectrumAnalyzer::new(8192, SpectrumBand::default());

    c.bench_function("spectrum_8192", |b| {
        b.iter(|| black_box(analyzer.bars(black_box(&signal), SAMPLE_RATE)));
    });
}

fn bench_median(c: &mut Criterion) {
    let mut filter = MedianFilter::new(5);
    let mut value = 41.0f32;

    c.bench_function("median_push_5", |b| {
        b.iter(|| {
            value = if value > 42.0 { 41.0 } else { value + 0.1 };
            black_box(filter.push(black_box(value)))
        });
    });
}

criterion_group!(benches, bench_engine_tick, bench_yin, bench_spectrum, bench_median);
criterion_main!(benches);
