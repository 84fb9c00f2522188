// Format conversion for CPAL audio streams
//
// Capture: interleaved device frames (f32/i16/u16) are mixed down to mono f32.
// Playback: the mono f32 click track is written to every channel of a frame.
//
// All conversions are allocation-free and suitable for real-time audio callbacks.

use cpal::{FromSample, Sample};

/// Mix one interleaved input frame down to a mono f32 sample
///
/// Channels are averaged; an empty frame is silence.
#[inline]
pub fn mix_frame_to_mono<T>(frame: &[T]) -> f32
where
    T: Sample,
    f32: FromSample<T>,
{
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame
        .iter()
        .map(|&sample| f32::from_sample(sample))
        .sum();
    sum / frame.len() as f32
}

/// Write a mono f32 sample to all channels of an interleaved output frame
///
/// # Arguments
/// * `internal_sample` - The mono f32 sample to write
/// * `output_frame` - A slice representing one audio frame (e.g., [L, R] for stereo)
#[inline]
pub fn write_mono_to_interleaved_frame<T>(internal_sample: f32, output_frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    for channel_sample in output_frame.iter_mut() {
        *channel_sample = Sample::from_sample::<f32>(internal_sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_stereo_f32_to_mono() {
        let frame = [0.5f32, -0.1];
        assert!((mix_frame_to_mono(&frame) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_mix_i16_to_mono() {
        let frame = [i16::MAX, i16::MAX];
        assert!((mix_frame_to_mono(&frame) - 1.0).abs() < 0.001);

        let silent = [0i16, 0];
        assert_eq!(mix_frame_to_mono(&silent), 0.0);
    }

    #[test]
    fn test_mix_u16_midpoint_is_silence() {
        // u16 uses offset binary encoding where 32768 is zero
        let frame = [32768u16];
        assert!(mix_frame_to_mono(&frame).abs() < 0.001);
    }

    #[test]
    fn test_mix_empty_frame() {
        let frame: [f32; 0] = [];
        assert_eq!(mix_frame_to_mono(&frame), 0.0);
    }

    #[test]
    fn test_write_mono_to_interleaved() {
        let mut output: [f32; 2] = [0.0; 2];
        write_mono_to_interleaved_frame(0.5, &mut output);
        assert_eq!(output, [0.5, 0.5]);

        let mut output_i16: [i16; 2] = [0; 2];
        write_mono_to_interleaved_frame(0.5, &mut output_i16);
        assert!(output_i16[0] > 0);
        assert_eq!(output_i16[0], output_i16[1]);
    }
}
