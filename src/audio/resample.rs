//! Sample-format and sample-rate conversions.
//!
//! Resampling is nearest-neighbour on purpose: it is allocation-light and
//! runs on every capture frame, the VAD is insensitive to the phase error,
//! and uplink frames are short enough that the distortion is inaudible.

/// Convert little-endian PCM16 bytes to samples. A trailing odd byte is
/// ignored.
pub fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Convert samples to little-endian PCM16 bytes.
pub fn samples_to_pcm(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Normalize a PCM16 sample into [-1.0, 1.0].
pub fn sample_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Clamp and quantize a float sample back to PCM16.
pub fn f32_to_sample(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Normalize a whole frame into [-1.0, 1.0] floats.
pub fn frame_to_f32(frame: &[i16]) -> Vec<f32> {
    frame.iter().copied().map(sample_to_f32).collect()
}

/// Nearest-neighbour resample between arbitrary rates. Passes the input
/// through untouched when the rates match.
pub fn resample_nearest(samples: &[i16], from_hz: u32, to_hz: u32) -> Vec<i16> {
    if from_hz == to_hz || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_hz as u64 / from_hz as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = (i as u64 * from_hz as u64 + to_hz as u64 / 2) / to_hz as u64;
        let src = (src as usize).min(samples.len() - 1);
        out.push(samples[src]);
    }
    out
}

/// Peak amplitude of a frame (max absolute sample value).
pub fn peak_amplitude(frame: &[i16]) -> i32 {
    frame
        .iter()
        .map(|&s| (s as i32).abs())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_round_trip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 1234, -4321];
        let pcm = samples_to_pcm(&samples);
        assert_eq!(pcm.len(), samples.len() * 2);
        assert_eq!(pcm_to_samples(&pcm), samples);
    }

    #[test]
    fn test_pcm_to_samples_ignores_trailing_byte() {
        assert_eq!(pcm_to_samples(&[0x34, 0x12, 0xff]), vec![0x1234]);
    }

    #[test]
    fn test_float_normalization_range() {
        assert!((sample_to_f32(i16::MAX) - 1.0).abs() < 0.001);
        assert!((sample_to_f32(i16::MIN) + 1.0).abs() < 0.001);
        assert_eq!(sample_to_f32(0), 0.0);
        assert_eq!(f32_to_sample(2.0), i16::MAX - 0); // clamped
        assert_eq!(f32_to_sample(-2.0), -i16::MAX);
    }

    #[test]
    fn test_resample_passthrough_at_equal_rates() {
        let samples = vec![1i16, 2, 3, 4];
        assert_eq!(resample_nearest(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn test_upsample_16k_to_24k_length() {
        let frame = vec![7i16; 512];
        let up = resample_nearest(&frame, 16_000, 24_000);
        assert_eq!(up.len(), 768);
        assert!(up.iter().all(|&s| s == 7));
    }

    #[test]
    fn test_downsample_48k_to_16k_length() {
        let frame: Vec<i16> = (0..512).map(|i| i as i16).collect();
        let down = resample_nearest(&frame, 48_000, 16_000);
        assert_eq!(down.len(), 170);
        // Monotone input stays monotone under nearest-neighbour decimation.
        assert!(down.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_peak_amplitude() {
        assert_eq!(peak_amplitude(&[]), 0);
        assert_eq!(peak_amplitude(&[0, 5, -9, 3]), 9);
        assert_eq!(peak_amplitude(&[i16::MIN]), 32768);
    }
}
