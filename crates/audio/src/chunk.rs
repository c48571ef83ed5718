/// Opaque PCM audio at a known sample rate, bit depth 16, mono (spec §3).
///
/// Samples are stored as `f32` in `[-1.0, 1.0]` internally (the format every
/// other component in this workspace already speaks) and converted to/from
/// 16-bit PCM only at the device and wire boundaries.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_ms(&self) -> f64 {
        1000.0 * self.samples.len() as f64 / self.sample_rate as f64
    }

    /// RMS energy over the normalized samples, per spec §4.1.
    pub fn rms_energy(&self) -> f32 {
        rms_energy(&self.samples)
    }

    pub fn to_pcm16(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for &s in &self.samples {
            let clamped = s.clamp(-1.0, 1.0);
            let v = (clamped * i16::MAX as f32) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn from_pcm16(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
            .collect();
        Self { samples, sample_rate }
    }
}

/// RMS over normalized float samples, shared by VAD, barge-in, and C2.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_zero_rms() {
        let chunk = AudioChunk::new(vec![0.0; 160], 16000);
        assert_eq!(chunk.rms_energy(), 0.0);
    }

    #[test]
    fn full_scale_square_wave_has_unit_rms() {
        let chunk = AudioChunk::new(vec![1.0, -1.0, 1.0, -1.0], 16000);
        assert!((chunk.rms_energy() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pcm16_round_trip_preserves_amplitude_within_quantization() {
        let chunk = AudioChunk::new(vec![0.5, -0.25, 0.0, 0.75], 16000);
        let bytes = chunk.to_pcm16();
        let back = AudioChunk::from_pcm16(&bytes, 16000);
        for (a, b) in chunk.samples.iter().zip(back.samples.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn duration_ms_matches_sample_count_and_rate() {
        let chunk = AudioChunk::new(vec![0.0; 1600], 16000);
        assert!((chunk.duration_ms() - 100.0).abs() < 1e-6);
    }
}
