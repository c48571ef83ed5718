//! C2, the Echo Canceller (spec §4.2): decides whether a mic frame is
//! predominantly reproduction of what the speaker is currently playing.

mod ring;

use ring::ReferenceRing;
use voicecore_audio::{AudioChunk, EchoDecision, EchoGate};

#[derive(Debug, thiserror::Error)]
pub enum EchoError {
    #[error("reference buffer misconfigured: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, EchoError>;

#[derive(Debug, Clone, Copy)]
pub struct EchoCancellerConfig {
    pub sample_rate: u32,
    pub reference_buffer_ms: u32,
    /// Approximate speaker-to-mic acoustic loop delay.
    pub latency_compensation_ms: u32,
    pub corr_threshold: f32,
    pub strict_corr_threshold: f32,
    pub strict_confidence_threshold: f32,
}

impl Default for EchoCancellerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            reference_buffer_ms: 800,
            latency_compensation_ms: 80,
            corr_threshold: 0.35,
            strict_corr_threshold: 0.5,
            strict_confidence_threshold: 0.7,
        }
    }
}

/// Compares mic frames against recently played reference audio via sliding
/// correlation, grounded in the cursor-based ring buffer idiom of
/// `voicecore-turn`'s `AudioBuffer`.
pub struct EchoCanceller {
    config: EchoCancellerConfig,
    reference: ReferenceRing,
}

impl EchoCanceller {
    pub fn new(config: EchoCancellerConfig) -> Self {
        let reference = ReferenceRing::new(config.sample_rate, config.reference_buffer_ms);
        Self { config, reference }
    }

    /// `(is_echo, correlation, confidence)`, per spec §4.2.
    pub fn analyze(&self, mic: &[f32], strict: bool) -> EchoAnalysis {
        if self.reference.is_empty() {
            return EchoAnalysis::default();
        }

        let offset_samples =
            (self.config.latency_compensation_ms as u64 * self.config.sample_rate as u64 / 1000) as usize;
        let correlation = self.reference.correlate(mic, offset_samples);
        let fill_ratio = self.reference.fill_ratio();
        let confidence = (correlation.abs() * fill_ratio).clamp(0.0, 1.0);

        let (corr_threshold, confidence_threshold) = if strict {
            (self.config.strict_corr_threshold, self.config.strict_confidence_threshold)
        } else {
            (self.config.corr_threshold, 0.0)
        };

        let is_echo = correlation >= corr_threshold && confidence >= confidence_threshold;

        EchoAnalysis { is_echo, correlation, confidence }
    }

    pub fn feed_reference(&mut self, bytes: &[f32]) {
        self.reference.push(bytes);
    }

    pub fn process(&mut self, mic_bytes: &[f32], strict: bool) -> EchoAnalysis {
        self.analyze(mic_bytes, strict)
    }

    pub fn end_playback(&mut self) {
        // Reference stays in the ring so any late echo tail is still caught
        // during the playback cooldown window; nothing to tear down here.
    }

    pub fn clear_reference(&mut self) {
        self.reference.clear();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EchoAnalysis {
    pub is_echo: bool,
    pub correlation: f32,
    pub confidence: f32,
}

impl EchoGate for EchoCanceller {
    fn feed_reference(&mut self, chunk: &AudioChunk) {
        EchoCanceller::feed_reference(self, &chunk.samples);
    }

    fn process(&mut self, mic: &AudioChunk, strict: bool) -> EchoDecision {
        let analysis = EchoCanceller::process(self, &mic.samples, strict);
        EchoDecision {
            is_echo: analysis.is_echo,
            correlation: analysis.correlation,
            confidence: analysis.confidence,
        }
    }

    fn end_playback(&mut self) {
        EchoCanceller::end_playback(self);
    }

    fn clear_reference(&mut self) {
        EchoCanceller::clear_reference(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_reference_never_reports_echo() {
        let canceller = EchoCanceller::new(EchoCancellerConfig::default());
        let mic = vec![0.5; 320];
        let analysis = canceller.analyze(&mic, false);
        assert!(!analysis.is_echo);
        assert_eq!(analysis.correlation, 0.0);
    }

    #[test]
    fn identical_signal_is_classified_as_echo_under_relaxed_threshold() {
        let mut canceller = EchoCanceller::new(EchoCancellerConfig {
            latency_compensation_ms: 0,
            ..EchoCancellerConfig::default()
        });
        let tone: Vec<f32> = (0..3200).map(|i| (i as f32 * 0.1).sin()).collect();
        canceller.feed_reference(&tone);
        let analysis = canceller.analyze(&tone[..320], false);
        assert!(analysis.is_echo);
        assert!(analysis.correlation > 0.9);
    }

    #[test]
    fn strict_mode_rejects_weak_correlation_that_relaxed_mode_would_accept() {
        let mut canceller = EchoCanceller::new(EchoCancellerConfig {
            latency_compensation_ms: 0,
            corr_threshold: 0.3,
            ..EchoCancellerConfig::default()
        });
        let reference: Vec<f32> = (0..3200).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        canceller.feed_reference(&reference);
        let mic: Vec<f32> = (0..320).map(|i| (i as f32 * 0.37).sin()).collect();
        let relaxed = canceller.analyze(&mic, false);
        let strict = canceller.analyze(&mic, true);
        assert!(!strict.is_echo || relaxed.confidence >= strict.confidence);
    }

    #[test]
    fn clear_reference_empties_the_ring() {
        let mut canceller = EchoCanceller::new(EchoCancellerConfig::default());
        canceller.feed_reference(&[0.1; 100]);
        canceller.clear_reference();
        let analysis = canceller.analyze(&[0.1; 100], false);
        assert!(!analysis.is_echo);
    }
}
