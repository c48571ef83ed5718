//! `SessionConfig` (spec §6): every recognized tuning option collapsed into
//! one typed, validated record instead of loose dynamically-typed settings.
//! Loading it from a file/env/CLI is an external collaborator's job.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tts_min_chars ({min}) must be less than tts_max_chars ({max})")]
    TtsChunkBounds { min: usize, max: usize },
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,

    pub energy_threshold: f32,
    pub barge_in_multiplier: f32,
    pub barge_in_confirm_frames: u32,
    pub silence_duration_ms: u32,
    pub min_speech_duration_ms: u32,

    pub pre_buffer_ms: u32,
    pub drain_interval_ms: u32,
    pub fade_in_ms: u32,
    pub playback_cooldown_ms: u32,

    pub echo_correlation_threshold: f32,
    pub reference_buffer_ms: u32,
    pub latency_compensation_ms: u32,

    pub tts_min_chars: usize,
    pub tts_max_chars: usize,

    pub barge_in_grace_period_ms: u32,
    pub cancel_log_debounce_ms: u32,

    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 16_000,
            energy_threshold: 0.02,
            barge_in_multiplier: 1.5,
            barge_in_confirm_frames: 4,
            silence_duration_ms: 500,
            min_speech_duration_ms: 200,
            pre_buffer_ms: 300,
            drain_interval_ms: 20,
            fade_in_ms: 15,
            playback_cooldown_ms: 150,
            echo_correlation_threshold: 0.35,
            reference_buffer_ms: 800,
            latency_compensation_ms: 80,
            tts_min_chars: 80,
            tts_max_chars: 250,
            barge_in_grace_period_ms: 800,
            cancel_log_debounce_ms: 500,
            history_limit: 20,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tts_min_chars >= self.tts_max_chars {
            return Err(ConfigError::TtsChunkBounds { min: self.tts_min_chars, max: self.tts_max_chars });
        }
        for (value, field) in [
            (self.input_sample_rate as i64, "input_sample_rate"),
            (self.output_sample_rate as i64, "output_sample_rate"),
            (self.history_limit as i64, "history_limit"),
        ] {
            if value <= 0 {
                return Err(ConfigError::NotPositive { field });
            }
        }
        Ok(())
    }

    pub fn to_gateway_config(&self) -> voicecore_audio::AudioGatewayConfig {
        voicecore_audio::AudioGatewayConfig {
            input_sample_rate: self.input_sample_rate,
            output_sample_rate: self.output_sample_rate,
            frame_ms: 20,
            vad_mode: voicecore_audio::VadMode::External,
            energy_threshold: self.energy_threshold,
            min_speech_duration_ms: self.min_speech_duration_ms,
            silence_duration_ms: self.silence_duration_ms,
            barge_in_multiplier: self.barge_in_multiplier,
            barge_in_bypass_multiplier: self.barge_in_multiplier * 2.5,
            barge_in_confirm_frames: self.barge_in_confirm_frames,
            playback_ring_ms: self.reference_buffer_ms,
            pre_buffer_ms: self.pre_buffer_ms,
            drain_interval_ms: self.drain_interval_ms,
            playback_cooldown_ms: self.playback_cooldown_ms,
        }
    }

    pub fn to_echo_config(&self) -> voicecore_echo::EchoCancellerConfig {
        voicecore_echo::EchoCancellerConfig {
            sample_rate: self.input_sample_rate,
            reference_buffer_ms: self.reference_buffer_ms,
            latency_compensation_ms: self.latency_compensation_ms,
            corr_threshold: self.echo_correlation_threshold,
            strict_corr_threshold: (self.echo_correlation_threshold + 0.15).min(0.95),
            strict_confidence_threshold: 0.7,
        }
    }

    pub fn to_chunker_config(&self) -> voicecore_turn::ChunkerConfig {
        voicecore_turn::ChunkerConfig { min_chars: self.tts_min_chars, max_chars: self.tts_max_chars }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_chunk_bounds_are_rejected() {
        let mut config = SessionConfig::default();
        config.tts_min_chars = 300;
        config.tts_max_chars = 250;
        assert!(matches!(config.validate(), Err(ConfigError::TtsChunkBounds { .. })));
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let mut config = SessionConfig::default();
        config.input_sample_rate = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NotPositive { field: "input_sample_rate" })));
    }
}
