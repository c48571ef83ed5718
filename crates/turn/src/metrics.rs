//! Per-turn latency tracking and aggregation (spec §4.4g).

use std::time::Instant;

use voicecore_events::LatencyBreakdown;

const BOTTLENECK_THRESHOLD_MS: u64 = 2000;

/// Timestamps collected across a single turn's lifecycle. `stt_end` is the
/// turn's start reference; every other field is optional until its stage
/// actually runs.
#[derive(Debug, Clone)]
pub struct TurnTimer {
    pub stt_start: Instant,
    pub stt_first_partial: Option<Instant>,
    pub stt_end: Option<Instant>,
    pub llm_start: Option<Instant>,
    pub llm_first_token: Option<Instant>,
    pub tts_start: Option<Instant>,
    pub tts_first_chunk: Option<Instant>,
    pub playback_start: Option<Instant>,
}

impl TurnTimer {
    /// Fallback used when no real STT timing is available (test doubles,
    /// greeting playback): `stt_start`/`stt_end` both stamp "now", so
    /// `stt_latency_ms` reads 0 instead of drifting as the turn runs.
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            stt_start: now,
            stt_first_partial: None,
            stt_end: Some(now),
            llm_start: None,
            llm_first_token: None,
            tts_start: None,
            tts_first_chunk: None,
            playback_start: None,
        }
    }

    /// Seeds the STT leg from C3's own timing (spec §4.3), so `stt_ms`
    /// reflects the transcript's actual recognition latency instead of the
    /// time between commit and the orchestrator picking it up.
    pub fn from_stt_timing(timing: &voicecore_stt::TimingMetrics) -> Self {
        Self {
            stt_start: timing.start_time,
            stt_first_partial: timing.first_partial_time,
            stt_end: Some(timing.commit_time),
            llm_start: None,
            llm_first_token: None,
            tts_start: None,
            tts_first_chunk: None,
            playback_start: None,
        }
    }

    /// `real_latency = first-partial time - first-audio-since-speech-start`
    /// (spec §4.3); falls back to 0 when no partial ever arrived.
    pub fn stt_latency_ms(&self) -> u64 {
        self.stt_first_partial
            .map(|t| t.saturating_duration_since(self.stt_start).as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn llm_latency_ms(&self) -> u64 {
        match (self.llm_start, self.llm_first_token) {
            (Some(start), Some(first)) => first.saturating_duration_since(start).as_millis() as u64,
            _ => 0,
        }
    }

    pub fn tts_latency_ms(&self) -> u64 {
        match (self.tts_start, self.tts_first_chunk) {
            (Some(start), Some(first)) => first.saturating_duration_since(start).as_millis() as u64,
            _ => 0,
        }
    }

    pub fn time_to_first_audio_ms(&self) -> u64 {
        match (self.stt_end, self.playback_start) {
            (Some(stt_end), Some(playback)) => playback.saturating_duration_since(stt_end).as_millis() as u64,
            _ => 0,
        }
    }

    /// `total = stt + llm + tts` (spec §4.4g; `time_to_first_audio` is
    /// reported alongside but not summed in).
    pub fn breakdown(&self) -> LatencyBreakdown {
        let stt_ms = self.stt_latency_ms();
        let llm_ms = self.llm_latency_ms();
        let tts_ms = self.tts_latency_ms();
        LatencyBreakdown {
            stt_ms,
            llm_ms,
            tts_ms,
            time_to_first_audio_ms: self.time_to_first_audio_ms(),
            total_ms: stt_ms + llm_ms + tts_ms,
        }
    }

    pub fn is_bottleneck(breakdown: &LatencyBreakdown) -> bool {
        breakdown.total_ms > BOTTLENECK_THRESHOLD_MS || breakdown.time_to_first_audio_ms > BOTTLENECK_THRESHOLD_MS
    }
}

/// Running average over a session's turns, updated incrementally so the
/// whole history doesn't need to be re-scanned per turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatencyAggregate {
    count: usize,
    total_ms_sum: f64,
    time_to_first_audio_ms_sum: f64,
}

impl LatencyAggregate {
    pub fn record(&mut self, breakdown: &LatencyBreakdown) {
        self.count += 1;
        self.total_ms_sum += breakdown.total_ms as f64;
        self.time_to_first_audio_ms_sum += breakdown.time_to_first_audio_ms as f64;
    }

    pub fn average_total_ms(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.total_ms_sum / self.count as f64 }
    }

    pub fn average_time_to_first_audio_ms(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.time_to_first_audio_ms_sum / self.count as f64 }
    }

    pub fn turn_count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn breakdown_sums_stt_llm_tts_but_not_time_to_first_audio() {
        let mut timer = TurnTimer::start();
        timer.stt_first_partial = Some(timer.stt_start + Duration::from_millis(100));
        timer.stt_end = Some(timer.stt_start + Duration::from_millis(150));
        timer.llm_start = Some(timer.stt_start + Duration::from_millis(150));
        timer.llm_first_token = Some(timer.stt_start + Duration::from_millis(350));
        timer.tts_start = Some(timer.stt_start + Duration::from_millis(350));
        timer.tts_first_chunk = Some(timer.stt_start + Duration::from_millis(500));
        timer.playback_start = Some(timer.stt_start + Duration::from_millis(550));

        let breakdown = timer.breakdown();
        assert_eq!(breakdown.stt_ms, 100);
        assert_eq!(breakdown.llm_ms, 200);
        assert_eq!(breakdown.tts_ms, 150);
        assert_eq!(breakdown.total_ms, 450);
        assert_eq!(breakdown.time_to_first_audio_ms, 400);
    }

    #[test]
    fn bottleneck_flags_when_total_exceeds_threshold() {
        let breakdown = LatencyBreakdown { stt_ms: 1000, llm_ms: 1000, tts_ms: 500, time_to_first_audio_ms: 100, total_ms: 2500 };
        assert!(TurnTimer::is_bottleneck(&breakdown));
    }

    #[test]
    fn aggregate_computes_running_average() {
        let mut aggregate = LatencyAggregate::default();
        aggregate.record(&LatencyBreakdown { stt_ms: 0, llm_ms: 0, tts_ms: 0, time_to_first_audio_ms: 0, total_ms: 100 });
        aggregate.record(&LatencyBreakdown { stt_ms: 0, llm_ms: 0, tts_ms: 0, time_to_first_audio_ms: 0, total_ms: 300 });
        assert_eq!(aggregate.average_total_ms(), 200.0);
        assert_eq!(aggregate.turn_count(), 2);
    }
}
