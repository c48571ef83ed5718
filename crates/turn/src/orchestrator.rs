//! C4, the Turn Orchestrator (spec §4.4): the single-logical-thread reducer
//! that owns [`SessionState`]/[`Session`] and drives C5/C6 through one
//! user turn, honoring barge-in and cancellation at every await point.

use std::sync::Arc;
use std::sync::Mutex;

use uuid::Uuid;

use voicecore_bus::SessionFlags;
use voicecore_events::{
    event_names, AgentSpokeEvent, BottleneckEvent, EventBusRef, MetricsEvent, SessionSummary, UserSpokeEvent,
};
use voicecore_llm::{BatchOptions, ConversationMessage, LlmClient, Role};
use voicecore_tts::TtsClient;

use crate::chunker::{ChunkerConfig, TextChunker};
use crate::data::Session;
use crate::filters::{is_noise, looks_corrupted};
use crate::metrics::TurnTimer;
use crate::playback_sink::PlaybackSink;
use crate::session_state::SessionState;
use crate::stt_reset::SttTimingReset;

const FALLBACK_MAX_TOKENS: u32 = 80;
const ACK_TEXT: &str = "uhum";

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("llm error: {0}")]
    Llm(#[from] voicecore_llm::LlmError),
    #[error("tts error: {0}")]
    Tts(#[from] voicecore_tts::TtsError),
}

pub type Result<T> = std::result::Result<T, TurnError>;

/// Outcome of processing one final transcript, mainly useful to tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Interrupted,
    CancelledBeforeAudio,
    Discarded,
    /// The transcript arrived during the greeting and was buffered rather
    /// than turned into a reply (spec §4.4, Greeting state).
    GreetingBuffered,
}

pub struct TurnOrchestrator<L, T, P, R> {
    llm: L,
    tts: T,
    playback: P,
    stt_reset: R,
    events: EventBusRef,
    system_prompt: String,
    chunker_config: ChunkerConfig,
    history_limit: usize,
    flags: Arc<SessionFlags>,
    session: Mutex<Session>,
    state: Mutex<SessionState>,
}

impl<L, T, P, R> TurnOrchestrator<L, T, P, R>
where
    L: LlmClient,
    T: TtsClient,
    P: PlaybackSink,
    R: SttTimingReset,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        llm: L,
        tts: T,
        playback: P,
        stt_reset: R,
        events: EventBusRef,
        system_prompt: impl Into<String>,
        flags: Arc<SessionFlags>,
        chunker_config: ChunkerConfig,
        history_limit: usize,
    ) -> Self {
        Self {
            llm,
            tts,
            playback,
            stt_reset,
            events,
            system_prompt: system_prompt.into(),
            chunker_config,
            history_limit,
            flags,
            session: Mutex::new(Session::new(session_id)),
            state: Mutex::new(SessionState::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.lock().unwrap().id
    }

    fn interrupted_or_cancelled(&self) -> bool {
        self.flags.interrupted() || self.flags.cancel_requested()
    }

    fn recent_agent_replies(&self) -> Vec<String> {
        let session = self.session.lock().unwrap();
        session.recent_agent_replies(3).map(String::from).collect()
    }

    /// Puts the session into the Greeting phase and suppresses barge-in
    /// (spec §4.4, S4) until [`Self::play_greeting`]'s stream ends. Called
    /// synchronously by the caller before the STT event drain starts, so
    /// there is no window where an early final could race past the check.
    pub fn begin_greeting(&self) {
        self.state.lock().unwrap().enter_greeting();
        self.flags.set_barge_in_enabled(false);
    }

    /// Streams the initial agent utterance to C1, then flushes whatever the
    /// caller said during playback as the first turn (S4's "Alô? Oi, sou
    /// João" concatenation runs through the exact path a mid-turn
    /// continuation does).
    pub async fn play_greeting(&self, text: &str) -> Result<Option<TurnOutcome>> {
        let mut chunker = TextChunker::new(self.chunker_config);
        let mut chunks = Vec::new();
        if let Some(chunk) = chunker.push(text) {
            chunks.push(chunk);
        }
        if let Some(tail) = chunker.flush() {
            chunks.push(tail);
        }

        for chunk_text in chunks {
            let playback = &self.playback;
            let mut on_pcm_chunk = |pcm: Vec<u8>| playback.push_stream_chunk(pcm);
            self.tts.synthesize_stream(&chunk_text, &mut on_pcm_chunk).await?;
        }
        self.playback.end_stream();
        {
            let mut session = self.session.lock().unwrap();
            session.push_turn(Role::Agent, text.to_string());
        }

        self.end_greeting().await
    }

    async fn end_greeting(&self) -> Result<Option<TurnOutcome>> {
        let buffered = {
            let mut state = self.state.lock().unwrap();
            state.greeting_ended();
            state.take_greeting_buffer()
        };
        self.flags.set_barge_in_enabled(true);

        let joined = buffered.join(" ").trim().to_string();
        if joined.is_empty() {
            return Ok(None);
        }
        let outcome = self.process_final_text(joined, TurnTimer::start()).await?;
        Ok(Some(outcome))
    }

    /// Entry point for C3's `Partial` event (spec §4.4b). A non-noise
    /// partial arriving while a reply is still being generated (but before
    /// any audio has gone out) means the caller kept talking; the in-flight
    /// reply is abandoned and the partial is remembered so the next final is
    /// concatenated onto it.
    pub async fn handle_partial_transcript(&self, text: &str) -> Result<()> {
        let is_processing = self.state.lock().unwrap().is_processing();
        if !is_processing {
            return Ok(());
        }
        let has_started_playback = self.state.lock().unwrap().has_started_playback();
        if has_started_playback {
            return Ok(());
        }

        let recent = self.recent_agent_replies();
        if is_noise(text, recent.iter().map(String::as_str)) {
            return Ok(());
        }

        {
            let mut state = self.state.lock().unwrap();
            state.set_pending_text(text.to_string());
            state.request_cancel();
        }
        self.flags.set_cancel_requested(true);

        let should_ack = self.state.lock().unwrap().try_consume_ack_slot();
        if should_ack {
            if let Ok(pcm) = self.tts.synthesize_ack(ACK_TEXT).await {
                self.playback.play_oneshot(pcm);
            }
        }
        Ok(())
    }

    /// Entry point for C3's `Final` event (spec §4.4a-c). `partial_fallback`
    /// is the best partial captured during playback, used when the final
    /// transcript looks corrupted by echo (§4.4e). `timing` is C3's own
    /// measurement of this transcript's recognition latency (§4.3).
    pub async fn handle_final_transcript(
        &self,
        text: String,
        partial_fallback: Option<String>,
        timing: Option<voicecore_stt::TimingMetrics>,
    ) -> Result<TurnOutcome> {
        if self.state.lock().unwrap().is_greeting() {
            self.state.lock().unwrap().push_greeting_text(text);
            return Ok(TurnOutcome::GreetingBuffered);
        }
        if self.state.lock().unwrap().in_barge_in_grace() {
            return Ok(TurnOutcome::Discarded);
        }

        let recent = self.recent_agent_replies();

        let text = if looks_corrupted(&text, recent.iter().map(String::as_str)) {
            match partial_fallback {
                Some(fallback) if !fallback.trim().is_empty() => fallback,
                _ => return Ok(TurnOutcome::Discarded),
            }
        } else {
            text
        };

        if is_noise(&text, recent.iter().map(String::as_str)) {
            return Ok(TurnOutcome::Discarded);
        }

        let text = {
            let mut state = self.state.lock().unwrap();
            match state.take_pending_text() {
                Some(pending) if !pending.trim().is_empty() => format!("{} {}", pending.trim(), text.trim()),
                _ => text,
            }
        };

        let timer = timing.as_ref().map(TurnTimer::from_stt_timing).unwrap_or_else(TurnTimer::start);
        self.process_final_text(text, timer).await
    }

    async fn process_final_text(&self, text: String, timer: TurnTimer) -> Result<TurnOutcome> {
        {
            let mut state = self.state.lock().unwrap();
            state.begin_processing();
        }
        {
            let mut session = self.session.lock().unwrap();
            session.push_turn(Role::User, text.clone());
        }
        self.events.emit(
            event_names::USER_SPOKE,
            serde_json::to_value(UserSpokeEvent { session_id: self.session_id(), text }).unwrap_or_default(),
        );

        self.run_turn(timer).await
    }

    fn build_messages(&self) -> Vec<ConversationMessage> {
        let session = self.session.lock().unwrap();
        let skip = session.history.len().saturating_sub(self.history_limit);
        let mut messages = vec![ConversationMessage::system(self.system_prompt.clone())];
        messages.extend(session.history.iter().skip(skip).map(|turn| match turn.role {
            Role::User => ConversationMessage::user(turn.text.clone()),
            Role::Agent => ConversationMessage::agent(turn.text.clone()),
            Role::System => ConversationMessage::system(turn.text.clone()),
        }));
        messages
    }

    async fn run_turn(&self, mut timer: TurnTimer) -> Result<TurnOutcome> {
        let messages = self.build_messages();

        timer.llm_start = Some(std::time::Instant::now());
        let mut chunker = TextChunker::new(self.chunker_config);
        let mut reply = String::new();
        let mut pending_chunks: Vec<String> = Vec::new();
        let mut first_token = true;
        let mut llm_failed = false;

        {
            let llm_start_marker = &mut timer.llm_first_token;
            let chunker_ref = &mut chunker;
            let reply_ref = &mut reply;
            let first_token_ref = &mut first_token;
            let chunks_ref = &mut pending_chunks;
            let mut on_chunk = |token: &str| {
                if *first_token_ref {
                    *llm_start_marker = Some(std::time::Instant::now());
                    *first_token_ref = false;
                }
                reply_ref.push_str(token);
                if let Some(chunk) = chunker_ref.push(token) {
                    chunks_ref.push(chunk);
                }
            };
            if self.llm.generate_stream(&messages, &mut on_chunk).await.is_err() {
                llm_failed = true;
            }
        }

        if llm_failed {
            reply.clear();
            pending_chunks.clear();
            chunker = TextChunker::new(self.chunker_config);
            match self.llm.generate(&messages, BatchOptions { max_tokens: FALLBACK_MAX_TOKENS }).await {
                Ok(batch) => {
                    reply = batch.text;
                    if let Some(chunk) = chunker.push(&reply) {
                        pending_chunks.push(chunk);
                    }
                }
                Err(err) => {
                    self.finish_turn_without_reply();
                    return Err(TurnError::Llm(err));
                }
            }
        }

        if let Some(tail) = chunker.flush() {
            pending_chunks.push(tail);
        }

        let chunks = pending_chunks;
        let mut dispatched_any = false;

        for chunk_text in chunks {
            if self.interrupted_or_cancelled() {
                return self.finish_interrupted_or_cancelled(dispatched_any);
            }
            if timer.tts_start.is_none() {
                timer.tts_start = Some(std::time::Instant::now());
            }
            let playback = &self.playback;
            let tts_first_chunk = &mut timer.tts_first_chunk;
            let mut first_pcm = tts_first_chunk.is_none();
            let mut on_pcm_chunk = |pcm: Vec<u8>| {
                if first_pcm {
                    *tts_first_chunk = Some(std::time::Instant::now());
                    first_pcm = false;
                }
                playback.push_stream_chunk(pcm);
            };
            match self.tts.synthesize_stream(&chunk_text, &mut on_pcm_chunk).await {
                Ok(()) => {
                    dispatched_any = true;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "tts chunk failed, skipping");
                    continue;
                }
            }
            if dispatched_any {
                let mut state = self.state.lock().unwrap();
                if !state.has_started_playback() {
                    state.begin_speaking();
                    timer.playback_start = Some(std::time::Instant::now());
                }
            }
        }

        if self.interrupted_or_cancelled() {
            return self.finish_interrupted_or_cancelled(dispatched_any);
        }

        if !dispatched_any {
            self.finish_turn_without_reply();
            return Ok(TurnOutcome::CancelledBeforeAudio);
        }

        self.playback.end_stream();
        {
            let mut session = self.session.lock().unwrap();
            session.push_turn(Role::Agent, reply.clone());
        }
        {
            let mut state = self.state.lock().unwrap();
            state.record_agent_reply(reply.clone());
            state.playback_ended();
        }
        self.events.emit(
            event_names::AGENT_SPOKE,
            serde_json::to_value(AgentSpokeEvent { session_id: self.session_id(), text: reply }).unwrap_or_default(),
        );

        self.record_metrics(&timer);
        Ok(TurnOutcome::Completed)
    }

    fn finish_interrupted_or_cancelled(&self, dispatched_any: bool) -> Result<TurnOutcome> {
        self.playback.stop_playback();
        self.flags.set_cancel_requested(false);
        let mut state = self.state.lock().unwrap();
        state.take_cancel_requested();
        if dispatched_any {
            state.barge_in();
            drop(state);
            self.stt_reset.reset_timing_on_bargein();
            Ok(TurnOutcome::Interrupted)
        } else {
            let mut session = self.session.lock().unwrap();
            session.discard_last_agent_turn();
            drop(session);
            state.cancel_before_audio();
            Ok(TurnOutcome::CancelledBeforeAudio)
        }
    }

    fn finish_turn_without_reply(&self) {
        let mut state = self.state.lock().unwrap();
        state.cancel_before_audio();
    }

    fn record_metrics(&self, timer: &TurnTimer) {
        let breakdown = timer.breakdown();
        let turn_id = Uuid::new_v4();
        {
            let mut session = self.session.lock().unwrap();
            session.record_latency(breakdown);
        }
        self.events.emit(
            event_names::METRICS,
            serde_json::to_value(MetricsEvent { turn_id, latency: breakdown }).unwrap_or_default(),
        );
        if TurnTimer::is_bottleneck(&breakdown) {
            self.events.emit(
                event_names::BOTTLENECK,
                serde_json::to_value(BottleneckEvent { turn_id, latency: breakdown }).unwrap_or_default(),
            );
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let session = self.session.lock().unwrap();
        SessionSummary {
            turn_count: session.turn_count(),
            average_total_ms: session.average_total_latency_ms(),
            average_time_to_first_audio_ms: session.average_time_to_first_audio_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback_sink::test_support::RecordingPlaybackSink;
    use crate::stt_reset::test_support::NullSttTimingReset;
    use voicecore_events::InMemoryEventBus;
    use voicecore_llm::ScriptedLlmClient;
    use voicecore_tts::ScriptedTtsClient;

    fn orchestrator(
        tokens: Vec<&str>,
        tts_chunks: Vec<Vec<u8>>,
    ) -> TurnOrchestrator<ScriptedLlmClient, ScriptedTtsClient, RecordingPlaybackSink, NullSttTimingReset> {
        let llm = ScriptedLlmClient::new(tokens.into_iter().map(String::from).collect());
        let tts = ScriptedTtsClient::new(tts_chunks);
        let playback = RecordingPlaybackSink::new();
        let events: EventBusRef = Arc::new(InMemoryEventBus::new());
        TurnOrchestrator::new(
            Uuid::nil(),
            llm,
            tts,
            playback,
            NullSttTimingReset::new(),
            events,
            "system prompt",
            Arc::new(SessionFlags::new()),
            ChunkerConfig::default(),
            20,
        )
    }

    #[tokio::test]
    async fn completes_a_turn_and_dispatches_audio() {
        let orch = orchestrator(vec!["Ótimo, "], vec![vec![1, 2, 3]]);
        let outcome = orch
            .handle_final_transcript("Tenho uma loja de cosméticos.".to_string(), None, None)
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
        assert!(!orch.playback.pushed_chunks().is_empty());
        assert!(orch.playback.was_ended());
    }

    #[tokio::test]
    async fn noisy_transcript_is_discarded_without_calling_llm() {
        let orch = orchestrator(vec!["nunca deveria rodar"], vec![vec![9]]);
        let outcome = orch.handle_final_transcript("hmm".to_string(), None, None).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Discarded);
        assert!(orch.playback.pushed_chunks().is_empty());
    }

    #[tokio::test]
    async fn corrupted_final_falls_back_to_partial() {
        let orch = orchestrator(vec!["ok"], vec![vec![1]]);
        let replies = vec!["Legal, muito potencial nesse mercado.".to_string()];
        {
            let mut session = orch.session.lock().unwrap();
            session.push_turn(Role::Agent, replies[0].clone());
        }
        let outcome = orch
            .handle_final_transcript(
                "muito potencial nesse mercado".to_string(),
                Some("quero saber mais sobre o produto".to_string()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_batch_generation() {
        let llm = ScriptedLlmClient::failing_after(vec!["a".into(), "b".into()], 0);
        let tts = ScriptedTtsClient::new(vec![vec![1]]);
        let playback = RecordingPlaybackSink::new();
        let events: EventBusRef = Arc::new(InMemoryEventBus::new());
        let orch = TurnOrchestrator::new(
            Uuid::nil(),
            llm,
            tts,
            playback,
            NullSttTimingReset::new(),
            events,
            "system",
            Arc::new(SessionFlags::new()),
            ChunkerConfig::default(),
            20,
        );
        let outcome = orch.handle_final_transcript("me conta mais".to_string(), None, None).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
    }

    #[tokio::test]
    async fn barge_in_before_any_audio_cancels_without_agent_spoke_history() {
        let orch = orchestrator(vec!["resposta"], vec![vec![1]]);
        orch.flags.set_cancel_requested(true);
        let outcome = orch.handle_final_transcript("conte mais".to_string(), None, None).await.unwrap();
        assert_eq!(outcome, TurnOutcome::CancelledBeforeAudio);
        let session = orch.session.lock().unwrap();
        assert!(session.history.iter().all(|t| !matches!(t.role, Role::Agent)));
    }

    #[tokio::test]
    async fn barge_in_after_audio_dispatched_resets_stt_timing() {
        let orch = orchestrator(vec!["resposta"], vec![vec![1, 2]]);
        {
            let mut state = orch.state.lock().unwrap();
            state.begin_processing();
            state.begin_speaking();
        }
        let outcome = orch.finish_interrupted_or_cancelled(true).unwrap();
        assert_eq!(outcome, TurnOutcome::Interrupted);
        assert_eq!(orch.stt_reset.reset_count(), 1);
    }

    #[tokio::test]
    async fn greeting_buffers_finals_until_it_ends_then_runs_a_turn() {
        let orch = orchestrator(vec!["Prazer, "], vec![vec![9]]);
        orch.begin_greeting();
        assert!(!orch.flags.barge_in_enabled());

        let outcome = orch.handle_final_transcript("Alô? Oi, sou João".to_string(), None, None).await.unwrap();
        assert_eq!(outcome, TurnOutcome::GreetingBuffered);

        let result = orch.play_greeting("Olá, aqui é da loja.").await.unwrap();
        assert_eq!(result, Some(TurnOutcome::Completed));
        assert!(orch.flags.barge_in_enabled());

        let session = orch.session.lock().unwrap();
        assert!(session.history.iter().any(|t| matches!(t.role, Role::User) && t.text == "Alô? Oi, sou João"));
    }

    #[tokio::test]
    async fn partial_during_processing_sets_pending_text_and_plays_an_ack() {
        let orch = orchestrator(vec!["resposta parcial"], vec![vec![1]]);
        {
            let mut state = orch.state.lock().unwrap();
            state.begin_processing();
        }
        orch.handle_partial_transcript("Tenho uma loja.").await.unwrap();
        assert!(orch.flags.cancel_requested());
        assert!(!orch.playback.oneshots().is_empty());

        let outcome = orch
            .handle_final_transcript("de cosméticos".to_string(), None, None)
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::CancelledBeforeAudio);
    }

    #[tokio::test]
    async fn final_during_barge_in_grace_is_discarded() {
        let orch = orchestrator(vec!["resposta"], vec![vec![1]]);
        {
            let mut state = orch.state.lock().unwrap();
            state.begin_processing();
            state.begin_speaking();
            state.barge_in();
        }
        let outcome = orch.handle_final_transcript("continuo aqui".to_string(), None, None).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Discarded);
    }

    #[tokio::test]
    async fn history_from_prior_turns_reaches_the_llm() {
        let orch = orchestrator(vec!["ok"], vec![vec![1]]);
        orch.handle_final_transcript("Tenho uma loja de roupas.".to_string(), None, None).await.unwrap();
        orch.handle_final_transcript("Vendo online também.".to_string(), None, None).await.unwrap();
        let messages = orch.build_messages();
        // system + 2 user turns + 2 agent replies already in history.
        assert_eq!(messages.len(), 5);
        assert!(messages.iter().any(|m| m.content.contains("Tenho uma loja de roupas.")));
    }
}
