//! Session factory wiring C1-C6 together per the concurrency model in spec
//! §5: C1 and C3 each own a background thread/task; C4 (the orchestrator)
//! is the single logical thread that reduces the final-transcript stream,
//! but individual STT events are dispatched onto their own tasks so a
//! partial arriving mid-turn isn't stuck behind an in-flight final.

mod config;
mod error;
mod sink;
mod transcript;

pub use config::{ConfigError, SessionConfig};
pub use error::SessionError;
pub use sink::{GatewayPlaybackSink, SttResetHandle};
pub use transcript::{NullTranscriptSink, TranscriptSink};

pub type Result<T> = std::result::Result<T, SessionError>;

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use voicecore_audio::{AudioGateway, AudioInput, AudioOutput};
use voicecore_bus::Bus;
use voicecore_echo::EchoCanceller;
use voicecore_events::{
    event_names, ErrorEvent, EventBusRef, PartialTranscriptEvent, SessionEndedEvent, SessionStartedEvent,
};
use voicecore_llm::LlmClient;
use voicecore_stt::{SttClient, SttEvent};
use voicecore_tts::TtsClient;
use voicecore_turn::TurnOrchestrator;

/// Depth of the STT→orchestrator queue (spec §5's bounded-queue shape);
/// wide enough to absorb a burst of partials without ever blocking C3's
/// reader task.
const STT_EVENT_QUEUE_CAPACITY: usize = 64;

/// A live voice session: C1's audio gateway, C3's STT client, and the C4
/// orchestrator wired together and already running.
pub struct VoiceSession<O, L, T>
where
    O: AudioOutput + 'static,
    L: LlmClient + 'static,
    T: TtsClient + 'static,
{
    id: Uuid,
    gateway: Arc<AudioGateway<O, EchoCanceller>>,
    orchestrator: Arc<TurnOrchestrator<L, T, GatewayPlaybackSink<O>, SttResetHandle>>,
    stt: Arc<Mutex<Box<dyn SttClient>>>,
    events: EventBusRef,
}

impl<O, L, T> VoiceSession<O, L, T>
where
    O: AudioOutput + 'static,
    L: LlmClient + 'static,
    T: TtsClient + 'static,
{
    /// Starts capture/playback, opens the STT transport, and spawns the task
    /// that drains STT events into the orchestrator. Collaborators (device
    /// bindings, the LLM/TTS vendor clients, the STT transport) are supplied
    /// by the caller; this crate only wires them together. `greeting`, when
    /// present, is streamed to C1 immediately (spec §4.4, Greeting state)
    /// with barge-in suppressed until it finishes.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        config: SessionConfig,
        input: impl AudioInput + 'static,
        output: O,
        mut stt: Box<dyn SttClient>,
        llm: L,
        tts: T,
        events: EventBusRef,
        system_prompt: impl Into<String>,
        greeting: Option<String>,
    ) -> Result<Self> {
        config.validate()?;
        let session_id = Uuid::new_v4();

        let echo = EchoCanceller::new(config.to_echo_config());
        let gateway = Arc::new(AudioGateway::start(input, output, echo, config.to_gateway_config()));
        let flags = gateway.flags();

        let mut event_bus: Bus<SttEvent> = Bus::bounded(STT_EVENT_QUEUE_CAPACITY, "stt-to-orchestrator");
        let sender = event_bus.sender();
        let mut receiver = event_bus.take_receiver().expect("bus receiver taken exactly once");

        stt.open(session_id, Box::new(move |event| {
            sender.send(event);
        }))?;
        let stt: Arc<Mutex<Box<dyn SttClient>>> = Arc::new(Mutex::new(stt));

        let orchestrator = Arc::new(TurnOrchestrator::new(
            session_id,
            llm,
            tts,
            GatewayPlaybackSink::new(gateway.clone()),
            SttResetHandle::new(stt.clone()),
            events.clone(),
            system_prompt,
            flags,
            config.to_chunker_config(),
            config.history_limit,
        ));

        {
            let stt_feed = stt.clone();
            gateway.subscribe_frames(move |chunk| {
                let bytes = chunk.to_pcm16();
                let mut guard = stt_feed.lock().unwrap();
                if guard.is_connected() {
                    guard.feed_audio(&bytes);
                }
            });
        }

        if let Some(greeting_text) = greeting {
            orchestrator.begin_greeting();
            let orchestrator = orchestrator.clone();
            let events = events.clone();
            tokio::spawn(async move {
                if let Err(err) = orchestrator.play_greeting(&greeting_text).await {
                    events.emit(
                        event_names::ERROR,
                        serde_json::to_value(ErrorEvent {
                            context: "greeting".to_string(),
                            message: err.to_string(),
                        })
                        .unwrap_or_default(),
                    );
                }
            });
        }

        let partial_fallback: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        {
            let orchestrator = orchestrator.clone();
            let events = events.clone();
            let partial_fallback = partial_fallback.clone();
            tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    let orchestrator = orchestrator.clone();
                    let events = events.clone();
                    let partial_fallback = partial_fallback.clone();
                    // Each event gets its own task so a partial that should
                    // cancel an in-flight final (spec §4.4b, S3) isn't stuck
                    // waiting behind that final's await.
                    tokio::spawn(async move {
                        match event {
                            SttEvent::Partial { text } => {
                                events.emit(
                                    event_names::PARTIAL_TRANSCRIPT,
                                    serde_json::to_value(PartialTranscriptEvent {
                                        session_id,
                                        text: text.clone(),
                                    })
                                    .unwrap_or_default(),
                                );
                                *partial_fallback.lock().unwrap() = Some(text.clone());
                                if let Err(err) = orchestrator.handle_partial_transcript(&text).await {
                                    events.emit(
                                        event_names::ERROR,
                                        serde_json::to_value(ErrorEvent {
                                            context: "turn".to_string(),
                                            message: err.to_string(),
                                        })
                                        .unwrap_or_default(),
                                    );
                                }
                            }
                            SttEvent::Final { text, timing } => {
                                let fallback = partial_fallback.lock().unwrap().take();
                                if let Err(err) =
                                    orchestrator.handle_final_transcript(text, fallback, Some(timing)).await
                                {
                                    events.emit(
                                        event_names::ERROR,
                                        serde_json::to_value(ErrorEvent {
                                            context: "turn".to_string(),
                                            message: err.to_string(),
                                        })
                                        .unwrap_or_default(),
                                    );
                                }
                            }
                        }
                    });
                }
            });
        }

        events.emit(
            event_names::SESSION_STARTED,
            serde_json::to_value(SessionStartedEvent { session_id }).unwrap_or_default(),
        );

        Ok(Self { id: session_id, gateway, orchestrator, stt, events })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn orchestrator(&self) -> &Arc<TurnOrchestrator<L, T, GatewayPlaybackSink<O>, SttResetHandle>> {
        &self.orchestrator
    }

    /// Cooperative shutdown (spec §5): stop playback, close C3, flush
    /// metrics, publish `session:ended`. Subsequent calls into this session
    /// are the caller's responsibility to reject.
    pub fn end(&self) {
        self.stt.lock().unwrap().close();
        self.gateway.stop_playback();
        let summary = self.orchestrator.summary();
        self.events.emit(
            event_names::SESSION_ENDED,
            serde_json::to_value(SessionEndedEvent { session_id: self.id, summary }).unwrap_or_default(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicecore_audio::test_support::{InMemoryAudioInput, InMemoryAudioOutput};
    use voicecore_events::InMemoryEventBus;
    use voicecore_llm::ScriptedLlmClient;
    use voicecore_stt::MockSttClient;
    use voicecore_tts::ScriptedTtsClient;

    #[tokio::test]
    async fn session_start_emits_session_started_and_wires_a_turn() {
        let bus = Arc::new(InMemoryEventBus::new());
        let events: EventBusRef = bus.clone();
        let input = InMemoryAudioInput::new(16_000, vec![]);
        let output = InMemoryAudioOutput::new(16_000);
        let stt = Box::new(MockSttClient::new(vec![]));
        let llm = ScriptedLlmClient::new(vec!["Olá!".to_string()]);
        let tts = ScriptedTtsClient::new(vec![vec![1, 2, 3]]);

        let session = VoiceSession::start(
            SessionConfig::default(),
            input,
            output,
            stt,
            llm,
            tts,
            events,
            "system prompt",
            None,
        )
        .unwrap();

        assert_eq!(bus.events_for(event_names::SESSION_STARTED).len(), 1);

        let outcome = session
            .orchestrator()
            .handle_final_transcript("Tenho uma loja de roupas.".to_string(), None, None)
            .await
            .unwrap();
        assert_eq!(outcome, voicecore_turn::TurnOutcome::Completed);

        session.end();
        assert_eq!(bus.events_for(event_names::SESSION_ENDED).len(), 1);
    }

    #[tokio::test]
    async fn greeting_suppresses_barge_in_until_it_ends() {
        let bus = Arc::new(InMemoryEventBus::new());
        let events: EventBusRef = bus.clone();
        let input = InMemoryAudioInput::new(16_000, vec![]);
        let output = InMemoryAudioOutput::new(16_000);
        let stt = Box::new(MockSttClient::new(vec![]));
        let llm = ScriptedLlmClient::new(vec!["Claro!".to_string()]);
        let tts = ScriptedTtsClient::new(vec![vec![1, 2]]);

        let session = VoiceSession::start(
            SessionConfig::default(),
            input,
            output,
            stt,
            llm,
            tts,
            events,
            "system prompt",
            Some("Olá, aqui é da loja.".to_string()),
        )
        .unwrap();

        assert!(!session.gateway.flags().barge_in_enabled());
        // The spawned greeting task needs a scheduling point to run.
        tokio::task::yield_now().await;
        session.end();
    }
}
