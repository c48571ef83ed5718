//! C6, the TTS Chunk Pipeline (spec §4.6).

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("tts transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, TtsError>;

/// Contract for C6. Each call to `synthesize_stream`/`synthesize_ack` must
/// yield its first chunk as quickly as possible; time-to-first-byte is the
/// TTS latency component C4 records.
#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize_stream(
        &self,
        text: &str,
        on_pcm_chunk: &mut (dyn FnMut(Vec<u8>) + Send),
    ) -> Result<()>;

    /// Short cached utterances (onomatopoeias, confirmations) suitable for
    /// `play_oneshot` on C1.
    async fn synthesize_ack(&self, short_text: &str) -> Result<Vec<u8>>;
}

/// Test-only collaborator yielding a fixed sequence of PCM chunks per call,
/// with an error-once mode to exercise C4's per-chunk failure handling.
pub struct ScriptedTtsClient {
    chunks: Vec<Vec<u8>>,
    error_once: std::sync::atomic::AtomicBool,
}

impl ScriptedTtsClient {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self { chunks, error_once: std::sync::atomic::AtomicBool::new(false) }
    }

    pub fn erroring_once(chunks: Vec<Vec<u8>>) -> Self {
        Self { chunks, error_once: std::sync::atomic::AtomicBool::new(true) }
    }
}

#[async_trait]
impl TtsClient for ScriptedTtsClient {
    async fn synthesize_stream(
        &self,
        _text: &str,
        on_pcm_chunk: &mut (dyn FnMut(Vec<u8>) + Send),
    ) -> Result<()> {
        if self
            .error_once
            .compare_exchange(
                true,
                false,
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
            )
            .is_ok()
        {
            return Err(TtsError::Transport("scripted failure".to_string()));
        }
        for chunk in &self.chunks {
            on_pcm_chunk(chunk.clone());
        }
        Ok(())
    }

    async fn synthesize_ack(&self, _short_text: &str) -> Result<Vec<u8>> {
        Ok(self.chunks.first().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_yields_chunks_in_order() {
        let client = ScriptedTtsClient::new(vec![vec![1, 2], vec![3, 4]]);
        let mut received = Vec::new();
        let mut on_chunk = |chunk: Vec<u8>| received.push(chunk);
        client.synthesize_stream("oi", &mut on_chunk).await.unwrap();
        assert_eq!(received, vec![vec![1, 2], vec![3, 4]]);
    }

    #[tokio::test]
    async fn erroring_once_fails_first_call_then_succeeds() {
        let client = ScriptedTtsClient::erroring_once(vec![vec![9]]);
        let mut received = Vec::new();
        let mut on_chunk = |chunk: Vec<u8>| received.push(chunk);
        assert!(client.synthesize_stream("oi", &mut on_chunk).await.is_err());
        assert!(client.synthesize_stream("oi", &mut on_chunk).await.is_ok());
        assert_eq!(received, vec![vec![9]]);
    }

    #[tokio::test]
    async fn synthesize_ack_returns_first_chunk() {
        let client = ScriptedTtsClient::new(vec![vec![7, 7]]);
        let ack = client.synthesize_ack("uhum").await.unwrap();
        assert_eq!(ack, vec![7, 7]);
    }
}
