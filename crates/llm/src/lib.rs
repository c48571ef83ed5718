//! C5, the LLM Stream Adapter (spec §4.5).

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm stream ended early: {0}")]
    StreamEnded(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Agent,
}

#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn agent(content: impl Into<String>) -> Self {
        Self { role: Role::Agent, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Error,
}

#[derive(Debug, Clone)]
pub struct GenerationUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct BatchGeneration {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Option<GenerationUsage>,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub max_tokens: u32,
}

/// Contract for C5. Implementations must not buffer the full response before
/// the first `on_chunk` call; first-token latency is the metric C4 measures.
#[async_trait]
pub trait LlmClient: Send + Sync {
    // Hand-expanded instead of left to `#[async_trait]`'s own elision
    // rewriting: the macro mints a fresh, unrelated lifetime for the `dyn
    // FnMut` trait object's implicit bound instead of tying it to the `&mut`
    // reference it's nested in, which makes the generated signature
    // unsatisfiable by any caller. Writing the desugared `Pin<Box<dyn
    // Future>>` form directly gives the compiler's normal (correct) elision
    // a chance to run instead.
    fn generate_stream<'life0, 'life1, 'life2, 'async_trait>(
        &'life0 self,
        messages: &'life1 [ConversationMessage],
        on_chunk: &'life2 mut (dyn FnMut(&str) + Send),
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait;

    async fn generate(
        &self,
        messages: &[ConversationMessage],
        options: BatchOptions,
    ) -> Result<BatchGeneration>;
}

/// Test-only collaborator driving `generate_stream`/`generate` from a
/// scripted token sequence, including an error-after-N-tokens variant for
/// the S6 fallback scenario.
pub struct ScriptedLlmClient {
    tokens: Vec<String>,
    fail_after: Option<usize>,
}

impl ScriptedLlmClient {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens, fail_after: None }
    }

    pub fn failing_after(tokens: Vec<String>, fail_after: usize) -> Self {
        Self { tokens, fail_after: Some(fail_after) }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn generate_stream<'life0, 'life1, 'life2, 'async_trait>(
        &'life0 self,
        _messages: &'life1 [ConversationMessage],
        on_chunk: &'life2 mut (dyn FnMut(&str) + Send),
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            for (i, token) in self.tokens.iter().enumerate() {
                if let Some(limit) = self.fail_after {
                    if i >= limit {
                        return Err(LlmError::Transport("scripted failure".to_string()));
                    }
                }
                on_chunk(token);
            }
            Ok(())
        })
    }

    async fn generate(
        &self,
        _messages: &[ConversationMessage],
        options: BatchOptions,
    ) -> Result<BatchGeneration> {
        let mut text = String::new();
        for token in self.tokens.iter().take(options.max_tokens as usize) {
            text.push_str(token);
        }
        Ok(BatchGeneration { text, finish_reason: FinishReason::Stop, usage: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_streams_all_tokens_in_order() {
        let client = ScriptedLlmClient::new(vec!["ol".into(), "á ".into(), "mundo".into()]);
        let mut collected = String::new();
        let mut on_chunk = |chunk: &str| collected.push_str(chunk);
        client.generate_stream(&[], &mut on_chunk).await.unwrap();
        assert_eq!(collected, "olá mundo");
    }

    #[tokio::test]
    async fn scripted_client_errors_after_configured_token_count() {
        let client = ScriptedLlmClient::failing_after(vec!["a".into(), "b".into(), "c".into()], 2);
        let mut collected = String::new();
        let mut on_chunk = |chunk: &str| collected.push_str(chunk);
        let result = client.generate_stream(&[], &mut on_chunk).await;
        assert!(result.is_err());
        assert_eq!(collected, "ab");
    }

    #[tokio::test]
    async fn batch_generation_respects_max_tokens_cap() {
        let client = ScriptedLlmClient::new(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        let result = client
            .generate(&[], BatchOptions { max_tokens: 2 })
            .await
            .unwrap();
        assert_eq!(result.text, "ab");
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }
}
