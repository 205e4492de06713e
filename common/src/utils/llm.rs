//! The LLM Proxy Client (spec §4.L): routes a chat completion request to
//! one of two upstreams and streams back content deltas.
//!
//! Grounded in the same client-wrapping idiom as
//! [`crate::utils::embedding::EmbeddingClient`]: a thin seam over
//! `async_openai` so callers can be tested against
//! [`testing::StaticLlmClient`] instead of a live endpoint.

use std::pin::Pin;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::AppError;

/// Prefix that routes a completion request to the local OSS runtime instead
/// of the remote hosted provider. Stripped before the model name is
/// forwarded upstream.
pub const OLLAMA_PREFIX: &str = "ollama:";

/// A single turn in a chat history handed to [`LlmProxyClient::stream_completion`].
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

/// Seam the Chat Session Handler is built against, so tests can swap in
/// [`testing::StaticLlmClient`] instead of calling out to a real LLM.
#[async_trait]
pub trait LlmProxy: Send + Sync {
    async fn stream_completion(&self, model: &str, messages: Vec<ChatTurn>) -> TokenStream;
}

/// Routes between two OpenAI-compatible upstreams by model-name prefix, per
/// spec §4.L: `ollama:` selects the local OSS runtime client, anything else
/// selects the remote hosted provider. Both clients speak the same wire
/// shape, so selection is the entire difference between the two branches.
#[derive(Clone)]
pub struct LlmProxyClient {
    remote: Client<OpenAIConfig>,
    local: Client<OpenAIConfig>,
}

impl LlmProxyClient {
    #[must_use]
    pub fn new(remote: Client<OpenAIConfig>, local: Client<OpenAIConfig>) -> Self {
        Self { remote, local }
    }

    fn build_messages(
        messages: &[ChatTurn],
    ) -> Result<Vec<ChatCompletionRequestMessage>, AppError> {
        messages
            .iter()
            .map(|turn| match turn.role {
                ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map(Into::into)
                    .map_err(AppError::OpenAI),
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map(Into::into)
                    .map_err(AppError::OpenAI),
            })
            .collect()
    }
}

#[async_trait]
impl LlmProxy for LlmProxyClient {
    /// Strips the `ollama:` prefix (if present) before forwarding, selects
    /// the matching upstream client, and returns a stream that yields only
    /// non-empty content deltas. Transport errors surface as
    /// `LLMUnavailable`; the stream then ends after the single error item,
    /// matching "terminal sentinel is iterator exhaustion".
    async fn stream_completion(&self, model: &str, messages: Vec<ChatTurn>) -> TokenStream {
        let (client, upstream_model) = match model.strip_prefix(OLLAMA_PREFIX) {
            Some(stripped) => (&self.local, stripped.to_string()),
            None => (&self.remote, model.to_string()),
        };
        debug!(model = %upstream_model, local = model.starts_with(OLLAMA_PREFIX), "routing completion request");

        let built = Self::build_messages(&messages).and_then(|msgs| {
            CreateChatCompletionRequestArgs::default()
                .model(upstream_model)
                .messages(msgs)
                .stream(true)
                .build()
                .map_err(AppError::OpenAI)
        });

        let request = match built {
            Ok(request) => request,
            Err(err) => return futures::stream::once(async move { Err(err) }).boxed(),
        };

        match client.chat().create_stream(request).await {
            Ok(stream) => stream
                .filter_map(|chunk| async move {
                    match chunk {
                        Ok(response) => {
                            let content = response
                                .choices
                                .first()
                                .and_then(|choice| choice.delta.content.clone())
                                .unwrap_or_default();
                            if content.is_empty() {
                                None
                            } else {
                                Some(Ok(content))
                            }
                        }
                        Err(err) => Some(Err(AppError::LLMUnavailable(err.to_string()))),
                    }
                })
                .boxed(),
            Err(err) => {
                futures::stream::once(async move { Err(AppError::LLMUnavailable(err.to_string())) })
                    .boxed()
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use async_trait::async_trait;
    use futures::StreamExt;

    use super::{ChatTurn, LlmProxy, TokenStream};
    use crate::error::AppError;

    /// Replays a fixed list of tokens regardless of input, or yields a
    /// single `LLMUnavailable` error when configured to fail. No network
    /// call, deterministic, used by Chat Session Handler tests.
    #[derive(Clone)]
    pub struct StaticLlmClient {
        tokens: Vec<String>,
        fail: bool,
    }

    impl StaticLlmClient {
        #[must_use]
        pub fn responding_with(tokens: Vec<String>) -> Self {
            Self {
                tokens,
                fail: false,
            }
        }

        #[must_use]
        pub fn failing() -> Self {
            Self {
                tokens: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl LlmProxy for StaticLlmClient {
        async fn stream_completion(&self, _model: &str, _messages: Vec<ChatTurn>) -> TokenStream {
            if self.fail {
                return futures::stream::once(async {
                    Err(AppError::LLMUnavailable("simulated upstream failure".into()))
                })
                .boxed();
            }
            let tokens = self.tokens.clone();
            futures::stream::iter(tokens.into_iter().map(Ok)).boxed()
        }
    }
}
