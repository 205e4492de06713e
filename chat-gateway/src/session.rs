//! The Chat Session Handler's per-frame pipeline (spec §4.K), expressed as
//! an async generator: each inbound frame produces a stream of zero or
//! more `token` frames followed by exactly one `done`/`error` frame.
//!
//! Grounded on the same `async-stream` idiom `chunker_pipeline::worker`
//! uses for `BackfillWorker::report`: the generator macro lets the eight
//! ordered steps read as straight-line async code while still yielding
//! incrementally to the transport. Dropping the stream before it is
//! exhausted (the transport does this on peer disconnect) drops every
//! in-flight await inside it, including the upstream LLM request —
//! structured-concurrency cancellation for free.

use std::pin::Pin;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tracing::{error, warn};

use common::{
    storage::types::{
        conversation::Conversation,
        memory_item::MemoryItem,
        message::MessageRole,
    },
    utils::llm::{ChatRole, ChatTurn},
};

use crate::{
    frame::{clamp_rag_limit, validate_frame, ClientFrame, ServerFrame},
    prompt,
    state::ChatGatewayState,
};

/// Runs the full per-frame pipeline and returns a stream of outbound
/// frames. `rag` selects `/chat/ws/rag-chat` (true) vs `/chat/ws/chat`
/// (false) behavior for step 4.
pub fn process_frame(
    state: ChatGatewayState,
    frame: ClientFrame,
    rag: bool,
) -> Pin<Box<dyn Stream<Item = ServerFrame> + Send>> {
    Box::pin(stream! {
        // Step 1: validate.
        if let Err(reason) = validate_frame(&frame) {
            yield ServerFrame::Error { content: reason };
            return;
        }

        // Step 2: persist user turn (best-effort; a persistence failure
        // here is not one of the "steps 5-7" errors the protocol sends an
        // error frame for, so it is logged and the turn proceeds).
        if let Some(conversation_id) = frame.conversation_id.as_deref() {
            if let Err(err) = Conversation::add_message(
                conversation_id,
                MessageRole::User,
                frame.message.clone(),
                None,
                &state.db,
            )
            .await
            {
                warn!(error = %err, conversation_id, "failed to persist user message");
            }
        }

        // Step 3: assemble system context.
        let memory_context = if frame.use_memory {
            match MemoryItem::list(&state.db).await {
                Ok(memories) => prompt::memory_block(&frame.message, 5, &memories),
                Err(err) => {
                    warn!(error = %err, "memory lookup failed, continuing without memory");
                    None
                }
            }
        } else {
            None
        };
        let system_prefix = prompt::assemble_system_prefix(
            &frame.style,
            frame.project_id.as_deref(),
            memory_context.as_deref(),
        );

        // Step 4: RAG branch, only on the RAG endpoint.
        let (user_prompt, sources) = if rag {
            let limit = clamp_rag_limit(frame.rag_limit);
            let (context_block, sources) = retrieval_pipeline::get_context_and_sources(
                &frame.message,
                state.embedding_client.as_ref(),
                limit,
                &state.db,
            )
            .await;
            let video_titles: Vec<String> = sources.iter().map(|s| s.title.clone()).collect();
            let prompt = prompt::build_rag_prompt(&system_prefix, &context_block, &video_titles, &frame.message);
            (prompt, sources)
        } else {
            (prompt::build_plain_prompt(&system_prefix, &frame.message), Vec::new())
        };

        // Step 5/6: route to the LLM Proxy Client and proxy its stream.
        let messages = vec![ChatTurn {
            role: ChatRole::User,
            content: user_prompt,
        }];
        let mut upstream = state.llm_proxy.stream_completion(&frame.model, messages).await;
        let mut full_response = String::new();

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(token) => {
                    full_response.push_str(&token);
                    yield ServerFrame::Token { content: token };
                }
                Err(err) => {
                    error!(error = %err, "LLM stream failed");
                    yield ServerFrame::Error {
                        content: err.to_string(),
                    };
                    return;
                }
            }
        }

        // Step 7: persist assistant turn (best-effort per spec §5: a
        // failure here still reaches step 8).
        if let Some(conversation_id) = frame.conversation_id.as_deref() {
            if let Err(err) = Conversation::add_message(
                conversation_id,
                MessageRole::Assistant,
                full_response,
                Some(sources.clone()),
                &state.db,
            )
            .await
            {
                error!(error = %err, conversation_id, "failed to persist assistant message, still emitting done");
            }
        }

        // Step 8: terminate.
        yield ServerFrame::Done { sources };
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::{
        storage::{db::SurrealDbClient, store::testing::TestStorageManager},
        utils::{
            config::testing::test_config_memory,
            embedding::testing::HashedEmbeddingClient,
            llm::testing::StaticLlmClient,
        },
    };
    use uuid::Uuid;

    use super::*;

    async fn test_state(llm: StaticLlmClient) -> ChatGatewayState {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .unwrap(),
        );
        let storage = TestStorageManager::new_memory().await.unwrap().clone_storage();
        ChatGatewayState {
            db,
            config: test_config_memory(),
            storage,
            embedding_client: Arc::new(HashedEmbeddingClient::new(8)),
            llm_proxy: Arc::new(llm),
            metrics: Arc::new(common::observability::Metrics::new()),
        }
    }

    fn frame(message: &str, conversation_id: Option<String>) -> ClientFrame {
        ClientFrame {
            message: message.to_string(),
            model: "ollama:qwen3:8b".to_string(),
            conversation_id,
            project_id: None,
            style: "default".to_string(),
            use_memory: true,
            rag_limit: None,
        }
    }

    #[tokio::test]
    async fn invalid_frame_yields_single_error_frame() {
        let state = test_state(StaticLlmClient::responding_with(vec!["hi".into()])).await;
        let events: Vec<ServerFrame> = process_frame(state, frame("", None), false).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerFrame::Error { .. }));
    }

    #[tokio::test]
    async fn plain_chat_streams_tokens_then_done_in_order() {
        let state = test_state(StaticLlmClient::responding_with(vec![
            "Hel".into(),
            "lo".into(),
        ]))
        .await;
        let events: Vec<ServerFrame> = process_frame(state, frame("hi there", None), false)
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                ServerFrame::Token { content: "Hel".into() },
                ServerFrame::Token { content: "lo".into() },
                ServerFrame::Done { sources: vec![] },
            ]
        );
    }

    #[tokio::test]
    async fn conversation_turns_are_persisted_around_the_stream() {
        let state = test_state(StaticLlmClient::responding_with(vec!["ok".into()])).await;
        let conversation = Conversation::create_conversation(
            "Untitled".to_string(),
            "ollama:qwen3:8b".to_string(),
            &state.db,
        )
        .await
        .unwrap();

        let events: Vec<ServerFrame> = process_frame(
            state.clone(),
            frame("hello", Some(conversation.id.clone())),
            false,
        )
        .collect()
        .await;
        assert!(matches!(events.last(), Some(ServerFrame::Done { .. })));

        let (_, messages) = Conversation::get_conversation(&conversation.id, &state.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "ok");
    }

    #[tokio::test]
    async fn llm_failure_emits_error_and_stops_without_done() {
        let state = test_state(StaticLlmClient::failing()).await;
        let events: Vec<ServerFrame> = process_frame(state, frame("hi", None), false)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerFrame::Error { .. }));
    }

    #[tokio::test]
    async fn rag_endpoint_with_no_hits_still_streams_and_completes() {
        let state = test_state(StaticLlmClient::responding_with(vec!["answer".into()])).await;
        let events: Vec<ServerFrame> = process_frame(state, frame("what is rust?", None), true)
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                ServerFrame::Token { content: "answer".into() },
                ServerFrame::Done { sources: vec![] },
            ]
        );
    }
}
