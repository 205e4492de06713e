//! Wire types for the WebSocket chat protocol (spec §6): one inbound frame
//! per client message, multiple outbound frames per inbound one.

use common::storage::types::message::SourceRef;
use serde::{Deserialize, Serialize};

/// Upper bound on `message` length, inclusive. Anything longer fails
/// validation (spec §4.K step 1) rather than being silently truncated.
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// Default `rag_limit` when the client omits it.
pub const DEFAULT_RAG_LIMIT: usize = 5;

/// Upper bound on `rag_limit`; values above this are clamped, not rejected.
pub const MAX_RAG_LIMIT: usize = 20;

fn default_style() -> String {
    "default".to_string()
}

fn default_use_memory() -> bool {
    true
}

/// A single client → server frame, per spec §6.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    pub message: String,
    pub model: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_use_memory")]
    pub use_memory: bool,
    #[serde(default)]
    pub rag_limit: Option<usize>,
}

/// A single server → client frame. Several of these are emitted per
/// inbound [`ClientFrame`]: zero or more `Token`s followed by exactly one
/// of `Done`/`Error`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Token { content: String },
    Done { sources: Vec<SourceRef> },
    Error { content: String },
}

/// Step 1 of the per-frame pipeline: non-empty message, within the length
/// cap. Returns the rejection reason on failure so the caller can emit it
/// verbatim as an `error` frame.
pub fn validate_frame(frame: &ClientFrame) -> Result<(), String> {
    if frame.message.trim().is_empty() {
        return Err("message must not be empty".to_string());
    }
    if frame.message.chars().count() > MAX_MESSAGE_LEN {
        return Err(format!(
            "message exceeds the {MAX_MESSAGE_LEN}-character limit"
        ));
    }
    Ok(())
}

/// Clamps a client-supplied `rag_limit` into `1..=20`, defaulting to 5 when
/// absent.
#[must_use]
pub fn clamp_rag_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_RAG_LIMIT).clamp(1, MAX_RAG_LIMIT)
}
