//! The WebSocket Chat Session Handler (spec §4.K), its prompt-assembly
//! helpers (§4.K steps 3-4), and the wire frame types it speaks (§6). The
//! LLM Proxy Client itself (§4.L) lives in `common::utils::llm`, since the
//! Backfill Worker's embedding path shares the same client-wrapping idiom.

pub mod frame;
pub mod prompt;
pub mod routes;
pub mod session;
pub mod state;

pub use routes::chat_routes;
pub use state::ChatGatewayState;
