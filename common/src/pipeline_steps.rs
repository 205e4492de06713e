//! Explicit registry of pipeline step names and their current version tags.
//!
//! Per the redesign notes, `pipeline_state` is treated as an opaque
//! `step -> version` map at the storage layer, but the set of valid step
//! names and their current versions are code-level constants here, not
//! free-form strings scattered through call sites. Unknown step names found
//! in a stored `pipeline_state` are tolerated on read (forward
//! compatibility) but writes must go through [`CURRENT_VERSION`].

/// Name of the chunking step.
pub const CHUNK_TRANSCRIPT: &str = "chunk_transcript";
/// Name of the chunk-embedding step.
pub const EMBED_CHUNKS: &str = "embed_chunks";
/// Name of the optional video-level summary embedding step.
pub const EMBED_SUMMARY: &str = "embed_summary";

/// All step names currently recognized for writes.
pub const KNOWN_STEPS: &[&str] = &[CHUNK_TRANSCRIPT, EMBED_CHUNKS, EMBED_SUMMARY];

/// Returns the current version tag for a known step, or `None` for an
/// unrecognized step name (which write paths must reject).
#[must_use]
pub fn current_version(step: &str) -> Option<&'static str> {
    match step {
        CHUNK_TRANSCRIPT => Some("v1.0"),
        EMBED_CHUNKS | EMBED_SUMMARY => Some("bge-m3.1024"),
        _ => None,
    }
}
