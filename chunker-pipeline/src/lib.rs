#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod archive_reader;
pub mod chunker;
pub mod worker;

pub use archive_reader::ArchiveReader;
pub use chunker::{chunk_plain, chunk_timed, ChunkingConfig, TranscriptChunk};
pub use worker::{run_worker_loop, BackfillStatus, BackfillWorker, ProgressEvent, RunOutcome, Step, VideoOutcome};
