//! Pause-preferred, token-bounded transcript chunking.
//!
//! Transcribed in semantics from the original `YouTubeChunker` service
//! (character-length token estimator, pause-boundary preference, trailing
//! small-chunk merge), re-expressed without the original's buffered-list
//! mutation style.

use common::storage::types::archive_record::TimedSegment;

/// One chunk of transcript text with timing and size metadata. Converted
/// to a `VideoChunk` by the caller once a `video_id` and (later) an
/// embedding are available.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptChunk {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub chunk_index: u32,
    pub token_count: u32,
}

/// Tunable thresholds for [`chunk_timed`]/[`chunk_plain`]. Defaults match
/// the spec's configuration table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingConfig {
    pub target_tokens: u32,
    pub max_tokens: u32,
    pub min_tokens: u32,
    pub pause_threshold: f64,
    pub chars_per_token: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 2500,
            max_tokens: 3000,
            min_tokens: 500,
            pause_threshold: 8.0,
            chars_per_token: 4.0,
        }
    }
}

impl ChunkingConfig {
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.chars().count() as f64 / self.chars_per_token) as u32
    }
}

/// Indices `i` where the gap between `segments[i]`'s end and
/// `segments[i+1]`'s start is at least `pause_threshold` seconds. A split
/// "at a pause" means after appending `segments[i]`.
fn pause_indices(segments: &[TimedSegment], config: &ChunkingConfig) -> std::collections::HashSet<usize> {
    let mut pauses = std::collections::HashSet::new();
    for i in 0..segments.len().saturating_sub(1) {
        let Some(current) = segments.get(i) else { continue };
        let Some(next) = segments.get(i + 1) else { continue };
        let current_end = current.start + current.duration;
        if next.start - current_end >= config.pause_threshold {
            pauses.insert(i);
        }
    }
    pauses
}

fn build_chunk(buffer: &[&TimedSegment], chunk_index: u32, config: &ChunkingConfig) -> TranscriptChunk {
    let text = buffer.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
    let start_time = buffer.first().map_or(0.0, |s| s.start);
    let end_time = buffer.last().map_or(0.0, |s| s.start + s.duration);
    let token_count = config.estimate_tokens(&text);
    TranscriptChunk { text, start_time, end_time, chunk_index, token_count }
}

/// Chunks a timed transcript per spec §4.D's algorithm: walk segments
/// accumulating a buffer, cutting at the first of (pause + target size),
/// (pause + min size), or (forced max size); merge an undersized trailing
/// buffer into the previous chunk.
#[must_use]
pub fn chunk_timed(segments: &[TimedSegment], config: &ChunkingConfig) -> Vec<TranscriptChunk> {
    if segments.is_empty() {
        return Vec::new();
    }

    let pauses = pause_indices(segments, config);
    let mut chunks = Vec::new();
    let mut buffer: Vec<&TimedSegment> = Vec::new();
    let mut chunk_index = 0_u32;

    for (i, segment) in segments.iter().enumerate() {
        buffer.push(segment);
        let text = buffer.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
        let tokens = config.estimate_tokens(&text);
        let at_pause = pauses.contains(&i);

        let should_split = if tokens >= config.target_tokens {
            at_pause || tokens >= config.max_tokens
        } else {
            at_pause && tokens >= config.min_tokens
        };

        if should_split {
            chunks.push(build_chunk(&buffer, chunk_index, config));
            chunk_index += 1;
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        let tail = build_chunk(&buffer, chunk_index, config);
        if let Some(last) = chunks.last_mut() {
            if tail.token_count < config.min_tokens {
                last.text = format!("{} {}", last.text, tail.text);
                last.end_time = tail.end_time;
                last.token_count = config.estimate_tokens(&last.text);
                return chunks;
            }
        }
        chunks.push(tail);
    }

    chunks
}

/// Chunks plain (untimed) text at sentence boundaries using the same
/// token thresholds. All chunks carry `start_time = end_time = 0.0`.
#[must_use]
pub fn chunk_plain(text: &str, config: &ChunkingConfig) -> Vec<TranscriptChunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(trimmed);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chunk_index = 0_u32;

    for sentence in sentences {
        let candidate = if current.is_empty() {
            sentence.to_string()
        } else {
            format!("{current} {sentence}")
        };
        let candidate_tokens = config.estimate_tokens(&candidate);

        if candidate_tokens >= config.target_tokens && !current.is_empty() {
            chunks.push(plain_chunk(&current, chunk_index, config));
            chunk_index += 1;
            current = sentence.to_string();
        } else if candidate_tokens >= config.max_tokens {
            if !current.is_empty() {
                chunks.push(plain_chunk(&current, chunk_index, config));
                chunk_index += 1;
            }
            current = sentence.to_string();
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        let tokens = config.estimate_tokens(&current);
        if let Some(last) = chunks.last_mut() {
            if tokens < config.min_tokens {
                last.text = format!("{} {}", last.text, current);
                last.token_count = config.estimate_tokens(&last.text);
                return chunks;
            }
        }
        chunks.push(plain_chunk(&current, chunk_index, config));
    }

    chunks
}

fn plain_chunk(text: &str, chunk_index: u32, config: &ChunkingConfig) -> TranscriptChunk {
    TranscriptChunk {
        text: text.to_string(),
        start_time: 0.0,
        end_time: 0.0,
        chunk_index,
        token_count: config.estimate_tokens(text),
    }
}

/// Splits on `[.!?]` followed by whitespace, keeping the terminator with
/// the preceding sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for (position, &(idx, ch)) in chars.iter().enumerate() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let Some(&(next_idx, next_ch)) = chars.get(position + 1) else {
            continue;
        };
        if next_ch.is_whitespace() {
            let end = idx + ch.len_utf8();
            sentences.push(text[start..end].trim());
            start = next_idx;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences.into_iter().filter(|s| !s.is_empty()).collect()
}
