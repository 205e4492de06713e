//! Extracts a YouTube video id from the handful of URL shapes the
//! `/youtube/analyze` endpoint actually receives. Grounded on the
//! video-id-regex idiom used for the same purpose in the example pack's
//! YouTube audio source (a standalone capture-group regex over the known
//! URL forms, falling back to a bare 11-character id).
//!
//! Fetching metadata for videos not already in the store is explicitly a
//! third-party API wrapper, out of scope for this engine; this module only
//! recognizes the id, it never calls out to YouTube.
use regex::Regex;
use std::sync::LazyLock;

static VIDEO_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?:
            (?:https?://)?
            (?:www\.)?
            (?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/)
            ([a-zA-Z0-9_-]{11})
        )
        |
        ^([a-zA-Z0-9_-]{11})$
        ",
    )
    .unwrap_or_else(|_| unreachable!("video id pattern is a fixed, valid regex"))
});

/// Recognizes a YouTube video id from a full URL or a bare 11-character id.
#[must_use]
pub fn extract_video_id(input: &str) -> Option<String> {
    let captures = VIDEO_ID_PATTERN.captures(input.trim())?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_from_short_url() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_bare_id() {
        assert_eq!(
            extract_video_id("dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn rejects_unrelated_url() {
        assert_eq!(extract_video_id("https://example.com/page"), None);
    }
}
