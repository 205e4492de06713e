//! Observability Hooks middleware (spec §4.M): attaches a correlation id to
//! every request/response pair and records the `http_server_*` series named
//! in the spec.
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use common::observability::correlation_id_or_generate;

use crate::api_state::ApiState;

/// Reads (or mints) the correlation id, echoes it on the response, and
/// records `http_server_active_requests`/`http_server_request_duration_seconds`
/// around the handler call.
pub async fn observe_request(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Response {
    let header_name = state.config.correlation_header.clone();
    let header = HeaderName::try_from(&header_name)
        .unwrap_or_else(|_| HeaderName::from_static("x-correlation-id"));
    let correlation_id = correlation_id_or_generate(
        req.headers()
            .get(header_name.as_str())
            .and_then(|v| v.to_str().ok()),
    );

    let method = req.method().to_string();
    let route = req.uri().path().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        req.headers_mut().insert(header.clone(), value.clone());
    }

    state.metrics.inc_active_requests(&method, &route);
    let started_at = Instant::now();

    let mut response = next.run(req).await;

    state.metrics.dec_active_requests(&method, &route);
    state.metrics.record_http_request(
        &method,
        &route,
        response.status().as_u16(),
        started_at.elapsed().as_secs_f64(),
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(header, value);
    }

    response
}
