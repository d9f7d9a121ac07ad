//! System handlers: health, stats, metrics, OpenAPI, events.

use super::StatsResponse;
use crate::api::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": if state.downloader.is_accepting() { "ok" } else { "shutting_down" },
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /stats - Task counts and worker pool state
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses(
        (status = 200, description = "Current statistics", body = StatsResponse)
    )
)]
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let downloader = &state.downloader;
    let response = StatsResponse {
        tasks: downloader.stats().await,
        active_tasks: downloader.active_task_count().await,
        workers: downloader.worker_count(),
        queued_jobs: downloader.queued_jobs(),
        accepting: downloader.is_accepting(),
    };

    (StatusCode::OK, Json(response))
}

/// GET /metrics - Prometheus text exposition
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "system",
    responses(
        (status = 200, description = "Task and download counters in Prometheus text format", content_type = "text/plain"),
        (status = 500, description = "Metrics could not be encoded", body = crate::error::ApiError)
    )
)]
pub async fn metrics(State(state): State<AppState>) -> crate::Result<impl IntoResponse> {
    let body = state.downloader.metrics().render()?;
    Ok((
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body,
    ))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// GET /events - Server-sent events stream
#[utoipa::path(
    get,
    path = "/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.downloader.subscribe();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json_data) => Some(Ok(SseEvent::default().event(event.kind()).data(json_data))),
            Err(e) => {
                tracing::warn!("Failed to serialize event to JSON: {}", e);
                None
            }
        },
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!("SSE client lagged, skipped {} events", skipped);
            Some(Ok(SseEvent::default().event("error").data(format!(
                r#"{{"error":"lagged","skipped":{}}}"#,
                skipped
            ))))
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
