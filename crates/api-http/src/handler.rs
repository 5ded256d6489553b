//! HTTP Handlers
//!
//! Implements the broker's HTTP protocol on top of the queue engine.

use crate::error::{api_invalid_body, ApiError};
use crate::server::AppState;
use crate::stream::{ndjson_stream, SubscriptionGuard};
use crate::types::QueueListResponse;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fanout_core::{Message, QueueStats};
use tracing::{debug, info};

/// POST /queues/:name/messages
///
/// Accepts any JSON value as the body. The queue is resolved before the body
/// is parsed, so an unknown queue reports 404 even for a malformed body.
pub async fn publish(
    Path(name): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let queue = state.broker.get_queue(&name)?;

    let value: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| api_invalid_body(e.to_string()))?;
    let message = Message::from_json(&value).map_err(|e| api_invalid_body(e.to_string()))?;

    queue.send(message)?;
    debug!(queue = %name, bytes = body.len(), "Message published");

    Ok(StatusCode::ACCEPTED)
}

/// POST /queues/:name/subscriptions
///
/// Responds 200 and keeps the body open, writing one JSON message per line
/// until the client goes away or the queue closes.
pub async fn subscribe(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let queue = state.broker.get_queue(&name)?;
    let subscription = queue.subscribe()?;

    info!(queue = %name, subscriber_id = subscription.id(), "Subscription stream opened");

    let body = Body::from_stream(ndjson_stream(SubscriptionGuard::new(queue, subscription)));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// GET /queues
pub async fn list_queues(State(state): State<AppState>) -> Json<QueueListResponse> {
    Json(QueueListResponse {
        queues: state.broker.stats(),
    })
}

/// GET /queues/:name
pub async fn queue_stats(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<QueueStats>, ApiError> {
    let queue = state.broker.get_queue(&name)?;
    Ok(Json(queue.stats()))
}
