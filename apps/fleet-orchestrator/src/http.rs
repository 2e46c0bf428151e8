//! [apps/fleet-orchestrator/src/http.rs]
//! Minimal demonstration HTTP surface so the workspace runs end to end: a
//! health check, a handful of REST endpoints over the command/query handlers
//! in `fleet_core::{commands, queries}`, and a server-sent-events endpoint
//! over the Event Relay. This is glue, not a full controller layer — it does
//! no auth, no request validation beyond what `serde` gives for free, and no
//! routing sophistication beyond a flat `Router` with a CORS layer and a
//! handful of `.route(...)` calls.

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_core::commands::refresh::request_worker_data_refresh;
use fleet_core::commands::worker_lifecycle::{start_worker, stop_worker};
use fleet_core::queries::labs::get_worker_labs;
use fleet_core::queries::workers::{get_worker_by_id, get_workers_by_region};
use fleet_core::relay::SubscriptionFilter;
use fleet_core::{OperationResult, Services};
use fleet_domain::{WorkerId, WorkerStatus};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/regions/:region/workers", get(list_workers_by_region))
        .route("/api/v1/workers/:identifier", get(get_worker))
        .route("/api/v1/workers/:worker_id/labs", get(list_worker_labs))
        .route("/api/v1/workers/:worker_id/start", post(start))
        .route("/api/v1/workers/:worker_id/stop", post(stop))
        .route("/api/v1/workers/:worker_id/refresh", post(request_refresh))
        .route("/api/v1/events", get(event_stream))
        .layer(cors)
        .with_state(services)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct RegionQuery {
    status: Option<WorkerStatus>,
}

async fn list_workers_by_region(
    State(services): State<Services>,
    Path(region): Path<String>,
    Query(query): Query<RegionQuery>,
) -> impl IntoResponse {
    let result = get_workers_by_region(&services, region, query.status).await;
    Json(OperationResult::from_query_result(result))
}

async fn get_worker(State(services): State<Services>, Path(identifier): Path<String>) -> impl IntoResponse {
    let result = get_worker_by_id(&services, &identifier).await;
    Json(OperationResult::from_query_result(result))
}

async fn list_worker_labs(State(services): State<Services>, Path(worker_id): Path<WorkerId>) -> impl IntoResponse {
    let result = get_worker_labs(&services, worker_id).await;
    Json(OperationResult::from_query_result(result))
}

async fn start(State(services): State<Services>, Path(worker_id): Path<WorkerId>) -> impl IntoResponse {
    let result = start_worker(&services, worker_id, "http-api".into()).await;
    Json(OperationResult::from_command_result(result))
}

async fn stop(State(services): State<Services>, Path(worker_id): Path<WorkerId>) -> impl IntoResponse {
    let result = stop_worker(&services, worker_id, "http-api".into()).await;
    Json(OperationResult::from_command_result(result))
}

async fn request_refresh(State(services): State<Services>, Path(worker_id): Path<WorkerId>) -> impl IntoResponse {
    let result = request_worker_data_refresh(&services, worker_id).await;
    Json(OperationResult::from_command_result(result))
}

/// Server-sent-events feed over the Event Relay, unfiltered. A real
/// controller would derive `SubscriptionFilter` from query parameters and
/// the caller's auth scope; this demonstration endpoint subscribes to
/// everything.
async fn event_stream(
    State(services): State<Services>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (_id, receiver) = services.relay.subscribe(SubscriptionFilter::default());
    let stream = ReceiverStream::new(receiver).map(|envelope| {
        Ok(SseEvent::default()
            .event(envelope.event_type.clone())
            .json_data(envelope)
            .unwrap_or_else(|_| SseEvent::default()))
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(25)))
}
