//! HTTP API of the search indexer.
//!
//! One route, `POST /aggregator/clusters/{id}/sync`. Admission runs as route
//! middleware so a rejected request never reaches the body decoder.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{header::CONTENT_LENGTH, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use indexer_sync::{AdmissionController, SyncEngine};
use indexer_types::SyncEvent;
use std::sync::Arc;
use tracing::{error, warn};

/// Body of a 500 response.
pub const SERVER_ERROR_MESSAGE: &str = "Server error while processing the request.";

#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    pub admission: Arc<AdmissionController>,
}

impl AppState {
    pub fn new(engine: SyncEngine, admission: AdmissionController) -> Self {
        Self {
            engine,
            admission: Arc::new(admission),
        }
    }
}

/// Build the HTTP API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/aggregator/clusters/{id}/sync", post(sync_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admission_gate,
        ))
        // Large bodies are bounded by admission, not by a fixed limit.
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

async fn admission_gate(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    request: Request,
    next: Next,
) -> Response {
    let content_length = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    match state.admission.admit(&cluster, content_length) {
        // The permit lives until the handler has answered.
        Ok(_permit) => next.run(request).await,
        Err(rejection) => (StatusCode::TOO_MANY_REQUESTS, rejection.to_string()).into_response(),
    }
}

async fn sync_handler(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    body: Bytes,
) -> Response {
    let event = match SyncEvent::from_json(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("error decoding sync event from {cluster}: {e}");
            return (StatusCode::BAD_REQUEST, format!("Invalid sync event: {e}")).into_response();
        }
    };

    match state.engine.sync(&cluster, event).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!(cluster, "error processing sync: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE).into_response()
        }
    }
}
