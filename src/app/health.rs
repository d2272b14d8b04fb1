use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;

use crate::worker::{StatusSnapshot, WorkerStatus};

/// `GET /` answers while the process is up; `GET /status` reports the loop.
pub fn health_router(status: WorkerStatus) -> Router {
    Router::new()
        .route("/", get(|| async { "ok\n" }))
        .route("/status", get(worker_status))
        .with_state(status)
}

async fn worker_status(State(status): State<WorkerStatus>) -> Json<StatusSnapshot> {
    Json(status.snapshot())
}
