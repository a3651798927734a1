use axum::extract::State;
use axum::response::Json;

use crate::app_state::AppState;
use crate::models::WorkerFleetSnapshot;

pub async fn get_worker_status(State(state): State<AppState>) -> Json<WorkerFleetSnapshot> {
    Json(state.status_cache.snapshot().await)
}
