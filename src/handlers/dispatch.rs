use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::CoreError;

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub priority: u8,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub message_id: String,
}

fn status_for(error: &CoreError) -> StatusCode {
    match error {
        CoreError::SubmissionNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::IllegalState(_) | CoreError::AlreadyEvaluated(_) => StatusCode::CONFLICT,
        CoreError::SubmissionIdOverflow(_) => StatusCode::BAD_REQUEST,
        CoreError::UnknownLanguage(_) | CoreError::TaskNotReady(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn dispatch_submission(
    State(state): State<AppState>,
    Path(submission_id): Path<u64>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, (StatusCode, String)> {
    match state.dispatch.dispatch(submission_id, request.priority).await {
        Ok(message_id) => Ok(Json(DispatchResponse { message_id })),
        Err(e) => {
            tracing::error!("dispatch of submission {} failed: {}", submission_id, e);
            Err((status_for(&e), e.to_string()))
        }
    }
}
