//! Job lookup handler

use axum::{extract::{State, Path}, Json};

use crate::{AppState, AppResult, AppError};
use crate::models::JobRecord;

/// Get a single prediction job
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<JobRecord>> {
    let ledger = state.ledger.as_ref().ok_or(AppError::ServiceUnavailable)?;

    let job = ledger
        .find(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    Ok(Json(job))
}
