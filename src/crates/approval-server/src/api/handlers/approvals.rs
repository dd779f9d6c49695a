//! Stage-1 approval endpoint handlers

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    response::IntoResponse,
    Json,
};
use hitl_checkpoint::Stage;

use crate::api::{
    error::ApiResult,
    models::{PollQuery, RemindRequest, SubmitRequest},
    response,
    routes::AppState,
};
use crate::services::PauseRequest;

/// Open a checkpoint for a paused run
///
/// POST /approvals/checkpoints
pub async fn create_checkpoint(
    State(state): State<AppState>,
    payload: Result<Json<PauseRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let outcome = state.approvals.pause(request).await?;
    Ok(response::created(outcome))
}

/// Poll a run, sending the automatic reminder when due
///
/// GET /approvals/poll?run_id=
pub async fn poll(
    State(state): State<AppState>,
    query: Result<Query<PollQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let run_id = query.run_id()?;
    let view = state.approvals.poll(&run_id).await?;
    Ok(response::ok(view))
}

/// Send a manual reminder
///
/// POST /approvals/remind
pub async fn remind(
    State(state): State<AppState>,
    payload: Result<Json<RemindRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let run_id = request.run_id()?;
    let receipt = state.approvals.remind(&run_id).await?;
    Ok(response::ok(receipt))
}

/// Stage-1 decision from an emailed link
///
/// GET /approvals/submit?token=&action=[&reason=&signer=]
pub async fn submit_link(
    State(state): State<AppState>,
    query: Result<Query<SubmitRequest>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(request) = query?;
    submit(&state, Stage::Stage1, request).await
}

/// Stage-1 decision from the UI
///
/// POST /approvals/submit
pub async fn submit_form(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    submit(&state, Stage::Stage1, request).await
}

/// Shared by the stage-1 and EDD submit endpoints
pub(crate) async fn submit(
    state: &AppState,
    stage: Stage,
    request: SubmitRequest,
) -> ApiResult<axum::response::Response> {
    let submission = request.into_submission()?;
    let result = state.approvals.submit(stage, submission).await?;
    Ok(response::ok(result).into_response())
}
