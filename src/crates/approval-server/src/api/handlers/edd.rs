//! Enhanced due diligence endpoint handlers
//!
//! Same request shape as the stage-1 submit endpoints; only EDD tokens are
//! accepted here.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    response::IntoResponse,
    Json,
};
use hitl_checkpoint::Stage;

use super::approvals::submit;
use crate::api::{error::ApiResult, models::SubmitRequest, routes::AppState};

/// EDD decision from an emailed link
///
/// GET /edd/submit?token=&action=[&reason=&signer=]
pub async fn submit_link(
    State(state): State<AppState>,
    query: Result<Query<SubmitRequest>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(request) = query?;
    submit(&state, Stage::Edd, request).await
}

/// EDD decision from the UI
///
/// POST /edd/submit
pub async fn submit_form(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    submit(&state, Stage::Edd, request).await
}
