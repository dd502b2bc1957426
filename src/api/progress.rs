use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    routing::post,
};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{ApiResult, CallerId};
use crate::{
    progress::{self, ProgressRecord, QuizResult},
    server::AppState,
};

#[derive(Deserialize, ToSchema)]
pub struct VideoRequest {
    pub video_id: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct HeartbeatRequest {
    pub video_id: i64,
    pub seconds_watched: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct QuizSubmission {
    pub video_id: i64,
    /// Chosen option text keyed by question index
    pub answers: BTreeMap<usize, String>,
}

#[utoipa::path(
    context_path = "/api/progress",
    path = "/start",
    method(post),
    request_body = VideoRequest,
    params(("x-user-id" = i64, Header, description = "Calling user")),
    responses(
        (status = 200, description = "Progress after pressing play", body = ProgressRecord),
        (status = 404, description = "Video not found")
    )
)]
pub async fn start(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Json(req): Json<VideoRequest>,
) -> ApiResult<ProgressRecord> {
    Ok(Json(
        progress::start_video(&state.database, user_id, req.video_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/progress",
    path = "/heartbeat",
    method(post),
    request_body = HeartbeatRequest,
    params(("x-user-id" = i64, Header, description = "Calling user")),
    responses(
        (status = 200, description = "Watch time recorded", body = ProgressRecord),
        (status = 404, description = "Video not found")
    )
)]
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<ProgressRecord> {
    Ok(Json(
        progress::update_watch_time(&state.database, user_id, req.video_id, req.seconds_watched)
            .await?,
    ))
}

#[utoipa::path(
    context_path = "/api/progress",
    path = "/complete",
    method(post),
    request_body = VideoRequest,
    params(("x-user-id" = i64, Header, description = "Calling user")),
    responses(
        (status = 200, description = "Video marked watched", body = ProgressRecord),
        (status = 404, description = "Video not found")
    )
)]
pub async fn complete(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Json(req): Json<VideoRequest>,
) -> ApiResult<ProgressRecord> {
    Ok(Json(
        progress::complete_video(&state.database, user_id, req.video_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/progress",
    path = "/quiz/submit",
    method(post),
    request_body = QuizSubmission,
    params(("x-user-id" = i64, Header, description = "Calling user")),
    responses(
        (status = 200, description = "Graded attempt", body = QuizResult),
        (status = 404, description = "Video or quiz not found")
    )
)]
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Json(req): Json<QuizSubmission>,
) -> ApiResult<QuizResult> {
    Ok(Json(
        progress::submit_quiz(&state.database, user_id, req.video_id, &req.answers).await?,
    ))
}

pub fn get_progress_scope() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/progress",
        Router::new()
            .route("/start", post(start))
            .route("/heartbeat", post(heartbeat))
            .route("/complete", post(complete))
            .route("/quiz/submit", post(submit_quiz)),
    )
}
