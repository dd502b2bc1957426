use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use super::{ApiResult, CallerId};
use crate::{
    analysis::batch::{ProcessReport, StatusSummary, status_summary},
    analytics::{self, StudentAnalyticsRow},
    certificate::{Certificate, eligibility::Eligibility},
    course,
    server::AppState,
};

#[utoipa::path(
    context_path = "/api/courses",
    path = "/{id}/analyze",
    method(post),
    params(
        ("id" = i64, Path, description = "Course id"),
        ("x-user-id" = i64, Header, description = "Calling user, must be the course creator")
    ),
    responses(
        (status = 200, description = "Pending videos analyzed", body = ProcessReport),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "Course not found")
    )
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Path(course_id): Path<i64>,
) -> ApiResult<ProcessReport> {
    course::get_owned_course(&state.database, course_id, user_id).await?;
    Ok(Json(state.batch.process_pending(course_id).await?))
}

#[utoipa::path(
    context_path = "/api/courses",
    path = "/{id}/analysis-status",
    method(get),
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 200, description = "Video counts by analysis status", body = StatusSummary),
        (status = 404, description = "Course not found")
    )
)]
pub async fn analysis_status(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
) -> ApiResult<StatusSummary> {
    Ok(Json(status_summary(&state.database, course_id).await?))
}

#[utoipa::path(
    context_path = "/api/courses",
    path = "/{id}/analytics",
    method(get),
    params(
        ("id" = i64, Path, description = "Course id"),
        ("x-user-id" = i64, Header, description = "Calling user, must be the course creator")
    ),
    responses(
        (status = 200, description = "Progress of every enrolled student", body = Vec<StudentAnalyticsRow>),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "Course not found")
    )
)]
pub async fn analytics(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Path(course_id): Path<i64>,
) -> ApiResult<Vec<StudentAnalyticsRow>> {
    Ok(Json(
        analytics::course_analytics(&state.database, user_id, course_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/courses",
    path = "/{id}/eligibility",
    method(get),
    params(
        ("id" = i64, Path, description = "Course id"),
        ("x-user-id" = i64, Header, description = "Calling user")
    ),
    responses(
        (status = 200, description = "Whether the caller may get a certificate", body = Eligibility)
    )
)]
pub async fn eligibility(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Path(course_id): Path<i64>,
) -> ApiResult<Eligibility> {
    Ok(Json(
        state.issuer.eligibility().evaluate(user_id, course_id).await?,
    ))
}

#[utoipa::path(
    context_path = "/api/courses",
    path = "/{id}/certificate",
    method(post),
    params(
        ("id" = i64, Path, description = "Course id"),
        ("x-user-id" = i64, Header, description = "Calling user")
    ),
    responses(
        (status = 200, description = "The caller's certificate, issued now or earlier", body = Certificate),
        (status = 400, description = "Not eligible, with the missing requirements"),
        (status = 502, description = "Rendering or upload failed")
    )
)]
pub async fn issue_certificate(
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Path(course_id): Path<i64>,
) -> ApiResult<Certificate> {
    Ok(Json(state.issuer.issue(user_id, course_id).await?))
}

pub fn get_courses_scope() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/courses",
        Router::new()
            .route("/{id}/analyze", post(analyze))
            .route("/{id}/analysis-status", get(analysis_status))
            .route("/{id}/analytics", get(analytics))
            .route("/{id}/eligibility", get(eligibility))
            .route("/{id}/certificate", post(issue_certificate)),
    )
}
