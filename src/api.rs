pub mod certificates;
pub mod courses;
pub mod progress;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;
use utoipa::OpenApi;

use crate::{error::Error, server::AppState};

/// Header carrying the authenticated user id, set by the gateway in front of this service
pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the calling user
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .map(CallerId)
            .ok_or((StatusCode::UNAUTHORIZED, "missing or invalid x-user-id header"))
    }
}

pub struct ApiError(Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Ineligible { .. } => StatusCode::BAD_REQUEST,
            Error::ExternalBackend(_) | Error::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) | Error::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match self.0 {
            Error::Ineligible { missing } => json!({
                "message": "Not eligible for certificate yet",
                "missing_requirements": missing,
            }),
            e if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %e, "request failed");
                json!({ "message": "Internal server error" })
            }
            e => {
                if status == StatusCode::BAD_GATEWAY {
                    error!(error = %e, "backend failure");
                }
                json!({ "message": e.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(OpenApi)]
#[openapi(
    paths(
        courses::analyze,
        courses::analysis_status,
        courses::analytics,
        courses::eligibility,
        courses::issue_certificate,
        certificates::verify,
        progress::start,
        progress::heartbeat,
        progress::complete,
        progress::submit_quiz,
    ),
    info(title = "course-certify", description = "Video course analysis and certificates")
)]
pub struct ApiDoc;

pub fn get_openapi_json() -> anyhow::Result<String> {
    Ok(ApiDoc::openapi().to_pretty_json()?)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(courses::get_courses_scope())
                .merge(certificates::get_certificates_scope())
                .merge(progress::get_progress_scope()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        analysis::AnalysisPipeline,
        config::Config,
        quiz::sample_quiz,
        testing::{FakeQuiz, FakeRenderer, FakeTranscripts, FakeUploader, FakeVideo, Seed, memory_pool, seed_course},
    };

    async fn app(videos: usize) -> (Router, Seed) {
        let database = memory_pool().await;
        let seed = seed_course(&database, videos).await;
        let transcripts = (1..=videos).map(|i| format!("yt-{i}")).collect::<Vec<_>>();
        let pipeline = AnalysisPipeline::new(
            Arc::new(FakeTranscripts::with(transcripts.iter().map(|id| (id.as_str(), "a lesson")))),
            Arc::new(FakeQuiz::returning(sample_quiz())),
            Arc::new(FakeVideo::unavailable()),
            12_000,
            Duration::from_secs(5),
        );
        let state = AppState::new(
            database,
            Arc::new(pipeline),
            Arc::new(FakeRenderer::default()),
            Arc::new(FakeUploader::default()),
            &Config::default(),
        );
        (router(Arc::new(state)), seed)
    }

    async fn call(app: &Router, method: Method, uri: &str, user: Option<i64>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(USER_ID_HEADER, user.to_string());
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn caller_header_is_required() {
        let (app, seed) = app(1).await;
        let uri = format!("/api/courses/{}/eligibility", seed.course);
        let (status, _) = call(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn only_creator_may_analyze() {
        let (app, seed) = app(2).await;
        let uri = format!("/api/courses/{}/analyze", seed.course);
        let (status, _) = call(&app, Method::POST, &uri, Some(seed.student), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, report) = call(&app, Method::POST, &uri, Some(seed.creator), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["processed"], 2);
        assert_eq!(report["details"][0]["method"], "primary");
        assert_eq!(report["details"][0]["status"], "COMPLETED");

        let uri = format!("/api/courses/{}/analysis-status", seed.course);
        let (status, summary) = call(&app, Method::GET, &uri, Some(seed.student), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["with_quiz"], 2);
    }

    #[tokio::test]
    async fn ineligible_certificate_lists_requirements() {
        let (app, seed) = app(1).await;
        let uri = format!("/api/courses/{}/certificate", seed.course);
        let (status, body) = call(&app, Method::POST, &uri, Some(seed.student), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["missing_requirements"],
            serde_json::json!(["User is not enrolled in this course"])
        );
    }

    #[tokio::test]
    async fn watch_pass_and_certify() {
        let (app, seed) = app(1).await;
        let video = seed.videos[0];
        let analyze = format!("/api/courses/{}/analyze", seed.course);
        call(&app, Method::POST, &analyze, Some(seed.creator), None).await;

        let body = serde_json::json!({ "video_id": video });
        let (status, record) =
            call(&app, Method::POST, "/api/progress/start", Some(seed.student), Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["watch_status"], "IN_PROGRESS");
        let heartbeat = serde_json::json!({ "video_id": video, "seconds_watched": 120 });
        call(&app, Method::POST, "/api/progress/heartbeat", Some(seed.student), Some(heartbeat)).await;
        let (_, record) = call(&app, Method::POST, "/api/progress/complete", Some(seed.student), Some(body)).await;
        assert_eq!(record["is_quiz_passed"], false);

        let answers = serde_json::json!({
            "video_id": video,
            "answers": { "0": "B0", "1": "B1", "2": "B2", "3": "B3", "4": "B4" },
        });
        let (status, result) =
            call(&app, Method::POST, "/api/progress/quiz/submit", Some(seed.student), Some(answers)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["score"], 100);

        let eligibility = format!("/api/courses/{}/eligibility", seed.course);
        let (_, body) = call(&app, Method::GET, &eligibility, Some(seed.student), None).await;
        assert_eq!(body["eligible"], true);

        let issue = format!("/api/courses/{}/certificate", seed.course);
        let (status, certificate) = call(&app, Method::POST, &issue, Some(seed.student), None).await;
        assert_eq!(status, StatusCode::OK);
        let id = certificate["id"].as_str().unwrap().to_string();
        let (_, again) = call(&app, Method::POST, &issue, Some(seed.student), None).await;
        assert_eq!(again["id"], id.as_str());

        let (status, view) = call(&app, Method::GET, &format!("/api/certificates/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["student_name"], "Grace Hopper");
        assert_eq!(view["course_title"], "Rust 101");

        let unknown = format!("/api/certificates/{}", uuid::Uuid::new_v4());
        let (status, _) = call(&app, Method::GET, &unknown, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn openapi_lists_routes() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("/api/courses/{id}/analyze"));
        assert!(json.contains("/api/certificates/{id}"));
    }
}
