use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    course::{self, Video},
    error::{Error, Result},
    utils::now_utc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchStatus {
    NotStarted,
    InProgress,
    Watched,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub is_completed: bool,
    pub certificate_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One user's progress on one video
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct ProgressRecord {
    #[serde(skip_serializing)]
    pub id: i64,
    #[serde(skip_serializing)]
    pub enrollment_id: i64,
    pub video_id: i64,
    pub watch_status: WatchStatus,
    pub seconds_watched: i64,
    pub is_quiz_passed: bool,
    /// Latest quiz score, 0-100
    pub quiz_score: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizResult {
    pub video_id: i64,
    pub score: i64,
    pub correct: usize,
    pub total: usize,
    pub passed: bool,
    /// Whether the video quiz counts as passed, including earlier attempts
    pub is_quiz_passed: bool,
}

const PROGRESS_COLUMNS: &str =
    "id, enrollment_id, video_id, watch_status, seconds_watched, is_quiz_passed, quiz_score";

pub async fn find_enrollment(
    database: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<Option<Enrollment>> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT id, user_id, course_id, is_completed, certificate_url, created_at \
         FROM enrollment WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(database)
    .await?;
    Ok(enrollment)
}

/// Enrollments are created lazily, on the first viewing action
pub async fn ensure_enrollment(
    database: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<Enrollment> {
    course::get_user(database, user_id).await?;
    sqlx::query(
        "INSERT OR IGNORE INTO enrollment (user_id, course_id, is_completed, created_at) VALUES (?, ?, 0, ?)",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(now_utc())
    .execute(database)
    .await?;
    find_enrollment(database, user_id, course_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Enrollment of user {user_id} in course {course_id}")))
}

pub async fn progress_for_enrollment(
    database: &SqlitePool,
    enrollment_id: i64,
) -> Result<Vec<ProgressRecord>> {
    let records = sqlx::query_as::<_, ProgressRecord>(&format!(
        "SELECT {PROGRESS_COLUMNS} FROM video_progress WHERE enrollment_id = ?"
    ))
    .bind(enrollment_id)
    .fetch_all(database)
    .await?;
    Ok(records)
}

async fn get_progress(database: &SqlitePool, enrollment_id: i64, video_id: i64) -> Result<ProgressRecord> {
    sqlx::query_as::<_, ProgressRecord>(&format!(
        "SELECT {PROGRESS_COLUMNS} FROM video_progress WHERE enrollment_id = ? AND video_id = ?"
    ))
    .bind(enrollment_id)
    .bind(video_id)
    .fetch_optional(database)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Progress for video {video_id}")))
}

/// Make sure the user is enrolled and a progress row exists for the video
async fn ensure_progress(database: &SqlitePool, user_id: i64, video: &Video) -> Result<Enrollment> {
    let enrollment = ensure_enrollment(database, user_id, video.course_id).await?;
    sqlx::query("INSERT OR IGNORE INTO video_progress (enrollment_id, video_id) VALUES (?, ?)")
        .bind(enrollment.id)
        .bind(video.id)
        .execute(database)
        .await?;
    Ok(enrollment)
}

/// The user pressed play
pub async fn start_video(database: &SqlitePool, user_id: i64, video_id: i64) -> Result<ProgressRecord> {
    let video = course::get_video(database, video_id).await?;
    let enrollment = ensure_progress(database, user_id, &video).await?;
    sqlx::query(
        "UPDATE video_progress SET watch_status = ? WHERE enrollment_id = ? AND video_id = ? AND watch_status = ?",
    )
    .bind(WatchStatus::InProgress)
    .bind(enrollment.id)
    .bind(video_id)
    .bind(WatchStatus::NotStarted)
    .execute(database)
    .await?;
    get_progress(database, enrollment.id, video_id).await
}

/// Heartbeat from the player, watch time never moves backwards
pub async fn update_watch_time(
    database: &SqlitePool,
    user_id: i64,
    video_id: i64,
    seconds_watched: i64,
) -> Result<ProgressRecord> {
    let video = course::get_video(database, video_id).await?;
    let enrollment = ensure_progress(database, user_id, &video).await?;
    sqlx::query(
        "UPDATE video_progress SET seconds_watched = MAX(seconds_watched, ?), \
         watch_status = CASE WHEN watch_status = ? THEN ? ELSE watch_status END \
         WHERE enrollment_id = ? AND video_id = ?",
    )
    .bind(seconds_watched.max(0))
    .bind(WatchStatus::NotStarted)
    .bind(WatchStatus::InProgress)
    .bind(enrollment.id)
    .bind(video_id)
    .execute(database)
    .await?;
    get_progress(database, enrollment.id, video_id).await
}

/// Mark a video WATCHED. Videos without a quiz count as passed.
pub async fn complete_video(database: &SqlitePool, user_id: i64, video_id: i64) -> Result<ProgressRecord> {
    let video = course::get_video(database, video_id).await?;
    let enrollment = ensure_progress(database, user_id, &video).await?;
    let auto_pass = video.valid_quiz().is_none();
    sqlx::query(
        "UPDATE video_progress SET watch_status = ?, seconds_watched = MAX(seconds_watched, ?), \
         is_quiz_passed = (is_quiz_passed OR ?) WHERE enrollment_id = ? AND video_id = ?",
    )
    .bind(WatchStatus::Watched)
    .bind(video.duration_seconds)
    .bind(auto_pass)
    .bind(enrollment.id)
    .bind(video_id)
    .execute(database)
    .await?;
    info!(user_id, video_id, auto_pass, "video completed");
    get_progress(database, enrollment.id, video_id).await
}

/// Grade a quiz attempt. A pass is kept even if a later attempt fails.
pub async fn submit_quiz(
    database: &SqlitePool,
    user_id: i64,
    video_id: i64,
    answers: &BTreeMap<usize, String>,
) -> Result<QuizResult> {
    let video = course::get_video(database, video_id).await?;
    let quiz = video
        .valid_quiz()
        .ok_or_else(|| Error::NotFound(format!("Quiz for video {video_id}")))?;
    let grade = quiz.grade(answers);
    let enrollment = ensure_progress(database, user_id, &video).await?;
    sqlx::query(
        "UPDATE video_progress SET quiz_score = ?, is_quiz_passed = (is_quiz_passed OR ?) \
         WHERE enrollment_id = ? AND video_id = ?",
    )
    .bind(grade.score)
    .bind(grade.passed)
    .bind(enrollment.id)
    .bind(video_id)
    .execute(database)
    .await?;
    let record = get_progress(database, enrollment.id, video_id).await?;
    info!(user_id, video_id, score = grade.score, passed = grade.passed, "quiz submitted");
    Ok(QuizResult {
        video_id,
        score: grade.score,
        correct: grade.correct,
        total: grade.total,
        passed: grade.passed,
        is_quiz_passed: record.is_quiz_passed,
    })
}
