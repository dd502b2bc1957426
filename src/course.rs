use serde::{Deserialize, Serialize};
use sqlx::{SqlitePool, types::Json};
use utoipa::ToSchema;

use crate::{
    error::{Error, Result},
    quiz::QuizPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Course {
    pub id: i64,
    pub creator_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Video {
    pub id: i64,
    pub course_id: i64,
    /// Identifier on the hosting platform, e.g. a YouTube video id
    pub external_id: String,
    pub title: String,
    pub duration_seconds: i64,
    pub position: i64,
    pub analysis_status: AnalysisStatus,
    pub transcript: Option<String>,
    pub quiz: Option<Json<QuizPayload>>,
    pub has_quiz: bool,
}

impl Video {
    /// The stored quiz, only when it is a complete one
    pub fn valid_quiz(&self) -> Option<&QuizPayload> {
        self.quiz
            .as_ref()
            .map(|quiz| &quiz.0)
            .filter(|quiz| self.has_quiz && quiz.is_valid_quiz())
    }
}

const VIDEO_COLUMNS: &str = "id, course_id, external_id, title, duration_seconds, position, \
    analysis_status, transcript, quiz, has_quiz";

pub async fn find_course(database: &SqlitePool, course_id: i64) -> Result<Option<Course>> {
    let course = sqlx::query_as::<_, Course>("SELECT id, creator_id, title FROM course WHERE id = ?")
        .bind(course_id)
        .fetch_optional(database)
        .await?;
    Ok(course)
}

pub async fn get_course(database: &SqlitePool, course_id: i64) -> Result<Course> {
    find_course(database, course_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Course {course_id}")))
}

/// Load a course and check that `user_id` created it
pub async fn get_owned_course(database: &SqlitePool, course_id: i64, user_id: i64) -> Result<Course> {
    let course = get_course(database, course_id).await?;
    if course.creator_id != user_id {
        return Err(Error::Forbidden(format!(
            "user {user_id} does not own course {course_id}"
        )));
    }
    Ok(course)
}

pub async fn get_user(database: &SqlitePool, user_id: i64) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT id, full_name, email FROM app_user WHERE id = ?")
        .bind(user_id)
        .fetch_optional(database)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {user_id}")))
}

pub async fn get_video(database: &SqlitePool, video_id: i64) -> Result<Video> {
    sqlx::query_as::<_, Video>(&format!("SELECT {VIDEO_COLUMNS} FROM video WHERE id = ?"))
        .bind(video_id)
        .fetch_optional(database)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Video {video_id}")))
}

/// All videos of a course in playlist order
pub async fn list_videos(database: &SqlitePool, course_id: i64) -> Result<Vec<Video>> {
    let videos = sqlx::query_as::<_, Video>(&format!(
        "SELECT {VIDEO_COLUMNS} FROM video WHERE course_id = ? ORDER BY position, id"
    ))
    .bind(course_id)
    .fetch_all(database)
    .await?;
    Ok(videos)
}

/// Videos still waiting for analysis, in the order they are selected for processing
pub async fn pending_videos(database: &SqlitePool, course_id: i64) -> Result<Vec<Video>> {
    let videos = sqlx::query_as::<_, Video>(&format!(
        "SELECT {VIDEO_COLUMNS} FROM video WHERE course_id = ? AND analysis_status = ? ORDER BY position, id"
    ))
    .bind(course_id)
    .bind(AnalysisStatus::Pending)
    .fetch_all(database)
    .await?;
    Ok(videos)
}

pub async fn create_user(database: &SqlitePool, full_name: &str, email: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO app_user (full_name, email) VALUES (?, ?)")
        .bind(full_name)
        .bind(email)
        .execute(database)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn create_course(database: &SqlitePool, creator_id: i64, title: &str) -> Result<i64> {
    get_user(database, creator_id).await?;
    let result = sqlx::query("INSERT INTO course (creator_id, title) VALUES (?, ?)")
        .bind(creator_id)
        .bind(title)
        .execute(database)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Append a PENDING video at the end of the course playlist
pub async fn add_video(
    database: &SqlitePool,
    course_id: i64,
    external_id: &str,
    title: &str,
    duration_seconds: i64,
) -> Result<i64> {
    get_course(database, course_id).await?;
    let result = sqlx::query(
        "INSERT INTO video (course_id, external_id, title, duration_seconds, position) \
         VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(position), 0) + 1 FROM video WHERE course_id = ?))",
    )
    .bind(course_id)
    .bind(external_id)
    .bind(title)
    .bind(duration_seconds)
    .bind(course_id)
    .execute(database)
    .await?;
    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pool;

    #[tokio::test]
    async fn videos_keep_playlist_order() {
        let database = memory_pool().await;
        let creator = create_user(&database, "Ada", "ada@example.com").await.unwrap();
        let course = create_course(&database, creator, "Rust 101").await.unwrap();
        let first = add_video(&database, course, "yt-a", "Intro", 60).await.unwrap();
        let second = add_video(&database, course, "yt-b", "Ownership", 600).await.unwrap();

        let videos = list_videos(&database, course).await.unwrap();
        assert_eq!(videos.iter().map(|v| v.id).collect::<Vec<_>>(), [first, second]);
        assert_eq!(videos[1].position, 2);
        assert!(videos.iter().all(|v| v.analysis_status == AnalysisStatus::Pending));
        assert!(videos.iter().all(|v| v.quiz.is_none() && !v.has_quiz));
        assert_eq!(pending_videos(&database, course).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ownership_is_checked() {
        let database = memory_pool().await;
        let creator = create_user(&database, "Ada", "ada@example.com").await.unwrap();
        let other = create_user(&database, "Bob", "bob@example.com").await.unwrap();
        let course = create_course(&database, creator, "Rust 101").await.unwrap();

        assert!(get_owned_course(&database, course, creator).await.is_ok());
        assert!(matches!(
            get_owned_course(&database, course, other).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            get_owned_course(&database, course + 1, creator).await,
            Err(Error::NotFound(_))
        ));
    }
}
