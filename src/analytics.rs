use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{course, error::Result, utils::round1};

/// One enrolled student, as seen by the course creator
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentAnalyticsRow {
    pub student_name: String,
    pub student_email: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub enrolled_at: OffsetDateTime,
    /// Share of the course videos watched to the end, 0-100
    pub completion_percentage: f64,
    /// Mean of the latest quiz scores, absent before the first attempt
    pub average_quiz_score: Option<f64>,
    pub certificate_issued: bool,
}

#[derive(sqlx::FromRow)]
struct EnrollmentStats {
    student_name: String,
    student_email: String,
    enrolled_at: OffsetDateTime,
    watched: i64,
    average_quiz_score: Option<f64>,
    certificate_issued: bool,
}

/// Per-student progress of a course. Only its creator may look.
pub async fn course_analytics(
    database: &SqlitePool,
    creator_id: i64,
    course_id: i64,
) -> Result<Vec<StudentAnalyticsRow>> {
    course::get_owned_course(database, course_id, creator_id).await?;
    let total_videos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM video WHERE course_id = ?")
        .bind(course_id)
        .fetch_one(database)
        .await?;
    let stats = sqlx::query_as::<_, EnrollmentStats>(
        "SELECT u.full_name AS student_name, u.email AS student_email, e.created_at AS enrolled_at, \
            COALESCE(SUM(p.watch_status = 'WATCHED'), 0) AS watched, \
            AVG(p.quiz_score) AS average_quiz_score, \
            e.is_completed AS certificate_issued \
         FROM enrollment e \
         JOIN app_user u ON u.id = e.user_id \
         LEFT JOIN video_progress p ON p.enrollment_id = e.id \
         WHERE e.course_id = ? \
         GROUP BY e.id \
         ORDER BY e.created_at, e.id",
    )
    .bind(course_id)
    .fetch_all(database)
    .await?;

    let total = total_videos.max(1) as f64;
    Ok(stats
        .into_iter()
        .map(|s| StudentAnalyticsRow {
            student_name: s.student_name,
            student_email: s.student_email,
            enrolled_at: s.enrolled_at,
            completion_percentage: round1((s.watched as f64 / total * 100.0).min(100.0)),
            average_quiz_score: s.average_quiz_score.map(round1),
            certificate_issued: s.certificate_issued,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        error::Error,
        progress::{complete_video, start_video, submit_quiz},
        testing::{memory_pool, seed_course, set_quiz},
    };

    #[tokio::test]
    async fn completion_and_scores_are_rounded() {
        let database = memory_pool().await;
        let seed = seed_course(&database, 3).await;
        set_quiz(&database, seed.videos[0]).await;
        set_quiz(&database, seed.videos[1]).await;
        complete_video(&database, seed.student, seed.videos[0]).await.unwrap();
        start_video(&database, seed.student, seed.videos[1]).await.unwrap();

        let four_right: BTreeMap<usize, String> = (0..4).map(|i| (i, format!("B{i}"))).collect();
        let one_right: BTreeMap<usize, String> = BTreeMap::from([(0, "B0".to_string())]);
        submit_quiz(&database, seed.student, seed.videos[0], &four_right).await.unwrap();
        submit_quiz(&database, seed.student, seed.videos[1], &one_right).await.unwrap();

        let rows = course_analytics(&database, seed.creator, seed.course).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.student_name, "Grace Hopper");
        assert_eq!(row.student_email, "grace@example.com");
        assert_eq!(row.completion_percentage, 33.3);
        // (80 + 20) / 2
        assert_eq!(row.average_quiz_score, Some(50.0));
        assert!(!row.certificate_issued);
    }

    #[tokio::test]
    async fn student_without_attempts_has_no_average() {
        let database = memory_pool().await;
        let seed = seed_course(&database, 2).await;
        start_video(&database, seed.student, seed.videos[0]).await.unwrap();
        let rows = course_analytics(&database, seed.creator, seed.course).await.unwrap();
        assert_eq!(rows[0].completion_percentage, 0.0);
        assert_eq!(rows[0].average_quiz_score, None);
    }

    #[tokio::test]
    async fn only_the_creator_may_look() {
        let database = memory_pool().await;
        let seed = seed_course(&database, 1).await;
        assert!(matches!(
            course_analytics(&database, seed.student, seed.course).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            course_analytics(&database, seed.creator, seed.course + 1).await,
            Err(Error::NotFound(_))
        ));
    }
}
