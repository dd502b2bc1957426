use std::collections::HashMap;

use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    course,
    error::Result,
    progress::{self, WatchStatus},
};

pub const NOT_ENROLLED: &str = "User is not enrolled in this course";
pub const NO_VIDEOS: &str = "Course has no videos";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Eligibility {
    pub eligible: bool,
    /// Every unmet requirement, in course order
    pub missing_reasons: Vec<String>,
}

impl Eligibility {
    fn from_reasons(missing_reasons: Vec<String>) -> Self {
        Self {
            eligible: missing_reasons.is_empty(),
            missing_reasons,
        }
    }
}

/// All-or-nothing check: every video watched to the end with its quiz passed.
#[derive(Clone)]
pub struct EligibilityEvaluator {
    database: SqlitePool,
}

impl EligibilityEvaluator {
    pub fn new(database: SqlitePool) -> Self {
        Self { database }
    }

    pub async fn evaluate(&self, user_id: i64, course_id: i64) -> Result<Eligibility> {
        let Some(enrollment) = progress::find_enrollment(&self.database, user_id, course_id).await?
        else {
            return Ok(Eligibility::from_reasons(vec![NOT_ENROLLED.to_string()]));
        };
        let videos = course::list_videos(&self.database, course_id).await?;
        if videos.is_empty() {
            return Ok(Eligibility::from_reasons(vec![NO_VIDEOS.to_string()]));
        }
        let progress: HashMap<i64, _> = progress::progress_for_enrollment(&self.database, enrollment.id)
            .await?
            .into_iter()
            .map(|record| (record.video_id, record))
            .collect();

        let mut missing = Vec::new();
        for video in &videos {
            let Some(record) = progress.get(&video.id) else {
                missing.push(format!("Video '{}' not started", video.title));
                continue;
            };
            if record.watch_status != WatchStatus::Watched {
                missing.push(format!("Video '{}' not fully watched", video.title));
            }
            if !record.is_quiz_passed {
                missing.push(format!("Video '{}' quiz not passed", video.title));
            }
        }
        Ok(Eligibility::from_reasons(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        progress::{complete_video, start_video},
        testing::{memory_pool, seed_course, set_quiz},
    };

    #[tokio::test]
    async fn not_enrolled_is_the_only_reason() {
        let database = memory_pool().await;
        let seed = seed_course(&database, 2).await;
        let eligibility = EligibilityEvaluator::new(database)
            .evaluate(seed.student, seed.course)
            .await
            .unwrap();
        assert!(!eligibility.eligible);
        assert_eq!(eligibility.missing_reasons, [NOT_ENROLLED]);
    }

    #[tokio::test]
    async fn course_without_videos() {
        let database = memory_pool().await;
        let seed = seed_course(&database, 0).await;
        progress::ensure_enrollment(&database, seed.student, seed.course)
            .await
            .unwrap();
        let eligibility = EligibilityEvaluator::new(database)
            .evaluate(seed.student, seed.course)
            .await
            .unwrap();
        assert_eq!(eligibility.missing_reasons, [NO_VIDEOS]);
    }

    #[tokio::test]
    async fn unwatched_and_unpassed_videos_are_both_reported() {
        let database = memory_pool().await;
        let seed = seed_course(&database, 3).await;
        set_quiz(&database, seed.videos[2]).await;
        complete_video(&database, seed.student, seed.videos[0]).await.unwrap();
        complete_video(&database, seed.student, seed.videos[2]).await.unwrap();

        let evaluator = EligibilityEvaluator::new(database.clone());
        let eligibility = evaluator.evaluate(seed.student, seed.course).await.unwrap();
        assert!(!eligibility.eligible);
        assert_eq!(
            eligibility.missing_reasons,
            ["Video 'Video 2' not started", "Video 'Video 3' quiz not passed"]
        );

        // a started video still misses its watch and its auto-pass
        start_video(&database, seed.student, seed.videos[1]).await.unwrap();
        let eligibility = evaluator.evaluate(seed.student, seed.course).await.unwrap();
        assert_eq!(
            eligibility.missing_reasons,
            [
                "Video 'Video 2' not fully watched",
                "Video 'Video 2' quiz not passed",
                "Video 'Video 3' quiz not passed",
            ]
        );
    }

    #[tokio::test]
    async fn single_watched_video_with_failed_quiz() {
        let database = memory_pool().await;
        let seed = seed_course(&database, 1).await;
        set_quiz(&database, seed.videos[0]).await;
        complete_video(&database, seed.student, seed.videos[0]).await.unwrap();

        let eligibility = EligibilityEvaluator::new(database)
            .evaluate(seed.student, seed.course)
            .await
            .unwrap();
        assert!(!eligibility.eligible);
        assert_eq!(eligibility.missing_reasons, ["Video 'Video 1' quiz not passed"]);
    }

    #[tokio::test]
    async fn unstarted_video_has_a_single_reason() {
        let database = memory_pool().await;
        let seed = seed_course(&database, 2).await;
        complete_video(&database, seed.student, seed.videos[0]).await.unwrap();

        let eligibility = EligibilityEvaluator::new(database.clone())
            .evaluate(seed.student, seed.course)
            .await
            .unwrap();
        assert_eq!(eligibility.missing_reasons, ["Video 'Video 2' not started"]);

        complete_video(&database, seed.student, seed.videos[1]).await.unwrap();
        let eligibility = EligibilityEvaluator::new(database)
            .evaluate(seed.student, seed.course)
            .await
            .unwrap();
        assert!(eligibility.eligible);
        assert!(eligibility.missing_reasons.is_empty());
    }
}
