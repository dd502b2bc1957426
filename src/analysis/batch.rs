use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, StreamExt, stream};
use serde::Serialize;
use sqlx::{SqlitePool, types::Json};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use super::{AnalysisMethod, AnalysisOutcome, AnalysisPipeline};
use crate::{
    course::{self, AnalysisStatus, Video},
    error::Result,
    quiz::QuizPayload,
};

const NOTHING_TO_STORE: &str = "No transcript or quiz data available";
const ALREADY_ANALYZED: &str = "already analyzed";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VideoDetail {
    pub video_id: i64,
    pub external_id: String,
    pub title: String,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<AnalysisMethod>,
    pub has_quiz: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessReport {
    pub course_id: i64,
    pub course_title: String,
    pub total_pending: usize,
    pub processed: usize,
    pub failed: usize,
    /// Videos another run finished first, their results were not stored
    pub skipped: usize,
    /// In the order the videos were selected
    pub details: Vec<VideoDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
pub struct StatusSummary {
    pub pending: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
    /// Completed videos carrying a quiz
    pub with_quiz: i64,
}

/// Row change decided for one analyzed video, applied at commit time
struct StagedUpdate {
    video_id: i64,
    status: AnalysisStatus,
    transcript: Option<String>,
    quiz: Option<Json<QuizPayload>>,
    has_quiz: bool,
}

pub struct BatchProcessor {
    database: SqlitePool,
    pipeline: Arc<AnalysisPipeline>,
    max_concurrency: usize,
}

impl BatchProcessor {
    pub fn new(database: SqlitePool, pipeline: Arc<AnalysisPipeline>, max_concurrency: usize) -> Self {
        Self {
            database,
            pipeline,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Analyze every PENDING video of a course and store the results in one transaction.
    #[instrument(skip(self))]
    pub async fn process_pending(&self, course_id: i64) -> Result<ProcessReport> {
        let course = course::get_course(&self.database, course_id).await?;
        let videos = course::pending_videos(&self.database, course_id).await?;
        let mut report = ProcessReport {
            course_id,
            course_title: course.title,
            total_pending: videos.len(),
            processed: 0,
            failed: 0,
            skipped: 0,
            details: Vec::with_capacity(videos.len()),
        };
        if videos.is_empty() {
            info!("no pending videos");
            return Ok(report);
        }

        let pipeline = &self.pipeline;
        let analyzed: Vec<(Video, Option<AnalysisOutcome>)> = stream::iter(videos)
            .map(|video| async move {
                let outcome = AssertUnwindSafe(pipeline.analyze(
                    &video.external_id,
                    &video.title,
                    video.duration_seconds,
                ))
                .catch_unwind()
                .await
                .inspect_err(|_| error!(video_id = video.id, "analysis panicked"))
                .ok();
                (video, outcome)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let staged: Vec<_> = analyzed
            .into_iter()
            .map(|(video, outcome)| stage(&video, outcome))
            .collect();

        let mut tx = self.database.begin().await?;
        for (update, mut detail) in staged {
            let result = sqlx::query(
                "UPDATE video SET analysis_status = ?, transcript = ?, quiz = ?, has_quiz = ? \
                 WHERE id = ? AND analysis_status = ?",
            )
            .bind(update.status)
            .bind(update.transcript)
            .bind(update.quiz)
            .bind(update.has_quiz)
            .bind(update.video_id)
            .bind(AnalysisStatus::Pending)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                warn!(video_id = update.video_id, "video is no longer pending, result dropped");
                let (status, has_quiz) = sqlx::query_as::<_, (AnalysisStatus, bool)>(
                    "SELECT analysis_status, has_quiz FROM video WHERE id = ?",
                )
                .bind(update.video_id)
                .fetch_one(&mut *tx)
                .await?;
                detail.status = status;
                detail.has_quiz = has_quiz;
                detail.error = Some(ALREADY_ANALYZED.to_string());
                report.skipped += 1;
            } else if update.status == AnalysisStatus::Completed {
                report.processed += 1;
            } else {
                report.failed += 1;
            }
            report.details.push(detail);
        }
        tx.commit().await?;
        info!(
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "pending videos analyzed"
        );
        Ok(report)
    }

    pub async fn status_summary(&self, course_id: i64) -> Result<StatusSummary> {
        status_summary(&self.database, course_id).await
    }
}

/// Decide what to store for one video. `None` means the analysis panicked.
fn stage(video: &Video, outcome: Option<AnalysisOutcome>) -> (StagedUpdate, VideoDetail) {
    let mut detail = VideoDetail {
        video_id: video.id,
        external_id: video.external_id.clone(),
        title: video.title.clone(),
        status: AnalysisStatus::Failed,
        method: outcome.as_ref().map(|o| o.method),
        has_quiz: false,
        error: None,
    };
    let mut update = StagedUpdate {
        video_id: video.id,
        status: AnalysisStatus::Failed,
        transcript: None,
        quiz: None,
        has_quiz: false,
    };
    match outcome {
        Some(outcome) if outcome.is_persistable() => {
            let quiz = outcome.quiz.filter(QuizPayload::is_valid_quiz);
            update.status = AnalysisStatus::Completed;
            update.has_quiz = quiz.is_some();
            update.transcript = outcome.transcript;
            update.quiz = quiz.map(Json);
            detail.status = AnalysisStatus::Completed;
            detail.has_quiz = update.has_quiz;
        }
        Some(outcome) if outcome.success => {
            detail.error = Some(NOTHING_TO_STORE.to_string());
        }
        Some(outcome) => {
            detail.error = Some(outcome.error.unwrap_or_else(|| "Unknown error".to_string()));
        }
        None => detail.error = Some("analysis panicked".to_string()),
    }
    (update, detail)
}

pub async fn status_summary(database: &SqlitePool, course_id: i64) -> Result<StatusSummary> {
    course::get_course(database, course_id).await?;
    let summary = sqlx::query_as::<_, StatusSummary>(
        "SELECT \
            COALESCE(SUM(analysis_status = 'PENDING'), 0) AS pending, \
            COALESCE(SUM(analysis_status = 'COMPLETED'), 0) AS completed, \
            COALESCE(SUM(analysis_status = 'FAILED'), 0) AS failed, \
            COUNT(*) AS total, \
            COALESCE(SUM(analysis_status = 'COMPLETED' AND has_quiz), 0) AS with_quiz \
         FROM video WHERE course_id = ?",
    )
    .bind(course_id)
    .fetch_one(database)
    .await?;
    Ok(summary)
}
