//! Turns a video identifier into a quiz verdict or a definitive failure.
//!
//! The primary path feeds the transcript to a text model. Videos without a transcript go to a
//! multimodal model that watches the video directly. A failure on the primary path is final.

pub mod batch;
pub mod quiz_client;
pub mod transcript;
pub mod video_client;

use std::{future::Future, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::quiz::QuizPayload;
use quiz_client::QuizInference;
use transcript::TranscriptSource;
use video_client::{VideoInference, VideoReply, payload_from_reply};

pub const TRUNCATION_MARKER: &str = "... [truncated]";
pub const FALLBACK_UNAVAILABLE: &str = "fallback unavailable";

/// `analysis_method` tag of quizzes built from a transcript
pub const METHOD_TRANSCRIPT: &str = "transcript";
/// `analysis_method` tag of quizzes built by watching the video
pub const METHOD_VIDEO: &str = "video_analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMethod {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub success: bool,
    pub transcript: Option<String>,
    pub quiz: Option<QuizPayload>,
    pub method: AnalysisMethod,
    pub error: Option<String>,
}

impl AnalysisOutcome {
    fn failed(method: AnalysisMethod, error: impl Into<String>) -> Self {
        Self {
            success: false,
            transcript: None,
            quiz: None,
            method,
            error: Some(error.into()),
        }
    }

    /// Worth storing: a transcript, or a complete quiz
    pub fn is_persistable(&self) -> bool {
        self.success
            && (self.transcript.is_some() || self.quiz.as_ref().is_some_and(QuizPayload::is_valid_quiz))
    }
}

pub struct AnalysisPipeline {
    transcripts: Arc<dyn TranscriptSource>,
    quiz_inference: Arc<dyn QuizInference>,
    video_inference: Arc<dyn VideoInference>,
    max_transcript_chars: usize,
    request_timeout: Duration,
}

impl AnalysisPipeline {
    pub fn new(
        transcripts: Arc<dyn TranscriptSource>,
        quiz_inference: Arc<dyn QuizInference>,
        video_inference: Arc<dyn VideoInference>,
        max_transcript_chars: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transcripts,
            quiz_inference,
            video_inference,
            max_transcript_chars,
            request_timeout,
        }
    }

    /// Analyze one video. Never fails, errors are reported in the outcome.
    #[instrument(skip(self, title), fields(title = %title))]
    pub async fn analyze(&self, external_id: &str, title: &str, duration_seconds: i64) -> AnalysisOutcome {
        let transcript = match self
            .guarded("transcript", self.transcripts.fetch(external_id))
            .await
        {
            Ok(Ok(text)) => text.filter(|t| !t.trim().is_empty()),
            Ok(Err(e)) => {
                warn!(error = %e, "transcript fetch failed, using video analysis");
                None
            }
            Err(e) => {
                warn!(error = %e, "transcript fetch timed out, using video analysis");
                None
            }
        };
        match transcript {
            Some(transcript) => self.analyze_transcript(transcript).await,
            None => self.analyze_video(external_id, title, duration_seconds).await,
        }
    }

    async fn analyze_transcript(&self, transcript: String) -> AnalysisOutcome {
        let input = truncate_transcript(&transcript, self.max_transcript_chars);
        debug!(chars = input.chars().count(), "analyzing transcript");
        match self.guarded("quiz inference", self.quiz_inference.infer(&input)).await {
            Ok(Ok(payload)) => {
                info!(has_quiz = payload.has_quiz, "transcript analyzed");
                AnalysisOutcome {
                    success: true,
                    transcript: Some(transcript),
                    quiz: Some(payload.with_method(METHOD_TRANSCRIPT)),
                    method: AnalysisMethod::Primary,
                    error: None,
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "transcript analysis failed");
                AnalysisOutcome::failed(AnalysisMethod::Primary, e.to_string())
            }
            Err(e) => AnalysisOutcome::failed(AnalysisMethod::Primary, e),
        }
    }

    async fn analyze_video(&self, external_id: &str, title: &str, duration_seconds: i64) -> AnalysisOutcome {
        let reply = self
            .guarded(
                "video inference",
                self.video_inference.infer(external_id, title, duration_seconds),
            )
            .await;
        match reply {
            Ok(Ok(VideoReply::Text(text))) => {
                let payload = payload_from_reply(&text).with_method(METHOD_VIDEO);
                info!(has_quiz = payload.has_quiz, duration_seconds, "video analyzed");
                AnalysisOutcome {
                    success: true,
                    transcript: None,
                    quiz: Some(payload),
                    method: AnalysisMethod::Fallback,
                    error: None,
                }
            }
            Ok(Ok(VideoReply::Unavailable)) => {
                warn!("no transcript and video analysis is not configured");
                AnalysisOutcome::failed(AnalysisMethod::Fallback, FALLBACK_UNAVAILABLE)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "video analysis failed");
                AnalysisOutcome::failed(AnalysisMethod::Fallback, e.to_string())
            }
            Err(e) => AnalysisOutcome::failed(AnalysisMethod::Fallback, e),
        }
    }

    async fn guarded<T>(&self, what: &str, future: impl Future<Output = T>) -> Result<T, String> {
        tokio::time::timeout(self.request_timeout, future)
            .await
            .map_err(|_| format!("{what} timed out after {:?}", self.request_timeout))
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_transcript(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}
