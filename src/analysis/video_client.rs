//! Fallback backend: asks a multimodal model to watch the video itself.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    ai_utils::extract_json_object,
    analysis::quiz_client::QUIZ_INSTRUCTION,
    config::GeminiConfig,
    error::{Error, Result},
    quiz::QuizPayload,
};

/// Reply of the fallback backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoReply {
    /// Free-form text which may embed a JSON verdict
    Text(String),
    /// The backend is not configured for this deployment
    Unavailable,
}

#[async_trait]
pub trait VideoInference: Send + Sync {
    async fn infer(&self, external_id: &str, title: &str, duration_seconds: i64) -> Result<VideoReply>;
}

pub struct DisabledVideoInference;

#[async_trait]
impl VideoInference for DisabledVideoInference {
    async fn infer(&self, _external_id: &str, _title: &str, _duration_seconds: i64) -> Result<VideoReply> {
        Ok(VideoReply::Unavailable)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

pub struct GeminiVideoClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiVideoClient {
    pub fn new(config: GeminiConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn build_request(external_id: &str, title: &str, duration_seconds: i64) -> GenerateContentRequest {
        let url = video_url(external_id);
        let prompt = format!(
            "Analyze this video and generate a quiz if it is educational content.\n\n\
             Video URL: {url}\nVideo Title: {title}\nDuration: {duration_seconds} seconds\n\n\
             {QUIZ_INSTRUCTION}\n\n\
             Respond with a JSON object with the fields has_quiz, reason and questions \
             (each question has q, options and answer)."
        );
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(prompt),
                        file_data: None,
                    },
                    Part {
                        text: None,
                        file_data: Some(FileData {
                            mime_type: "video/mp4".to_string(),
                            file_uri: url,
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig { temperature: 0.7 },
        }
    }
}

pub fn video_url(external_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={external_id}")
}

#[async_trait]
impl VideoInference for GeminiVideoClient {
    async fn infer(&self, external_id: &str, title: &str, duration_seconds: i64) -> Result<VideoReply> {
        let endpoint = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let request = Self::build_request(external_id, title, duration_seconds);
        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::ExternalBackend(format!("Gemini request failed: {e}")))?;
        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("Gemini response: {e}")))?;
        let text = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(VideoReply::Text(text))
    }
}

/// Best-effort verdict from free-form text, never an error.
pub fn payload_from_reply(text: &str) -> QuizPayload {
    let parsed = extract_json_object(text)
        .ok_or_else(|| "no JSON object in reply".to_string())
        .and_then(|json| serde_json::from_str::<QuizPayload>(json).map_err(|e| e.to_string()));
    match parsed {
        Ok(payload) => payload.normalize(),
        Err(e) => {
            let preview: String = text.chars().take(200).collect();
            warn!(error = %e, %preview, "failed to parse fallback response");
            QuizPayload::no_quiz("Failed to parse AI response")
        }
    }
}
