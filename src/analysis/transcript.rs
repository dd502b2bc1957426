use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Languages asked for, in order of preference. The sidecar falls back to any language.
pub const PREFERRED_LANGUAGES: [&str; 5] = ["en", "en-US", "en-GB", "hi", "en-IN"];

/// Where video transcripts come from.
///
/// "No transcript in any language" is a normal outcome and must be `Ok(None)`;
/// `Err` is reserved for transport failures.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, external_id: &str) -> anyhow::Result<Option<String>>;
}

/// Used when no transcript service is configured, every video goes to the fallback path.
pub struct DisabledTranscriptSource;

#[async_trait]
impl TranscriptSource for DisabledTranscriptSource {
    async fn fetch(&self, _external_id: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    text: String,
}

/// Client for a transcript sidecar exposing `GET /transcripts/{id}?languages=...`
pub struct HttpTranscriptSource {
    client: Client,
    base_url: String,
}

impl HttpTranscriptSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TranscriptSource for HttpTranscriptSource {
    async fn fetch(&self, external_id: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/transcripts/{}", self.base_url, external_id);
        let response = self
            .client
            .get(&url)
            .query(&[("languages", PREFERRED_LANGUAGES.join(","))])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(external_id, "no transcript available");
            return Ok(None);
        }
        let body: TranscriptResponse = response.error_for_status()?.json().await?;
        Ok(join_segments(body.segments.iter().map(|s| s.text.as_str())))
    }
}

/// Join caption segments into one text, `None` if nothing but whitespace remains
fn join_segments<'a>(segments: impl Iterator<Item = &'a str>) -> Option<String> {
    let text = segments
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_joined_with_spaces() {
        let text = join_segments(["hello ", " world", "", "again"].into_iter());
        assert_eq!(text.as_deref(), Some("hello world again"));
    }

    #[test]
    fn blank_transcript_is_absent() {
        assert_eq!(join_segments(["  ", "\n"].into_iter()), None);
        assert_eq!(join_segments(std::iter::empty()), None);
    }

    #[test]
    fn response_without_segments_parses() {
        let body: TranscriptResponse = serde_json::from_str("{}").unwrap();
        assert!(body.segments.is_empty());
    }

    #[tokio::test]
    async fn disabled_source_never_returns_text() {
        assert!(DisabledTranscriptSource.fetch("abc").await.unwrap().is_none());
    }
}
