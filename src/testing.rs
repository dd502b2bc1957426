//! Fixtures shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions, types::Json};

use crate::{
    analysis::{
        quiz_client::QuizInference,
        transcript::TranscriptSource,
        video_client::{VideoInference, VideoReply},
    },
    certificate::artifact::{ArtifactUploader, CertificateFields, CertificateRenderer},
    course,
    error::{Error, Result},
    progress,
    quiz::{QuizPayload, sample_quiz},
};

/// Fresh in-memory database with the schema applied.
///
/// A single connection that never expires, so every query sees the same memory database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub struct Seed {
    pub creator: i64,
    pub student: i64,
    pub course: i64,
    pub videos: Vec<i64>,
}

/// A course by one user, with `videos` PENDING videos titled "Video 1".."Video n", and a second user.
pub async fn seed_course(database: &SqlitePool, videos: usize) -> Seed {
    let creator = course::create_user(database, "Ada Lovelace", "ada@example.com")
        .await
        .unwrap();
    let student = course::create_user(database, "Grace Hopper", "grace@example.com")
        .await
        .unwrap();
    let course = course::create_course(database, creator, "Rust 101").await.unwrap();
    let mut ids = Vec::with_capacity(videos);
    for i in 1..=videos {
        let id = course::add_video(database, course, &format!("yt-{i}"), &format!("Video {i}"), 300)
            .await
            .unwrap();
        ids.push(id);
    }
    Seed {
        creator,
        student,
        course,
        videos: ids,
    }
}

/// Attach the sample quiz to a video, as a completed analysis would
pub async fn set_quiz(database: &SqlitePool, video_id: i64) {
    sqlx::query("UPDATE video SET analysis_status = 'COMPLETED', quiz = ?, has_quiz = 1 WHERE id = ?")
        .bind(Json(sample_quiz()))
        .bind(video_id)
        .execute(database)
        .await
        .unwrap();
}

/// The student watches every video of the seed to the end
pub async fn complete_everything(database: &SqlitePool, seed: &Seed) {
    for &video in &seed.videos {
        progress::complete_video(database, seed.student, video).await.unwrap();
    }
}

#[derive(Default)]
pub struct FakeTranscripts {
    transcripts: HashMap<String, String>,
    broken: bool,
    pub calls: AtomicUsize,
}

impl FakeTranscripts {
    pub fn with<'a>(transcripts: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            transcripts: transcripts
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TranscriptSource for FakeTranscripts {
    async fn fetch(&self, external_id: &str) -> anyhow::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(anyhow!("transcript service unreachable"));
        }
        Ok(self.transcripts.get(external_id).cloned())
    }
}

pub struct FakeQuiz {
    reply: Option<QuizPayload>,
    /// Panics when the input contains this text
    panic_on: Option<String>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub last_input: Mutex<Option<String>>,
}

impl FakeQuiz {
    pub fn returning(payload: QuizPayload) -> Self {
        Self {
            reply: Some(payload),
            panic_on: None,
            delay: None,
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Self::returning(QuizPayload::no_quiz("unused"))
        }
    }

    pub fn panicking_on(mut self, marker: &str) -> Self {
        self.panic_on = Some(marker.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl QuizInference for FakeQuiz {
    async fn infer(&self, text: &str) -> Result<QuizPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(text.to_string());
        if let Some(marker) = &self.panic_on {
            if text.contains(marker.as_str()) {
                panic!("quiz backend exploded on {marker}");
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| Error::ExternalBackend("quiz backend down".to_string()))
    }
}

pub struct FakeVideo {
    reply: Option<String>,
    broken: bool,
    pub calls: AtomicUsize,
}

impl FakeVideo {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            broken: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            reply: None,
            broken: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn broken() -> Self {
        Self {
            reply: None,
            broken: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VideoInference for FakeVideo {
    async fn infer(&self, _external_id: &str, _title: &str, _duration_seconds: i64) -> Result<VideoReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(Error::ExternalBackend("video backend returned 503".to_string()));
        }
        Ok(match &self.reply {
            Some(text) => VideoReply::Text(text.clone()),
            None => VideoReply::Unavailable,
        })
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pub fail: bool,
    /// Blocks the render, to widen race windows
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub last_fields: Mutex<Option<CertificateFields>>,
}

impl CertificateRenderer for FakeRenderer {
    fn render(&self, fields: &CertificateFields) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_fields.lock().unwrap() = Some(fields.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(anyhow!("renderer crashed"));
        }
        Ok(format!("certificate for {}", fields.student_name).into_bytes())
    }
}

#[derive(Default)]
pub struct FakeUploader {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl ArtifactUploader for FakeUploader {
    fn upload(&self, _bytes: &[u8], name: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("bucket down"));
        }
        Ok(format!("https://files.example.com/{name}.svg"))
    }
}
