use std::{str::FromStr, sync::Arc};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

use crate::{
    ai_utils,
    analysis::{
        AnalysisPipeline,
        batch::BatchProcessor,
        quiz_client::{OpenAiQuizClient, QuizInference},
        transcript::{DisabledTranscriptSource, HttpTranscriptSource, TranscriptSource},
        video_client::{DisabledVideoInference, GeminiVideoClient, VideoInference},
    },
    certificate::{
        CertificateIssuer,
        artifact::{ArtifactUploader, CertificateRenderer, LocalDirUploader, SvgCertificateRenderer},
    },
    config::Config,
};

/// Everything a request handler may touch. Built once at startup.
pub struct AppState {
    pub database: SqlitePool,
    pub batch: BatchProcessor,
    pub issuer: CertificateIssuer,
}

impl AppState {
    pub fn new(
        database: SqlitePool,
        pipeline: Arc<AnalysisPipeline>,
        renderer: Arc<dyn CertificateRenderer>,
        uploader: Arc<dyn ArtifactUploader>,
        config: &Config,
    ) -> Self {
        Self {
            batch: BatchProcessor::new(database.clone(), pipeline, config.analysis.max_concurrency),
            issuer: CertificateIssuer::new(
                database.clone(),
                renderer,
                uploader,
                config.certificate.render_timeout(),
                config.certificate.upload_timeout(),
            ),
            database,
        }
    }

    /// Wire the real backends described by `config`
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let database = connect_database(&config.database_url).await?;
        let pipeline = Arc::new(build_pipeline(config)?);
        let renderer = Arc::new(SvgCertificateRenderer::new(&config.certificate.presented_by));
        let uploader = Arc::new(LocalDirUploader::new(
            &config.certificate.output_dir,
            &config.certificate.public_base_url,
        ));
        Ok(Self::new(database, pipeline, renderer, uploader, config))
    }
}

pub fn build_pipeline(config: &Config) -> anyhow::Result<AnalysisPipeline> {
    let timeout = config.analysis.request_timeout();
    let transcripts: Arc<dyn TranscriptSource> = match &config.transcript.base_url {
        Some(url) => Arc::new(HttpTranscriptSource::new(url, timeout)?),
        None => {
            info!("no transcript service configured, every video goes to video analysis");
            Arc::new(DisabledTranscriptSource)
        }
    };
    let quiz: Arc<dyn QuizInference> = Arc::new(OpenAiQuizClient::new(
        ai_utils::build_client(&config.openai),
        &config.openai.model,
    ));
    let video: Arc<dyn VideoInference> = match &config.gemini {
        Some(gemini) => Arc::new(GeminiVideoClient::new(gemini.clone(), timeout)?),
        None => {
            info!("video analysis backend not configured");
            Arc::new(DisabledVideoInference)
        }
    };
    Ok(AnalysisPipeline::new(
        transcripts,
        quiz,
        video,
        config.analysis.max_transcript_chars,
        timeout,
    ))
}

/// Open (creating if needed) the database and bring its schema up to date
pub async fn connect_database(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let database = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&database).await?;
    Ok(database)
}
