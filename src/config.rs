use std::{fmt, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// Process-wide configuration, built and validated once by the composition root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub openai: OpenAIConfig,
    /// Absent means the video fallback backend is unavailable.
    pub gemini: Option<GeminiConfig>,
    pub transcript: TranscriptConfig,
    pub analysis: AnalysisConfig,
    pub certificate: CertificateConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://course_certify.db".to_string(),
            openai: OpenAIConfig::default(),
            gemini: None,
            transcript: TranscriptConfig::default(),
            analysis: AnalysisConfig::default(),
            certificate: CertificateConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl From<&OpenAIConfig> for async_openai::config::OpenAIConfig {
    fn from(config: &OpenAIConfig) -> Self {
        async_openai::config::OpenAIConfig::default()
            .with_api_base(&config.base_url)
            .with_api_key(&config.api_key)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Base url of the transcript sidecar, transcripts are treated as absent when unset
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    pub max_transcript_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_timeout_secs: 120,
            max_transcript_chars: 12_000,
        }
    }
}

impl AnalysisConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    pub output_dir: PathBuf,
    pub public_base_url: String,
    pub presented_by: String,
    pub render_timeout_secs: u64,
    pub upload_timeout_secs: u64,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("certificates"),
            public_base_url: "http://127.0.0.1:8080/certificates".to_string(),
            presented_by: "Course Certify Team".to_string(),
            render_timeout_secs: 30,
            upload_timeout_secs: 60,
        }
    }
}

impl CertificateConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Read the toml file (if any), apply `.env` / environment overrides and validate.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`] without validation, for tools that never call a backend
    pub fn read(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| dotenvy::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Secrets and endpoints may come from the environment instead of the file.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(model) = var("AI_MODEL") {
            self.openai.model = model;
        }
        if let Some(key) = var("GEMINI_API_KEY").filter(|k| !k.is_empty()) {
            self.gemini.get_or_insert_with(GeminiConfig::default).api_key = key;
        }
        if let Some(url) = var("TRANSCRIPT_SERVICE_URL").filter(|u| !u.is_empty()) {
            self.transcript.base_url = Some(url);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            bail!("database_url is not configured");
        }
        if self.openai.api_key.trim().is_empty() {
            bail!("OPENAI_API_KEY is not configured");
        }
        if let Some(gemini) = &self.gemini {
            if gemini.api_key.trim().is_empty() {
                bail!("[gemini] section present but GEMINI_API_KEY is empty");
            }
        }
        if self.analysis.max_concurrency == 0 {
            bail!("analysis.max_concurrency must be at least 1");
        }
        if self.analysis.max_transcript_chars == 0 {
            bail!("analysis.max_transcript_chars must be at least 1");
        }
        if self.analysis.request_timeout_secs == 0
            || self.certificate.render_timeout_secs == 0
            || self.certificate.upload_timeout_secs == 0
        {
            bail!("timeouts must be at least one second");
        }
        Ok(())
    }
}
