#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not eligible for certificate yet: {}", .missing.join("; "))]
    Ineligible { missing: Vec<String> },
    #[error("External backend failure: {0}")]
    ExternalBackend(String),
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Fatal error: {0}")]
    Fatal(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Failures caused by a third-party backend rather than by the caller or our own storage.
    pub fn is_external(&self) -> bool {
        matches!(self, Error::ExternalBackend(_) | Error::MalformedResponse(_))
    }
}
