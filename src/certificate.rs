//! Idempotent certificate issuance.

pub mod artifact;
pub mod eligibility;

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use dashmap::DashMap;
use serde::Serialize;
use sqlx::SqlitePool;
use time::{OffsetDateTime, macros::format_description};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    course,
    error::{Error, Result},
    utils::now_utc,
};
use artifact::{ArtifactUploader, CertificateFields, CertificateRenderer};
use eligibility::EligibilityEvaluator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Certificate {
    pub id: Uuid,
    pub user_id: i64,
    pub course_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub issued_at: OffsetDateTime,
    pub artifact_url: String,
}

impl Certificate {
    /// Date printed on the certificate, e.g. "October 17, 2026"
    pub fn issue_date(&self) -> String {
        self.issued_at
            .format(format_description!("[month repr:long] [day], [year]"))
            .unwrap_or_else(|_| self.issued_at.date().to_string())
    }

    /// Identifier short enough to print
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    fn artifact_name(&self) -> String {
        format!("certificate_{}", self.id)
    }
}

#[derive(sqlx::FromRow)]
struct CertificateRow {
    id: String,
    user_id: i64,
    course_id: i64,
    issued_at: OffsetDateTime,
    artifact_url: String,
}

impl TryFrom<CertificateRow> for Certificate {
    type Error = Error;

    fn try_from(row: CertificateRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| Error::Fatal(anyhow!("corrupt certificate id {:?}: {e}", row.id)))?;
        Ok(Self {
            id,
            user_id: row.user_id,
            course_id: row.course_id,
            issued_at: row.issued_at,
            artifact_url: row.artifact_url,
        })
    }
}

/// A certificate together with who earned it, for public verification
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CertificateView {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub student_name: String,
    pub course_title: String,
}

const CERTIFICATE_COLUMNS: &str = "id, user_id, course_id, issued_at, artifact_url";

pub async fn find_certificate(
    database: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<Option<Certificate>> {
    sqlx::query_as::<_, CertificateRow>(&format!(
        "SELECT {CERTIFICATE_COLUMNS} FROM certificate WHERE user_id = ? AND course_id = ?"
    ))
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(database)
    .await?
    .map(Certificate::try_from)
    .transpose()
}

pub async fn get_certificate(database: &SqlitePool, id: Uuid) -> Result<Certificate> {
    sqlx::query_as::<_, CertificateRow>(&format!(
        "SELECT {CERTIFICATE_COLUMNS} FROM certificate WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(database)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Certificate {id}")))?
    .try_into()
}

pub struct CertificateIssuer {
    database: SqlitePool,
    eligibility: EligibilityEvaluator,
    renderer: Arc<dyn CertificateRenderer>,
    uploader: Arc<dyn ArtifactUploader>,
    render_timeout: Duration,
    upload_timeout: Duration,
    /// Serializes issuance per (user, course) within this process
    locks: DashMap<(i64, i64), Arc<Mutex<()>>>,
}

impl CertificateIssuer {
    pub fn new(
        database: SqlitePool,
        renderer: Arc<dyn CertificateRenderer>,
        uploader: Arc<dyn ArtifactUploader>,
        render_timeout: Duration,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            eligibility: EligibilityEvaluator::new(database.clone()),
            database,
            renderer,
            uploader,
            render_timeout,
            upload_timeout,
            locks: DashMap::new(),
        }
    }

    pub fn eligibility(&self) -> &EligibilityEvaluator {
        &self.eligibility
    }

    /// Issue the certificate of `user_id` for `course_id`, or return the one already issued.
    ///
    /// The artifact is rendered and uploaded before anything is written, so a failed render
    /// or upload leaves no trace. At most one render runs per (user, course) in this process;
    /// across processes the unique key on `certificate` decides the winner.
    #[instrument(skip(self))]
    pub async fn issue(&self, user_id: i64, course_id: i64) -> Result<Certificate> {
        let entry = KeyLock::acquire(&self.locks, (user_id, course_id));
        let _guard = entry.lock.lock().await;
        self.issue_locked(user_id, course_id).await
    }

    async fn issue_locked(&self, user_id: i64, course_id: i64) -> Result<Certificate> {
        if let Some(existing) = find_certificate(&self.database, user_id, course_id).await? {
            info!(certificate_id = %existing.id, "certificate already issued");
            return Ok(existing);
        }
        let eligibility = self.eligibility.evaluate(user_id, course_id).await?;
        if !eligibility.eligible {
            return Err(Error::Ineligible {
                missing: eligibility.missing_reasons,
            });
        }
        let user = course::get_user(&self.database, user_id).await?;
        let course = course::get_course(&self.database, course_id).await?;

        let mut certificate = Certificate {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            issued_at: now_utc(),
            artifact_url: String::new(),
        };
        let fields = CertificateFields {
            student_name: user.full_name,
            course_title: course.title,
            issue_date: certificate.issue_date(),
            short_id: certificate.short_id(),
        };

        let renderer = self.renderer.clone();
        let bytes = run_blocking("render", self.render_timeout, move || renderer.render(&fields)).await?;
        let uploader = self.uploader.clone();
        let name = certificate.artifact_name();
        certificate.artifact_url =
            run_blocking("upload", self.upload_timeout, move || uploader.upload(&bytes, &name)).await?;

        let mut tx = self.database.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO certificate (id, user_id, course_id, issued_at, artifact_url) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(certificate.id.to_string())
        .bind(user_id)
        .bind(course_id)
        .bind(certificate.issued_at)
        .bind(&certificate.artifact_url)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            tx.rollback().await?;
            warn!("certificate issued concurrently elsewhere, returning it");
            return find_certificate(&self.database, user_id, course_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Certificate of user {user_id} for course {course_id}")));
        }
        sqlx::query(
            "UPDATE enrollment SET is_completed = 1, certificate_url = ? WHERE user_id = ? AND course_id = ?",
        )
        .bind(&certificate.artifact_url)
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        info!(certificate_id = %certificate.id, url = %certificate.artifact_url, "certificate issued");
        get_certificate(&self.database, certificate.id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Certificate> {
        get_certificate(&self.database, id).await
    }

    /// Resolve a certificate id to who earned it. Unknown ids are not authentic.
    pub async fn verify(&self, id: Uuid) -> Result<CertificateView> {
        let certificate = self.get(id).await?;
        let user = course::get_user(&self.database, certificate.user_id).await?;
        let course = course::get_course(&self.database, certificate.course_id).await?;
        Ok(CertificateView {
            certificate,
            student_name: user.full_name,
            course_title: course.title,
        })
    }
}

/// A handle on the per-key lock. The map entry is removed on drop once no other caller holds
/// it, which also covers a cancelled `issue`.
struct KeyLock<'a> {
    locks: &'a DashMap<(i64, i64), Arc<Mutex<()>>>,
    key: (i64, i64),
    lock: Arc<Mutex<()>>,
}

impl<'a> KeyLock<'a> {
    fn acquire(locks: &'a DashMap<(i64, i64), Arc<Mutex<()>>>, key: (i64, i64)) -> Self {
        let lock = locks.entry(key).or_default().clone();
        Self { locks, key, lock }
    }
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        // the map and this handle
        self.locks
            .remove_if(&self.key, |_, lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
    }
}

/// Run a blocking side effect on the blocking pool with a deadline
async fn run_blocking<T, F>(what: &str, timeout: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(Error::ExternalBackend(format!("certificate {what} failed: {e:#}"))),
        Ok(Err(e)) => Err(Error::ExternalBackend(format!("certificate {what} aborted: {e}"))),
        Err(_) => Err(Error::ExternalBackend(format!(
            "certificate {what} timed out after {timeout:?}"
        ))),
    }
}
