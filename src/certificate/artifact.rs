//! Certificate rendering and upload. Both are blocking and run on the blocking pool.

use std::{fmt::Write as _, path::PathBuf};

use anyhow::{Context, bail};
use tracing::debug;

/// What gets printed on a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFields {
    pub student_name: String,
    pub course_title: String,
    /// e.g. "October 17, 2026"
    pub issue_date: String,
    /// First 8 characters of the certificate id
    pub short_id: String,
}

pub trait CertificateRenderer: Send + Sync {
    fn render(&self, fields: &CertificateFields) -> anyhow::Result<Vec<u8>>;
}

/// Stores a rendered artifact under a unique name and returns its public URL.
/// Uploading the same name twice overwrites.
pub trait ArtifactUploader: Send + Sync {
    fn upload(&self, bytes: &[u8], name: &str) -> anyhow::Result<String>;
}

pub struct SvgCertificateRenderer {
    presented_by: String,
}

impl SvgCertificateRenderer {
    pub fn new(presented_by: impl Into<String>) -> Self {
        Self {
            presented_by: presented_by.into(),
        }
    }
}

impl CertificateRenderer for SvgCertificateRenderer {
    fn render(&self, fields: &CertificateFields) -> anyhow::Result<Vec<u8>> {
        let mut svg = String::new();
        writeln!(
            svg,
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="1123" height="794" viewBox="0 0 1123 794">"##
        )?;
        writeln!(svg, r##"  <rect width="1123" height="794" fill="#fdfbf5"/>"##)?;
        writeln!(
            svg,
            r##"  <rect x="30" y="30" width="1063" height="734" fill="none" stroke="#1e3a5f" stroke-width="6"/>"##
        )?;
        let lines = [
            (150, 44, "Certificate of Completion"),
            (240, 20, "This is to certify that"),
            (320, 40, fields.student_name.as_str()),
            (390, 20, "has successfully completed the course"),
            (460, 32, fields.course_title.as_str()),
            (560, 18, fields.issue_date.as_str()),
            (600, 16, self.presented_by.as_str()),
        ];
        for (y, size, text) in lines {
            writeln!(
                svg,
                r##"  <text x="561" y="{y}" font-family="Georgia, serif" font-size="{size}" text-anchor="middle" fill="#1e3a5f">{}</text>"##,
                escape_xml(text)
            )?;
        }
        writeln!(
            svg,
            r##"  <text x="1063" y="744" font-family="monospace" font-size="12" text-anchor="end" fill="#7a7a7a">ID: {}</text>"##,
            escape_xml(&fields.short_id)
        )?;
        svg.push_str("</svg>\n");
        Ok(svg.into_bytes())
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Writes artifacts to a directory that is served under `public_base_url`
pub struct LocalDirUploader {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalDirUploader {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl ArtifactUploader for LocalDirUploader {
    fn upload(&self, bytes: &[u8], name: &str) -> anyhow::Result<String> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!("invalid artifact name {name:?}");
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))?;
        let file_name = format!("{name}.svg");
        let path = self.dir.join(&file_name);
        std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), "artifact stored");
        Ok(format!("{}/{file_name}", self.public_base_url))
    }
}
