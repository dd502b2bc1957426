use std::path::PathBuf;

use anyhow::bail;
use tracing_subscriber::EnvFilter;

/// Current time in UTC
pub fn now_utc() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc()
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// 初始化日志
pub fn init_log(log: Option<PathBuf>) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber_builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true);
    let (non_blocking, guard) = if let Some(log) = log {
        // output to file，daily rotate, non-blocking
        if !log.is_dir() {
            bail!("log path {} is not a directory", log.display());
        }
        let file_appender = tracing_appender::rolling::daily(log, "course_certify.log");
        tracing_appender::non_blocking(file_appender)
    } else {
        // output to stdout
        tracing_appender::non_blocking(std::io::stdout())
    };
    tracing::subscriber::set_global_default(subscriber_builder.with_writer(non_blocking).finish())?;
    Ok(guard)
}

#[test]
fn round1_keeps_one_decimal() {
    assert_eq!(round1(66.666), 66.7);
    assert_eq!(round1(100.0), 100.0);
}

#[test]
fn init_log_rejects_a_file_as_log_dir() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let err = init_log(Some(file.path().to_path_buf())).unwrap_err();
    assert!(err.to_string().contains("is not a directory"));
}
