//! Tracing setup: a quiet stderr layer plus an optional debug log file in the app directory.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "log.txt";

pub struct LogOptions<'a> {
    /// Log to stderr. Off while the TUI owns the terminal.
    pub stderr: bool,
    /// Directory for `log.txt`; `None` disables the file layer.
    pub file_dir: Option<&'a Path>,
    pub max_file_bytes: u64,
}

/// Install the global subscriber. Keep the returned guard alive until exit so buffered
/// file output is flushed.
pub fn init(opts: LogOptions<'_>) -> Result<Option<WorkerGuard>> {
    let stderr_layer = opts.stderr.then(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter)
    });

    let (file_layer, guard) = match opts.file_dir {
        Some(dir) => {
            truncate_if_oversized(dir, opts.max_file_bytes)?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("app_launcher=debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(guard)
}

/// Start `log.txt` over once it is larger than `max_bytes`, leaving a marker line.
pub(crate) fn truncate_if_oversized(dir: &Path, max_bytes: u64) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);
    let Ok(meta) = std::fs::metadata(&path) else {
        return Ok(());
    };
    if meta.len() <= max_bytes {
        return Ok(());
    }
    let mut f = std::fs::File::create(&path)
        .with_context(|| format!("truncate {}", path.display()))?;
    let ts = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into());
    writeln!(f, "[{ts}] log truncated (was {} bytes)", meta.len())?;
    Ok(())
}
