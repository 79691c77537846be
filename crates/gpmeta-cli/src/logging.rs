use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives, e.g. `GPMETA_LOG=debug` or `GPMETA_LOG=gpmeta_core::resolve=debug`.
pub const LOG_ENV: &str = "GPMETA_LOG";

/// Formatter shared by the console and file outputs: timestamp, level,
/// target and message on every line.
fn entry_layer<S, W>(writer: W, ansi: bool) -> fmt::Layer<S, fmt::format::DefaultFields, fmt::format::Format, W>
where
    W: for<'w> fmt::MakeWriter<'w> + 'static,
{
    fmt::layer().with_writer(writer).with_ansi(ansi)
}

/// Console logging on stderr plus a daily log file in `log_dir`
/// (`gpmeta.<date>.log`, three files kept). Keep the guard alive until exit
/// or buffered file lines are lost.
pub fn init_logger(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::try_new(&filter).with_context(|| format!("invalid {}: {}", LOG_ENV, filter))?;

    let file_appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix("gpmeta")
        .filename_suffix("log")
        .max_log_files(3)
        .build(log_dir)
        .with_context(|| format!("cannot open log directory {}", log_dir.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(entry_layer(std::io::stderr, true))
        .with(entry_layer(non_blocking, false))
        .with(filter_layer)
        .init();

    Ok(guard)
}
