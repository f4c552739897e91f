use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let _log_guard = init_logging();
    codex_transcript_viewer::run()
}

/// File-based logging so the alternate screen never gets corrupted by log
/// output. `RUST_LOG` controls the filter; no log dir means no logging.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let dir = codex_transcript_viewer::default_data_dir().join("logs");
    std::fs::create_dir_all(&dir).ok()?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        dir,
        "ctv.log",
    ));
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}
