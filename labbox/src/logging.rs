//! Tracing setup shared by the server and the CLI.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::options::LogOptions;

const LOG_FILE_NAME: &str = "labbox.log";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `options.level`. With `options.dir` set, records are
/// also written to a daily-rotated file; keep the returned guard alive for as
/// long as logs should be flushed. Calling this twice is harmless: the second
/// subscriber is not installed.
pub fn init_logging(options: &LogOptions) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let Some(dir) = &options.dir else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .try_init();
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("failed to create log dir {}: {}", dir.display(), e);
    }
    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();

    Some(guard)
}
