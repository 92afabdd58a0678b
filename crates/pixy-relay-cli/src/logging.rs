use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// `RUST_LOG` wins over the configured level. Stderr always receives
/// output; a configured file path adds a non-blocking file layer.
pub fn init_tracing(config: &LogConfig) {
    static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::io::stderr);

    let file_layer = config.file_path.as_ref().and_then(|file_path| {
        let directory = file_path.parent()?;
        let file_name = file_path.file_name()?;
        if let Err(error) = std::fs::create_dir_all(directory) {
            eprintln!(
                "warning: failed to create log directory {}: {error}",
                directory.display()
            );
            return None;
        }
        let appender = tracing_appender::rolling::never(directory, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = TRACE_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
    });

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if let Err(error) = init_result {
        eprintln!("warning: failed to initialize relay tracing subscriber: {error}");
    }
}
