// Logging bootstrap shared by the tool binaries.
//
// Console output always goes through a fmt layer; passing a log directory
// adds a daily-rolling file layer on top. RUST_LOG overrides the numeric
// console level when set.

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tracing_appender::rolling;

/// Map the numeric console log level used by the CLI to a filter directive.
/// 0=Minimum, 1=Error, 2=Detail, 3=Full/Debug, 4=Trace.
pub fn map_log_level(level: i32) -> &'static str {
    match level {
        0 => "warn",
        1 => "error",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system.
pub fn initialize_logging(log_dir: Option<&str>, console_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_level));

    if let Some(dir) = log_dir {
        let path = Path::new(dir);
        if !path.exists() {
            let _ = std::fs::create_dir_all(path);
        }

        let file_appender = rolling::daily(dir, "worldtool.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the guard alive for the program duration
        std::mem::forget(guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .init();
    }
}
