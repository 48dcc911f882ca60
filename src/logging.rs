//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! - **Chat** ([`init_chat`]): JSON file layer (daily rotation) plus a
//!   console layer, for long interactive sessions.
//! - **CLI** ([`init_cli`]): console only, for one-shot subcommands.
//!
//! Both honour `RUST_LOG`. Prompt text and student records are never
//! logged; only sizes and counts.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file prefix; the appender adds `.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "mathpath.log";

/// Holds the non-blocking writer guard for file logging.
///
/// Keep it alive for the duration of the session; dropping it flushes
/// pending entries.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialise logging for the interactive chat.
///
/// Writes JSON logs to `{logs_dir}/mathpath.log.YYYY-MM-DD` and
/// human-readable output to stderr. If a global subscriber is already
/// installed the existing one is kept.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_chat(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(json_layer)
        .with(console_layer)
        .try_init();

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise console-only logging for one-shot subcommands.
///
/// `verbose` lowers the default level to `debug`; `RUST_LOG` still wins.
pub fn init_cli(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
