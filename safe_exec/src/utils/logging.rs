//! # Logging Initialization
//!
//! Centralized `tracing` setup shared by the service and CLI binaries.
//!
//! - **`init_logging()`** is guarded by a `std::sync::Once`, so calling it more
//!   than once (tests, embedding) is harmless.
//! - **Environment filter**: `RUST_LOG` wins when set. Otherwise the given level
//!   applies everywhere, and `debug`/`trace` also turn on request spans from
//!   `tower_http`.
//! - **Stderr (default)**: ANSI colors only when stderr is a terminal.
//! - **File (opt-in)**: a daily rolling file in the user cache directory
//!   resolved by `directories`, written through a non-blocking appender. Falls
//!   back to stderr when that directory cannot be used.
//!
//! Stdout is never used: the runner protocol and CLI output own it.

use anyhow::Result;
use directories::ProjectDirs;
use std::io::{IsTerminal, stderr};
use std::path::Path;
use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

const LOG_FILE_PREFIX: &str = "safe_exec.log";

/// Initialize verbose logging for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Initializes the global tracing subscriber.
///
/// # Errors
///
/// Currently infallible; the `Result` keeps call sites stable should file setup
/// become fatal.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

        if log_to_file
            && let Some(proj_dirs) = ProjectDirs::from("dev", "SafeExec", "safe_exec")
        {
            let log_dir = proj_dirs.cache_dir();
            if can_write(log_dir) {
                let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .init();
                // Leaked so buffered lines are flushed for the whole process life.
                Box::leak(Box::new(guard));
                return;
            }
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                layer()
                    .with_writer(stderr)
                    .with_ansi(stderr().is_terminal()),
            )
            .init();
    });

    Ok(())
}

fn default_directives(log_level: &str) -> String {
    match log_level {
        "debug" | "trace" => format!(
            "{log_level},safe_exec={log_level},safe_exec_http={log_level},tower_http=debug"
        ),
        _ => format!("{log_level},tower_http=info"),
    }
}

/// Whether log files can be created in `dir`. `tracing_appender::rolling`
/// panics on permission errors, so this runs first.
fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".safe_exec_log_probe");
    match std::fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_logging_is_idempotent() {
        assert!(init_logging("info", false).is_ok());
        assert!(init_logging("debug", false).is_ok());
        init_test_logging();
    }

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives("info"), "info,tower_http=info");
        assert!(default_directives("debug").contains("safe_exec=debug"));
    }

    #[test]
    fn test_can_write_to_temp_dir() {
        let dir = TempDir::new().unwrap();
        assert!(can_write(&dir.path().join("logs")));
        assert!(!dir.path().join("logs").join(".safe_exec_log_probe").exists());
    }
}
