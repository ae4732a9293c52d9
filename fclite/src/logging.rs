//! Process-wide tracing setup.
//!
//! Library code only emits `tracing` events. Binaries call [`init_logging`]
//! once; a machine can also route its own events elsewhere with
//! `MachineOpt::Logger`.

use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "fclite.log";

/// Keeps the background log writer alive. Hold it until exit so buffered
/// lines are flushed.
pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` (default `info`). With `log_dir` set,
/// events go to a daily rolling file in that directory; otherwise to stderr.
pub fn init_logging(log_dir: Option<&Path>) -> LogGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_guard = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();

            None
        }
    };

    LogGuard {
        _file_guard: file_guard,
    }
}
