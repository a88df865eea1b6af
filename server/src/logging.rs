//! Logging setup for the work server.
//!
//! The daemon wires `server.log_level` and `server.log_format` from the
//! configuration into [`init_logging`]; worker threads are long-lived, so
//! thread ids are included to tell concurrent searches apart in the output.

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::ServerError;

/// Selects the output format for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Readable lines for terminals.
    Human,
    /// One JSON object per line, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(ServerError::Config(format!("unknown log format {other:?}"))),
        }
    }
}

/// Install the process-wide tracing subscriber.
///
/// A `RUST_LOG` environment variable takes precedence over the configured
/// `level` string (e.g. `"info"`, `"debug,cinder_server=trace"`). Calling
/// this a second time panics, since a process has a single global
/// subscriber.
pub fn init_logging(format: LogFormat, level: &str) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::new(level),
    };

    let lines = fmt::layer().with_target(true).with_thread_ids(true);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Human => registry.with(lines).init(),
        LogFormat::Json => registry.with(lines.json()).init(),
    }
}
