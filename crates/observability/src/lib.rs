//! # Observability
//!
//! Structured logging for the AI4Science auth workspace.
//!
//! Services call [`init_with_config`] once at startup and then use
//! plain `tracing` macros. Every event is written as one JSON object per line
//! to `~/.ai4science/logs/dev.jsonl`:
//!
//! - `tail -f ~/.ai4science/logs/dev.jsonl | jq` for pretty JSON
//! - `lnav ~/.ai4science/logs/dev.jsonl` for interactive exploration
//!
//! Field values whose key looks like a credential (`access_token`,
//! `password`, ...) or whose value looks like a bearer token are redacted
//! before they reach the file.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "cli".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod json_layer;
mod redact;
mod writer;

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use redact::{redact_fields, REDACTED};
pub use writer::{CentralLogWriter, WriterFactory};

/// Directory under the home directory that holds all runtime files.
const BASE_DIR_NAME: &str = ".ai4science";

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "cli", "desktop").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.ai4science/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Central log file location.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(BASE_DIR_NAME).join("logs").join("dev.jsonl"))
}

/// Initialize logging with custom configuration.
///
/// If the log file cannot be opened the JSON layer is skipped and only the
/// stderr layer (when enabled) is installed. Calling this twice is harmless;
/// the second subscriber is rejected by `tracing` and ignored.
pub fn init_with_config(config: LogConfig) {
    let log_path = config.log_path.clone().or_else(default_log_path);

    let json_layer = log_path.as_ref().and_then(|path| match CentralLogWriter::new(path) {
        Ok(writer) => Some(
            JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
                .with_filter(env_filter(&config.default_level)),
        ),
        Err(e) => {
            eprintln!("failed to open log file {}: {}", path.display(), e);
            None
        }
    });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?log_path,
            "observability initialized"
        );
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
