//! Logging initialization.
//!
//! Thin wrapper over the observability crate so binaries configure logging
//! from [`Config`](crate::Config) and [`Paths`](crate::Paths) in one call.

use crate::Paths;
use observability::LogConfig;

/// Initialize structured logging for a service.
///
/// Writes JSONL to the paths' central log file. Log level comes from
/// `RUST_LOG` when set, otherwise from `level`.
pub fn init_logging(service_name: &str, level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}
